use std::time::Duration;
use thiserror::Error;

use crate::runtime::TextureId;

/// Why a load attempt ended without a resource
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LoadFailure {
    #[error("runtime reported: {0}")]
    Runtime(String),

    #[error("still loading after {0:?}")]
    TimedOut(Duration),

    #[error("still loading after {0} polls")]
    PollLimitReached(u32),
}

/// Terminal load failure, tagged with the kind of resource
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResourceLoadError {
    #[error("Failed to load model '{name}': {reason}")]
    Model { name: String, reason: LoadFailure },

    #[error("Failed to load texture {id}: {reason}")]
    Texture { id: TextureId, reason: LoadFailure },
}

impl ResourceLoadError {
    pub fn reason(&self) -> &LoadFailure {
        match self {
            ResourceLoadError::Model { reason, .. } | ResourceLoadError::Texture { reason, .. } => {
                reason
            }
        }
    }
}
