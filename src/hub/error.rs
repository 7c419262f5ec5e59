use thiserror::Error;

use crate::runtime::{PoseError, PropertyError, RuntimeError};

/// Errors surfaced by the tracking hub
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HubError {
    /// The first handshake with the runtime failed; no hub state exists.
    #[error("Tracking hub initialization failed: {0}")]
    InitializationFailed(String),

    /// Pose retrieval failed; the scan of this cycle was skipped.
    #[error("Pose scan aborted: {0}")]
    PoseFetch(#[from] PoseError),

    /// Reading the hardware event stream failed; remaining events wait for the next cycle.
    #[error("Event stream read failed: {0}")]
    EventRead(RuntimeError),

    #[error(transparent)]
    Property(#[from] PropertyError),
}
