use std::fmt;
use std::str::FromStr;

use super::error::{LoadFailure, ResourceLoadError};
use crate::runtime::{NativeHandle, TextureId};

/// Content identifier used to deduplicate loads
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    Model(String),
    Texture(TextureId),
}

impl ResourceKey {
    pub fn model(name: impl Into<String>) -> Self {
        ResourceKey::Model(name.into())
    }

    pub fn texture(id: TextureId) -> Self {
        ResourceKey::Texture(id)
    }

    pub(crate) fn failure(&self, reason: LoadFailure) -> ResourceLoadError {
        match self {
            ResourceKey::Model(name) => ResourceLoadError::Model {
                name: name.clone(),
                reason,
            },
            ResourceKey::Texture(id) => ResourceLoadError::Texture { id: *id, reason },
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKey::Model(name) => write!(f, "model:{}", name),
            ResourceKey::Texture(id) => write!(f, "texture:{}", id),
        }
    }
}

impl FromStr for ResourceKey {
    type Err = String;

    /// Parses `model:<name>` or `texture:<id>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("model", name)) if !name.is_empty() => Ok(ResourceKey::Model(name.to_string())),
            Some(("texture", id)) => id
                .parse()
                .map(ResourceKey::Texture)
                .map_err(|e| format!("invalid texture id '{}': {}", id, e)),
            _ => Err(format!("unrecognised resource key '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceMetadata {
    Model {
        vertex_count: u32,
        triangle_count: u32,
        diffuse_texture: Option<TextureId>,
    },
    Texture {
        width: u16,
        height: u16,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedResource {
    pub key: ResourceKey,
    pub handle: NativeHandle,
    pub metadata: ResourceMetadata,
}

pub type LoadResult = Result<LoadedResource, ResourceLoadError>;

/// A render model and the diffuse texture it references
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelAssets {
    pub model: LoadedResource,
    pub texture: Option<LoadedResource>,
}

impl ModelAssets {
    /// Every key that has to be freed once the model is no longer drawn.
    pub fn keys(&self) -> Vec<ResourceKey> {
        std::iter::once(&self.model)
            .chain(self.texture.as_ref())
            .map(|resource| resource.key.clone())
            .collect()
    }
}

/// Observable state of a key
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceState {
    NotRequested,
    Loading,
    Loaded(LoadedResource),
    Errored(ResourceLoadError),
}
