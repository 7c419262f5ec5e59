//! Coalescing asynchronous model/texture loader
//!
//! Wraps the runtime's poll-until-ready load primitives:
//!
//! ```text
//! request(key) ──► per-key section ──► cached? ──yes──► result
//!                                        │ no
//!                                        ▼
//!                      poll primitive ◄──tick── interval (LoadPolicy)
//!                                        │ terminal
//!                                        ▼
//!                           store Loaded / Errored, release section
//! ```
//!
//! Each key gets its own async mutex, created on first use and kept for the session.
//! Concurrent requests for one key wait on that section and then read the cached outcome, so
//! the primitive is polled through exactly one load sequence per terminal outcome. Different
//! keys never wait on each other.

pub mod async_loader;
pub mod error;
pub mod resource;

pub use async_loader::{LoadPolicy, ResourceLoader};
pub use error::{LoadFailure, ResourceLoadError};
pub use resource::{
    LoadResult, LoadedResource, ModelAssets, ResourceKey, ResourceMetadata, ResourceState,
};
