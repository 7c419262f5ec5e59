//! Concurrency core of a real-time tracked-device runtime
//!
//! - [`queue`] - deferred-action queues between cadences
//! - [`device`] - device read views and owner capabilities
//! - [`notify`] - lifecycle notifications delivered on the update cadence
//! - [`hub`] - the tracking hub and its render, input and update cadences
//! - [`loader`] - coalescing model/texture loader
//! - [`runtime`] - interfaces to the hardware runtime, [`sim`] a scriptable stand-in
//! - [`config`] - TOML configuration

pub mod config;
pub mod device;
pub mod hub;
pub mod loader;
pub mod notify;
pub mod queue;
pub mod runtime;
pub mod sim;
