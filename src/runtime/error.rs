use thiserror::Error;

use super::property::PropertyKey;
use crate::device::SlotIndex;

/// Errors reported by the runtime outside of pose retrieval
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuntimeError {
    #[error("Runtime handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Failed to read hardware event queue: {0}")]
    EventQueue(String),
}

/// Pose retrieval errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PoseError {
    /// Another application holds input focus; poses are stale until focus returns.
    #[error("Pose retrieval degraded: application does not have focus")]
    FocusLost,

    #[error("Pose retrieval failed: {0}")]
    Runtime(String),
}

/// Property accessor errors, returned synchronously to the caller
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PropertyError {
    #[error("Property {key:?} unavailable for slot {slot}")]
    Unavailable { slot: SlotIndex, key: PropertyKey },

    #[error("Property {key:?} for slot {slot} has type {actual}, expected {expected}")]
    WrongType {
        slot: SlotIndex,
        key: PropertyKey,
        expected: &'static str,
        actual: &'static str,
    },
}
