//! Tracked device entities
//!
//! Every tracked device exists as two halves created together by [`state::new_pair`]:
//!
//! 1. [`DeviceHandle`] - read-only view, cloned freely to any thread
//! 2. [`DeviceOwner`] - write capability, only ever held inside the hub
//!
//! # Field groups
//!
//! ```text
//! render pose          ── written by render cadence
//! motion, controller   ── written by input cadence
//! enabled, tracking,
//! activity             ── written by update cadence (through queued actions)
//! ```
//!
//! No field group is behind a lock. Each group has exactly one writing cadence, and
//! multi-word groups live in a [`SeqCell`] so readers never observe a torn value.

pub mod seq_cell;
pub mod state;
pub mod types;

pub use seq_cell::{Packed, SeqCell};
pub use state::{DeviceDescriptor, DeviceHandle, DeviceOwner};
pub use types::{
    ActivityLevel, ButtonMask, ButtonType, ControllerInput, ControllerRole, DeviceClass,
    DeviceKind, MotionState, RigidPose, SlotIndex, TrackingState,
};
