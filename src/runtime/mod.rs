//! Interfaces to the hardware tracking runtime
//!
//! The runtime itself is an external collaborator. This module only defines what the hub and
//! the resource loader need from it:
//!
//! - [`TrackingRuntime`] - handshake, slot classes, poses, controller input, events, properties
//! - [`ResourceRuntime`] - poll-until-ready model and texture loads
//!
//! [`crate::sim::SimulatedRuntime`] implements both for the demo binary and the tests.

pub mod error;
pub mod event;
pub mod property;

pub use error::{PoseError, PropertyError, RuntimeError};
pub use event::{HardwareEvent, HardwareEventKind};
pub use property::{PropertyKey, PropertyValue};

use crate::device::{
    ActivityLevel, ControllerInput, DeviceClass, MotionState, RigidPose, SlotIndex, TrackingState,
};

/// Upper bound on slots any runtime reports.
pub const MAX_TRACKED_DEVICES: usize = 64;

/// Opaque native resource handle owned by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(pub u64);

pub type TextureId = i32;

/// Per-slot pose record as reported by the runtime
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseRecord {
    pub pose_valid: bool,
    pub connected: bool,
    pub pose: RigidPose,
    pub velocity: [f32; 3],
    pub angular_velocity: [f32; 3],
    pub tracking: TrackingState,
}

impl PoseRecord {
    pub fn motion(&self) -> MotionState {
        MotionState {
            pose: self.pose,
            velocity: self.velocity,
            angular_velocity: self.angular_velocity,
        }
    }
}

impl Default for PoseRecord {
    fn default() -> Self {
        Self {
            pose_valid: false,
            connected: false,
            pose: RigidPose::default(),
            velocity: [0.0; 3],
            angular_velocity: [0.0; 3],
            tracking: TrackingState::Uninitialized,
        }
    }
}

/// Result of the initial handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeInfo {
    pub name: String,
    pub slot_count: usize,
}

/// Tracking side of the hardware runtime.
///
/// Methods are called from all three cadences concurrently and must not block.
pub trait TrackingRuntime: Send + Sync {
    /// First contact with the runtime. The only fatal failure path of the hub.
    fn handshake(&self) -> Result<RuntimeInfo, RuntimeError>;

    fn device_class(&self, slot: SlotIndex) -> DeviceClass;

    /// Fills one record per slot for the current render cycle.
    fn render_poses(&self, poses: &mut [PoseRecord]) -> Result<(), PoseError>;

    /// High-rate pose of a single slot, used by the input cadence.
    fn sample_pose(&self, slot: SlotIndex) -> Result<PoseRecord, PoseError>;

    fn controller_input(&self, slot: SlotIndex) -> Result<ControllerInput, PoseError>;

    /// Next pending hardware event, `None` once the queue is empty.
    fn poll_event(&self) -> Result<Option<HardwareEvent>, RuntimeError>;

    fn property(&self, slot: SlotIndex, key: PropertyKey) -> Result<PropertyValue, PropertyError>;

    fn activity_level(&self, slot: SlotIndex) -> ActivityLevel;
}

/// One step of a poll-until-ready load
#[derive(Debug, Clone, PartialEq)]
pub enum LoadPoll<T> {
    Loading,
    Ready(T),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelData {
    pub handle: NativeHandle,
    pub vertex_count: u32,
    pub triangle_count: u32,
    pub diffuse_texture: Option<TextureId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureData {
    pub handle: NativeHandle,
    pub width: u16,
    pub height: u16,
}

/// Model and texture loading side of the runtime.
///
/// Loads are asynchronous by repeated query: callers keep calling the load method until it
/// stops returning [`LoadPoll::Loading`].
pub trait ResourceRuntime: Send + Sync {
    fn load_model(&self, name: &str) -> LoadPoll<ModelData>;

    fn load_texture(&self, id: TextureId) -> LoadPoll<TextureData>;

    fn free_model(&self, handle: NativeHandle);

    fn free_texture(&self, handle: NativeHandle);
}
