//! Device read view and owner capability
//!
//! [`new_pair`] is the only way to create a device, and it returns both halves at once. The
//! [`DeviceOwner`] cannot be cloned or constructed outside this crate; the hub keeps it and
//! hands each cadence only the setters for the field group that cadence writes.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use super::seq_cell::SeqCell;
use super::types::{
    ActivityLevel, ControllerInput, DeviceClass, DeviceKind, MotionState, RigidPose, SlotIndex,
    TrackingState,
};
use crate::notify::{Notification, Notifier};

/// Immutable facts captured when a slot is registered
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDescriptor {
    pub slot: SlotIndex,
    pub class: DeviceClass,
    pub kind: DeviceKind,
    pub render_model: Option<String>,
    pub serial_number: Option<String>,
}

struct DeviceCell {
    descriptor: DeviceDescriptor,

    // render cadence
    render_pose: SeqCell<RigidPose>,

    // input cadence
    motion: SeqCell<MotionState>,
    controller_input: Option<SeqCell<ControllerInput>>,

    // update cadence
    enabled: AtomicBool,
    tracking: AtomicU8,
    activity: AtomicU8,
}

/// Read-only view of a tracked device
#[derive(Clone)]
pub struct DeviceHandle {
    cell: Arc<DeviceCell>,
}

/// Exclusive write capability for a tracked device
pub struct DeviceOwner {
    cell: Arc<DeviceCell>,
}

/// Creates a device and returns its read view together with its owner.
pub(crate) fn new_pair(descriptor: DeviceDescriptor) -> (DeviceHandle, DeviceOwner) {
    debug!(
        "Creating device for slot {} ({:?})",
        descriptor.slot, descriptor.kind
    );
    let controller_input = descriptor
        .kind
        .is_controller()
        .then(|| SeqCell::new(ControllerInput::NEUTRAL));
    let cell = Arc::new(DeviceCell {
        descriptor,
        render_pose: SeqCell::new(RigidPose::default()),
        motion: SeqCell::new(MotionState::default()),
        controller_input,
        enabled: AtomicBool::new(false),
        tracking: AtomicU8::new(TrackingState::Uninitialized as u8),
        activity: AtomicU8::new(ActivityLevel::Unknown as u8),
    });
    (DeviceHandle { cell: cell.clone() }, DeviceOwner { cell })
}

impl DeviceHandle {
    pub fn slot(&self) -> SlotIndex {
        self.cell.descriptor.slot
    }

    pub fn class(&self) -> DeviceClass {
        self.cell.descriptor.class
    }

    pub fn kind(&self) -> DeviceKind {
        self.cell.descriptor.kind
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.cell.descriptor
    }

    pub fn render_model(&self) -> Option<&str> {
        self.cell.descriptor.render_model.as_deref()
    }

    /// Pose captured by the render cadence.
    pub fn render_pose(&self) -> RigidPose {
        self.cell.render_pose.load()
    }

    /// Pose and velocities sampled by the input cadence.
    pub fn motion(&self) -> MotionState {
        self.cell.motion.load()
    }

    /// Live input, `None` for anything that is not a controller.
    pub fn controller_input(&self) -> Option<ControllerInput> {
        self.cell.controller_input.as_ref().map(SeqCell::load)
    }

    pub fn is_enabled(&self) -> bool {
        self.cell.enabled.load(Ordering::Acquire)
    }

    pub fn tracking_state(&self) -> TrackingState {
        TrackingState::from_u8(self.cell.tracking.load(Ordering::Acquire))
    }

    pub fn activity_level(&self) -> ActivityLevel {
        ActivityLevel::from_u8(self.cell.activity.load(Ordering::Acquire))
    }

    /// Number of render poses written so far.
    pub fn render_pose_version(&self) -> u64 {
        self.cell.render_pose.version()
    }

    /// True when both views refer to the same device instance.
    pub fn same_device(&self, other: &DeviceHandle) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("slot", &self.slot())
            .field("kind", &self.kind())
            .field("enabled", &self.is_enabled())
            .field("tracking", &self.tracking_state())
            .finish()
    }
}

impl DeviceOwner {
    /// A fresh read view of the owned device.
    pub fn handle(&self) -> DeviceHandle {
        DeviceHandle {
            cell: self.cell.clone(),
        }
    }

    pub fn slot(&self) -> SlotIndex {
        self.cell.descriptor.slot
    }

    pub fn kind(&self) -> DeviceKind {
        self.cell.descriptor.kind
    }

    pub fn render_pose(&self) -> RigidPose {
        self.cell.render_pose.load()
    }

    pub fn motion(&self) -> MotionState {
        self.cell.motion.load()
    }

    pub fn controller_input(&self) -> Option<ControllerInput> {
        self.cell.controller_input.as_ref().map(SeqCell::load)
    }

    pub fn is_enabled(&self) -> bool {
        self.cell.enabled.load(Ordering::Acquire)
    }

    pub fn tracking_state(&self) -> TrackingState {
        TrackingState::from_u8(self.cell.tracking.load(Ordering::Acquire))
    }

    pub fn activity_level(&self) -> ActivityLevel {
        ActivityLevel::from_u8(self.cell.activity.load(Ordering::Acquire))
    }

    // render cadence only
    pub(crate) fn set_render_pose(&self, pose: RigidPose) {
        self.cell.render_pose.store(pose);
    }

    // input cadence only
    pub(crate) fn set_motion(&self, motion: MotionState) {
        self.cell.motion.store(motion);
    }

    // input cadence only
    pub(crate) fn set_controller_input(&self, input: ControllerInput) {
        if let Some(cell) = &self.cell.controller_input {
            cell.store(input);
        }
    }

    // input cadence only
    pub(crate) fn reset_controller_input(&self) {
        self.set_controller_input(ControllerInput::NEUTRAL);
    }

    /// Stores the flag and, on an actual change, fires Enabled or Disabled.
    ///
    /// Update cadence only. Returns whether the value changed.
    pub(crate) fn set_enabled(&self, enabled: bool, notifier: &mut Notifier) -> bool {
        let previous = self.cell.enabled.swap(enabled, Ordering::AcqRel);
        if previous == enabled {
            return false;
        }
        info!(
            "Device in slot {} {}",
            self.slot(),
            if enabled { "enabled" } else { "disabled" }
        );
        let device = self.handle();
        notifier.notify(if enabled {
            Notification::Enabled { device }
        } else {
            Notification::Disabled { device }
        });
        true
    }

    /// Stores the tracking state and, on an actual change, fires TrackingStateChanged.
    ///
    /// Update cadence only. Returns whether the value changed.
    pub(crate) fn set_tracking_state(&self, state: TrackingState, notifier: &mut Notifier) -> bool {
        let previous = TrackingState::from_u8(self.cell.tracking.swap(state as u8, Ordering::AcqRel));
        if previous == state {
            return false;
        }
        debug!(
            "Tracking state of slot {}: {:?} -> {:?}",
            self.slot(),
            previous,
            state
        );
        notifier.notify(Notification::TrackingStateChanged {
            device: self.handle(),
            previous,
            current: state,
        });
        true
    }

    /// Update cadence only. Returns whether the value changed.
    pub(crate) fn set_activity_level(&self, level: ActivityLevel, notifier: &mut Notifier) -> bool {
        let previous = ActivityLevel::from_u8(self.cell.activity.swap(level as u8, Ordering::AcqRel));
        if previous == level {
            return false;
        }
        debug!(
            "Activity level of slot {}: {:?} -> {:?}",
            self.slot(),
            previous,
            level
        );
        notifier.notify(Notification::ActivityChanged {
            device: self.handle(),
            previous,
            current: level,
        });
        true
    }
}
