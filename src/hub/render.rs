//! Render cadence - the single writer of the device registry

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::error::HubError;
use super::input::InputContext;
use super::update::UpdateContext;
use crate::device::state::new_pair;
use crate::device::{
    ControllerRole, DeviceClass, DeviceDescriptor, DeviceHandle, DeviceKind, DeviceOwner,
    SlotIndex, TrackingState,
};
use crate::queue::QueueHandle;
use crate::runtime::property::{int_property, text_property};
use crate::runtime::{PoseError, PoseRecord, PropertyError, PropertyKey, PropertyValue, TrackingRuntime};

/// Where a slot is in its `Unseen -> Registered -> {Active, Inactive}` lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPhase {
    Unseen,
    Active,
    Inactive,
}

/// What one render pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub registered: Vec<SlotIndex>,
    pub connected: Vec<SlotIndex>,
    pub disconnected: Vec<SlotIndex>,
    pub tracking_changes: usize,
    pub render_poses_written: usize,
    /// The runtime reported lost focus; last cycle's poses were reused.
    pub focus_degraded: bool,
}

struct RegisteredDevice {
    handle: DeviceHandle,
    owner: Arc<DeviceOwner>,
    // last connectivity and tracking result seen by this cadence
    connected: bool,
    tracking: TrackingState,
}

pub struct RenderCadence {
    runtime: Arc<dyn TrackingRuntime>,
    registry: Vec<Option<RegisteredDevice>>,
    poses: Vec<PoseRecord>,
    input_queue: QueueHandle<InputContext>,
    update_queue: QueueHandle<UpdateContext>,
    focus_degraded: bool,
    cycles: u64,
}

impl RenderCadence {
    pub(crate) fn new(
        runtime: Arc<dyn TrackingRuntime>,
        slot_count: usize,
        input_queue: QueueHandle<InputContext>,
        update_queue: QueueHandle<UpdateContext>,
    ) -> Self {
        Self {
            runtime,
            registry: (0..slot_count).map(|_| None).collect(),
            poses: vec![PoseRecord::default(); slot_count],
            input_queue,
            update_queue,
            focus_degraded: false,
            cycles: 0,
        }
    }

    pub fn slot_count(&self) -> usize {
        self.registry.len()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Handle for scheduling work onto the input cadence.
    pub fn input_queue(&self) -> QueueHandle<InputContext> {
        self.input_queue.clone()
    }

    /// Handle for scheduling work onto the update cadence.
    pub fn update_queue(&self) -> QueueHandle<UpdateContext> {
        self.update_queue.clone()
    }

    pub fn device(&self, slot: SlotIndex) -> Option<DeviceHandle> {
        self.registry
            .get(slot as usize)
            .and_then(Option::as_ref)
            .map(|d| d.handle.clone())
    }

    /// All registered devices in slot order.
    pub fn devices(&self) -> Vec<DeviceHandle> {
        self.registry
            .iter()
            .flatten()
            .map(|d| d.handle.clone())
            .collect()
    }

    pub fn slot_phase(&self, slot: SlotIndex) -> SlotPhase {
        match self.registry.get(slot as usize).and_then(Option::as_ref) {
            None => SlotPhase::Unseen,
            Some(d) if d.connected => SlotPhase::Active,
            Some(_) => SlotPhase::Inactive,
        }
    }

    /// Typed property query forwarded to the runtime.
    pub fn property(&self, slot: SlotIndex, key: PropertyKey) -> Result<PropertyValue, PropertyError> {
        self.runtime.property(slot, key)
    }

    /// One render pass over every slot in ascending order.
    ///
    /// Lost focus is logged once per transition and the pass continues on the previous
    /// cycle's poses. Any other pose error aborts the pass before the registry is touched;
    /// it is logged and returned, and the next cycle retries.
    pub fn scan_poses(&mut self) -> Result<ScanReport, HubError> {
        self.cycles += 1;
        let mut report = ScanReport::default();

        match self.runtime.render_poses(&mut self.poses) {
            Ok(()) => {
                if self.focus_degraded {
                    info!("Application focus regained, pose retrieval back to normal");
                    self.focus_degraded = false;
                }
            }
            Err(PoseError::FocusLost) => {
                if !self.focus_degraded {
                    warn!("Application focus lost, continuing with stale poses");
                    self.focus_degraded = true;
                }
                report.focus_degraded = true;
            }
            Err(e) => {
                error!("Render pose scan aborted in cycle {}: {}", self.cycles, e);
                return Err(HubError::PoseFetch(e));
            }
        }

        for index in 0..self.registry.len() {
            let slot = index as SlotIndex;
            let class = self.runtime.device_class(slot);
            if class == DeviceClass::Invalid {
                continue;
            }

            if self.registry[index].is_none() {
                self.register(slot, class);
                report.registered.push(slot);
            }

            let record = self.poses[index];
            let Some(device) = self.registry[index].as_mut() else {
                continue;
            };

            if record.connected && !device.connected {
                device.connected = true;
                let owner = device.owner.clone();
                self.input_queue
                    .enqueue(move |ctx: &mut InputContext| ctx.activate(owner));
                let owner = device.owner.clone();
                self.update_queue
                    .enqueue(move |ctx: &mut UpdateContext| ctx.set_enabled(&owner, true));
                report.connected.push(slot);
            } else if !record.connected && device.connected {
                device.connected = false;
                self.input_queue
                    .enqueue(move |ctx: &mut InputContext| ctx.deactivate(slot));
                let owner = device.owner.clone();
                self.update_queue
                    .enqueue(move |ctx: &mut UpdateContext| ctx.set_enabled(&owner, false));
                report.disconnected.push(slot);
            }

            if record.pose_valid {
                device.owner.set_render_pose(record.pose);
                report.render_poses_written += 1;
            }

            if record.tracking != device.tracking {
                device.tracking = record.tracking;
                let owner = device.owner.clone();
                let state = record.tracking;
                self.update_queue.enqueue(move |ctx: &mut UpdateContext| {
                    ctx.set_tracking_state(&owner, state)
                });
                report.tracking_changes += 1;
            }
        }

        if !report.registered.is_empty() || !report.connected.is_empty() || !report.disconnected.is_empty() {
            debug!("Render cycle {}: {:?}", self.cycles, report);
        }
        Ok(report)
    }

    fn register(&mut self, slot: SlotIndex, class: DeviceClass) {
        let kind = match class {
            DeviceClass::HeadMounted => DeviceKind::HeadMounted,
            DeviceClass::Controller => DeviceKind::Controller {
                role: self.controller_role(slot),
            },
            DeviceClass::GenericTracker => DeviceKind::Tracker,
            DeviceClass::TrackingReference => DeviceKind::Reference,
            DeviceClass::Other | DeviceClass::Invalid => DeviceKind::Generic,
        };
        let render_model = self.optional_text(slot, PropertyKey::RenderModelName);
        let serial_number = self.optional_text(slot, PropertyKey::SerialNumber);

        let (handle, owner) = new_pair(DeviceDescriptor {
            slot,
            class,
            kind,
            render_model,
            serial_number,
        });
        let owner = Arc::new(owner);
        info!("Registered {:?} in slot {}", kind, slot);

        let announce = owner.clone();
        self.update_queue
            .enqueue(move |ctx: &mut UpdateContext| ctx.announce(announce));

        self.registry[slot as usize] = Some(RegisteredDevice {
            handle,
            owner,
            connected: false,
            tracking: TrackingState::Uninitialized,
        });
    }

    fn controller_role(&self, slot: SlotIndex) -> ControllerRole {
        match int_property(&*self.runtime, slot, PropertyKey::ControllerRole) {
            Ok(raw) => ControllerRole::from_raw(raw),
            Err(e) => {
                debug!("No controller role for slot {}: {}", slot, e);
                ControllerRole::Invalid
            }
        }
    }

    fn optional_text(&self, slot: SlotIndex, key: PropertyKey) -> Option<String> {
        match text_property(&*self.runtime, slot, key) {
            Ok(text) => Some(text),
            Err(e) => {
                debug!("{}", e);
                None
            }
        }
    }
}
