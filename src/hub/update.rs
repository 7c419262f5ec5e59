//! Update cadence - notifications, hardware events and derived state
//!
//! All notifications are fired from here. The [`UpdateContext`] owns the [`Notifier`] and the
//! update-side index of announced devices, so listeners always run on this cadence.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::error::HubError;
use crate::device::{ControllerRole, DeviceHandle, DeviceKind, DeviceOwner, SlotIndex, TrackingState};
use crate::notify::{Notification, NotificationKind, Notifier};
use crate::queue::{QueueHandle, ThreadQueue};
use crate::runtime::{HardwareEvent, HardwareEventKind, TrackingRuntime};

/// Upper bound on hardware events handled per update cycle.
pub const MAX_EVENTS_PER_CYCLE: usize = 128;

/// State confined to the update cadence; queued update actions run against it
#[derive(Default)]
pub struct UpdateContext {
    notifier: Notifier,
    devices: BTreeMap<SlotIndex, Arc<DeviceOwner>>,
    head_mounted: Option<DeviceHandle>,
    left_controller: Option<DeviceHandle>,
    right_controller: Option<DeviceHandle>,
}

impl UpdateContext {
    /// Records a newly registered device and fires DeviceDetected.
    pub(crate) fn announce(&mut self, owner: Arc<DeviceOwner>) {
        let handle = owner.handle();
        match owner.kind() {
            DeviceKind::HeadMounted if self.head_mounted.is_none() => {
                self.head_mounted = Some(handle.clone());
            }
            DeviceKind::Controller {
                role: ControllerRole::LeftHand,
            } => self.left_controller = Some(handle.clone()),
            DeviceKind::Controller {
                role: ControllerRole::RightHand,
            } => self.right_controller = Some(handle.clone()),
            _ => {}
        }
        info!("Device detected in slot {}: {:?}", handle.slot(), handle.kind());
        self.devices.insert(handle.slot(), owner);
        self.notifier
            .notify(Notification::DeviceDetected { device: handle });
    }

    pub(crate) fn set_enabled(&mut self, owner: &DeviceOwner, enabled: bool) {
        owner.set_enabled(enabled, &mut self.notifier);
    }

    pub(crate) fn set_tracking_state(&mut self, owner: &DeviceOwner, state: TrackingState) {
        owner.set_tracking_state(state, &mut self.notifier);
    }

    /// Listener registration, also usable from actions queued by other threads.
    pub fn notifier_mut(&mut self) -> &mut Notifier {
        &mut self.notifier
    }

    pub fn device(&self, slot: SlotIndex) -> Option<DeviceHandle> {
        self.devices.get(&slot).map(|owner| owner.handle())
    }

    /// Announced devices in slot order.
    pub fn devices(&self) -> Vec<DeviceHandle> {
        self.devices.values().map(|owner| owner.handle()).collect()
    }

    pub fn head_mounted(&self) -> Option<DeviceHandle> {
        self.head_mounted.clone()
    }

    pub fn left_controller(&self) -> Option<DeviceHandle> {
        self.left_controller.clone()
    }

    pub fn right_controller(&self) -> Option<DeviceHandle> {
        self.right_controller.clone()
    }
}

/// What one update cycle did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateReport {
    pub actions_run: usize,
    pub events_dispatched: usize,
    pub event_error: Option<HubError>,
    pub quit_requested: bool,
}

pub struct UpdateCadence {
    runtime: Arc<dyn TrackingRuntime>,
    queue: ThreadQueue<UpdateContext>,
    context: UpdateContext,
    // read past the event budget, dispatched first next cycle
    carried: Option<HardwareEvent>,
    has_focus: bool,
    paused: bool,
    cycles: u64,
}

impl UpdateCadence {
    pub(crate) fn new(runtime: Arc<dyn TrackingRuntime>, queue: ThreadQueue<UpdateContext>) -> Self {
        Self {
            runtime,
            queue,
            context: UpdateContext::default(),
            carried: None,
            has_focus: true,
            paused: false,
            cycles: 0,
        }
    }

    pub fn queue_handle(&self) -> QueueHandle<UpdateContext> {
        self.queue.handle()
    }

    pub fn context(&self) -> &UpdateContext {
        &self.context
    }

    pub fn subscribe<F>(&mut self, kind: NotificationKind, listener: F)
    where
        F: FnMut(&Notification) + Send + 'static,
    {
        self.context.notifier.subscribe(kind, listener);
    }

    pub fn notifier_mut(&mut self) -> &mut Notifier {
        &mut self.context.notifier
    }

    pub fn has_focus(&self) -> bool {
        self.has_focus
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// One update cycle: drain, dispatch hardware events, then recompute derived state.
    ///
    /// An event read error stops event handling for this cycle only; it is logged and
    /// reported, and derived state is still recomputed.
    pub fn run_cycle(&mut self) -> UpdateReport {
        self.cycles += 1;
        let mut report = UpdateReport {
            actions_run: self.queue.drain_all(&mut self.context),
            ..Default::default()
        };

        let mut focus = None;
        let mut paused = None;
        while report.events_dispatched < MAX_EVENTS_PER_CYCLE {
            let event = match self.carried.take() {
                Some(event) => event,
                None => match self.runtime.poll_event() {
                    Ok(Some(event)) => event,
                    Ok(None) => break,
                    Err(e) => {
                        error!("Hardware event read failed in update cycle {}: {}", self.cycles, e);
                        report.event_error = Some(HubError::EventRead(e));
                        break;
                    }
                },
            };
            match event.kind {
                HardwareEventKind::InputFocusCaptured => focus = Some(false),
                HardwareEventKind::InputFocusReleased => focus = Some(true),
                HardwareEventKind::DashboardActivated => paused = Some(true),
                HardwareEventKind::DashboardDeactivated => paused = Some(false),
                HardwareEventKind::Quit => report.quit_requested = true,
                _ => {}
            }
            self.dispatch(event);
            report.events_dispatched += 1;
        }
        if report.events_dispatched == MAX_EVENTS_PER_CYCLE {
            match self.runtime.poll_event() {
                Ok(Some(event)) => {
                    warn!("Event budget exhausted, remaining events wait for the next cycle");
                    self.carried = Some(event);
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Hardware event read failed in update cycle {}: {}", self.cycles, e);
                    report.event_error = Some(HubError::EventRead(e));
                }
            }
        }

        if let Some(has_focus) = focus {
            self.set_focus(has_focus);
        }
        if let Some(paused) = paused {
            self.set_paused(paused);
        }
        self.update_activity();
        report
    }

    fn dispatch(&mut self, event: HardwareEvent) {
        let device = event.slot.and_then(|slot| self.context.device(slot));
        if event.slot.is_some() && device.is_none() {
            debug!("Event {:?} for unregistered slot {:?}", event.kind, event.slot);
        }
        self.context
            .notifier
            .notify(Notification::HardwareEvent { device, event });
    }

    fn set_focus(&mut self, has_focus: bool) {
        if self.has_focus == has_focus {
            return;
        }
        self.has_focus = has_focus;
        info!("Input focus {}", if has_focus { "acquired" } else { "lost" });
        self.context
            .notifier
            .notify(Notification::FocusChanged { has_focus });
    }

    fn set_paused(&mut self, paused: bool) {
        if self.paused == paused {
            return;
        }
        self.paused = paused;
        info!("Application {}", if paused { "paused" } else { "resumed" });
        self.context
            .notifier
            .notify(Notification::PauseChanged { paused });
    }

    fn update_activity(&mut self) {
        let UpdateContext {
            notifier, devices, ..
        } = &mut self.context;
        for (slot, owner) in devices.iter() {
            let level = self.runtime.activity_level(*slot);
            owner.set_activity_level(level, notifier);
        }
    }
}
