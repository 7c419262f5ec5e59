//! Input cadence - high-rate motion sampling and controller input actions
//!
//! Each cycle drains the input queue (activation changes scheduled by the render cadence),
//! samples every active device and turns controller button changes into [`InputAction`]s.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::device::{ButtonMask, ButtonType, ControllerInput, DeviceOwner, SlotIndex};
use crate::queue::{QueueHandle, ThreadQueue};
use crate::runtime::{PoseError, TrackingRuntime};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputSettings {
    /// Joystick deflection below this fraction reads as centered
    pub joystick_deadzone: f32,
    /// Trigger value at which the trigger counts as a pressed button
    pub trigger_press_threshold: f32,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            joystick_deadzone: 0.05,
            trigger_press_threshold: 0.55,
        }
    }
}

// Button event state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ButtonEventState {
    Pressed,
    Released,
}

/// Button edge on a controller
#[derive(Clone, Debug, PartialEq)]
pub struct InputAction {
    pub slot: SlotIndex,
    pub button: ButtonType,
    pub state: ButtonEventState,
    /// How long the button was held, set on release
    pub held_ms: Option<f64>,
    pub timestamp: DateTime<Local>,
}

#[derive(Default)]
struct HeldButtons {
    mask: ButtonMask,
    since: HashMap<ButtonType, DateTime<Local>>,
}

/// State confined to the input cadence; queued input actions run against it
#[derive(Default)]
pub struct InputContext {
    active: BTreeMap<SlotIndex, Arc<DeviceOwner>>,
    held: HashMap<SlotIndex, HeldButtons>,
    // releases synthesised by deactivation, delivered with the next sample batch
    released: Vec<InputAction>,
}

impl InputContext {
    pub(crate) fn activate(&mut self, owner: Arc<DeviceOwner>) {
        let slot = owner.slot();
        info!("Slot {} added to input polling set", slot);
        self.active.insert(slot, owner);
    }

    pub(crate) fn deactivate(&mut self, slot: SlotIndex) {
        let Some(owner) = self.active.remove(&slot) else {
            debug!("Slot {} was not in the input polling set", slot);
            return;
        };
        info!("Slot {} removed from input polling set", slot);
        if !owner.kind().is_controller() {
            return;
        }
        owner.reset_controller_input();
        if let Some(held) = self.held.remove(&slot) {
            let now = Local::now();
            for button in held.mask.pressed() {
                self.released.push(InputAction {
                    slot,
                    button,
                    state: ButtonEventState::Released,
                    held_ms: held.since.get(&button).map(|t| held_ms(*t, now)),
                    timestamp: now,
                });
            }
        }
    }

    pub fn is_active(&self, slot: SlotIndex) -> bool {
        self.active.contains_key(&slot)
    }

    pub fn active_slots(&self) -> Vec<SlotIndex> {
        self.active.keys().copied().collect()
    }
}

pub type InputListener = Box<dyn FnMut(&InputAction) + Send + 'static>;

pub struct InputCadence {
    runtime: Arc<dyn TrackingRuntime>,
    queue: ThreadQueue<InputContext>,
    context: InputContext,
    settings: InputSettings,
    listeners: Vec<InputListener>,
    focus_degraded: bool,
    cycles: u64,
}

impl InputCadence {
    pub(crate) fn new(
        runtime: Arc<dyn TrackingRuntime>,
        queue: ThreadQueue<InputContext>,
        settings: InputSettings,
    ) -> Self {
        Self {
            runtime,
            queue,
            context: InputContext::default(),
            settings,
            listeners: Vec::new(),
            focus_degraded: false,
            cycles: 0,
        }
    }

    pub fn queue_handle(&self) -> QueueHandle<InputContext> {
        self.queue.handle()
    }

    pub fn context(&self) -> &InputContext {
        &self.context
    }

    pub fn active_slots(&self) -> Vec<SlotIndex> {
        self.context.active_slots()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Whether the last samples reported lost application focus.
    pub fn focus_degraded(&self) -> bool {
        self.focus_degraded
    }

    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(&InputAction) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// One input cycle. Returns the input actions delivered to listeners.
    pub fn run_cycle(&mut self) -> Vec<InputAction> {
        self.cycles += 1;
        self.queue.drain_all(&mut self.context);

        let mut actions = std::mem::take(&mut self.context.released);
        let InputContext { active, held, .. } = &mut self.context;
        let mut focus_lost = false;
        let mut sampled = false;

        for (slot, owner) in active.iter() {
            match self.runtime.sample_pose(*slot) {
                Ok(record) => {
                    sampled = true;
                    if record.pose_valid {
                        owner.set_motion(record.motion());
                    }
                }
                // last motion stays in place, controller input is still read
                Err(PoseError::FocusLost) => focus_lost = true,
                Err(e) => {
                    warn!("Motion sample for slot {} failed: {}", slot, e);
                    continue;
                }
            }

            if !owner.kind().is_controller() {
                continue;
            }
            match self.runtime.controller_input(*slot) {
                Ok(raw) => {
                    let input = filter_input(raw, &self.settings);
                    owner.set_controller_input(input);
                    let state = held.entry(*slot).or_default();
                    detect_edges(*slot, input.buttons, state, &mut actions);
                }
                Err(e) => warn!("Controller input for slot {} failed: {}", slot, e),
            }
        }

        if focus_lost && !self.focus_degraded {
            warn!("Application focus lost, keeping last motion samples");
            self.focus_degraded = true;
        } else if sampled && !focus_lost && self.focus_degraded {
            info!("Application focus regained, motion sampling back to normal");
            self.focus_degraded = false;
        }

        for action in &actions {
            debug!(
                "Input action: slot {} {:?} {:?} at {}",
                action.slot,
                action.button,
                action.state,
                action.timestamp.format("%H:%M:%S.%3f")
            );
            for listener in self.listeners.iter_mut() {
                if catch_unwind(AssertUnwindSafe(|| listener(action))).is_err() {
                    error!("Input listener panicked on {:?}", action.button);
                }
            }
        }
        actions
    }
}

/// Applies the deadzone and folds the trigger into the button mask.
fn filter_input(raw: ControllerInput, settings: &InputSettings) -> ControllerInput {
    let mut buttons = raw.buttons;
    if raw.trigger >= settings.trigger_press_threshold {
        buttons = buttons.with(ButtonType::Trigger);
    }
    ControllerInput {
        buttons,
        trigger: raw.trigger,
        joystick: [
            apply_deadzone(raw.joystick[0], settings.joystick_deadzone),
            apply_deadzone(raw.joystick[1], settings.joystick_deadzone),
        ],
    }
}

fn detect_edges(
    slot: SlotIndex,
    current: ButtonMask,
    held: &mut HeldButtons,
    actions: &mut Vec<InputAction>,
) {
    if current == held.mask {
        return;
    }
    let now = Local::now();
    for button in ButtonType::ALL {
        let was = held.mask.contains(button);
        let is = current.contains(button);
        if is && !was {
            held.since.insert(button, now);
            actions.push(InputAction {
                slot,
                button,
                state: ButtonEventState::Pressed,
                held_ms: None,
                timestamp: now,
            });
        } else if was && !is {
            let pressed_at = held.since.remove(&button);
            actions.push(InputAction {
                slot,
                button,
                state: ButtonEventState::Released,
                held_ms: pressed_at.map(|t| held_ms(t, now)),
                timestamp: now,
            });
        }
    }
    held.mask = current;
}

fn held_ms(pressed_at: DateTime<Local>, now: DateTime<Local>) -> f64 {
    (now - pressed_at).num_microseconds().unwrap_or(0) as f64 / 1000.0
}

// Helper function to apply deadzone to analog stick values
fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if value.abs() < deadzone {
        0.0
    } else {
        // Rescale the value to the range outside the deadzone
        let sign = if value < 0.0 { -1.0 } else { 1.0 };
        sign * (value.abs() - deadzone) / (1.0 - deadzone)
    }
}
