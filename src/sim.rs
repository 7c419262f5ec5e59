//! Scriptable in-process runtime
//!
//! Stands in for the hardware runtime in the demo binary and in tests. Every slot, event and
//! asset is scripted through `&self` methods, so a test can keep an `Arc` and change hardware
//! state between cadence cycles.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::device::{
    ActivityLevel, ControllerInput, ControllerRole, DeviceClass, RigidPose, SlotIndex,
    TrackingState,
};
use crate::loader::ResourceKey;
use crate::runtime::{
    HardwareEvent, LoadPoll, ModelData, NativeHandle, PoseError, PoseRecord, PropertyError,
    PropertyKey, PropertyValue, ResourceRuntime, RuntimeError, RuntimeInfo, TextureData,
    TextureId, TrackingRuntime,
};

/// Scripted description of the device in one slot
#[derive(Debug, Clone)]
pub struct SimDevice {
    pub class: DeviceClass,
    pub role: ControllerRole,
    pub render_model: Option<String>,
    pub serial_number: String,
}

impl SimDevice {
    pub fn new(class: DeviceClass) -> Self {
        Self {
            class,
            role: ControllerRole::Invalid,
            render_model: None,
            serial_number: String::new(),
        }
    }

    pub fn head_mounted() -> Self {
        Self::new(DeviceClass::HeadMounted).with_model("generic_hmd")
    }

    pub fn controller(role: ControllerRole) -> Self {
        let mut device = Self::new(DeviceClass::Controller).with_model("vr_controller");
        device.role = role;
        device
    }

    pub fn with_model(mut self, name: &str) -> Self {
        self.render_model = Some(name.to_string());
        self
    }
}

#[derive(Debug, Clone)]
struct SimSlot {
    device: Option<SimDevice>,
    record: PoseRecord,
    input: ControllerInput,
    activity: ActivityLevel,
}

impl Default for SimSlot {
    fn default() -> Self {
        Self {
            device: None,
            record: PoseRecord::default(),
            input: ControllerInput::NEUTRAL,
            activity: ActivityLevel::Unknown,
        }
    }
}

#[derive(Debug, Clone)]
enum AssetOutcome<T> {
    Ready(T),
    Fail(String),
}

#[derive(Debug, Clone)]
struct SimAsset<T> {
    polls_before_ready: u32,
    outcome: AssetOutcome<T>,
    remaining: Option<u32>,
    sequences: u32,
}

impl<T> SimAsset<T> {
    fn new(polls_before_ready: u32, outcome: AssetOutcome<T>) -> Self {
        Self {
            polls_before_ready,
            outcome,
            remaining: None,
            sequences: 0,
        }
    }
}

#[derive(Default)]
struct SimState {
    handshake_error: Option<String>,
    slots: Vec<SimSlot>,
    focus_lost: bool,
    render_error: Option<String>,
    events: VecDeque<HardwareEvent>,
    event_error: Option<String>,
    models: HashMap<String, SimAsset<ModelData>>,
    textures: HashMap<TextureId, SimAsset<TextureData>>,
    next_handle: u64,
    freed: Vec<NativeHandle>,
    render_calls: u64,
}

impl SimState {
    fn slot_mut(&mut self, slot: SlotIndex) -> Option<&mut SimSlot> {
        self.slots.get_mut(slot as usize)
    }

    fn next_handle(&mut self) -> NativeHandle {
        self.next_handle += 1;
        NativeHandle(self.next_handle)
    }
}

/// In-process implementation of both runtime traits
pub struct SimulatedRuntime {
    state: Mutex<SimState>,
}

impl SimulatedRuntime {
    pub fn new(slot_count: usize) -> Self {
        let state = SimState {
            slots: vec![SimSlot::default(); slot_count],
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// Head-mounted display in slot 0, two controllers, two base stations and matching assets.
    pub fn with_default_setup(slot_count: usize) -> Self {
        let runtime = Self::new(slot_count.max(5));
        runtime.set_device(0, SimDevice::head_mounted());
        runtime.set_device(1, SimDevice::controller(ControllerRole::LeftHand));
        runtime.set_device(2, SimDevice::controller(ControllerRole::RightHand));
        runtime.set_device(3, SimDevice::new(DeviceClass::TrackingReference).with_model("lh_basestation"));
        runtime.set_device(4, SimDevice::new(DeviceClass::TrackingReference).with_model("lh_basestation"));
        for slot in 0..5 {
            runtime.set_connected(slot, true);
            runtime.set_tracking(slot, TrackingState::RunningOk);
            runtime.set_activity(slot, ActivityLevel::UserInteraction);
        }
        runtime.add_model("generic_hmd", 12_000, 8_000, Some(1), 3);
        runtime.add_model("vr_controller", 4_800, 3_200, Some(2), 2);
        runtime.add_model("lh_basestation", 900, 600, None, 1);
        runtime.add_texture(1, 1024, 1024, 2);
        runtime.add_texture(2, 512, 512, 1);
        runtime
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_slot(&self, slot: SlotIndex, f: impl FnOnce(&mut SimSlot)) {
        if let Some(s) = self.lock().slot_mut(slot) {
            f(s);
        }
    }

    pub fn fail_handshake(&self, reason: &str) {
        self.lock().handshake_error = Some(reason.to_string());
    }

    pub fn set_device(&self, slot: SlotIndex, device: SimDevice) {
        self.with_slot(slot, |s| s.device = Some(device));
    }

    pub fn set_connected(&self, slot: SlotIndex, connected: bool) {
        self.with_slot(slot, |s| s.record.connected = connected);
    }

    /// Sets a valid pose for the slot.
    pub fn set_pose(&self, slot: SlotIndex, pose: RigidPose) {
        self.with_slot(slot, |s| {
            s.record.pose = pose;
            s.record.pose_valid = true;
        });
    }

    pub fn set_velocity(&self, slot: SlotIndex, velocity: [f32; 3], angular_velocity: [f32; 3]) {
        self.with_slot(slot, |s| {
            s.record.velocity = velocity;
            s.record.angular_velocity = angular_velocity;
        });
    }

    pub fn set_pose_valid(&self, slot: SlotIndex, valid: bool) {
        self.with_slot(slot, |s| s.record.pose_valid = valid);
    }

    pub fn set_tracking(&self, slot: SlotIndex, tracking: TrackingState) {
        self.with_slot(slot, |s| s.record.tracking = tracking);
    }

    pub fn set_input(&self, slot: SlotIndex, input: ControllerInput) {
        self.with_slot(slot, |s| s.input = input);
    }

    pub fn set_activity(&self, slot: SlotIndex, activity: ActivityLevel) {
        self.with_slot(slot, |s| s.activity = activity);
    }

    pub fn set_focus_lost(&self, lost: bool) {
        self.lock().focus_lost = lost;
    }

    /// The next `render_poses` call fails with a non-focus error.
    pub fn fail_next_render(&self, reason: &str) {
        self.lock().render_error = Some(reason.to_string());
    }

    pub fn fail_next_event_read(&self, reason: &str) {
        self.lock().event_error = Some(reason.to_string());
    }

    pub fn push_event(&self, event: HardwareEvent) {
        self.lock().events.push_back(event);
    }

    /// Registers a model that becomes ready after `polls_before_ready` loading polls.
    pub fn add_model(
        &self,
        name: &str,
        vertex_count: u32,
        triangle_count: u32,
        diffuse_texture: Option<TextureId>,
        polls_before_ready: u32,
    ) {
        let data = ModelData {
            handle: NativeHandle(0),
            vertex_count,
            triangle_count,
            diffuse_texture,
        };
        self.lock().models.insert(
            name.to_string(),
            SimAsset::new(polls_before_ready, AssetOutcome::Ready(data)),
        );
    }

    pub fn add_failing_model(&self, name: &str, reason: &str, polls_before_failure: u32) {
        self.lock().models.insert(
            name.to_string(),
            SimAsset::new(polls_before_failure, AssetOutcome::Fail(reason.to_string())),
        );
    }

    pub fn add_texture(&self, id: TextureId, width: u16, height: u16, polls_before_ready: u32) {
        let data = TextureData {
            handle: NativeHandle(0),
            width,
            height,
        };
        self.lock()
            .textures
            .insert(id, SimAsset::new(polls_before_ready, AssetOutcome::Ready(data)));
    }

    /// A texture whose load never leaves the loading state.
    pub fn add_stuck_texture(&self, id: TextureId) {
        let data = TextureData {
            handle: NativeHandle(0),
            width: 0,
            height: 0,
        };
        self.lock()
            .textures
            .insert(id, SimAsset::new(u32::MAX, AssetOutcome::Ready(data)));
    }

    /// Number of load sequences the primitive has started for `key`.
    ///
    /// A load is only finished by a terminal poll. If the caller stops polling halfway, the
    /// next poll of the same key resumes that load instead of starting a new sequence, the
    /// way a runtime keeps loading in the background.
    pub fn load_sequences(&self, key: &ResourceKey) -> u32 {
        let state = self.lock();
        match key {
            ResourceKey::Model(name) => state.models.get(name).map_or(0, |a| a.sequences),
            ResourceKey::Texture(id) => state.textures.get(id).map_or(0, |a| a.sequences),
        }
    }

    pub fn freed_handles(&self) -> Vec<NativeHandle> {
        self.lock().freed.clone()
    }

    pub fn render_calls(&self) -> u64 {
        self.lock().render_calls
    }

    /// Moves every connected device along a small circle, for the demo.
    pub fn animate(&self, seconds: f32) {
        let mut state = self.lock();
        for (index, slot) in state.slots.iter_mut().enumerate() {
            if slot.device.is_none() || !slot.record.connected {
                continue;
            }
            let phase = seconds + index as f32;
            slot.record.pose = RigidPose {
                position: [0.3 * phase.cos(), 1.2 + 0.05 * index as f32, 0.3 * phase.sin()],
                rotation: [0.0, (phase / 2.0).sin(), 0.0, (phase / 2.0).cos()],
            };
            slot.record.velocity = [-0.3 * phase.sin(), 0.0, 0.3 * phase.cos()];
            slot.record.angular_velocity = [0.0, 1.0, 0.0];
            slot.record.pose_valid = true;
        }
    }

    fn advance<T: Copy>(
        asset: &mut SimAsset<T>,
        handle: NativeHandle,
        attach: impl FnOnce(T, NativeHandle) -> T,
    ) -> LoadPoll<T> {
        let remaining = match asset.remaining {
            Some(remaining) => remaining,
            None => {
                asset.sequences += 1;
                asset.polls_before_ready
            }
        };
        if remaining > 0 {
            asset.remaining = Some(remaining - 1);
            return LoadPoll::Loading;
        }
        asset.remaining = None;
        match &asset.outcome {
            AssetOutcome::Ready(data) => LoadPoll::Ready(attach(*data, handle)),
            AssetOutcome::Fail(reason) => LoadPoll::Failed(reason.clone()),
        }
    }
}

impl TrackingRuntime for SimulatedRuntime {
    fn handshake(&self) -> Result<RuntimeInfo, RuntimeError> {
        let state = self.lock();
        if let Some(reason) = &state.handshake_error {
            return Err(RuntimeError::HandshakeFailed(reason.clone()));
        }
        Ok(RuntimeInfo {
            name: "simulated".to_string(),
            slot_count: state.slots.len(),
        })
    }

    fn device_class(&self, slot: SlotIndex) -> DeviceClass {
        self.lock()
            .slots
            .get(slot as usize)
            .and_then(|s| s.device.as_ref())
            .map_or(DeviceClass::Invalid, |d| d.class)
    }

    fn render_poses(&self, poses: &mut [PoseRecord]) -> Result<(), PoseError> {
        let mut state = self.lock();
        state.render_calls += 1;
        if let Some(reason) = state.render_error.take() {
            return Err(PoseError::Runtime(reason));
        }
        if state.focus_lost {
            return Err(PoseError::FocusLost);
        }
        for (out, slot) in poses.iter_mut().zip(state.slots.iter()) {
            *out = slot.record;
        }
        Ok(())
    }

    fn sample_pose(&self, slot: SlotIndex) -> Result<PoseRecord, PoseError> {
        let state = self.lock();
        if state.focus_lost {
            return Err(PoseError::FocusLost);
        }
        state
            .slots
            .get(slot as usize)
            .map(|s| s.record)
            .ok_or_else(|| PoseError::Runtime(format!("slot {} out of range", slot)))
    }

    fn controller_input(&self, slot: SlotIndex) -> Result<ControllerInput, PoseError> {
        self.lock()
            .slots
            .get(slot as usize)
            .map(|s| s.input)
            .ok_or_else(|| PoseError::Runtime(format!("slot {} out of range", slot)))
    }

    fn poll_event(&self) -> Result<Option<HardwareEvent>, RuntimeError> {
        let mut state = self.lock();
        if let Some(reason) = state.event_error.take() {
            return Err(RuntimeError::EventQueue(reason));
        }
        Ok(state.events.pop_front())
    }

    fn property(&self, slot: SlotIndex, key: PropertyKey) -> Result<PropertyValue, PropertyError> {
        let state = self.lock();
        let unavailable = PropertyError::Unavailable { slot, key };
        let device = state
            .slots
            .get(slot as usize)
            .and_then(|s| s.device.as_ref())
            .ok_or(unavailable.clone())?;
        match key {
            PropertyKey::ControllerRole if device.class == DeviceClass::Controller => {
                Ok(PropertyValue::Int(device.role.as_raw()))
            }
            PropertyKey::RenderModelName => device
                .render_model
                .clone()
                .map(PropertyValue::Text)
                .ok_or(unavailable),
            PropertyKey::SerialNumber if !device.serial_number.is_empty() => {
                Ok(PropertyValue::Text(device.serial_number.clone()))
            }
            PropertyKey::ManufacturerName => Ok(PropertyValue::Text("Simulated".to_string())),
            PropertyKey::BatteryPercentage if device.class == DeviceClass::Controller => {
                Ok(PropertyValue::Float(0.8))
            }
            PropertyKey::DeviceIsWireless => {
                Ok(PropertyValue::Bool(device.class == DeviceClass::Controller))
            }
            _ => Err(unavailable),
        }
    }

    fn activity_level(&self, slot: SlotIndex) -> ActivityLevel {
        self.lock()
            .slots
            .get(slot as usize)
            .map_or(ActivityLevel::Unknown, |s| s.activity)
    }
}

impl ResourceRuntime for SimulatedRuntime {
    fn load_model(&self, name: &str) -> LoadPoll<ModelData> {
        let mut state = self.lock();
        let handle = state.next_handle();
        let Some(asset) = state.models.get_mut(name) else {
            return LoadPoll::Failed(format!("unknown render model '{}'", name));
        };
        Self::advance(asset, handle, |data, handle| ModelData { handle, ..data })
    }

    fn load_texture(&self, id: TextureId) -> LoadPoll<TextureData> {
        let mut state = self.lock();
        let handle = state.next_handle();
        let Some(asset) = state.textures.get_mut(&id) else {
            return LoadPoll::Failed(format!("unknown texture {}", id));
        };
        Self::advance(asset, handle, |data, handle| TextureData { handle, ..data })
    }

    fn free_model(&self, handle: NativeHandle) {
        debug!("Simulated runtime freeing model {:?}", handle);
        self.lock().freed.push(handle);
    }

    fn free_texture(&self, handle: NativeHandle) {
        debug!("Simulated runtime freeing texture {:?}", handle);
        self.lock().freed.push(handle);
    }
}
