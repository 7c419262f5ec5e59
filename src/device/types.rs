use serde::{Deserialize, Serialize};

use super::seq_cell::Packed;

/// Stable hardware slot index. Never reused for another device within a session.
pub type SlotIndex = u32;

/// Hardware-reported class of the device occupying a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceClass {
    Invalid,
    HeadMounted,
    Controller,
    GenericTracker,
    TrackingReference,
    Other,
}

/// Class-specific subtype chosen when a slot is first registered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    HeadMounted,
    Controller { role: ControllerRole },
    Tracker,
    Reference,
    Generic,
}

impl DeviceKind {
    pub fn is_controller(&self) -> bool {
        matches!(self, DeviceKind::Controller { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControllerRole {
    Invalid,
    LeftHand,
    RightHand,
    OptOut,
}

impl ControllerRole {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => ControllerRole::LeftHand,
            2 => ControllerRole::RightHand,
            3 => ControllerRole::OptOut,
            _ => ControllerRole::Invalid,
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            ControllerRole::Invalid => 0,
            ControllerRole::LeftHand => 1,
            ControllerRole::RightHand => 2,
            ControllerRole::OptOut => 3,
        }
    }
}

/// Quality of a device's pose as reported by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TrackingState {
    Uninitialized = 0,
    Calibrating = 1,
    CalibratingOutOfRange = 2,
    RunningOk = 3,
    RunningOutOfRange = 4,
    FallbackRotationOnly = 5,
}

impl TrackingState {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => TrackingState::Calibrating,
            2 => TrackingState::CalibratingOutOfRange,
            3 => TrackingState::RunningOk,
            4 => TrackingState::RunningOutOfRange,
            5 => TrackingState::FallbackRotationOnly,
            _ => TrackingState::Uninitialized,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ActivityLevel {
    Unknown = 0,
    Idle = 1,
    UserInteraction = 2,
    UserInteractionTimeout = 3,
    Standby = 4,
}

impl ActivityLevel {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ActivityLevel::Idle,
            2 => ActivityLevel::UserInteraction,
            3 => ActivityLevel::UserInteractionTimeout,
            4 => ActivityLevel::Standby,
            _ => ActivityLevel::Unknown,
        }
    }
}

/// Position and orientation (quaternion x, y, z, w)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidPose {
    pub position: [f32; 3],
    pub rotation: [f32; 4],
}

impl Default for RigidPose {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl Packed for RigidPose {
    const WORDS: usize = 7;

    fn pack(&self, out: &mut [u32]) {
        pack_floats(&self.position, &mut out[0..3]);
        pack_floats(&self.rotation, &mut out[3..7]);
    }

    fn unpack(words: &[u32]) -> Self {
        let mut pose = RigidPose::default();
        unpack_floats(&words[0..3], &mut pose.position);
        unpack_floats(&words[3..7], &mut pose.rotation);
        pose
    }
}

/// High-rate transform sampled by the input cadence
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionState {
    pub pose: RigidPose,
    pub velocity: [f32; 3],
    pub angular_velocity: [f32; 3],
}

impl Packed for MotionState {
    const WORDS: usize = 13;

    fn pack(&self, out: &mut [u32]) {
        self.pose.pack(&mut out[0..7]);
        pack_floats(&self.velocity, &mut out[7..10]);
        pack_floats(&self.angular_velocity, &mut out[10..13]);
    }

    fn unpack(words: &[u32]) -> Self {
        let mut motion = MotionState {
            pose: RigidPose::unpack(&words[0..7]),
            ..Default::default()
        };
        unpack_floats(&words[7..10], &mut motion.velocity);
        unpack_floats(&words[10..13], &mut motion.angular_velocity);
        motion
    }
}

// Button type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ButtonType {
    System = 0,
    ApplicationMenu = 1,
    Grip = 2,
    DPadLeft = 3,
    DPadUp = 4,
    DPadRight = 5,
    DPadDown = 6,
    A = 7,
    Touchpad = 8,
    Trigger = 9,
    Joystick = 10,
}

impl ButtonType {
    pub const ALL: [ButtonType; 11] = [
        ButtonType::System,
        ButtonType::ApplicationMenu,
        ButtonType::Grip,
        ButtonType::DPadLeft,
        ButtonType::DPadUp,
        ButtonType::DPadRight,
        ButtonType::DPadDown,
        ButtonType::A,
        ButtonType::Touchpad,
        ButtonType::Trigger,
        ButtonType::Joystick,
    ];

    pub fn mask(self) -> ButtonMask {
        ButtonMask(1 << self as u32)
    }
}

/// Bit set of pressed buttons
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ButtonMask(pub u32);

impl ButtonMask {
    pub const NONE: ButtonMask = ButtonMask(0);

    pub fn contains(self, button: ButtonType) -> bool {
        self.0 & button.mask().0 != 0
    }

    pub fn with(self, button: ButtonType) -> ButtonMask {
        ButtonMask(self.0 | button.mask().0)
    }

    pub fn pressed(self) -> impl Iterator<Item = ButtonType> {
        ButtonType::ALL.into_iter().filter(move |b| self.contains(*b))
    }
}

/// Live controller input, sampled by the input cadence
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ControllerInput {
    pub buttons: ButtonMask,
    pub trigger: f32,
    pub joystick: [f32; 2],
}

impl ControllerInput {
    /// Everything released and centered.
    pub const NEUTRAL: ControllerInput = ControllerInput {
        buttons: ButtonMask::NONE,
        trigger: 0.0,
        joystick: [0.0, 0.0],
    };
}

impl Packed for ControllerInput {
    const WORDS: usize = 4;

    fn pack(&self, out: &mut [u32]) {
        out[0] = self.buttons.0;
        out[1] = self.trigger.to_bits();
        pack_floats(&self.joystick, &mut out[2..4]);
    }

    fn unpack(words: &[u32]) -> Self {
        let mut input = ControllerInput {
            buttons: ButtonMask(words[0]),
            trigger: f32::from_bits(words[1]),
            joystick: [0.0; 2],
        };
        unpack_floats(&words[2..4], &mut input.joystick);
        input
    }
}

fn pack_floats(values: &[f32], out: &mut [u32]) {
    for (o, v) in out.iter_mut().zip(values) {
        *o = v.to_bits();
    }
}

fn unpack_floats(words: &[u32], out: &mut [f32]) {
    for (o, w) in out.iter_mut().zip(words) {
        *o = f32::from_bits(*w);
    }
}
