use crate::device::{ButtonType, SlotIndex};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HardwareEventKind {
    TrackedDeviceActivated,
    TrackedDeviceDeactivated,
    TrackedDeviceRoleChanged,
    ButtonPress { button: ButtonType },
    ButtonUnpress { button: ButtonType },
    InputFocusCaptured,
    InputFocusReleased,
    DashboardActivated,
    DashboardDeactivated,
    Quit,
    Other(u32),
}

/// Event read from the runtime's hardware event queue
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HardwareEvent {
    pub kind: HardwareEventKind,
    /// Originating slot, `None` for global events
    pub slot: Option<SlotIndex>,
    /// Seconds between the event happening and it being read
    pub age_seconds: f32,
}

impl HardwareEvent {
    pub fn global(kind: HardwareEventKind) -> Self {
        Self {
            kind,
            slot: None,
            age_seconds: 0.0,
        }
    }

    pub fn for_slot(kind: HardwareEventKind, slot: SlotIndex) -> Self {
        Self {
            kind,
            slot: Some(slot),
            age_seconds: 0.0,
        }
    }
}
