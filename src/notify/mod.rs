//! Device lifecycle notifications
//!
//! Notifications are delivered on the update cadence only. The [`Notifier`] lives inside the
//! update cadence's private context, so listeners are always invoked from that one thread.
//! Values are stored before their notification fires; a listener reading the device sees the
//! new value.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::device::{ActivityLevel, DeviceHandle, TrackingState};
use crate::runtime::HardwareEvent;

#[derive(Debug, Clone)]
pub enum Notification {
    DeviceDetected {
        device: DeviceHandle,
    },
    Enabled {
        device: DeviceHandle,
    },
    Disabled {
        device: DeviceHandle,
    },
    TrackingStateChanged {
        device: DeviceHandle,
        previous: TrackingState,
        current: TrackingState,
    },
    ActivityChanged {
        device: DeviceHandle,
        previous: ActivityLevel,
        current: ActivityLevel,
    },
    FocusChanged {
        has_focus: bool,
    },
    PauseChanged {
        paused: bool,
    },
    HardwareEvent {
        device: Option<DeviceHandle>,
        event: HardwareEvent,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    DeviceDetected,
    Enabled,
    Disabled,
    TrackingStateChanged,
    ActivityChanged,
    FocusChanged,
    PauseChanged,
    HardwareEvent,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 8] = [
        NotificationKind::DeviceDetected,
        NotificationKind::Enabled,
        NotificationKind::Disabled,
        NotificationKind::TrackingStateChanged,
        NotificationKind::ActivityChanged,
        NotificationKind::FocusChanged,
        NotificationKind::PauseChanged,
        NotificationKind::HardwareEvent,
    ];
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::DeviceDetected { .. } => NotificationKind::DeviceDetected,
            Notification::Enabled { .. } => NotificationKind::Enabled,
            Notification::Disabled { .. } => NotificationKind::Disabled,
            Notification::TrackingStateChanged { .. } => NotificationKind::TrackingStateChanged,
            Notification::ActivityChanged { .. } => NotificationKind::ActivityChanged,
            Notification::FocusChanged { .. } => NotificationKind::FocusChanged,
            Notification::PauseChanged { .. } => NotificationKind::PauseChanged,
            Notification::HardwareEvent { .. } => NotificationKind::HardwareEvent,
        }
    }

    /// Slot of the device the notification is about, if any.
    pub fn slot(&self) -> Option<u32> {
        match self {
            Notification::DeviceDetected { device }
            | Notification::Enabled { device }
            | Notification::Disabled { device }
            | Notification::TrackingStateChanged { device, .. }
            | Notification::ActivityChanged { device, .. } => Some(device.slot()),
            Notification::HardwareEvent { device, .. } => device.as_ref().map(|d| d.slot()),
            Notification::FocusChanged { .. } | Notification::PauseChanged { .. } => None,
        }
    }
}

pub type Listener = Box<dyn FnMut(&Notification) + Send + 'static>;

/// Observer lists, one per [`NotificationKind`]
#[derive(Default)]
pub struct Notifier {
    listeners: HashMap<NotificationKind, Vec<Listener>>,
    delivered: u64,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, kind: NotificationKind, listener: F)
    where
        F: FnMut(&Notification) + Send + 'static,
    {
        debug!("New listener for {:?}", kind);
        self.listeners
            .entry(kind)
            .or_default()
            .push(Box::new(listener));
    }

    /// Forwards the given kinds into a channel, for consumers living off the update cadence.
    pub fn channel(&mut self, kinds: &[NotificationKind]) -> mpsc::UnboundedReceiver<Notification> {
        let (tx, rx) = mpsc::unbounded_channel();
        for kind in kinds {
            let tx = tx.clone();
            self.subscribe(*kind, move |notification| {
                let _ = tx.send(notification.clone());
            });
        }
        rx
    }

    pub fn listener_count(&self, kind: NotificationKind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }

    /// Total notifications delivered so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub(crate) fn notify(&mut self, notification: Notification) {
        self.delivered += 1;
        let Some(listeners) = self.listeners.get_mut(&notification.kind()) else {
            return;
        };
        for listener in listeners.iter_mut() {
            if catch_unwind(AssertUnwindSafe(|| listener(&notification))).is_err() {
                error!("Listener for {:?} panicked", notification.kind());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn delivers_only_to_matching_kind() {
        let mut notifier = Notifier::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        notifier.subscribe(NotificationKind::FocusChanged, move |n| {
            sink.lock().unwrap().push(n.kind());
        });

        notifier.notify(Notification::PauseChanged { paused: true });
        notifier.notify(Notification::FocusChanged { has_focus: false });

        assert_eq!(*seen.lock().unwrap(), vec![NotificationKind::FocusChanged]);
        assert_eq!(notifier.delivered(), 2);
    }

    #[test]
    fn panicking_listener_does_not_starve_others() {
        let mut notifier = Notifier::new();
        let count = Arc::new(Mutex::new(0));
        notifier.subscribe(NotificationKind::PauseChanged, |_| panic!("listener failure"));
        let sink = count.clone();
        notifier.subscribe(NotificationKind::PauseChanged, move |_| {
            *sink.lock().unwrap() += 1;
        });

        notifier.notify(Notification::PauseChanged { paused: false });
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn channel_receives_clones() {
        let mut notifier = Notifier::new();
        let mut rx = notifier.channel(&NotificationKind::ALL);
        notifier.notify(Notification::FocusChanged { has_focus: true });

        match rx.try_recv() {
            Ok(Notification::FocusChanged { has_focus }) => assert!(has_focus),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(notifier.listener_count(NotificationKind::Enabled), 1);
    }
}
