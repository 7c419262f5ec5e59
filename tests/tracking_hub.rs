//! Integration tests for the tracking hub
//!
//! Each test scripts the simulated runtime, then steps the render, input and update cadences
//! by hand in the order a test needs.

use std::io;
use std::sync::{Arc, Mutex};

use trackhub::device::{
    ActivityLevel, ButtonMask, ButtonType, ControllerInput, ControllerRole, DeviceClass,
    DeviceKind, RigidPose, TrackingState,
};
use trackhub::hub::{ButtonEventState, Cadences, HubError, HubSettings, SlotPhase, TrackingHub};
use trackhub::notify::{Notification, NotificationKind};
use trackhub::runtime::{
    HardwareEvent, HardwareEventKind, PoseError, PropertyError, PropertyKey, TrackingRuntime,
};
use trackhub::hub::update::MAX_EVENTS_PER_CYCLE;
use trackhub::sim::{SimDevice, SimulatedRuntime};

fn connect(runtime: &Arc<SimulatedRuntime>) -> Cadences {
    let tracking: Arc<dyn TrackingRuntime> = runtime.clone();
    TrackingHub::connect(tracking, HubSettings::default()).unwrap()
}

type Log = Arc<Mutex<Vec<Notification>>>;

fn record_notifications(cadences: &mut Cadences) -> Log {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    for kind in NotificationKind::ALL {
        let sink = log.clone();
        cadences
            .update
            .subscribe(kind, move |n| sink.lock().unwrap().push(n.clone()));
    }
    log
}

fn kinds(log: &Log) -> Vec<(NotificationKind, Option<u32>)> {
    log.lock()
        .unwrap()
        .iter()
        .map(|n| (n.kind(), n.slot()))
        .collect()
}

/// Formatted log output collected while a closure runs
#[derive(Clone, Default)]
struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogCapture {
    fn count(&self, needle: &str) -> usize {
        let bytes = self.0.lock().unwrap();
        String::from_utf8_lossy(&bytes)
            .lines()
            .filter(|line| line.contains(needle))
            .count()
    }
}

fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, LogCapture) {
    let capture = LogCapture::default();
    let writer = capture.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, capture)
}

fn cycle_all(cadences: &mut Cadences) {
    cadences.render.scan_poses().unwrap();
    cadences.input.run_cycle();
    cadences.update.run_cycle();
}

fn pose_at(x: f32) -> RigidPose {
    RigidPose {
        position: [x, 1.5, -0.25],
        rotation: [0.0, 0.38, 0.0, 0.92],
    }
}

#[test]
fn controller_appearing_is_detected_enabled_and_posed() {
    let runtime = Arc::new(SimulatedRuntime::new(8));
    runtime.set_device(3, SimDevice::controller(ControllerRole::RightHand));
    runtime.set_connected(3, true);
    runtime.set_pose(3, pose_at(0.4));
    runtime.set_tracking(3, TrackingState::RunningOk);

    let mut cadences = connect(&runtime);
    let log = record_notifications(&mut cadences);

    let report = cadences.render.scan_poses().unwrap();
    assert_eq!(report.registered, vec![3]);
    assert_eq!(report.connected, vec![3]);

    // render fields are written directly during the same pass
    let device = cadences.render.device(3).unwrap();
    assert_eq!(device.render_pose(), pose_at(0.4));
    assert!(!device.is_enabled());

    cadences.update.run_cycle();
    assert_eq!(
        kinds(&log),
        vec![
            (NotificationKind::DeviceDetected, Some(3)),
            (NotificationKind::Enabled, Some(3)),
            (NotificationKind::TrackingStateChanged, Some(3)),
        ]
    );
    assert!(device.is_enabled());
    assert_eq!(device.tracking_state(), TrackingState::RunningOk);
    assert_eq!(
        device.kind(),
        DeviceKind::Controller {
            role: ControllerRole::RightHand
        }
    );
    assert_eq!(cadences.render.slot_phase(3), SlotPhase::Active);
}

#[test]
fn disconnect_leaves_transforms_at_last_values() {
    let runtime = Arc::new(SimulatedRuntime::new(8));
    runtime.set_device(3, SimDevice::controller(ControllerRole::RightHand));
    runtime.set_connected(3, true);
    runtime.set_pose(3, pose_at(0.1));
    runtime.set_velocity(3, [0.5, 0.0, 0.0], [0.0, 2.0, 0.0]);

    let mut cadences = connect(&runtime);
    cycle_all(&mut cadences);
    cadences.input.run_cycle();
    assert_eq!(cadences.input.active_slots(), vec![3]);

    let device = cadences.update.context().device(3).unwrap();
    let render_pose = device.render_pose();
    let motion = device.motion();
    assert_eq!(motion.velocity, [0.5, 0.0, 0.0]);

    let log = record_notifications(&mut cadences);
    runtime.set_connected(3, false);
    runtime.set_pose_valid(3, false);
    let report = cadences.render.scan_poses().unwrap();
    assert_eq!(report.disconnected, vec![3]);

    cadences.input.run_cycle();
    assert!(cadences.input.active_slots().is_empty());
    assert!(!cadences.input.context().is_active(3));

    cadences.update.run_cycle();
    assert_eq!(kinds(&log), vec![(NotificationKind::Disabled, Some(3))]);
    assert!(!device.is_enabled());
    assert_eq!(device.render_pose(), render_pose);
    assert_eq!(device.motion(), motion);
    assert_eq!(cadences.render.slot_phase(3), SlotPhase::Inactive);
}

#[test]
fn reconnecting_keeps_the_same_device_and_notifies_per_transition() {
    let runtime = Arc::new(SimulatedRuntime::new(4));
    runtime.set_device(1, SimDevice::new(DeviceClass::GenericTracker));
    let mut cadences = connect(&runtime);
    let log = record_notifications(&mut cadences);

    cycle_all(&mut cadences);
    let first = cadences.render.device(1).unwrap();

    for _ in 0..3 {
        runtime.set_connected(1, true);
        cycle_all(&mut cadences);
        // same state again: no new notification
        cycle_all(&mut cadences);
        runtime.set_connected(1, false);
        cycle_all(&mut cadences);
        cycle_all(&mut cadences);
    }

    let again = cadences.render.device(1).unwrap();
    assert!(first.same_device(&again));
    assert!(first.same_device(&cadences.update.context().device(1).unwrap()));
    assert_eq!(cadences.render.devices().len(), 1);

    let log = kinds(&log);
    let count = |kind| log.iter().filter(|(k, _)| *k == kind).count();
    assert_eq!(count(NotificationKind::DeviceDetected), 1);
    assert_eq!(count(NotificationKind::Enabled), 3);
    assert_eq!(count(NotificationKind::Disabled), 3);
}

#[test]
fn device_detected_precedes_enabled_for_every_slot() {
    let runtime = Arc::new(SimulatedRuntime::with_default_setup(8));
    let mut cadences = connect(&runtime);
    let log = record_notifications(&mut cadences);

    cycle_all(&mut cadences);

    let log = kinds(&log);
    for slot in 0..5u32 {
        let detected = log
            .iter()
            .position(|e| *e == (NotificationKind::DeviceDetected, Some(slot)))
            .unwrap();
        let enabled = log
            .iter()
            .position(|e| *e == (NotificationKind::Enabled, Some(slot)))
            .unwrap();
        assert!(detected < enabled, "slot {} enabled before detection", slot);
    }
}

#[test]
fn convenience_references_follow_roles() {
    let runtime = Arc::new(SimulatedRuntime::with_default_setup(8));
    let mut cadences = connect(&runtime);
    cycle_all(&mut cadences);

    let context = cadences.update.context();
    assert_eq!(context.head_mounted().map(|d| d.slot()), Some(0));
    assert_eq!(context.left_controller().map(|d| d.slot()), Some(1));
    assert_eq!(context.right_controller().map(|d| d.slot()), Some(2));
    assert_eq!(context.devices().len(), 5);
    assert_eq!(
        context.head_mounted().and_then(|d| d.render_model().map(str::to_string)),
        Some("generic_hmd".to_string())
    );
}

#[test]
fn empty_slots_stay_unseen() {
    let runtime = Arc::new(SimulatedRuntime::new(4));
    runtime.set_device(2, SimDevice::head_mounted());
    let mut cadences = connect(&runtime);

    let report = cadences.render.scan_poses().unwrap();
    assert_eq!(report.registered, vec![2]);
    assert_eq!(cadences.render.slot_phase(0), SlotPhase::Unseen);
    assert_eq!(cadences.render.slot_phase(2), SlotPhase::Inactive);
    assert!(cadences.render.device(0).is_none());
}

#[test]
fn tracking_changes_cross_to_the_update_cadence() {
    let runtime = Arc::new(SimulatedRuntime::new(2));
    runtime.set_device(0, SimDevice::head_mounted());
    runtime.set_tracking(0, TrackingState::Calibrating);
    let mut cadences = connect(&runtime);
    cycle_all(&mut cadences);

    let log = record_notifications(&mut cadences);
    runtime.set_tracking(0, TrackingState::RunningOutOfRange);
    let report = cadences.render.scan_poses().unwrap();
    assert_eq!(report.tracking_changes, 1);

    let device = cadences.render.device(0).unwrap();
    // not applied until the update cadence drains
    assert_eq!(device.tracking_state(), TrackingState::Calibrating);

    cadences.update.run_cycle();
    assert_eq!(device.tracking_state(), TrackingState::RunningOutOfRange);
    match log.lock().unwrap().as_slice() {
        [Notification::TrackingStateChanged {
            previous, current, ..
        }] => {
            assert_eq!(*previous, TrackingState::Calibrating);
            assert_eq!(*current, TrackingState::RunningOutOfRange);
        }
        other => panic!("unexpected notifications {:?}", other),
    };
}

#[test]
fn focus_loss_is_advisory_and_uses_stale_poses() {
    let runtime = Arc::new(SimulatedRuntime::new(2));
    runtime.set_device(0, SimDevice::head_mounted());
    runtime.set_connected(0, true);
    runtime.set_pose(0, pose_at(1.0));
    let mut cadences = connect(&runtime);
    cycle_all(&mut cadences);
    let device = cadences.render.device(0).unwrap();

    runtime.set_focus_lost(true);
    runtime.set_pose(0, pose_at(2.0));
    runtime.set_connected(0, false);

    for _ in 0..3 {
        let report = cadences.render.scan_poses().unwrap();
        assert!(report.focus_degraded);
        assert!(report.disconnected.is_empty());
    }
    cadences.update.run_cycle();
    assert_eq!(device.render_pose(), pose_at(1.0));
    assert!(device.is_enabled());

    runtime.set_focus_lost(false);
    let report = cadences.render.scan_poses().unwrap();
    assert!(!report.focus_degraded);
    assert_eq!(report.disconnected, vec![0]);
    assert_eq!(device.render_pose(), pose_at(2.0));
}

#[test]
fn pose_failure_aborts_only_that_cycle() {
    let runtime = Arc::new(SimulatedRuntime::new(2));
    runtime.set_device(1, SimDevice::head_mounted());
    runtime.set_connected(1, true);
    let mut cadences = connect(&runtime);

    runtime.fail_next_render("compositor not responding");
    match cadences.render.scan_poses() {
        Err(HubError::PoseFetch(PoseError::Runtime(reason))) => {
            assert_eq!(reason, "compositor not responding")
        }
        other => panic!("unexpected result {:?}", other),
    }
    assert!(cadences.render.devices().is_empty());

    let report = cadences.render.scan_poses().unwrap();
    assert_eq!(report.registered, vec![1]);
    assert_eq!(cadences.render.cycles(), 2);
}

#[test]
fn hardware_events_carry_their_device() {
    let runtime = Arc::new(SimulatedRuntime::new(8));
    runtime.set_device(1, SimDevice::controller(ControllerRole::LeftHand));
    let mut cadences = connect(&runtime);
    cycle_all(&mut cadences);

    let log = record_notifications(&mut cadences);
    runtime.push_event(HardwareEvent::for_slot(
        HardwareEventKind::ButtonPress {
            button: ButtonType::A,
        },
        1,
    ));
    runtime.push_event(HardwareEvent::for_slot(
        HardwareEventKind::TrackedDeviceActivated,
        6,
    ));
    runtime.push_event(HardwareEvent::global(HardwareEventKind::Other(42)));

    let report = cadences.update.run_cycle();
    assert_eq!(report.events_dispatched, 3);

    let log = log.lock().unwrap();
    let devices: Vec<Option<u32>> = log
        .iter()
        .filter_map(|n| match n {
            Notification::HardwareEvent { device, .. } => Some(device.as_ref().map(|d| d.slot())),
            _ => None,
        })
        .collect();
    // slot 6 was never registered, so it is delivered like a global event
    assert_eq!(devices, vec![Some(1), None, None]);
}

#[test]
fn event_read_failure_defers_remaining_events() {
    let runtime = Arc::new(SimulatedRuntime::new(2));
    let mut cadences = connect(&runtime);
    runtime.push_event(HardwareEvent::global(HardwareEventKind::Other(1)));
    runtime.fail_next_event_read("queue corrupted");

    let report = cadences.update.run_cycle();
    assert_eq!(report.events_dispatched, 0);
    assert!(matches!(report.event_error, Some(HubError::EventRead(_))));

    let report = cadences.update.run_cycle();
    assert_eq!(report.events_dispatched, 1);
    assert!(report.event_error.is_none());
}

#[test]
fn focus_and_pause_notify_on_transitions_only() {
    let runtime = Arc::new(SimulatedRuntime::new(2));
    let mut cadences = connect(&runtime);
    let log = record_notifications(&mut cadences);

    runtime.push_event(HardwareEvent::global(HardwareEventKind::InputFocusCaptured));
    runtime.push_event(HardwareEvent::global(HardwareEventKind::DashboardActivated));
    cadences.update.run_cycle();
    assert!(!cadences.update.has_focus());
    assert!(cadences.update.is_paused());

    runtime.push_event(HardwareEvent::global(HardwareEventKind::DashboardActivated));
    cadences.update.run_cycle();

    runtime.push_event(HardwareEvent::global(HardwareEventKind::InputFocusReleased));
    runtime.push_event(HardwareEvent::global(HardwareEventKind::DashboardDeactivated));
    cadences.update.run_cycle();

    let derived: Vec<NotificationKind> = kinds(&log)
        .into_iter()
        .map(|(k, _)| k)
        .filter(|k| *k != NotificationKind::HardwareEvent)
        .collect();
    assert_eq!(
        derived,
        vec![
            NotificationKind::FocusChanged,
            NotificationKind::PauseChanged,
            NotificationKind::FocusChanged,
            NotificationKind::PauseChanged,
        ]
    );
    assert!(cadences.update.has_focus());
    assert!(!cadences.update.is_paused());
}

#[test]
fn activity_level_changes_are_notified() {
    let runtime = Arc::new(SimulatedRuntime::new(2));
    runtime.set_device(0, SimDevice::head_mounted());
    runtime.set_activity(0, ActivityLevel::UserInteraction);
    let mut cadences = connect(&runtime);
    let log = record_notifications(&mut cadences);

    cycle_all(&mut cadences);
    cycle_all(&mut cadences);
    runtime.set_activity(0, ActivityLevel::Standby);
    cycle_all(&mut cadences);

    let changes: Vec<(ActivityLevel, ActivityLevel)> = log
        .lock()
        .unwrap()
        .iter()
        .filter_map(|n| match n {
            Notification::ActivityChanged {
                previous, current, ..
            } => Some((*previous, *current)),
            _ => None,
        })
        .collect();
    assert_eq!(
        changes,
        vec![
            (ActivityLevel::Unknown, ActivityLevel::UserInteraction),
            (ActivityLevel::UserInteraction, ActivityLevel::Standby),
        ]
    );
}

#[test]
fn quit_event_is_reported() {
    let runtime = Arc::new(SimulatedRuntime::new(1));
    let mut cadences = connect(&runtime);
    runtime.push_event(HardwareEvent::global(HardwareEventKind::Quit));
    assert!(cadences.update.run_cycle().quit_requested);
}

#[test]
fn controller_input_becomes_actions_and_resets_on_disconnect() {
    let runtime = Arc::new(SimulatedRuntime::new(4));
    runtime.set_device(1, SimDevice::controller(ControllerRole::LeftHand));
    runtime.set_connected(1, true);
    let mut cadences = connect(&runtime);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    cadences
        .input
        .subscribe(move |action| sink.lock().unwrap().push((action.button, action.state)));

    cycle_all(&mut cadences);
    runtime.set_input(
        1,
        ControllerInput {
            buttons: ButtonMask::NONE.with(ButtonType::Grip),
            trigger: 0.9,
            joystick: [0.02, -0.7],
        },
    );
    let pressed = cadences.input.run_cycle();
    assert_eq!(pressed.len(), 2);

    let device = cadences.render.device(1).unwrap();
    let input = device.controller_input().unwrap();
    assert!(input.buttons.contains(ButtonType::Trigger));
    assert_eq!(input.joystick[0], 0.0);
    assert!(input.joystick[1] < 0.0);

    runtime.set_connected(1, false);
    cadences.render.scan_poses().unwrap();
    let released = cadences.input.run_cycle();
    assert!(released
        .iter()
        .all(|a| a.state == ButtonEventState::Released && a.held_ms.is_some()));
    assert_eq!(released.len(), 2);
    assert_eq!(device.controller_input(), Some(ControllerInput::NEUTRAL));

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![
            (ButtonType::Grip, ButtonEventState::Pressed),
            (ButtonType::Trigger, ButtonEventState::Pressed),
            (ButtonType::Grip, ButtonEventState::Released),
            (ButtonType::Trigger, ButtonEventState::Released),
        ]
    );
}

#[test]
fn unsupported_property_is_reported_to_the_caller() {
    let runtime = Arc::new(SimulatedRuntime::new(2));
    runtime.set_device(0, SimDevice::head_mounted());
    let cadences = connect(&runtime);

    assert_eq!(
        cadences.render.property(0, PropertyKey::BatteryPercentage),
        Err(PropertyError::Unavailable {
            slot: 0,
            key: PropertyKey::BatteryPercentage
        })
    );
    assert!(cadences
        .render
        .property(0, PropertyKey::ManufacturerName)
        .is_ok());
}

#[test]
fn listeners_can_be_added_through_the_update_queue() {
    let runtime = Arc::new(SimulatedRuntime::new(2));
    runtime.set_device(0, SimDevice::head_mounted());
    let mut cadences = connect(&runtime);
    let detected = Arc::new(Mutex::new(0));

    let sink = detected.clone();
    cadences.render.update_queue().enqueue(move |ctx| {
        ctx.notifier_mut()
            .subscribe(NotificationKind::DeviceDetected, move |_| {
                *sink.lock().unwrap() += 1;
            });
    });
    cycle_all(&mut cadences);

    assert_eq!(*detected.lock().unwrap(), 1);
}

#[test]
fn focus_loss_is_logged_once_per_transition_on_every_cadence() {
    let runtime = Arc::new(SimulatedRuntime::new(4));
    runtime.set_device(0, SimDevice::head_mounted());
    runtime.set_device(1, SimDevice::controller(ControllerRole::LeftHand));
    for slot in 0..2 {
        runtime.set_connected(slot, true);
        runtime.set_pose(slot, pose_at(0.5));
    }
    let mut cadences = connect(&runtime);

    let (pressed, logs) = capture_logs(|| {
        cycle_all(&mut cadences);
        let motion = cadences.render.device(0).unwrap().motion();

        runtime.set_focus_lost(true);
        runtime.set_pose(0, pose_at(3.0));
        for _ in 0..10 {
            cycle_all(&mut cadences);
        }
        assert!(cadences.input.focus_degraded());
        assert_eq!(cadences.render.device(0).unwrap().motion(), motion);

        // controller input keeps flowing without focus
        runtime.set_input(
            1,
            ControllerInput {
                buttons: ButtonMask::NONE.with(ButtonType::Grip),
                ..ControllerInput::NEUTRAL
            },
        );
        let pressed = cadences.input.run_cycle();

        runtime.set_focus_lost(false);
        for _ in 0..3 {
            cycle_all(&mut cadences);
        }
        assert!(!cadences.input.focus_degraded());

        runtime.set_focus_lost(true);
        for _ in 0..5 {
            cycle_all(&mut cadences);
        }
        pressed
    });

    assert_eq!(pressed.len(), 1);
    assert_eq!(pressed[0].button, ButtonType::Grip);
    // two loss transitions, each logged by render and by input
    assert_eq!(logs.count("Application focus lost"), 4);
    assert_eq!(logs.count("Application focus regained"), 2);
    assert_eq!(logs.count("Motion sample for slot"), 0);
}

#[test]
fn event_budget_warning_needs_a_pending_event() {
    let runtime = Arc::new(SimulatedRuntime::new(1));
    let mut cadences = connect(&runtime);
    let budget = MAX_EVENTS_PER_CYCLE as u32;

    let (reports, logs) = capture_logs(|| {
        for id in 0..budget {
            runtime.push_event(HardwareEvent::global(HardwareEventKind::Other(id)));
        }
        let exact = cadences.update.run_cycle();

        for id in 0..budget + 2 {
            runtime.push_event(HardwareEvent::global(HardwareEventKind::Other(id)));
        }
        let over = cadences.update.run_cycle();
        let rest = cadences.update.run_cycle();
        (exact, over, rest)
    });

    let (exact, over, rest) = reports;
    assert_eq!(exact.events_dispatched, MAX_EVENTS_PER_CYCLE);
    assert_eq!(over.events_dispatched, MAX_EVENTS_PER_CYCLE);
    assert_eq!(rest.events_dispatched, 2);
    assert_eq!(logs.count("Event budget exhausted"), 1);
}

#[test]
fn budget_overflow_keeps_event_order() {
    let runtime = Arc::new(SimulatedRuntime::new(1));
    let mut cadences = connect(&runtime);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    cadences
        .update
        .subscribe(NotificationKind::HardwareEvent, move |n| {
            if let Notification::HardwareEvent { event, .. } = n {
                if let HardwareEventKind::Other(id) = event.kind {
                    sink.lock().unwrap().push(id);
                }
            }
        });

    let total = MAX_EVENTS_PER_CYCLE as u32 + 5;
    for id in 0..total {
        runtime.push_event(HardwareEvent::global(HardwareEventKind::Other(id)));
    }
    cadences.update.run_cycle();
    cadences.update.run_cycle();

    assert_eq!(*seen.lock().unwrap(), (0..total).collect::<Vec<_>>());
}
