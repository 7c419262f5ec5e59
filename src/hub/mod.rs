//! Tracking hub - orchestrates the three cadences over the device registry
//!
//! # Cadences
//!
//! ```text
//!                    ┌────────────── render cadence ──────────────┐
//!                    │ scan slots, register devices, write render │
//!                    │ pose, detect connect / tracking changes    │
//!                    └───────┬──────────────────────────┬─────────┘
//!                 QueueHandle│<InputContext>            │QueueHandle<UpdateContext>
//!                            ▼                          ▼
//!   input cadence: drain, sample motion          update cadence: drain, poll events,
//!   and controller input, emit InputActions      derive focus/pause/activity, notify
//! ```
//!
//! # Lifecycle
//!
//! [`TrackingHub`] is a typestate machine. `TrackingHub<Handshaking>` only holds the runtime;
//! [`TrackingHub::initialize`] performs the handshake and yields `TrackingHub<Ready>`, which
//! is split into the three cadence objects by [`TrackingHub::into_cadences`]. A failed
//! handshake is reported before any registry or queue exists.
//!
//! # Ordering
//!
//! A slot seen for the first time is announced on the update queue before any enable action
//! for it is enqueued, and both come from the same render pass, so DeviceDetected always
//! precedes Enabled for that slot.

pub mod driver;
pub mod error;
pub mod input;
pub mod render;
pub mod update;

pub use driver::{spawn_cadences, CadenceIntervals, CadenceTasks};
pub use error::HubError;
pub use input::{ButtonEventState, InputAction, InputCadence, InputContext, InputSettings};
pub use render::{RenderCadence, ScanReport, SlotPhase};
pub use update::{UpdateCadence, UpdateContext, UpdateReport};

use statum::{machine, state};
use std::sync::Arc;
use tracing::{error, info};

use crate::queue::ThreadQueue;
use crate::runtime::{RuntimeInfo, TrackingRuntime, MAX_TRACKED_DEVICES};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct HubSettings {
    pub input: InputSettings,
}

/// The three cadence halves of a connected hub, ready to be moved to their threads
pub struct Cadences {
    pub render: RenderCadence,
    pub input: InputCadence,
    pub update: UpdateCadence,
}

#[state]
#[derive(Debug, Clone)]
pub enum HubState {
    Handshaking,
    Ready,
}

#[machine]
pub struct TrackingHub<S: HubState> {
    runtime: Arc<dyn TrackingRuntime>,
    settings: HubSettings,
    info: Option<RuntimeInfo>,
}

impl TrackingHub<Handshaking> {
    pub fn create(runtime: Arc<dyn TrackingRuntime>, settings: HubSettings) -> Self {
        info!("Creating tracking hub with settings: {:?}", settings);
        Self::new(runtime, settings, None)
    }

    /// Handshake with the runtime. The only fatal failure of the hub.
    pub fn initialize(mut self) -> Result<TrackingHub<Ready>, HubError> {
        let info = match self.runtime.handshake() {
            Ok(info) => info,
            Err(e) => {
                error!("Runtime handshake failed: {}", e);
                return Err(HubError::InitializationFailed(e.to_string()));
            }
        };
        info!(
            "Connected to runtime '{}' with {} slots",
            info.name, info.slot_count
        );
        self.info = Some(info);
        Ok(self.transition())
    }

    /// Shorthand for `create`, `initialize` and `into_cadences`.
    pub fn connect(
        runtime: Arc<dyn TrackingRuntime>,
        settings: HubSettings,
    ) -> Result<Cadences, HubError> {
        Ok(Self::create(runtime, settings).initialize()?.into_cadences())
    }
}

impl TrackingHub<Ready> {
    pub fn runtime_info(&self) -> Option<&RuntimeInfo> {
        self.info.as_ref()
    }

    /// Creates the queues and the empty registry and splits the hub into its cadences.
    pub fn into_cadences(self) -> Cadences {
        let slot_count = self
            .info
            .as_ref()
            .map_or(0, |info| info.slot_count)
            .min(MAX_TRACKED_DEVICES);

        let input_queue: ThreadQueue<InputContext> = ThreadQueue::new("input");
        let update_queue: ThreadQueue<UpdateContext> = ThreadQueue::new("update");

        let render = RenderCadence::new(
            self.runtime.clone(),
            slot_count,
            input_queue.handle(),
            update_queue.handle(),
        );
        let input = InputCadence::new(self.runtime.clone(), input_queue, self.settings.input.clone());
        let update = UpdateCadence::new(self.runtime, update_queue);

        info!("Tracking hub split into cadences ({} slots)", slot_count);
        Cadences {
            render,
            input,
            update,
        }
    }
}
