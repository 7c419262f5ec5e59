//! Runs the three cadences as periodic tokio tasks
//!
//! Each cadence is a plain sequential loop; the driver only supplies the clock. Tasks stop
//! when the cancellation token fires (or the runtime sends a quit event) and hand their
//! cadence back through the join handle.

use chrono::Local;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Cadences, InputCadence, RenderCadence, UpdateCadence};

#[derive(Debug, Clone, PartialEq)]
pub struct CadenceIntervals {
    pub render: Duration,
    pub input: Duration,
    pub update: Duration,
}

impl Default for CadenceIntervals {
    fn default() -> Self {
        Self {
            render: Duration::from_millis(11),
            input: Duration::from_millis(4),
            update: Duration::from_millis(33),
        }
    }
}

pub struct CadenceTasks {
    pub render: JoinHandle<RenderCadence>,
    pub input: JoinHandle<InputCadence>,
    pub update: JoinHandle<UpdateCadence>,
}

impl CadenceTasks {
    /// Waits for all three tasks and returns the cadences.
    pub async fn join(self) -> Result<Cadences, tokio::task::JoinError> {
        let (render, input, update) = tokio::try_join!(self.render, self.input, self.update)?;
        Ok(Cadences {
            render,
            input,
            update,
        })
    }
}

const STATS_INTERVAL_SECONDS: i64 = 10;
const MIN_PERIOD: Duration = Duration::from_millis(1);

async fn run_periodic<T, F>(
    name: &'static str,
    period: Duration,
    token: CancellationToken,
    mut cadence: T,
    mut cycle: F,
) -> T
where
    F: FnMut(&mut T) -> bool,
{
    let period = if period.is_zero() {
        warn!("{} cadence interval of zero raised to {:?}", name, MIN_PERIOD);
        MIN_PERIOD
    } else {
        period
    };
    info!("Starting {} cadence every {:?}", name, period);
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // For performance monitoring
    let mut cycle_count: u64 = 0;
    let mut last_log_time = Local::now();
    let log_interval = chrono::Duration::seconds(STATS_INTERVAL_SECONDS);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                if !cycle(&mut cadence) {
                    debug!("{} cadence requested shutdown", name);
                    token.cancel();
                    break;
                }
                cycle_count += 1;
            }
        }

        let now = Local::now();
        if now - last_log_time > log_interval {
            info!(
                "{} cadence stats: {} cycles in last {} seconds (avg {:.1}/sec)",
                name,
                cycle_count,
                log_interval.num_seconds(),
                cycle_count as f64 / log_interval.num_seconds() as f64
            );
            cycle_count = 0;
            last_log_time = now;
        }
    }

    info!("{} cadence stopped", name);
    cadence
}

/// Spawns one periodic task per cadence.
///
/// Listeners (input and notification) should be registered on the cadences before they are
/// handed over. A quit event from the runtime cancels `token` for all three.
pub fn spawn_cadences(
    cadences: Cadences,
    intervals: CadenceIntervals,
    token: CancellationToken,
) -> CadenceTasks {
    let Cadences {
        render,
        input,
        update,
    } = cadences;

    let render = tokio::spawn(run_periodic(
        "render",
        intervals.render,
        token.clone(),
        render,
        |render: &mut RenderCadence| {
            // failures are logged inside the scan
            let _ = render.scan_poses();
            true
        },
    ));
    let input = tokio::spawn(run_periodic(
        "input",
        intervals.input,
        token.clone(),
        input,
        |input: &mut InputCadence| {
            input.run_cycle();
            true
        },
    ));
    let update = tokio::spawn(run_periodic(
        "update",
        intervals.update,
        token,
        update,
        |update: &mut UpdateCadence| {
            !update.run_cycle().quit_requested
        },
    ));

    CadenceTasks {
        render,
        input,
        update,
    }
}
