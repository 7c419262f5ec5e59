use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use trackhub::config::RuntimeConfig;
use trackhub::device::{ButtonMask, ButtonType, ControllerInput};
use trackhub::hub::{spawn_cadences, TrackingHub};
use trackhub::loader::{ResourceKey, ResourceLoader};
use trackhub::notify::{Notification, NotificationKind};
use trackhub::runtime::{HardwareEvent, HardwareEventKind, ResourceRuntime, TrackingRuntime};
use trackhub::sim::SimulatedRuntime;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = match RuntimeConfig::load_or_init().await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Falling back to default config: {}", e);
            RuntimeConfig::default()
        }
    };
    setup_logging_env(&config.logging.level);
    info!("Starting with config: {:?}", config);

    let runtime = Arc::new(SimulatedRuntime::with_default_setup(config.demo.slot_count));
    let tracking: Arc<dyn TrackingRuntime> = runtime.clone();
    let resources: Arc<dyn ResourceRuntime> = runtime.clone();

    let mut cadences = TrackingHub::connect(tracking, config.hub_settings())
        .map_err(|e| eyre!("Failed to connect tracking hub: {}", e))?;
    let loader = ResourceLoader::new(resources, config.load_policy());

    let notifications = cadences
        .update
        .notifier_mut()
        .channel(&NotificationKind::ALL);
    cadences.input.subscribe(|action| {
        info!(
            "Input: slot {} {:?} {:?} (held {:?} ms)",
            action.slot, action.button, action.state, action.held_ms
        );
    });

    let token = CancellationToken::new();
    let tasks = spawn_cadences(cadences, config.cadence_intervals(), token.clone());

    let simulation = tokio::spawn(run_simulation(runtime.clone(), token.clone()));
    let consumer = tokio::spawn(consume_notifications(
        notifications,
        loader.clone(),
        token.clone(),
    ));

    let run_for = Duration::from_secs(config.demo.run_seconds);
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Ctrl-C received, shutting down"),
        _ = tokio::time::sleep(run_for) => info!("Demo finished after {:?}", run_for),
        _ = token.cancelled() => info!("Runtime requested shutdown"),
    }
    token.cancel();

    let cadences = tasks
        .join()
        .await
        .map_err(|e| eyre!("Cadence task failed: {}", e))?;
    let loaded_keys = consumer
        .await
        .map_err(|e| eyre!("Notification consumer failed: {}", e))?;
    if let Err(e) = simulation.await {
        warn!("Simulation task failed: {}", e);
    }

    // models and the textures they reference
    for key in loaded_keys {
        loader.free(&key).await;
    }

    info!(
        "Shutdown complete: {} render, {} input, {} update cycles, {} devices, {} load sequences",
        cadences.render.cycles(),
        cadences.input.cycles(),
        cadences.update.cycles(),
        cadences.render.devices().len(),
        loader.load_sequences()
    );
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    Ok(())
}

fn setup_logging_env(configured: &str) {
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|value| value.parse::<Level>().ok())
        .or_else(|| configured.parse::<Level>().ok())
        .unwrap_or(Level::INFO);

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

/// Drives the simulated hardware: motion, a controller dropping out and coming back, and a
/// trigger pull.
async fn run_simulation(runtime: Arc<SimulatedRuntime>, token: CancellationToken) {
    let started = tokio::time::Instant::now();
    let mut ticker = tokio::time::interval(Duration::from_millis(5));
    let mut step = 0u64;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let seconds = started.elapsed().as_secs_f32();
        runtime.animate(seconds);
        step += 1;

        match step {
            400 => {
                info!("Simulation: right controller loses connection");
                runtime.set_connected(2, false);
            }
            800 => {
                info!("Simulation: right controller reconnects");
                runtime.set_connected(2, true);
            }
            1000 => runtime.set_input(
                1,
                ControllerInput {
                    buttons: ButtonMask::NONE.with(ButtonType::Grip),
                    trigger: 0.8,
                    joystick: [0.4, 0.0],
                },
            ),
            1100 => runtime.set_input(1, ControllerInput::NEUTRAL),
            1200 => runtime.push_event(HardwareEvent::global(HardwareEventKind::DashboardActivated)),
            1400 => runtime.push_event(HardwareEvent::global(HardwareEventKind::DashboardDeactivated)),
            _ => {}
        }
    }
    debug!("Simulation stopped after {} steps", step);
}

/// Logs notifications and loads the render model of every detected device off the cadences.
async fn consume_notifications(
    mut notifications: mpsc::UnboundedReceiver<Notification>,
    loader: ResourceLoader,
    token: CancellationToken,
) -> Vec<ResourceKey> {
    let (loaded_tx, mut loaded_rx) = mpsc::unbounded_channel();

    loop {
        let notification = tokio::select! {
            _ = token.cancelled() => break,
            received = notifications.recv() => match received {
                Some(notification) => notification,
                None => break,
            },
        };

        match &notification {
            Notification::DeviceDetected { device } => {
                info!("Detected {:?} in slot {}", device.kind(), device.slot());
                if let Some(model) = device.render_model() {
                    let loader = loader.clone();
                    let model = model.to_string();
                    let loaded_tx = loaded_tx.clone();
                    tokio::spawn(async move {
                        match loader.request_model_with_texture(&model).await {
                            Ok(assets) => {
                                info!(
                                    "Render model ready: {:?} texture {:?}",
                                    assets.model.metadata,
                                    assets.texture.as_ref().map(|t| t.metadata)
                                );
                                for key in assets.keys() {
                                    let _ = loaded_tx.send(key);
                                }
                            }
                            Err(e) => error!("Render model unavailable: {}", e),
                        }
                    });
                }
            }
            Notification::HardwareEvent { device, event } => debug!(
                "Hardware event {:?} from {:?}",
                event.kind,
                device.as_ref().map(|d| d.slot())
            ),
            other => info!("{:?}", other),
        }
    }

    let mut loaded = Vec::new();
    while let Ok(key) = loaded_rx.try_recv() {
        if !loaded.contains(&key) {
            loaded.push(key);
        }
    }
    loaded
}
