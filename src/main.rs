use std::sync::Arc;

use color_eyre::Result;
use robotkit::config::Settings;
use robotkit::joystick::{GamepadJoystick, JoystickEvent};
use robotkit::motor::GpioMotorDriver;
use robotkit::network::MqttChannel;
use robotkit::persistence::{ConfigStore, FileStore};
use robotkit::role::{Collaborators, RoleController};
use robotkit::sensor::MqttSensorHub;
use robotkit::ui::{LogStatusDisplay, UiContext};
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let (settings, config_dir) = Settings::load_or_default().await;
    debug!("Settings: {:?}", settings);

    let data_dir = settings.data_dir(&config_dir);
    info!("Storing role configuration in {}", data_dir.display());
    let store = ConfigStore::new(
        Arc::new(FileStore::new(data_dir)),
        settings.general.default_host_name.clone(),
    );

    let (joystick_tx, mut joystick_rx) = mpsc::channel(100);
    let network = Arc::new(MqttChannel::new(settings.network.clone()));
    let collaborators = Collaborators {
        network: network.clone(),
        motors: Arc::new(GpioMotorDriver::new(settings.motor.clone())),
        joystick: Arc::new(GamepadJoystick::new(settings.joystick.clone(), joystick_tx)),
        sensors: Arc::new(MqttSensorHub::new(settings.sensor.clone())),
    };

    let display = LogStatusDisplay::new();
    let status = display.subscribe();
    let (ui, _ui_task) = UiContext::spawn(Box::new(display), network);

    let controller = RoleController::new(store, collaborators, ui.clone(), settings.sampling);
    let role = controller.initialize().await;
    info!("Running as {}", role);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }

            event = joystick_rx.recv() => match event {
                Some(JoystickEvent::Direction(frame)) => ui.send_command(frame),
                Some(JoystickEvent::SwitchRequested) => {
                    let role = controller.switch().await;
                    ui.flush().await;
                    let snapshot = status.borrow().clone();
                    info!(
                        "Now running as {} ({}), up {}s",
                        role,
                        snapshot.connection,
                        snapshot.uptime.num_seconds()
                    );
                }
                None => {
                    warn!("Joystick channel closed");
                    // Keep serving Ctrl-C without a joystick
                    tokio::signal::ctrl_c().await?;
                    break;
                }
            }
        }
    }

    controller.shutdown().await;
    ui.flush().await;
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
