//! Role controller
//!
//! Owns the active [`Role`] and the background paths that belong to it:
//!
//! - Robot: the drive path, which feeds frames from the network link into the
//!   motor driver
//! - Controller: the sensor path, which acquires the wearable, streams it into
//!   the axis state and runs the sample loop while the stream is alive
//!
//! ```text
//! initialize ──► load HostConfig ──► status ──► joystick ──► enter role ──► Stop ──► sensor path
//! switch     ──► toggle + save   ──► leave role ──► status ──► enter role ──► sensor path
//! ```
//!
//! All role state sits behind one async mutex, so callers never observe a
//! half-switched controller.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Role, RoleError};
use crate::joystick::JoystickInput;
use crate::motor::MotorDriver;
use crate::network::{CommandFrame, NetworkChannel};
use crate::persistence::{ConfigStore, HostConfig};
use crate::sampling::{AxisState, SampleLoop, SampleLoopSettings};
use crate::sensor::ingest::Streaming;
use crate::sensor::{AccelerometerReading, SensorHub, SensorSession};
use crate::ui::UiHandle;

/// How long a cancelled sensor path waits for an in-flight subscription
const SUBSCRIBE_GRACE: Duration = Duration::from_secs(2);

/// External collaborators driven by the role controller
#[derive(Clone)]
pub struct Collaborators {
    pub network: Arc<dyn NetworkChannel>,
    pub motors: Arc<dyn MotorDriver>,
    pub joystick: Arc<dyn JoystickInput>,
    pub sensors: Arc<dyn SensorHub>,
}

/// A cancellable background task owned by the current role
struct ActivePath {
    name: &'static str,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ActivePath {
    async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!("{} path panicked: {}", self.name, e);
        } else {
            debug!("{} path stopped", self.name);
        }
    }
}

struct RoleState {
    config: HostConfig,
    drive_path: Option<ActivePath>,
    sensor_path: Option<ActivePath>,
}

pub struct RoleController {
    store: ConfigStore,
    collaborators: Collaborators,
    ui: UiHandle,
    axis: AxisState,
    sampling: SampleLoopSettings,
    state: Mutex<RoleState>,
}

impl RoleController {
    pub fn new(
        store: ConfigStore,
        collaborators: Collaborators,
        ui: UiHandle,
        sampling: SampleLoopSettings,
    ) -> Self {
        let config = HostConfig::new(store.default_host_name());
        Self {
            store,
            collaborators,
            ui,
            axis: AxisState::new(),
            sampling,
            state: Mutex::new(RoleState {
                config,
                drive_path: None,
                sensor_path: None,
            }),
        }
    }

    /// Startup: restores the persisted role and brings up its collaborators
    pub async fn initialize(&self) -> Role {
        let mut state = self.state.lock().await;
        state.config = self.store.load().await;
        let role = state.config.role();
        info!("Starting in {} role", role);

        self.ui.show_status(role, &state.config.host_name);

        if let Err(e) = self.collaborators.joystick.init() {
            warn!("{}", RoleError::from(e));
        }

        self.enter_role(&mut state);
        self.ui.send_command(CommandFrame::stop());
        self.start_sensor_path(&mut state);
        role
    }

    /// Toggles between the controller role and the robot role with the
    /// default host name. Returns the role that is active afterwards.
    pub async fn switch(&self) -> Role {
        let mut state = self.state.lock().await;

        let next = if state.config.host_name.is_empty() {
            HostConfig::new(self.store.default_host_name())
        } else {
            HostConfig::new("")
        };
        info!("Switching from {} to {}", state.config.role(), next.role());

        if let Err(e) = self.store.save(&next).await {
            error!("Failed to persist role switch: {}", RoleError::from(e));
        }

        self.leave_role(&mut state).await;
        state.config = next;
        self.ui
            .show_status(state.config.role(), &state.config.host_name);
        self.enter_role(&mut state);
        self.start_sensor_path(&mut state);

        state.config.role()
    }

    pub async fn role(&self) -> Role {
        self.state.lock().await.config.role()
    }

    pub async fn host_config(&self) -> HostConfig {
        self.state.lock().await.config.clone()
    }

    pub fn axis_state(&self) -> AxisState {
        self.axis.clone()
    }

    /// Stops every background path of the current role
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        info!("Shutting down {} role", state.config.role());
        self.leave_role(&mut state).await;
    }

    /// Re-initializes the link and arms the motors when entering the robot role
    fn enter_role(&self, state: &mut RoleState) {
        if let Err(e) = self.collaborators.network.init(&state.config.host_name) {
            error!("{}", RoleError::from(e));
        }

        if state.config.role() == Role::Robot {
            match self.collaborators.motors.init() {
                Ok(_) => state.drive_path = Some(self.spawn_drive_path()),
                Err(e) => error!("{}", RoleError::from(e)),
            }
        }
    }

    fn start_sensor_path(&self, state: &mut RoleState) {
        if state.config.role() == Role::Controller {
            state.sensor_path = Some(self.spawn_sensor_path());
        }
    }

    async fn leave_role(&self, state: &mut RoleState) {
        if let Some(path) = state.sensor_path.take() {
            path.stop().await;
        }

        if let Some(path) = state.drive_path.take() {
            path.stop().await;
            if let Err(e) = self.collaborators.motors.stop() {
                warn!("{}", RoleError::from(e));
            }
        }
    }

    fn spawn_drive_path(&self) -> ActivePath {
        let incoming = self.collaborators.network.incoming();
        let motors = Arc::clone(&self.collaborators.motors);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_drive_path(incoming, motors, cancel.clone()));
        ActivePath {
            name: "Drive",
            cancel,
            task,
        }
    }

    fn spawn_sensor_path(&self) -> ActivePath {
        let hub = Arc::clone(&self.collaborators.sensors);
        let sampler = SampleLoop::new(self.axis.clone(), self.ui.clone(), &self.sampling);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_sensor_path(
            hub,
            self.axis.clone(),
            sampler,
            cancel.clone(),
        ));
        ActivePath {
            name: "Sensor",
            cancel,
            task,
        }
    }
}

async fn run_drive_path(
    mut incoming: broadcast::Receiver<CommandFrame>,
    motors: Arc<dyn MotorDriver>,
    cancel: CancellationToken,
) {
    info!("Drive path started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            frame = incoming.recv() => match frame {
                Ok(frame) => {
                    if let Err(e) = motors.drive(frame) {
                        warn!("Failed to apply {}: {}", frame, e);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Drive path lagging, skipped {} frames", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    warn!("Network link closed, drive path stops");
                    break;
                }
            }
        }
    }
}

type StreamingSensor = (
    SensorSession<Streaming>,
    mpsc::Receiver<AccelerometerReading>,
);

/// Connects, checks consent and subscribes. Returns `None` when cancelled.
///
/// A subscription that is already in flight when the path is cancelled gets
/// [`SUBSCRIBE_GRACE`] to land so it can be released again.
async fn acquire_sensor(
    hub: Arc<dyn SensorHub>,
    axis: AxisState,
    cancel: &CancellationToken,
) -> Result<Option<StreamingSensor>, RoleError> {
    let mut session = tokio::select! {
        _ = cancel.cancelled() => return Ok(None),
        session = SensorSession::create(hub, axis).connect() => session?,
    };

    tokio::select! {
        _ = cancel.cancelled() => return Ok(None),
        consent = session.ensure_consent() => consent?,
    }

    let subscribing = session.subscribe();
    tokio::pin!(subscribing);
    tokio::select! {
        subscribed = &mut subscribing => return Ok(Some(subscribed?)),
        _ = cancel.cancelled() => {}
    }

    match tokio::time::timeout(SUBSCRIBE_GRACE, subscribing).await {
        Ok(Ok((session, _readings))) => {
            debug!("Releasing subscription that completed after cancellation");
            session.shutdown().await;
        }
        Ok(Err(e)) => debug!("Subscription failed after cancellation: {}", e),
        Err(_) => warn!(
            "Sensor did not finish subscribing within {:?}, abandoning it",
            SUBSCRIBE_GRACE
        ),
    }
    Ok(None)
}

/// Sampling only runs while the sensor stream is alive
async fn run_sensor_path(
    hub: Arc<dyn SensorHub>,
    axis: AxisState,
    sampler: SampleLoop,
    cancel: CancellationToken,
) {
    let (session, readings) = match acquire_sensor(hub, axis, &cancel).await {
        Ok(Some(streaming)) => streaming,
        Ok(None) => {
            info!("Sensor acquisition cancelled");
            return;
        }
        Err(e) => {
            error!("Sensor acquisition aborted: {}", e);
            return;
        }
    };

    let sampling = cancel.child_token();
    let sampler_task = sampler.spawn(sampling.clone());

    let session = session.stream(readings, &cancel).await;

    sampling.cancel();
    if let Err(e) = sampler_task.await {
        error!("Sample loop panicked: {}", e);
    }
    session.shutdown().await;
}
