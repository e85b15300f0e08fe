//! UI execution context
//!
//! Every user-visible side effect (status text, axis values) and every command
//! dispatch is funnelled through one task that owns the [`StatusDisplay`] and
//! the network handle. Producers (sample loop, joystick, role controller) only
//! hold a cheap [`UiHandle`] and never touch either collaborator directly.
//!
//! ```text
//! SampleLoop ──┐
//! Joystick ────┼──► UiHandle ──mpsc──► UiContext task ──► StatusDisplay
//! RoleControl ─┘                                      └──► NetworkChannel
//! ```

pub mod status;

pub use status::{LogStatusDisplay, StatusSnapshot};

use crate::network::{CommandFrame, NetworkChannel};
use crate::role::Role;
use crate::sampling::AxisSample;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Title shown in the state field
pub const STATE_TITLE: &str = "Robot-Kit Sample";

const UI_QUEUE_CAPACITY: usize = 256;

/// Write-only status surface
pub trait StatusDisplay: Send {
    fn set_state(&mut self, text: &str);
    fn set_connection_label(&mut self, text: &str);
    fn set_axis_values(&mut self, x: f64, y: f64, z: f64);
}

#[derive(Debug)]
pub enum UiAction {
    SetState(String),
    SetConnectionLabel(String),
    SetAxisValues(AxisSample),
    SendCommand(CommandFrame),
    /// Completes once every action queued before it has been applied
    Flush(oneshot::Sender<()>),
}

/// Single consumer of [`UiAction`]s
pub struct UiContext {
    display: Box<dyn StatusDisplay>,
    network: Arc<dyn NetworkChannel>,
    actions: mpsc::Receiver<UiAction>,
}

impl UiContext {
    /// Spawns the UI task. It runs until every [`UiHandle`] is dropped.
    pub fn spawn(
        display: Box<dyn StatusDisplay>,
        network: Arc<dyn NetworkChannel>,
    ) -> (UiHandle, JoinHandle<()>) {
        let (sender, actions) = mpsc::channel(UI_QUEUE_CAPACITY);
        let context = Self {
            display,
            network,
            actions,
        };

        info!("Spawning UI context");
        let task = tokio::spawn(context.run());
        (UiHandle { sender }, task)
    }

    async fn run(mut self) {
        while let Some(action) = self.actions.recv().await {
            self.apply(action);
        }
        info!("UI context finished, all handles dropped");
    }

    fn apply(&mut self, action: UiAction) {
        match action {
            UiAction::SetState(text) => self.display.set_state(&text),
            UiAction::SetConnectionLabel(text) => self.display.set_connection_label(&text),
            UiAction::SetAxisValues(sample) => {
                self.display.set_axis_values(sample.x, sample.y, sample.z)
            }
            UiAction::SendCommand(frame) => {
                debug!("Dispatching {}", frame);
                self.network.send_command(frame);
            }
            UiAction::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

/// Cloneable entry point into the UI context
#[derive(Clone, Debug)]
pub struct UiHandle {
    sender: mpsc::Sender<UiAction>,
}

impl UiHandle {
    fn post(&self, action: UiAction) {
        if let Err(e) = self.sender.try_send(action) {
            warn!("UI context rejected action: {}", e);
        }
    }

    /// Shows the running mode, mirroring the startup status of the device
    pub fn show_status(&self, role: Role, host_name: &str) {
        self.post(UiAction::SetState(STATE_TITLE.to_string()));
        self.post(UiAction::SetConnectionLabel(role.connection_label(host_name)));
    }

    pub fn set_axis_values(&self, sample: AxisSample) {
        self.post(UiAction::SetAxisValues(sample));
    }

    pub fn send_command(&self, frame: CommandFrame) {
        self.post(UiAction::SendCommand(frame));
    }

    /// Waits until everything queued so far has been applied
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.sender.send(UiAction::Flush(done_tx)).await.is_err() {
            warn!("UI context closed before flush");
            return;
        }
        let _ = done_rx.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::{DirectionCommand, SpeedLevel};
    use crate::testing::{RecordingDisplay, RecordingNetwork};

    #[tokio::test]
    async fn actions_apply_in_order() {
        let display = RecordingDisplay::default();
        let log = display.log();
        let network = RecordingNetwork::new();
        let (ui, _task) = UiContext::spawn(Box::new(display), network.clone());

        ui.show_status(Role::Robot, "169.254.250.82");
        ui.set_axis_values(AxisSample::new(0.1, 0.2, 0.3));
        ui.send_command(CommandFrame::new(DirectionCommand::Left, SpeedLevel::Max));
        ui.flush().await;

        let log = log.lock().unwrap();
        assert_eq!(log.states, vec![STATE_TITLE.to_string()]);
        assert_eq!(log.labels, vec!["Robot to 169.254.250.82".to_string()]);
        assert_eq!(log.axes, vec![AxisSample::new(0.1, 0.2, 0.3)]);
        assert_eq!(
            network.sent(),
            vec![CommandFrame::new(DirectionCommand::Left, SpeedLevel::Max)]
        );
    }

    #[tokio::test]
    async fn controller_label() {
        let display = RecordingDisplay::default();
        let log = display.log();
        let (ui, _task) = UiContext::spawn(Box::new(display), RecordingNetwork::new());

        ui.show_status(Role::Controller, "");
        ui.flush().await;

        assert_eq!(log.lock().unwrap().labels, vec!["Controller".to_string()]);
    }
}
