use chrono::{DateTime, Local, TimeDelta};
use tokio::sync::watch;
use tracing::{debug, info};

use super::StatusDisplay;
use crate::sampling::AxisSample;

/// Everything the status surface currently shows
#[derive(Clone, Debug, PartialEq)]
pub struct StatusSnapshot {
    pub state: String,
    pub connection: String,
    pub axis: AxisSample,
    /// Time since the display was created
    pub uptime: TimeDelta,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            state: String::new(),
            connection: String::new(),
            axis: AxisSample::default(),
            uptime: TimeDelta::zero(),
        }
    }
}

/// Headless status display: logs every change and publishes the current
/// [`StatusSnapshot`] on a watch channel for anyone rendering it.
pub struct LogStatusDisplay {
    started: DateTime<Local>,
    snapshot: StatusSnapshot,
    sender: watch::Sender<StatusSnapshot>,
}

impl Default for LogStatusDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl LogStatusDisplay {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(StatusSnapshot::default());
        Self {
            started: Local::now(),
            snapshot: StatusSnapshot::default(),
            sender,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.sender.subscribe()
    }

    fn publish(&mut self) {
        self.snapshot.uptime = Local::now() - self.started;
        self.sender.send_replace(self.snapshot.clone());
    }
}

impl StatusDisplay for LogStatusDisplay {
    fn set_state(&mut self, text: &str) {
        info!("State: {}", text);
        self.snapshot.state = text.to_string();
        self.publish();
    }

    fn set_connection_label(&mut self, text: &str) {
        info!("Connection: {}", text);
        self.snapshot.connection = text.to_string();
        self.publish();
    }

    fn set_axis_values(&mut self, x: f64, y: f64, z: f64) {
        debug!("Axis values: x={} y={} z={}", x, y, z);
        self.snapshot.axis = AxisSample::new(x, y, z);
        self.publish();
    }
}
