//! Tilt sampling subsystem
//!
//! Turns a noisy accelerometer stream into discrete drive commands:
//!
//! 1. [`AxisState`] - latest smoothed reading, written by sensor ingest
//! 2. [`classifier`] - pure mapping from a reading to a [`DirectionCommand`]
//! 3. [`sample_loop`] - fixed-interval timer that classifies and dispatches
//!
//! # Architecture
//!
//! ```text
//! SensorIngest ──► AxisState ──► SampleLoop ──► UI context ──► NetworkChannel
//!  (writer)       (watch)       (1s ticks)    (display + dispatch)
//! ```

pub mod classifier;
pub mod sample_loop;

pub use classifier::{classify, classify_sample, TILT_THRESHOLD};
pub use sample_loop::{SampleLoop, SampleLoopSettings};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Smoothed 3-axis reading.
///
/// `x` is the forward/backward tilt, `y` the left/right tilt. `z` is carried
/// along for display only and never takes part in classification.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AxisSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl AxisSample {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Merges an incoming raw reading into this one, axis by axis.
    ///
    /// A reading of exactly zero on an axis keeps the stored value for that
    /// axis (last-nonzero-wins); any other value overwrites it.
    pub fn retain_nonzero(self, incoming: AxisSample) -> AxisSample {
        AxisSample {
            x: keep_nonzero(self.x, incoming.x),
            y: keep_nonzero(self.y, incoming.y),
            z: keep_nonzero(self.z, incoming.z),
        }
    }
}

fn keep_nonzero(stored: f64, incoming: f64) -> f64 {
    if incoming == 0.0 {
        stored
    } else {
        incoming
    }
}

/// Shared axis state between the sensor path (single writer) and the
/// sample loop (reader).
///
/// Backed by a watch channel so every update swaps a whole snapshot and
/// readers never observe a half-updated sample.
#[derive(Clone, Debug)]
pub struct AxisState {
    sender: Arc<watch::Sender<AxisSample>>,
}

impl Default for AxisState {
    fn default() -> Self {
        Self::new()
    }
}

impl AxisState {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(AxisSample::default());
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Applies a raw reading with zero retention and returns the new snapshot
    pub fn ingest(&self, incoming: AxisSample) -> AxisSample {
        self.sender
            .send_modify(|stored| *stored = stored.retain_nonzero(incoming));
        let updated = *self.sender.borrow();
        debug!(
            "Axis state updated: x={:.4} y={:.4} z={:.4}",
            updated.x, updated.y, updated.z
        );
        updated
    }

    pub fn snapshot(&self) -> AxisSample {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<AxisSample> {
        self.sender.subscribe()
    }
}

/// One of the nine movement instructions understood by the robot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DirectionCommand {
    Stop,
    Forward,
    Backward,
    Left,
    Right,
    ForwardLeft,
    ForwardRight,
    BackLeft,
    BackRight,
}

impl DirectionCommand {
    pub const ALL: [DirectionCommand; 9] = [
        DirectionCommand::Stop,
        DirectionCommand::Forward,
        DirectionCommand::Backward,
        DirectionCommand::Left,
        DirectionCommand::Right,
        DirectionCommand::ForwardLeft,
        DirectionCommand::ForwardRight,
        DirectionCommand::BackLeft,
        DirectionCommand::BackRight,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DirectionCommand::Stop => "Stop",
            DirectionCommand::Forward => "Forward",
            DirectionCommand::Backward => "Backward",
            DirectionCommand::Left => "Left",
            DirectionCommand::Right => "Right",
            DirectionCommand::ForwardLeft => "ForwardLeft",
            DirectionCommand::ForwardRight => "ForwardRight",
            DirectionCommand::BackLeft => "BackLeft",
            DirectionCommand::BackRight => "BackRight",
        }
    }
}

impl fmt::Display for DirectionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown direction command: {0}")]
pub struct UnknownCommand(pub String);

impl FromStr for DirectionCommand {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DirectionCommand::ALL
            .iter()
            .copied()
            .find(|command| command.as_str() == s)
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}

/// Speed levels understood by the motor side.
///
/// `Max` is the default: it accompanies the initial `Stop` at startup and every
/// command produced by the sample loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u16)]
pub enum SpeedLevel {
    Min = 100,
    Mid = 500,
    #[default]
    Max = 1000,
}

impl SpeedLevel {
    pub fn value(self) -> u16 {
        self as u16
    }
}
