//! # Network Link
//!
//! Carries drive commands from the controller device to the robot. The core
//! only needs two things from the link: an idempotent `init` that works in
//! either role, and a fire-and-forget `send_command`. The robot side also
//! listens to [`NetworkChannel::incoming`] to feed its motor driver.
//!
//! ## Wire Frame
//!
//! A [`CommandFrame`] travels as plain UTF-8 text `"<Command>:<speed>"`,
//! e.g. `Forward:1000`. Nothing is acknowledged.
//!
//! ```text
//! controller ──publish──► broker (controller host) ──► robot ──► MotorDriver
//! ```

pub mod mqtt_channel;

pub use mqtt_channel::{MqttChannel, NetworkSettings};

use crate::sampling::{DirectionCommand, SpeedLevel};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::broadcast;

/// A drive command together with the speed it should run at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame {
    pub command: DirectionCommand,
    pub speed: u16,
}

impl CommandFrame {
    pub fn new(command: DirectionCommand, speed: SpeedLevel) -> Self {
        Self {
            command,
            speed: speed.value(),
        }
    }

    pub fn stop() -> Self {
        Self::new(DirectionCommand::Stop, SpeedLevel::Max)
    }
}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.command, self.speed)
    }
}

impl FromStr for CommandFrame {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (command, speed) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| NetworkError::MalformedFrame(s.to_string()))?;

        let command = command
            .parse::<DirectionCommand>()
            .map_err(|e| NetworkError::MalformedFrame(e.to_string()))?;
        let speed = speed
            .parse::<u16>()
            .map_err(|e| NetworkError::MalformedFrame(format!("{}: {}", s, e)))?;

        Ok(Self { command, speed })
    }
}

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Failed to initialize network link: {0}")]
    InitializationError(String),

    #[error("Failed to send command: {0}")]
    SendError(String),

    #[error("Malformed command frame: {0}")]
    MalformedFrame(String),
}

/// Outbound (and robot-side inbound) command link.
///
/// Implementations must tolerate repeated `init` calls; each call replaces the
/// previous connection.
pub trait NetworkChannel: Send + Sync {
    fn init(&self, host_name: &str) -> Result<(), NetworkError>;

    /// Sends a frame without waiting for delivery. Failures are logged by the
    /// implementation.
    fn send_command(&self, frame: CommandFrame);

    /// Frames received from the link
    fn incoming(&self) -> broadcast::Receiver<CommandFrame>;
}
