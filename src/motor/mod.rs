//! Motor driver subsystem
//!
//! Only armed in the robot role. The driver receives [`CommandFrame`]s from the
//! robot drive path and turns them into wheel duty cycles for a two-wheel
//! differential drive.

pub mod gpio_driver;

pub use gpio_driver::{GpioMotorDriver, MotorSettings};

use crate::network::CommandFrame;
use crate::sampling::{DirectionCommand, SpeedLevel};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MotorError {
    #[error("Failed to initialize motors: {0}")]
    InitializationError(String),

    #[error("Motor driver not initialized")]
    NotInitialized,

    #[error("Failed to drive motors: {0}")]
    DriveError(String),
}

pub trait MotorDriver: Send + Sync {
    fn init(&self) -> Result<(), MotorError>;

    fn drive(&self, frame: CommandFrame) -> Result<(), MotorError>;

    /// Halts both wheels and releases the outputs
    fn stop(&self) -> Result<(), MotorError>;
}

/// Signed duty cycle per wheel in `-1.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelDuty {
    pub left: f64,
    pub right: f64,
}

/// Differential drive mix. Turning on the spot spins the wheels in opposite
/// directions; diagonals run the inner wheel at half duty.
pub fn wheel_duty(frame: CommandFrame) -> WheelDuty {
    let (left, right) = match frame.command {
        DirectionCommand::Stop => (0.0, 0.0),
        DirectionCommand::Forward => (1.0, 1.0),
        DirectionCommand::Backward => (-1.0, -1.0),
        DirectionCommand::Left => (-1.0, 1.0),
        DirectionCommand::Right => (1.0, -1.0),
        DirectionCommand::ForwardLeft => (0.5, 1.0),
        DirectionCommand::ForwardRight => (1.0, 0.5),
        DirectionCommand::BackLeft => (-0.5, -1.0),
        DirectionCommand::BackRight => (-1.0, -0.5),
    };

    let scale = (f64::from(frame.speed) / f64::from(SpeedLevel::Max.value())).clamp(0.0, 1.0);
    WheelDuty {
        left: left * scale,
        right: right * scale,
    }
}
