//! Gamepad joystick input
//!
//! Initialized in every role. The left stick is classified with the same tilt
//! classifier as the wearable and every change of the resulting command is
//! emitted as a [`JoystickEvent::Direction`]; the Select button requests a
//! role switch.
//!
//! ```text
//! Gamepad ──► GamepadCollector (poll thread) ──► JoystickEvent ──► application
//! ```

pub mod gamepad;

pub use gamepad::{GamepadCollector, GamepadJoystick, JoystickSettings};

use crate::network::CommandFrame;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoystickEvent {
    Direction(CommandFrame),
    SwitchRequested,
}

#[derive(Debug, Error)]
pub enum JoystickError {
    #[error("Failed to initialize joystick: {0}")]
    InitializationError(String),

    #[error("Failed to send joystick event: {0}")]
    EventSendError(String),
}

pub trait JoystickInput: Send + Sync {
    /// Starts polling. Calling it again while polling is a no-op.
    fn init(&self) -> Result<(), JoystickError>;
}
