//! Robot-kit tilt control
//!
//! One binary runs on both devices of the kit. The persisted host name decides
//! whether this device is the robot (drives its motors from received commands)
//! or the controller (turns the wearable's tilt into drive commands).

pub mod config;
pub mod joystick;
pub mod motor;
pub mod network;
pub mod persistence;
pub mod role;
pub mod sampling;
pub mod sensor;
pub mod ui;

#[cfg(test)]
pub(crate) mod testing;
