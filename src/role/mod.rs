//! Device role management
//!
//! The device is either the robot or the controller, never both. The role is
//! derived from the persisted host name at one place ([`Role::from_host_name`])
//! and everything downstream works with the enum.

pub mod role_controller;

pub use role_controller::{Collaborators, RoleController};

use crate::joystick::JoystickError;
use crate::motor::MotorError;
use crate::network::NetworkError;
use crate::persistence::PersistenceError;
use crate::sensor::SensorError;
use std::fmt;
use thiserror::Error;

/// Failures while entering or leaving a role.
///
/// None of these stop the process: the role controller logs them and keeps
/// the in-memory role at the attempted value.
#[derive(Debug, Error)]
pub enum RoleError {
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Motor error: {0}")]
    Motor(#[from] MotorError),

    #[error("Joystick error: {0}")]
    Joystick(#[from] JoystickError),

    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Receives commands and drives the motors
    Robot,
    /// Samples the tilt sensor and sends commands
    Controller,
}

impl Role {
    /// A non-empty host name means "robot connecting to that controller"
    pub fn from_host_name(host_name: &str) -> Self {
        if host_name.is_empty() {
            Role::Controller
        } else {
            Role::Robot
        }
    }

    pub fn connection_label(&self, host_name: &str) -> String {
        match self {
            Role::Robot => format!("Robot to {}", host_name),
            Role::Controller => "Controller".to_string(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Robot => write!(f, "Robot"),
            Role::Controller => write!(f, "Controller"),
        }
    }
}
