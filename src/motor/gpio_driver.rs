use std::sync::Mutex;

use rppal::gpio::{Gpio, OutputPin};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{wheel_duty, MotorDriver, MotorError};
use crate::network::CommandFrame;

/// BCM pin assignment of the H-bridge inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorSettings {
    pub left_forward_pin: u8,
    pub left_backward_pin: u8,
    pub right_forward_pin: u8,
    pub right_backward_pin: u8,
    pub pwm_frequency_hz: f64,
}

impl Default for MotorSettings {
    fn default() -> Self {
        Self {
            left_forward_pin: 17,
            left_backward_pin: 27,
            right_forward_pin: 23,
            right_backward_pin: 24,
            pwm_frequency_hz: 100.0,
        }
    }
}

struct Wheel {
    forward: OutputPin,
    backward: OutputPin,
}

impl Wheel {
    fn open(gpio: &Gpio, forward_pin: u8, backward_pin: u8) -> Result<Self, rppal::gpio::Error> {
        Ok(Self {
            forward: gpio.get(forward_pin)?.into_output_low(),
            backward: gpio.get(backward_pin)?.into_output_low(),
        })
    }

    fn apply(&mut self, duty: f64, frequency: f64) -> Result<(), rppal::gpio::Error> {
        if duty > 0.0 {
            self.backward.clear_pwm()?;
            self.backward.set_low();
            self.forward.set_pwm_frequency(frequency, duty)?;
        } else if duty < 0.0 {
            self.forward.clear_pwm()?;
            self.forward.set_low();
            self.backward.set_pwm_frequency(frequency, -duty)?;
        } else {
            self.release()?;
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), rppal::gpio::Error> {
        self.forward.clear_pwm()?;
        self.backward.clear_pwm()?;
        self.forward.set_low();
        self.backward.set_low();
        Ok(())
    }
}

/// Raspberry Pi motor driver using software PWM on four GPIO outputs
pub struct GpioMotorDriver {
    settings: MotorSettings,
    wheels: Mutex<Option<(Wheel, Wheel)>>,
}

impl GpioMotorDriver {
    pub fn new(settings: MotorSettings) -> Self {
        Self {
            settings,
            wheels: Mutex::new(None),
        }
    }
}

impl MotorDriver for GpioMotorDriver {
    fn init(&self) -> Result<(), MotorError> {
        let mut wheels = self
            .wheels
            .lock()
            .map_err(|e| MotorError::InitializationError(e.to_string()))?;

        if wheels.is_some() {
            debug!("Motors already initialized");
            return Ok(());
        }

        info!("Initializing motors with settings: {:?}", self.settings);
        let gpio = Gpio::new().map_err(|e| MotorError::InitializationError(e.to_string()))?;
        let left = Wheel::open(
            &gpio,
            self.settings.left_forward_pin,
            self.settings.left_backward_pin,
        )
        .map_err(|e| MotorError::InitializationError(e.to_string()))?;
        let right = Wheel::open(
            &gpio,
            self.settings.right_forward_pin,
            self.settings.right_backward_pin,
        )
        .map_err(|e| MotorError::InitializationError(e.to_string()))?;

        *wheels = Some((left, right));
        info!("Motors initialized");
        Ok(())
    }

    fn drive(&self, frame: CommandFrame) -> Result<(), MotorError> {
        let mut wheels = self
            .wheels
            .lock()
            .map_err(|e| MotorError::DriveError(e.to_string()))?;
        let (left, right) = wheels.as_mut().ok_or(MotorError::NotInitialized)?;

        let duty = wheel_duty(frame);
        debug!(
            "Driving {}: left={:.2} right={:.2}",
            frame, duty.left, duty.right
        );
        left.apply(duty.left, self.settings.pwm_frequency_hz)
            .and_then(|_| right.apply(duty.right, self.settings.pwm_frequency_hz))
            .map_err(|e| MotorError::DriveError(e.to_string()))
    }

    fn stop(&self) -> Result<(), MotorError> {
        let mut wheels = self
            .wheels
            .lock()
            .map_err(|e| MotorError::DriveError(e.to_string()))?;

        // Dropping the pins resets them to their previous mode
        if let Some((mut left, mut right)) = wheels.take() {
            info!("Stopping motors");
            if let Err(e) = left.release().and_then(|_| right.release()) {
                warn!("Failed to release motor outputs: {}", e);
            }
        }
        Ok(())
    }
}
