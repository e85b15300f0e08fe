use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use gilrs::{Axis, Button, Event, EventType, Gamepad, GamepadId, Gilrs};
use serde::{Deserialize, Serialize};
use statum::{machine, state};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{JoystickError, JoystickEvent, JoystickInput};
use crate::network::CommandFrame;
use crate::sampling::{classify, DirectionCommand, SpeedLevel};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoystickSettings {
    pub deadzone: f32,
    pub poll_interval_ms: u64,
}

impl Default for JoystickSettings {
    fn default() -> Self {
        Self {
            deadzone: 0.05,
            poll_interval_ms: 20,
        }
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum CollectionState {
    Initializing,
    Collecting,
}

#[machine]
#[derive(Debug)]
pub struct GamepadCollector<S: CollectionState> {
    gilrs: Gilrs,
    active_gamepad: Option<GamepadId>,
    settings: JoystickSettings,
    events: mpsc::Sender<JoystickEvent>,
    stick_x: f32,
    stick_y: f32,
    last_command: DirectionCommand,
}

impl GamepadCollector<Initializing> {
    pub fn create(
        settings: JoystickSettings,
        events: mpsc::Sender<JoystickEvent>,
    ) -> Result<Self, JoystickError> {
        info!("Initializing gilrs gamepad interface");
        let gilrs = Gilrs::new().map_err(|e| {
            error!("Failed to initialize gilrs: {}", e);
            JoystickError::InitializationError(e.to_string())
        })?;

        Ok(Self::new(
            gilrs,
            None,
            settings,
            events,
            0.0, // stick_x
            0.0, // stick_y
            DirectionCommand::Stop,
        ))
    }

    /// Selects the first connected gamepad and starts collecting
    pub fn initialize(mut self) -> GamepadCollector<Collecting> {
        let gamepads: Vec<(GamepadId, Gamepad<'_>)> = self.gilrs.gamepads().collect();

        if let Some((id, gamepad)) = gamepads.first() {
            info!("Found {} gamepads, using {} ({})", gamepads.len(), gamepad.name(), id);
            self.active_gamepad = Some(*id);
        } else {
            warn!("No gamepad connected, continuing in idle mode");
        }

        self.transition()
    }
}

impl GamepadCollector<Collecting> {
    /// Drains pending gilrs events and emits at most one direction change
    pub fn collect_pending(&mut self) -> Result<(), JoystickError> {
        while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            if let Some(active_id) = self.active_gamepad {
                if id != active_id {
                    continue;
                }
            } else if matches!(event, EventType::Connected) {
                info!("Gamepad {} connected, selecting it", id);
                self.active_gamepad = Some(id);
            }

            match event {
                EventType::AxisChanged(Axis::LeftStickX, value, _) => {
                    self.stick_x = apply_deadzone(value, self.settings.deadzone);
                }
                EventType::AxisChanged(Axis::LeftStickY, value, _) => {
                    self.stick_y = apply_deadzone(value, self.settings.deadzone);
                }
                EventType::ButtonPressed(Button::Select, _) => {
                    info!("Role switch requested from gamepad");
                    self.emit(JoystickEvent::SwitchRequested)?;
                }
                EventType::Disconnected => {
                    warn!("Gamepad {} disconnected", id);
                    self.active_gamepad = None;
                    self.stick_x = 0.0;
                    self.stick_y = 0.0;
                }
                other => debug!("Ignoring gamepad event: {:?}", other),
            }
        }

        let command = stick_command(self.stick_x, self.stick_y);
        if command != self.last_command {
            debug!("Stick direction changed: {} -> {}", self.last_command, command);
            self.last_command = command;
            self.emit(JoystickEvent::Direction(CommandFrame::new(
                command,
                SpeedLevel::Max,
            )))?;
        }
        Ok(())
    }

    fn emit(&self, event: JoystickEvent) -> Result<(), JoystickError> {
        self.events
            .try_send(event)
            .map_err(|e| JoystickError::EventSendError(e.to_string()))
    }

    pub fn run_until_cancelled(&mut self, cancel: &CancellationToken) {
        info!("Starting gamepad collection loop");
        let poll_interval = Duration::from_millis(self.settings.poll_interval_ms.max(1));

        while !cancel.is_cancelled() {
            if let Err(e) = self.collect_pending() {
                error!("Error collecting gamepad events: {}", e);
            }
            std::thread::sleep(poll_interval);
        }
        info!("Gamepad collection loop stopped");
    }
}

/// Joystick collaborator backed by a gilrs poll thread
pub struct GamepadJoystick {
    settings: JoystickSettings,
    events: mpsc::Sender<JoystickEvent>,
    started: AtomicBool,
    cancel: CancellationToken,
}

impl GamepadJoystick {
    pub fn new(settings: JoystickSettings, events: mpsc::Sender<JoystickEvent>) -> Self {
        Self {
            settings,
            events,
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }
}

impl JoystickInput for GamepadJoystick {
    fn init(&self) -> Result<(), JoystickError> {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Gamepad polling already running");
            return Ok(());
        }

        let settings = self.settings.clone();
        let events = self.events.clone();
        let cancel = self.cancel.clone();

        // gilrs stays on its own thread for its whole lifetime
        std::thread::Builder::new()
            .name("gamepad".to_string())
            .spawn(move || match GamepadCollector::create(settings, events) {
                Ok(collector) => collector.initialize().run_until_cancelled(&cancel),
                Err(e) => error!("Gamepad input unavailable: {}", e),
            })
            .map_err(|e| {
                self.started.store(false, Ordering::SeqCst);
                JoystickError::InitializationError(e.to_string())
            })?;

        Ok(())
    }
}

impl Drop for GamepadJoystick {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Stick up is forward, stick left is left
pub fn stick_command(stick_x: f32, stick_y: f32) -> DirectionCommand {
    classify(f64::from(stick_y), -f64::from(stick_x))
}

fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if value.abs() < deadzone {
        0.0
    } else {
        // Rescale to the range outside the deadzone
        value.signum() * (value.abs() - deadzone) / (1.0 - deadzone)
    }
}
