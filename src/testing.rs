//! Recording collaborators shared by the unit tests

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, Notify};

use crate::joystick::{JoystickError, JoystickInput};
use crate::motor::{MotorDriver, MotorError};
use crate::network::{CommandFrame, NetworkChannel, NetworkError};
use crate::persistence::{Persistence, PersistenceError};
use crate::sampling::AxisSample;
use crate::sensor::{
    AccelerometerReading, DeviceInfo, SensorClient, SensorError, SensorHub, UserConsent,
};
use crate::ui::StatusDisplay;

/// Polls `condition` until it holds, panicking after about two seconds
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

pub struct RecordingNetwork {
    sent: Mutex<Vec<CommandFrame>>,
    inits: Mutex<Vec<String>>,
    incoming: broadcast::Sender<CommandFrame>,
}

impl RecordingNetwork {
    pub fn new() -> Arc<Self> {
        let (incoming, _) = broadcast::channel(16);
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            inits: Mutex::new(Vec::new()),
            incoming,
        })
    }

    pub fn sent(&self) -> Vec<CommandFrame> {
        self.sent.lock().unwrap().clone()
    }

    pub fn inits(&self) -> Vec<String> {
        self.inits.lock().unwrap().clone()
    }

    /// Delivers a frame as if it arrived over the link
    pub fn inject(&self, frame: CommandFrame) {
        let _ = self.incoming.send(frame);
    }
}

impl NetworkChannel for RecordingNetwork {
    fn init(&self, host_name: &str) -> Result<(), NetworkError> {
        self.inits.lock().unwrap().push(host_name.to_string());
        Ok(())
    }

    fn send_command(&self, frame: CommandFrame) {
        self.sent.lock().unwrap().push(frame);
    }

    fn incoming(&self) -> broadcast::Receiver<CommandFrame> {
        self.incoming.subscribe()
    }
}

#[derive(Default)]
pub struct RecordingMotors {
    inits: AtomicUsize,
    stops: AtomicUsize,
    driven: Mutex<Vec<CommandFrame>>,
}

impl RecordingMotors {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn init_count(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn driven(&self) -> Vec<CommandFrame> {
        self.driven.lock().unwrap().clone()
    }
}

impl MotorDriver for RecordingMotors {
    fn init(&self) -> Result<(), MotorError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn drive(&self, frame: CommandFrame) -> Result<(), MotorError> {
        self.driven.lock().unwrap().push(frame);
        Ok(())
    }

    fn stop(&self) -> Result<(), MotorError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingJoystick {
    inits: AtomicUsize,
}

impl RecordingJoystick {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn init_count(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }
}

impl JoystickInput for RecordingJoystick {
    fn init(&self) -> Result<(), JoystickError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct DisplayLog {
    pub states: Vec<String>,
    pub labels: Vec<String>,
    pub axes: Vec<AxisSample>,
}

#[derive(Default)]
pub struct RecordingDisplay {
    log: Arc<Mutex<DisplayLog>>,
}

impl RecordingDisplay {
    pub fn log(&self) -> Arc<Mutex<DisplayLog>> {
        Arc::clone(&self.log)
    }
}

impl StatusDisplay for RecordingDisplay {
    fn set_state(&mut self, text: &str) {
        self.log.lock().unwrap().states.push(text.to_string());
    }

    fn set_connection_label(&mut self, text: &str) {
        self.log.lock().unwrap().labels.push(text.to_string());
    }

    fn set_axis_values(&mut self, x: f64, y: f64, z: f64) {
        self.log.lock().unwrap().axes.push(AxisSample::new(x, y, z));
    }
}

#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with(key: &str, value: &str) -> Arc<Self> {
        let store = Self::default();
        store
            .values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Arc::new(store)
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn read(&self, key: &str) -> Result<String, PersistenceError> {
        self.value(key)
            .ok_or_else(|| PersistenceError::NotFound(key.to_string()))
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Backend whose every operation fails with an I/O error
pub struct FailingStore;

#[async_trait]
impl Persistence for FailingStore {
    async fn read(&self, key: &str) -> Result<String, PersistenceError> {
        Err(PersistenceError::Io {
            key: key.to_string(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "read denied"),
        })
    }

    async fn write(&self, key: &str, _value: &str) -> Result<(), PersistenceError> {
        Err(PersistenceError::Io {
            key: key.to_string(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "write denied"),
        })
    }
}

#[derive(Default)]
struct HubLog {
    list_calls: usize,
    consent_requests: usize,
    subscribe_started: bool,
    interval: Option<Duration>,
    readings: Option<mpsc::Sender<AccelerometerReading>>,
    unsubscribed: bool,
}

/// Wearable hub with one device (`band-0`) and 16/32/128 ms intervals
pub struct ScriptedSensorHub {
    has_device: bool,
    consent: UserConsent,
    decline_request: Arc<AtomicBool>,
    subscribe_gate: Option<Arc<Notify>>,
    log: Arc<Mutex<HubLog>>,
}

impl ScriptedSensorHub {
    fn build(has_device: bool, consent: UserConsent, subscribe_gate: Option<Arc<Notify>>) -> Arc<Self> {
        Arc::new(Self {
            has_device,
            consent,
            decline_request: Arc::new(AtomicBool::new(false)),
            subscribe_gate,
            log: Arc::new(Mutex::new(HubLog::default())),
        })
    }

    pub fn new(consent: UserConsent) -> Arc<Self> {
        Self::build(true, consent, None)
    }

    pub fn without_devices() -> Arc<Self> {
        Self::build(false, UserConsent::Granted, None)
    }

    /// Subscriptions hang until [`ScriptedSensorHub::release_subscribe`]
    pub fn stalling_subscribe() -> Arc<Self> {
        Self::build(true, UserConsent::Granted, Some(Arc::new(Notify::new())))
    }

    pub fn release_subscribe(&self) {
        if let Some(gate) = &self.subscribe_gate {
            gate.notify_one();
        }
    }

    pub fn subscribe_started(&self) -> bool {
        self.log.lock().unwrap().subscribe_started
    }

    /// Makes the consent prompt come back declined
    pub fn declining_request(self: Arc<Self>) -> Arc<Self> {
        self.decline_request.store(true, Ordering::SeqCst);
        self
    }

    pub fn list_calls(&self) -> usize {
        self.log.lock().unwrap().list_calls
    }

    pub fn consent_requests(&self) -> usize {
        self.log.lock().unwrap().consent_requests
    }

    pub fn subscribed_interval(&self) -> Option<Duration> {
        self.log.lock().unwrap().interval
    }

    pub fn unsubscribed(&self) -> bool {
        self.log.lock().unwrap().unsubscribed
    }

    /// Emits one raw reading on the active subscription
    pub async fn push(&self, x: f64, y: f64, z: f64) {
        let sender = self
            .log
            .lock()
            .unwrap()
            .readings
            .clone()
            .expect("accelerometer not subscribed");
        sender
            .send(AccelerometerReading::new(x, y, z))
            .await
            .expect("reading stream closed");
    }
}

#[async_trait]
impl SensorHub for ScriptedSensorHub {
    async fn list_paired(&self) -> Result<Vec<DeviceInfo>, SensorError> {
        self.log.lock().unwrap().list_calls += 1;
        if !self.has_device {
            return Ok(Vec::new());
        }
        Ok(vec![DeviceInfo {
            id: "band-0".to_string(),
            name: "Scripted band".to_string(),
        }])
    }

    async fn connect(&self, _device: &DeviceInfo) -> Result<Box<dyn SensorClient>, SensorError> {
        Ok(Box::new(ScriptedClient {
            consent: self.consent,
            decline_request: Arc::clone(&self.decline_request),
            subscribe_gate: self.subscribe_gate.clone(),
            log: Arc::clone(&self.log),
        }))
    }
}

struct ScriptedClient {
    consent: UserConsent,
    decline_request: Arc<AtomicBool>,
    subscribe_gate: Option<Arc<Notify>>,
    log: Arc<Mutex<HubLog>>,
}

#[async_trait]
impl SensorClient for ScriptedClient {
    fn consent(&self) -> UserConsent {
        self.consent
    }

    async fn request_consent(&mut self) -> Result<UserConsent, SensorError> {
        self.log.lock().unwrap().consent_requests += 1;
        self.consent = if self.decline_request.load(Ordering::SeqCst) {
            UserConsent::Declined
        } else {
            UserConsent::Granted
        };
        Ok(self.consent)
    }

    fn supported_intervals(&self) -> Vec<Duration> {
        [16, 32, 128].map(Duration::from_millis).to_vec()
    }

    async fn subscribe_accelerometer(
        &mut self,
        interval: Duration,
    ) -> Result<mpsc::Receiver<AccelerometerReading>, SensorError> {
        if let Some(gate) = &self.subscribe_gate {
            self.log.lock().unwrap().subscribe_started = true;
            gate.notified().await;
        }

        let (tx, rx) = mpsc::channel(64);
        let mut log = self.log.lock().unwrap();
        log.interval = Some(interval);
        log.readings = Some(tx);
        log.unsubscribed = false;
        Ok(rx)
    }

    async fn unsubscribe(&mut self) -> Result<(), SensorError> {
        let mut log = self.log.lock().unwrap();
        log.readings = None;
        log.unsubscribed = true;
        Ok(())
    }
}
