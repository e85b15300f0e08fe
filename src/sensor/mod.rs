//! Wearable sensor subsystem
//!
//! Acquires a paired wearable, obtains user consent and streams its
//! accelerometer into the shared [`AxisState`](crate::sampling::AxisState).
//!
//! 1. [`SensorHub`] / [`SensorClient`] - device SDK seam
//! 2. [`ingest`] - statum session machine: Idle ──► Connected ──► Streaming
//! 3. [`mqtt_bridge`] - hub implementation for a wearable bridged over MQTT
//!
//! Only active in the controller role.

pub mod ingest;
pub mod mqtt_bridge;

pub use ingest::{SensorSession, SensorState};
pub use mqtt_bridge::{MqttSensorHub, SensorSettings};

use crate::sampling::AxisSample;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserConsent {
    NotSpecified,
    Granted,
    Declined,
}

/// One raw accelerometer sample as reported by the device
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccelerometerReading {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub timestamp: DateTime<Local>,
}

impl AccelerometerReading {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            timestamp: Local::now(),
        }
    }

    pub fn axes(&self) -> AxisSample {
        AxisSample::new(self.x, self.y, self.z)
    }
}

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("No paired sensor device available")]
    NoDevice,

    #[error("User declined sensor access")]
    ConsentDeclined,

    #[error("Sensor reports no reporting intervals")]
    NoReportingInterval,

    #[error("Failed to connect to sensor: {0}")]
    ConnectionError(String),

    #[error("Failed to subscribe to sensor: {0}")]
    SubscriptionError(String),

    #[error("Malformed sensor reading: {0}")]
    MalformedReading(String),

    #[error("Sensor session in invalid state: {0}")]
    InvalidState(String),
}

/// Entry point of the wearable SDK
#[async_trait]
pub trait SensorHub: Send + Sync {
    async fn list_paired(&self) -> Result<Vec<DeviceInfo>, SensorError>;

    async fn connect(&self, device: &DeviceInfo) -> Result<Box<dyn SensorClient>, SensorError>;
}

/// Connection to one device
#[async_trait]
pub trait SensorClient: Send + Sync {
    fn consent(&self) -> UserConsent;

    async fn request_consent(&mut self) -> Result<UserConsent, SensorError>;

    /// Reporting intervals supported by the accelerometer, fastest first
    fn supported_intervals(&self) -> Vec<Duration>;

    /// Starts the change stream. The stream ends when the device goes away or
    /// after [`SensorClient::unsubscribe`].
    async fn subscribe_accelerometer(
        &mut self,
        interval: Duration,
    ) -> Result<mpsc::Receiver<AccelerometerReading>, SensorError>;

    async fn unsubscribe(&mut self) -> Result<(), SensorError>;
}

/// Picks the mid-range reporting interval: the third supported one, or the
/// slowest available when fewer are offered.
pub fn pick_reporting_interval(intervals: &[Duration]) -> Option<Duration> {
    intervals.get(2).or_else(|| intervals.last()).copied()
}
