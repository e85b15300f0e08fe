//! Wearable bridged over MQTT
//!
//! A companion bridge paired with the wearable publishes raw accelerometer
//! readings as `"x,y,z"` text on the reading topic of the controller's local
//! broker. The hub advertises the chosen reporting interval back to the bridge
//! on `<topic>/interval` (retained). Consent is handled on the bridge, so it is
//! always reported as granted here.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    AccelerometerReading, DeviceInfo, SensorClient, SensorError, SensorHub, UserConsent,
};

const READING_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorSettings {
    /// Name reported for the bridged device
    pub device_name: String,
    pub broker: String,
    pub port: u16,
    pub reading_topic: String,
    /// Reporting intervals the bridge supports, fastest first
    pub supported_intervals_ms: Vec<u64>,
    /// Pause before polling the broker again after a connection error
    pub reconnect_delay_ms: u64,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            device_name: "Wearable bridge".to_string(),
            broker: "localhost".to_string(),
            port: 1883,
            reading_topic: "robotkit/accelerometer".to_string(),
            supported_intervals_ms: vec![16, 32, 128],
            reconnect_delay_ms: 1000,
        }
    }
}

pub struct MqttSensorHub {
    settings: SensorSettings,
}

impl MqttSensorHub {
    pub fn new(settings: SensorSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl SensorHub for MqttSensorHub {
    async fn list_paired(&self) -> Result<Vec<DeviceInfo>, SensorError> {
        if self.settings.reading_topic.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![DeviceInfo {
            id: self.settings.reading_topic.clone(),
            name: self.settings.device_name.clone(),
        }])
    }

    async fn connect(&self, device: &DeviceInfo) -> Result<Box<dyn SensorClient>, SensorError> {
        info!(
            "Connecting to {} via {}:{}",
            device.name, self.settings.broker, self.settings.port
        );
        Ok(Box::new(MqttSensorClient {
            settings: self.settings.clone(),
            topic: device.id.clone(),
            link: None,
        }))
    }
}

struct BridgeLink {
    client: AsyncClient,
    cancel: CancellationToken,
}

struct MqttSensorClient {
    settings: SensorSettings,
    topic: String,
    link: Option<BridgeLink>,
}

#[async_trait]
impl SensorClient for MqttSensorClient {
    fn consent(&self) -> UserConsent {
        UserConsent::Granted
    }

    async fn request_consent(&mut self) -> Result<UserConsent, SensorError> {
        Ok(UserConsent::Granted)
    }

    fn supported_intervals(&self) -> Vec<Duration> {
        self.settings
            .supported_intervals_ms
            .iter()
            .copied()
            .map(Duration::from_millis)
            .collect()
    }

    async fn subscribe_accelerometer(
        &mut self,
        interval: Duration,
    ) -> Result<mpsc::Receiver<AccelerometerReading>, SensorError> {
        if self.link.is_some() {
            return Err(SensorError::SubscriptionError(
                "already subscribed".to_string(),
            ));
        }

        let mut options = MqttOptions::new(
            "robotkit-sensor",
            self.settings.broker.clone(),
            self.settings.port,
        );
        options.set_keep_alive(Duration::from_secs(5));
        let (client, eventloop) = AsyncClient::new(options, 100);

        client
            .publish(
                format!("{}/interval", self.topic),
                QoS::AtLeastOnce,
                true,
                interval.as_millis().to_string(),
            )
            .await
            .map_err(|e| SensorError::SubscriptionError(e.to_string()))?;

        let (reading_tx, reading_rx) = mpsc::channel(READING_QUEUE_CAPACITY);
        let cancel = CancellationToken::new();
        tokio::spawn(forward_readings(
            eventloop,
            client.clone(),
            self.topic.clone(),
            reading_tx,
            Duration::from_millis(self.settings.reconnect_delay_ms),
            cancel.clone(),
        ));

        self.link = Some(BridgeLink { client, cancel });
        Ok(reading_rx)
    }

    async fn unsubscribe(&mut self) -> Result<(), SensorError> {
        let Some(link) = self.link.take() else {
            return Ok(());
        };
        link.cancel.cancel();
        if let Err(e) = link.client.try_unsubscribe(self.topic.clone()) {
            debug!("Bridge link already closed: {}", e);
        }
        Ok(())
    }
}

/// Forwards readings until cancelled or the receiver goes away. Connection
/// errors are retried; the subscription is renewed on every ConnAck.
async fn forward_readings(
    mut eventloop: EventLoop,
    client: AsyncClient,
    topic: String,
    readings: mpsc::Sender<AccelerometerReading>,
    reconnect_delay: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("Sensor bridge connected, subscribing to {}", topic);
                    if let Err(e) = client.try_subscribe(topic.clone(), QoS::AtMostOnce) {
                        warn!("Failed to subscribe to {}: {}", topic, e);
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) if publish.topic == topic => {
                    let parsed = std::str::from_utf8(&publish.payload)
                        .map_err(|e| SensorError::MalformedReading(e.to_string()))
                        .and_then(parse_reading);
                    match parsed {
                        Ok(reading) => match readings.try_send(reading) {
                            Ok(_) => {}
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                debug!("Reading queue full, dropping reading");
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => {
                                debug!("Reading receiver gone");
                                break;
                            }
                        },
                        Err(e) => warn!("{}", e),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        "Sensor bridge connection failed, retrying in {:?}: {}",
                        reconnect_delay, e
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(reconnect_delay) => {}
                    }
                }
            }
        }
    }
    debug!("Sensor bridge forwarding stopped");
}

/// Parses `"x,y,z"` into a reading timestamped now
pub fn parse_reading(text: &str) -> Result<AccelerometerReading, SensorError> {
    let values = text
        .trim()
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| SensorError::MalformedReading(format!("{:?}: {}", text, e)))?;

    match values.as_slice() {
        [x, y, z] => Ok(AccelerometerReading::new(*x, *y, *z)),
        _ => Err(SensorError::MalformedReading(format!(
            "expected 3 values, got {:?}",
            text
        ))),
    }
}
