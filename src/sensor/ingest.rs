//! Sensor session with statum state machine
//!
//! ```text
//! Idle ──connect──► Connected ──subscribe──► Streaming ──shutdown──► (unsubscribed)
//!                      │
//!                 ensure_consent
//! ```
//!
//! While streaming, every reading is merged into the shared axis state with
//! zero retention. The session is the only writer of that state.

use std::sync::Arc;

use chrono::{DateTime, Local};

use statum::{machine, state};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    pick_reporting_interval, AccelerometerReading, DeviceInfo, SensorClient, SensorError,
    SensorHub, UserConsent,
};
use crate::sampling::AxisState;

#[state]
#[derive(Debug, Clone)]
pub enum SensorState {
    Idle,
    Connected,
    Streaming,
}

#[machine]
pub struct SensorSession<S: SensorState> {
    hub: Arc<dyn SensorHub>,
    device: Option<DeviceInfo>,
    client: Option<Box<dyn SensorClient>>,
    axis: AxisState,
}

impl<S: SensorState> SensorSession<S> {
    pub fn device(&self) -> Option<&DeviceInfo> {
        self.device.as_ref()
    }

    fn client_mut(&mut self) -> Result<&mut Box<dyn SensorClient>, SensorError> {
        self.client
            .as_mut()
            .ok_or_else(|| SensorError::InvalidState("no sensor client".to_string()))
    }
}

impl SensorSession<Idle> {
    pub fn create(hub: Arc<dyn SensorHub>, axis: AxisState) -> Self {
        Self::new(hub, None, None, axis)
    }

    /// Connects to the first paired device
    pub async fn connect(mut self) -> Result<SensorSession<Connected>, SensorError> {
        let devices = self.hub.list_paired().await?;
        debug!("Found {} paired sensor devices", devices.len());

        let device = devices.into_iter().next().ok_or(SensorError::NoDevice)?;
        info!("Connecting to sensor {} ({})", device.name, device.id);

        let client = self.hub.connect(&device).await?;
        self.device = Some(device);
        self.client = Some(client);
        Ok(self.transition())
    }
}

impl SensorSession<Connected> {
    /// Asks for consent when the user has not decided yet
    pub async fn ensure_consent(&mut self) -> Result<(), SensorError> {
        let client = self.client_mut()?;
        let consent = match client.consent() {
            UserConsent::NotSpecified => {
                info!("Requesting user consent for accelerometer access");
                client.request_consent().await?
            }
            current => current,
        };

        match consent {
            UserConsent::Declined => Err(SensorError::ConsentDeclined),
            other => {
                debug!("Sensor consent: {:?}", other);
                Ok(())
            }
        }
    }

    /// Subscribes to accelerometer changes at the mid-range reporting interval
    pub async fn subscribe(
        mut self,
    ) -> Result<
        (
            SensorSession<Streaming>,
            mpsc::Receiver<AccelerometerReading>,
        ),
        SensorError,
    > {
        let client = self.client_mut()?;
        let interval = pick_reporting_interval(&client.supported_intervals())
            .ok_or(SensorError::NoReportingInterval)?;

        info!("Subscribing to accelerometer every {:?}", interval);
        let readings = client.subscribe_accelerometer(interval).await?;
        Ok((self.transition(), readings))
    }
}

impl SensorSession<Streaming> {
    /// Feeds readings into the axis state until cancelled or the device stream
    /// ends.
    pub async fn stream(
        self,
        mut readings: mpsc::Receiver<AccelerometerReading>,
        cancel: &CancellationToken,
    ) -> Self {
        let mut count: u64 = 0;
        let mut last_reading: Option<DateTime<Local>> = None;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(
                        "Sensor streaming cancelled after {} readings, last {}",
                        count,
                        describe_last(last_reading)
                    );
                    break;
                }

                reading = readings.recv() => match reading {
                    Some(reading) => {
                        count += 1;
                        last_reading = Some(reading.timestamp);
                        self.axis.ingest(reading.axes());
                    }
                    None => {
                        warn!(
                            "Sensor stream ended after {} readings, last {}",
                            count,
                            describe_last(last_reading)
                        );
                        break;
                    }
                }
            }
        }
        self
    }

    pub async fn shutdown(mut self) {
        match self.client_mut() {
            Ok(client) => match client.unsubscribe().await {
                Ok(_) => info!("Unsubscribed from accelerometer"),
                Err(e) => warn!("Failed to unsubscribe from accelerometer: {}", e),
            },
            Err(e) => warn!("{}", e),
        }
    }
}

fn describe_last(timestamp: Option<DateTime<Local>>) -> String {
    match timestamp {
        Some(timestamp) => format!("at {}", timestamp.format("%H:%M:%S%.3f")),
        None => "never".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::AxisSample;
    use crate::testing::ScriptedSensorHub;
    use std::time::Duration;

    #[tokio::test]
    async fn connects_to_first_device_and_subscribes_mid_interval() {
        let hub = ScriptedSensorHub::new(UserConsent::Granted);
        let session = SensorSession::create(hub.clone(), AxisState::new())
            .connect()
            .await
            .unwrap();
        assert_eq!(session.device().unwrap().id, "band-0");

        let (_session, _readings) = session.subscribe().await.unwrap();
        assert_eq!(hub.subscribed_interval(), Some(Duration::from_millis(128)));
    }

    #[tokio::test]
    async fn no_device_aborts() {
        let hub = ScriptedSensorHub::without_devices();
        let result = SensorSession::create(hub.clone(), AxisState::new())
            .connect()
            .await;
        assert!(matches!(result, Err(SensorError::NoDevice)));
    }

    #[tokio::test]
    async fn declined_consent_aborts() {
        let hub = ScriptedSensorHub::new(UserConsent::Declined);
        let mut session = SensorSession::create(hub.clone(), AxisState::new())
            .connect()
            .await
            .unwrap();
        assert!(matches!(
            session.ensure_consent().await,
            Err(SensorError::ConsentDeclined)
        ));
        assert_eq!(hub.consent_requests(), 0);
    }

    #[tokio::test]
    async fn unspecified_consent_is_requested() {
        let hub = ScriptedSensorHub::new(UserConsent::NotSpecified);
        let mut session = SensorSession::create(hub.clone(), AxisState::new())
            .connect()
            .await
            .unwrap();
        session.ensure_consent().await.unwrap();
        assert_eq!(hub.consent_requests(), 1);

        let hub = ScriptedSensorHub::new(UserConsent::NotSpecified).declining_request();
        let mut session = SensorSession::create(hub.clone(), AxisState::new())
            .connect()
            .await
            .unwrap();
        assert!(matches!(
            session.ensure_consent().await,
            Err(SensorError::ConsentDeclined)
        ));
    }

    #[tokio::test]
    async fn streams_with_zero_retention_until_cancelled() {
        let hub = ScriptedSensorHub::new(UserConsent::Granted);
        let axis = AxisState::new();
        let (session, readings) = SensorSession::create(hub.clone(), axis.clone())
            .connect()
            .await
            .unwrap()
            .subscribe()
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let streaming = tokio::spawn({
            let cancel = cancel.clone();
            async move { session.stream(readings, &cancel).await.shutdown().await }
        });

        hub.push(0.5, 0.0, 0.0).await;
        hub.push(0.0, -0.3, 0.0).await;
        crate::testing::wait_until(|| axis.snapshot() == AxisSample::new(0.5, -0.3, 0.0)).await;

        hub.push(0.7, 0.0, 0.0).await;
        crate::testing::wait_until(|| axis.snapshot().x == 0.7).await;

        cancel.cancel();
        streaming.await.unwrap();
        assert!(hub.unsubscribed());
    }

    #[test]
    fn last_reading_time_is_described() {
        assert_eq!(describe_last(None), "never");

        let reading = AccelerometerReading::new(0.0, 0.0, 1.0);
        let expected = format!("at {}", reading.timestamp.format("%H:%M:%S%.3f"));
        assert_eq!(describe_last(Some(reading.timestamp)), expected);
    }
}
