use std::sync::Mutex;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{CommandFrame, NetworkChannel, NetworkError};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Broker port on the controller host
    pub port: u16,
    /// Prefix for the MQTT client id, the role is appended
    pub client_id: String,
    pub command_topic: String,
    pub keep_alive_secs: u64,
    /// Broker used by the controller itself (its own host name is empty)
    pub local_broker: String,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            port: 1883,
            client_id: "robotkit".to_string(),
            command_topic: "robotkit/command".to_string(),
            keep_alive_secs: 5,
            local_broker: "localhost".to_string(),
        }
    }
}

struct Link {
    client: AsyncClient,
    cancel: CancellationToken,
    broker: String,
}

/// MQTT implementation of the command link.
///
/// The host name is the controller's address. The robot connects to the broker
/// there and subscribes to the command topic; the controller (empty host name)
/// publishes through the broker it hosts locally.
pub struct MqttChannel {
    settings: NetworkSettings,
    link: Mutex<Option<Link>>,
    incoming_tx: broadcast::Sender<CommandFrame>,
}

impl MqttChannel {
    pub fn new(settings: NetworkSettings) -> Self {
        let (incoming_tx, _) = broadcast::channel(64);
        Self {
            settings,
            link: Mutex::new(None),
            incoming_tx,
        }
    }

    fn broker_for(&self, host_name: &str) -> String {
        if host_name.is_empty() {
            self.settings.local_broker.clone()
        } else {
            host_name.to_string()
        }
    }
}

impl NetworkChannel for MqttChannel {
    fn init(&self, host_name: &str) -> Result<(), NetworkError> {
        let robot = !host_name.is_empty();
        let broker = self.broker_for(host_name);
        let client_id = format!(
            "{}-{}",
            self.settings.client_id,
            if robot { "robot" } else { "controller" }
        );
        info!(
            "Initializing network link to {}:{} as {}",
            broker, self.settings.port, client_id
        );

        let mut options = MqttOptions::new(client_id, broker.clone(), self.settings.port);
        options.set_keep_alive(Duration::from_secs(self.settings.keep_alive_secs));

        let (client, eventloop) = AsyncClient::new(options, 100);
        let cancel = CancellationToken::new();

        let resubscribe = robot.then(|| (client.clone(), self.settings.command_topic.clone()));
        tokio::spawn(run_event_loop(
            eventloop,
            cancel.clone(),
            self.incoming_tx.clone(),
            resubscribe,
            broker.clone(),
        ));

        let previous = self
            .link
            .lock()
            .map_err(|e| NetworkError::InitializationError(e.to_string()))?
            .replace(Link {
                client,
                cancel,
                broker,
            });

        if let Some(previous) = previous {
            debug!("Replacing previous link to {}", previous.broker);
            previous.cancel.cancel();
            if let Err(e) = previous.client.try_disconnect() {
                debug!("Previous link already closed: {}", e);
            }
        }

        Ok(())
    }

    fn send_command(&self, frame: CommandFrame) {
        let guard = match self.link.lock() {
            Ok(guard) => guard,
            Err(e) => {
                error!("Network link state unavailable: {}", e);
                return;
            }
        };

        let Some(link) = guard.as_ref() else {
            warn!("Dropping {}: network link not initialized", frame);
            return;
        };

        match link.client.try_publish(
            self.settings.command_topic.clone(),
            QoS::AtMostOnce,
            false,
            frame.to_string(),
        ) {
            Ok(_) => debug!("Sent {} to {}", frame, link.broker),
            Err(e) => warn!("Failed to send {}: {}", frame, e),
        }
    }

    fn incoming(&self) -> broadcast::Receiver<CommandFrame> {
        self.incoming_tx.subscribe()
    }
}

impl Drop for MqttChannel {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.link.lock() {
            if let Some(link) = guard.take() {
                link.cancel.cancel();
            }
        }
    }
}

// Polls the rumqttc event loop until cancelled; reconnects are handled by
// polling again after a short delay.
async fn run_event_loop(
    mut eventloop: EventLoop,
    cancel: CancellationToken,
    incoming: broadcast::Sender<CommandFrame>,
    resubscribe: Option<(AsyncClient, String)>,
    broker: String,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Event loop for {} cancelled", broker);
                break;
            }

            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("Connected to broker {}", broker);
                    if let Some((client, topic)) = &resubscribe {
                        if let Err(e) = client.try_subscribe(topic.clone(), QoS::AtMostOnce) {
                            warn!("Failed to subscribe to {}: {}", topic, e);
                        }
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    match decode_frame(&publish.payload) {
                        Ok(frame) => {
                            debug!("Received {} on {}", frame, publish.topic);
                            // No receivers simply means nobody drives motors right now
                            let _ = incoming.send(frame);
                        }
                        Err(e) => warn!("Ignoring message on {}: {}", publish.topic, e),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Connection to {} failed: {}", broker, e);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                    }
                }
            }
        }
    }
}

fn decode_frame(payload: &[u8]) -> Result<CommandFrame, NetworkError> {
    let text =
        std::str::from_utf8(payload).map_err(|e| NetworkError::MalformedFrame(e.to_string()))?;
    text.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::DirectionCommand;

    #[test]
    fn decodes_utf8_payloads() {
        let frame = decode_frame(b"BackRight:100").unwrap();
        assert_eq!(frame.command, DirectionCommand::BackRight);
        assert_eq!(frame.speed, 100);
        assert!(decode_frame(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn controller_uses_local_broker() {
        let channel = MqttChannel::new(NetworkSettings::default());
        assert_eq!(channel.broker_for(""), "localhost");
        assert_eq!(channel.broker_for("169.254.250.82"), "169.254.250.82");
    }

    #[tokio::test]
    async fn send_before_init_is_dropped() {
        let channel = MqttChannel::new(NetworkSettings::default());
        channel.send_command(CommandFrame::stop());
        assert!(channel.link.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn reinit_replaces_link() {
        let channel = MqttChannel::new(NetworkSettings::default());
        channel.init("").unwrap();
        let first = channel.link.lock().unwrap().as_ref().unwrap().cancel.clone();

        channel.init("10.0.0.7").unwrap();
        assert!(first.is_cancelled());
        assert_eq!(
            channel.link.lock().unwrap().as_ref().unwrap().broker,
            "10.0.0.7"
        );
    }
}
