//! MQTT transport (rumqttc)

use super::{Transport, TransportError};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Pause after an event loop error before polling again
const POLL_ERROR_PAUSE: Duration = Duration::from_secs(1);

/// MQTT publisher with a background event loop
///
/// rumqttc reconnects on the next poll after an error; `publish` fails fast
/// while the broker is unreachable.
pub struct MqttTransport {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    poller: JoinHandle<()>,
}

impl MqttTransport {
    pub fn connect(
        client_id: &str,
        host: &str,
        port: u16,
        credentials: Option<(String, String)>,
        keep_alive: Duration,
    ) -> Self {
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(keep_alive);
        if let Some((username, password)) = credentials {
            options.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(options, 16);
        let connected = Arc::new(AtomicBool::new(false));
        let flag = connected.clone();
        let broker = format!("{}:{}", host, port);

        let poller = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        flag.store(true, Ordering::SeqCst);
                        tracing::info!(broker = %broker, "MQTT connected");
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        flag.store(false, Ordering::SeqCst);
                        tracing::warn!(broker = %broker, "MQTT broker disconnected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if flag.swap(false, Ordering::SeqCst) {
                            tracing::warn!(broker = %broker, error = %e, "MQTT connection lost");
                        } else {
                            tracing::debug!(broker = %broker, error = %e, "MQTT connect attempt failed");
                        }
                        tokio::time::sleep(POLL_ERROR_PAUSE).await;
                    }
                }
            }
        });

        Self {
            client,
            connected,
            poller,
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .map_err(|e| TransportError::Publish(e.to_string()))
    }

    async fn reconnect(&self) -> Result<(), TransportError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.poller.abort();
        tracing::debug!("MQTT event loop stopped");
    }
}
