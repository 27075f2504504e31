//! Actuation transports
//!
//! One [`Transport`] trait with a backend per configured endpoint kind.

mod http;
mod mqtt;
mod simulated;

pub use http::HttpTransport;
pub use mqtt::MqttTransport;
pub use simulated::{PublishedMessage, SimulatedTransport};

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Transport failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("connect failed: {0}")]
    Connect(String),
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Transport(e.to_string())
    }
}

/// Publish/subscribe capability used by the actuator
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn publish(&self, topic: &str, payload: &[u8]) -> std::result::Result<(), TransportError>;

    /// Re-establish the connection before a retry
    async fn reconnect(&self) -> std::result::Result<(), TransportError> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }
}

/// Transport endpoint configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    #[default]
    Simulated,
    Mqtt {
        host: String,
        #[serde(default = "default_mqtt_port")]
        port: u16,
        #[serde(default = "default_client_id")]
        client_id: String,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
        #[serde(default = "default_keep_alive_secs")]
        keep_alive_secs: u64,
    },
    Http {
        url: String,
        #[serde(default = "default_http_timeout_ms")]
        timeout_ms: u64,
    },
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    format!("occupancy-lighting-{}", &uuid::Uuid::new_v4().simple().to_string()[..8])
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_http_timeout_ms() -> u64 {
    5000
}

impl TransportConfig {
    pub fn validate(&self) -> Result<()> {
        match self {
            TransportConfig::Simulated => Ok(()),
            TransportConfig::Mqtt {
                host,
                port,
                client_id,
                username,
                password,
                ..
            } => {
                if host.trim().is_empty() {
                    return Err(Error::Config("transport.host is required for mqtt".to_string()));
                }
                if *port == 0 {
                    return Err(Error::Config("transport.port must not be 0".to_string()));
                }
                if client_id.trim().is_empty() {
                    return Err(Error::Config(
                        "transport.client_id must not be empty".to_string(),
                    ));
                }
                if username.is_some() != password.is_some() {
                    return Err(Error::Config(
                        "transport.username and transport.password must be set together"
                            .to_string(),
                    ));
                }
                Ok(())
            }
            TransportConfig::Http { url, .. } => {
                let lower = url.to_ascii_lowercase();
                if lower.starts_with("http://") || lower.starts_with("https://") {
                    Ok(())
                } else {
                    Err(Error::Config(format!(
                        "transport.url must be an http(s) URL, got {:?}",
                        url
                    )))
                }
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TransportConfig::Simulated => "simulated",
            TransportConfig::Mqtt { .. } => "mqtt",
            TransportConfig::Http { .. } => "http",
        }
    }
}

/// Build the configured transport
///
/// MQTT spawns its event loop, so this must run inside a tokio runtime.
pub fn build_transport(config: &TransportConfig) -> Result<Arc<dyn Transport>> {
    config.validate()?;
    let transport: Arc<dyn Transport> = match config {
        TransportConfig::Simulated => Arc::new(SimulatedTransport::new()),
        TransportConfig::Mqtt {
            host,
            port,
            client_id,
            username,
            password,
            keep_alive_secs,
        } => {
            let credentials = username.clone().zip(password.clone());
            Arc::new(MqttTransport::connect(
                client_id,
                host,
                *port,
                credentials,
                Duration::from_secs(*keep_alive_secs),
            ))
        }
        TransportConfig::Http { url, timeout_ms } => {
            Arc::new(HttpTransport::new(url, Duration::from_millis(*timeout_ms))?)
        }
    };

    tracing::info!(transport = transport.name(), "Actuation transport ready");
    Ok(transport)
}
