//! In-memory transport

use super::{Transport, TransportError};
use crate::actuator::LightPayload;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::time::Instant;

/// One recorded publish
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub at: Instant,
}

impl PublishedMessage {
    pub fn light_payload(&self) -> Option<LightPayload> {
        serde_json::from_slice(&self.payload).ok()
    }
}

/// Transport that records publishes instead of sending them
#[derive(Debug, Default)]
pub struct SimulatedTransport {
    published: Mutex<Vec<PublishedMessage>>,
    attempts: AtomicU64,
    fail_remaining: AtomicU32,
    disconnected: AtomicBool,
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` publishes fail
    pub fn fail_next(&self, n: u32) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    /// Successful publishes, oldest first
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn last_payload(&self) -> Option<LightPayload> {
        self.published().last().and_then(|m| m.light_payload())
    }

    /// Publish attempts, including failed ones
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
            self.disconnected.store(true, Ordering::SeqCst);
            return Err(TransportError::Publish("simulated failure".to_string()));
        }
        self.disconnected.store(false, Ordering::SeqCst);

        tracing::info!(
            topic = %topic,
            payload = %String::from_utf8_lossy(payload),
            "Simulated publish"
        );

        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(PublishedMessage {
                topic: topic.to_string(),
                payload: payload.to_vec(),
                at: Instant::now(),
            });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::SeqCst)
    }
}
