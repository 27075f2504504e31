//! LightActuator - Safety Envelope and Publication
//!
//! ## Responsibilities
//!
//! - Enforce the minimum transition duration on every command
//! - Enforce the inter-command cooldown (latest deferred value wins)
//! - Publish through the configured transport
//! - Reconnect with exponential backoff, keeping only the latest desired
//!   brightness, and publish it once on recovery
//!
//! All timing decisions take an explicit `now`; the worker task in
//! [`worker`] feeds it from a [`crate::clock::Clock`].

mod command;
pub mod transport;
mod worker;

pub use command::{channel_level, ChannelLayout, LightCommand, LightPayload};
pub use transport::{build_transport, Transport, TransportConfig, TransportError};
pub use worker::{spawn_actuator, ActuationIntent, ActuatorHandle, IntentSource};

use crate::backoff::Backoff;
use crate::error::{Error, Result};
use crate::smoother::FULL_BRIGHTNESS;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// No published transition is ever shorter than this
pub const MIN_SAFE_DURATION_MS: u64 = 250;

/// Actuator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    pub topic: String,
    pub cooldown_ms: u64,
    /// Raised to the safety floor if set lower
    pub min_duration_ms: u64,
    pub channel_layout: ChannelLayout,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Send an off command when the pipeline stops
    pub turn_off_on_stop: bool,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            topic: "lights/occupancy/set".to_string(),
            cooldown_ms: 1000,
            min_duration_ms: MIN_SAFE_DURATION_MS,
            channel_layout: ChannelLayout::White,
            backoff_base_ms: 1000,
            backoff_max_ms: 30_000,
            turn_off_on_stop: true,
        }
    }
}

impl ActuatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.topic.trim().is_empty() {
            return Err(Error::Config("actuator.topic must not be empty".to_string()));
        }
        if self.backoff_base_ms == 0 {
            return Err(Error::Config(
                "actuator.backoff_base_ms must be positive".to_string(),
            ));
        }
        if self.backoff_max_ms < self.backoff_base_ms {
            return Err(Error::Config(format!(
                "actuator.backoff_max_ms ({}) is below backoff_base_ms ({})",
                self.backoff_max_ms, self.backoff_base_ms
            )));
        }
        Ok(())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn duration_floor_ms(&self) -> u64 {
        self.min_duration_ms.max(MIN_SAFE_DURATION_MS)
    }

    fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_max_ms),
        )
    }
}

/// Result of handing a brightness to the actuator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// Sent to the transport
    Published,
    /// Held until the cooldown expires or the transport recovers
    Deferred,
    /// Already the published brightness
    Unchanged,
    /// Transport rejected it; retry scheduled
    Failed,
}

/// Actuator status for the Control API
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActuatorStatus {
    pub transport: String,
    pub connected: bool,
    pub last_published_brightness: Option<u8>,
    pub last_published_at: Option<DateTime<Utc>>,
    pub pending_brightness: Option<u8>,
    pub publish_count: u64,
    pub failed_publishes: u64,
    pub consecutive_failures: u32,
    pub next_retry_in_ms: Option<u64>,
    pub last_error: Option<String>,
    /// Sequence of the last intent the worker handled
    pub last_intent_seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Desired {
    brightness: u8,
    duration_ms: u64,
}

#[derive(Debug, Clone, Copy)]
struct LastPublished {
    brightness: u8,
    at: Instant,
    wall_time: DateTime<Utc>,
}

/// LightActuator instance
pub struct LightActuator {
    transport: Arc<dyn Transport>,
    config: ActuatorConfig,
    last_published: Option<LastPublished>,
    pending: Option<Desired>,
    /// Set while reconnecting
    retry_at: Option<Instant>,
    backoff: Backoff,
    publish_count: u64,
    failed_publishes: u64,
    consecutive_failures: u32,
    last_error: Option<String>,
}

impl LightActuator {
    /// Create new LightActuator
    pub fn new(transport: Arc<dyn Transport>, config: ActuatorConfig) -> Self {
        let backoff = config.backoff();
        Self {
            transport,
            config,
            last_published: None,
            pending: None,
            retry_at: None,
            backoff,
            publish_count: 0,
            failed_publishes: 0,
            consecutive_failures: 0,
            last_error: None,
        }
    }

    pub fn config(&self) -> &ActuatorConfig {
        &self.config
    }

    /// Request `brightness` with a fade of `fade_ms`
    pub async fn apply(&mut self, brightness: u8, fade_ms: u64, now: Instant) -> ApplyOutcome {
        let desired = Desired {
            brightness: brightness.min(FULL_BRIGHTNESS),
            duration_ms: fade_ms.max(self.config.duration_floor_ms()),
        };

        if let Some(retry_at) = self.retry_at {
            self.pending = Some(desired);
            if now < retry_at {
                tracing::debug!(
                    brightness = desired.brightness,
                    "Transport reconnecting, command held"
                );
                return ApplyOutcome::Deferred;
            }
            return self.retry(now).await;
        }

        let Some(last) = self.last_published else {
            return self.publish(desired, now).await;
        };

        if last.brightness == desired.brightness {
            self.pending = None;
            return ApplyOutcome::Unchanged;
        }

        if now < last.at + self.config.cooldown() {
            tracing::debug!(
                brightness = desired.brightness,
                "Within cooldown, command deferred"
            );
            self.pending = Some(desired);
            return ApplyOutcome::Deferred;
        }

        self.publish(desired, now).await
    }

    /// Publish whatever is due at `now`
    ///
    /// Returns `None` when nothing was attempted.
    pub async fn flush(&mut self, now: Instant) -> Option<ApplyOutcome> {
        let desired = self.pending?;

        if let Some(retry_at) = self.retry_at {
            if now < retry_at {
                return None;
            }
            return Some(self.retry(now).await);
        }

        if let Some(last) = self.last_published {
            if last.brightness == desired.brightness {
                self.pending = None;
                return None;
            }
            if now < last.at + self.config.cooldown() {
                return None;
            }
        }

        Some(self.publish(desired, now).await)
    }

    /// When `flush` next has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending?;
        if let Some(retry_at) = self.retry_at {
            return Some(retry_at);
        }
        self.last_published
            .map(|last| last.at + self.config.cooldown())
    }

    pub fn is_reconnecting(&self) -> bool {
        self.retry_at.is_some()
    }

    pub fn status(&self, now: Instant) -> ActuatorStatus {
        ActuatorStatus {
            transport: self.transport.name().to_string(),
            connected: self.retry_at.is_none() && self.transport.is_connected(),
            last_published_brightness: self.last_published.map(|l| l.brightness),
            last_published_at: self.last_published.map(|l| l.wall_time),
            pending_brightness: self.pending.map(|p| p.brightness),
            publish_count: self.publish_count,
            failed_publishes: self.failed_publishes,
            consecutive_failures: self.consecutive_failures,
            next_retry_in_ms: self
                .retry_at
                .map(|at| at.saturating_duration_since(now).as_millis() as u64),
            last_error: self.last_error.clone(),
            last_intent_seq: 0,
        }
    }

    async fn retry(&mut self, now: Instant) -> ApplyOutcome {
        let Some(desired) = self.pending else {
            self.retry_at = None;
            return ApplyOutcome::Unchanged;
        };

        if let Err(e) = self.transport.reconnect().await {
            self.record_failure(desired, &e, now);
            return ApplyOutcome::Failed;
        }
        self.publish(desired, now).await
    }

    async fn publish(&mut self, desired: Desired, now: Instant) -> ApplyOutcome {
        let command = LightCommand::new(
            desired.brightness,
            desired.duration_ms,
            self.config.channel_layout,
        );
        let payload = match command.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode light command");
                self.last_error = Some(e.to_string());
                return ApplyOutcome::Failed;
            }
        };

        match self.transport.publish(&self.config.topic, &payload).await {
            Ok(()) => {
                if self.consecutive_failures > 0 {
                    tracing::info!(
                        transport = self.transport.name(),
                        failures = self.consecutive_failures,
                        "Transport recovered"
                    );
                }
                self.last_published = Some(LastPublished {
                    brightness: desired.brightness,
                    at: now,
                    wall_time: Utc::now(),
                });
                self.pending = None;
                self.retry_at = None;
                self.backoff.reset();
                self.consecutive_failures = 0;
                self.publish_count += 1;

                tracing::info!(
                    brightness = desired.brightness,
                    color = %command.color_value,
                    duration_ms = command.duration_ms,
                    "Light command published"
                );
                ApplyOutcome::Published
            }
            Err(e) => {
                self.record_failure(desired, &e, now);
                ApplyOutcome::Failed
            }
        }
    }

    fn record_failure(&mut self, desired: Desired, error: &TransportError, now: Instant) {
        let delay = self.backoff.next_delay();
        self.pending = Some(desired);
        self.retry_at = Some(now + delay);
        self.consecutive_failures += 1;
        self.failed_publishes += 1;
        self.last_error = Some(error.to_string());

        tracing::warn!(
            transport = self.transport.name(),
            brightness = desired.brightness,
            attempt = self.consecutive_failures,
            retry_in_ms = delay.as_millis() as u64,
            error = %error,
            "Light command failed, backing off"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::transport::SimulatedTransport;
    use super::*;
    use crate::clock::{Clock, ManualClock};

    fn actuator() -> (LightActuator, Arc<SimulatedTransport>) {
        let transport = Arc::new(SimulatedTransport::new());
        let actuator = LightActuator::new(transport.clone(), ActuatorConfig::default());
        (actuator, transport)
    }

    fn ms(start: Instant, at: u64) -> Instant {
        start + Duration::from_millis(at)
    }

    #[tokio::test]
    async fn test_duration_never_below_floor() {
        let (mut actuator, transport) = actuator();
        let start = Instant::now();

        assert_eq!(actuator.apply(60, 0, start).await, ApplyOutcome::Published);
        assert_eq!(actuator.apply(20, 100, ms(start, 5000)).await, ApplyOutcome::Published);

        for message in transport.published() {
            let payload = message.light_payload().unwrap();
            assert!(payload.duration >= MIN_SAFE_DURATION_MS);
        }
    }

    #[tokio::test]
    async fn test_cooldown_defers_latest_value() {
        let (mut actuator, transport) = actuator();
        let clock = ManualClock::new();
        let start = clock.origin();

        assert_eq!(actuator.apply(40, 500, clock.now()).await, ApplyOutcome::Published);
        clock.advance(Duration::from_millis(200));
        assert_eq!(actuator.apply(60, 500, clock.now()).await, ApplyOutcome::Deferred);
        clock.advance(Duration::from_millis(200));
        assert_eq!(actuator.apply(80, 500, clock.now()).await, ApplyOutcome::Deferred);

        assert_eq!(actuator.next_deadline(), Some(ms(start, 1000)));
        clock.advance(Duration::from_millis(500));
        assert_eq!(actuator.flush(clock.now()).await, None);
        clock.advance(Duration::from_millis(100));
        assert_eq!(actuator.flush(clock.now()).await, Some(ApplyOutcome::Published));

        let published = transport.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[1].light_payload().unwrap().all, LightCommand::new(80, 0, ChannelLayout::White).color_value);
        assert!(actuator.next_deadline().is_none());
    }

    #[tokio::test]
    async fn test_same_brightness_is_unchanged() {
        let (mut actuator, transport) = actuator();
        let start = Instant::now();

        actuator.apply(50, 500, start).await;
        assert_eq!(actuator.apply(70, 500, ms(start, 100)).await, ApplyOutcome::Deferred);
        assert_eq!(actuator.apply(50, 500, ms(start, 200)).await, ApplyOutcome::Unchanged);
        assert_eq!(actuator.flush(ms(start, 2000)).await, None);
        assert_eq!(transport.published().len(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_backoff_then_single_publish() {
        let (mut actuator, transport) = actuator();
        let start = Instant::now();
        transport.fail_next(3);

        assert_eq!(actuator.apply(70, 500, start).await, ApplyOutcome::Failed);
        let mut delays = Vec::new();
        let mut now = start;
        while let Some(deadline) = actuator.next_deadline() {
            delays.push(deadline - now);
            now = deadline;
            // New targets while reconnecting only replace the pending value
            actuator.apply(90, 500, now - Duration::from_millis(1)).await;
            actuator.flush(now).await;
        }

        assert_eq!(
            delays,
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000)
            ]
        );
        assert!(delays.windows(2).all(|w| w[1] >= w[0]));

        let published = transport.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].light_payload().unwrap().all, "000000e6");
        assert_eq!(transport.attempts(), 4);
        assert!(!actuator.is_reconnecting());
        assert_eq!(actuator.status(now).consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_backoff_is_capped() {
        let transport = Arc::new(SimulatedTransport::new());
        let config = ActuatorConfig {
            backoff_base_ms: 1000,
            backoff_max_ms: 4000,
            ..Default::default()
        };
        let mut actuator = LightActuator::new(transport.clone(), config);
        let start = Instant::now();
        transport.fail_next(6);

        actuator.apply(30, 500, start).await;
        let mut now = start;
        let mut delays = Vec::new();
        for _ in 0..6 {
            let deadline = actuator.next_deadline().unwrap();
            delays.push((deadline - now).as_millis() as u64);
            now = deadline;
            actuator.flush(now).await;
        }

        assert_eq!(delays, vec![1000, 2000, 4000, 4000, 4000, 4000]);
        assert_eq!(transport.published().len(), 1);
    }

    #[tokio::test]
    async fn test_status_reflects_failures() {
        let (mut actuator, transport) = actuator();
        let start = Instant::now();
        transport.fail_next(1);

        actuator.apply(40, 500, start).await;
        let status = actuator.status(ms(start, 250));
        assert!(!status.connected);
        assert_eq!(status.pending_brightness, Some(40));
        assert_eq!(status.consecutive_failures, 1);
        assert_eq!(status.next_retry_in_ms, Some(750));
        assert!(status.last_error.is_some());
    }

    #[test]
    fn test_config_validate() {
        assert!(ActuatorConfig::default().validate().is_ok());
        let bad = ActuatorConfig {
            backoff_base_ms: 5000,
            backoff_max_ms: 1000,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = ActuatorConfig {
            topic: " ".to_string(),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
