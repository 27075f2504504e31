//! Actuator task
//!
//! Owns the [`LightActuator`] and all transport I/O. Producers hand over
//! intents through a single-slot watch channel: a newer intent overwrites an
//! unconsumed one and the sender never waits.

use super::{ActuatorStatus, ApplyOutcome, LightActuator};
use crate::clock::Clock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Who asked for a brightness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentSource {
    Smoothing,
    Manual,
    Shutdown,
}

impl IntentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentSource::Smoothing => "smoothing",
            IntentSource::Manual => "manual",
            IntentSource::Shutdown => "shutdown",
        }
    }
}

/// Latest desired light state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuationIntent {
    pub brightness: u8,
    pub fade_ms: u64,
    pub source: IntentSource,
    seq: u64,
}

impl ActuationIntent {
    pub fn new(brightness: u8, fade_ms: u64, source: IntentSource) -> Self {
        Self {
            brightness,
            fade_ms,
            source,
            seq: 0,
        }
    }
}

/// Handle to the running actuator task
pub struct ActuatorHandle {
    intents: watch::Sender<Option<ActuationIntent>>,
    status: watch::Receiver<ActuatorStatus>,
    submitted: AtomicU64,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ActuatorHandle {
    /// Hand over an intent. Never blocks.
    pub fn submit(&self, intent: ActuationIntent) {
        let seq = self.submitted.fetch_add(1, Ordering::SeqCst) + 1;
        self.intents.send_replace(Some(ActuationIntent { seq, ..intent }));
    }

    pub fn status(&self) -> ActuatorStatus {
        self.status.borrow().clone()
    }

    /// Wait until every submitted intent has been handled and nothing is
    /// left pending. Returns `false` on timeout.
    pub async fn settle(&self, timeout: Duration) -> bool {
        let target = self.submitted.load(Ordering::SeqCst);
        let mut status = self.status.clone();
        let waited = tokio::time::timeout(
            timeout,
            status.wait_for(|s| s.last_intent_seq >= target && s.pending_brightness.is_none()),
        )
        .await;
        matches!(waited, Ok(Ok(_)))
    }

    /// Stop the task. Pending commands are dropped.
    pub async fn shutdown(&self) {
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
            let _ = task.await;
            tracing::info!("Actuator task stopped");
        }
    }
}

/// Spawn the actuator task
pub fn spawn_actuator(actuator: LightActuator, clock: Arc<dyn Clock>) -> ActuatorHandle {
    let (intent_tx, mut intent_rx) = watch::channel::<Option<ActuationIntent>>(None);
    let (status_tx, status_rx) = watch::channel(actuator.status(clock.now()));

    let task = tokio::spawn(async move {
        let mut actuator = actuator;
        let mut last_seq = 0;

        loop {
            let deadline = actuator.next_deadline();

            tokio::select! {
                changed = intent_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let intent = *intent_rx.borrow_and_update();
                    if let Some(intent) = intent {
                        let outcome = actuator
                            .apply(intent.brightness, intent.fade_ms, clock.now())
                            .await;
                        last_seq = intent.seq;
                        tracing::debug!(
                            brightness = intent.brightness,
                            source = intent.source.as_str(),
                            outcome = ?outcome,
                            "Intent applied"
                        );
                    }
                }
                _ = wait_until(deadline) => {
                    if let Some(outcome) = actuator.flush(clock.now()).await {
                        if outcome == ApplyOutcome::Published {
                            tracing::debug!("Deferred command flushed");
                        }
                    }
                }
            }

            let mut status = actuator.status(clock.now());
            status.last_intent_seq = last_seq;
            status_tx.send_replace(status);
        }

        tracing::debug!("Actuator intent channel closed");
    });

    ActuatorHandle {
        intents: intent_tx,
        status: status_rx,
        submitted: AtomicU64::new(0),
        task: Mutex::new(Some(task)),
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::transport::SimulatedTransport;
    use crate::actuator::ActuatorConfig;
    use crate::clock::SystemClock;

    fn spawn() -> (ActuatorHandle, Arc<SimulatedTransport>) {
        let transport = Arc::new(SimulatedTransport::new());
        let actuator = LightActuator::new(transport.clone(), ActuatorConfig::default());
        (spawn_actuator(actuator, Arc::new(SystemClock)), transport)
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_value_published_after_cooldown() {
        let (handle, transport) = spawn();

        handle.submit(ActuationIntent::new(40, 500, IntentSource::Smoothing));
        assert!(handle.settle(Duration::from_secs(5)).await);
        let first_at = transport.published()[0].at;

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.submit(ActuationIntent::new(60, 500, IntentSource::Smoothing));
        handle.submit(ActuationIntent::new(80, 500, IntentSource::Smoothing));
        assert!(handle.settle(Duration::from_secs(5)).await);

        let published = transport.published();
        assert_eq!(published.len(), 2);
        assert!(published[1].at - first_at >= Duration::from_millis(1000));
        assert_eq!(published[1].light_payload().unwrap().all, "000000cc");
        assert_eq!(handle.status().last_published_brightness, Some(80));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transport_failures() {
        let (handle, transport) = spawn();
        transport.fail_next(3);

        handle.submit(ActuationIntent::new(70, 500, IntentSource::Manual));
        assert!(handle.settle(Duration::from_secs(60)).await);

        assert_eq!(transport.attempts(), 4);
        assert_eq!(transport.published().len(), 1);
        let status = handle.status();
        assert!(status.connected);
        assert_eq!(status.failed_publishes, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_task() {
        let (handle, transport) = spawn();
        handle.shutdown().await;
        handle.submit(ActuationIntent::new(70, 500, IntentSource::Manual));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(transport.published().is_empty());
    }
}
