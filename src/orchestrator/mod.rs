//! PipelineOrchestrator - Detection to Actuation Loop
//!
//! ## Responsibilities
//!
//! - Own the capture loop task (read, detect, smooth, hand off)
//! - start / stop / pause / resume
//! - Camera switching through the registry, with smoother debounce reset
//! - Manual brightness override through the actuator envelope
//! - Publish the pipeline status snapshot
//!
//! The Control API only talks to this type; it never reaches into the
//! registry, smoother or actuator directly.

mod capture_loop;
mod types;

pub use types::*;

use crate::activity_log::{ActivityLog, LightActivity};
use crate::actuator::{ActuationIntent, ActuatorHandle, IntentSource};
use crate::clock::Clock;
use crate::detection::DetectionAdapter;
use crate::error::{Error, Result};
use crate::frame_source::FrameSourceRegistry;
use crate::smoother::OccupancySmoother;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// State shared between the orchestrator and its capture loop
pub(crate) struct PipelineShared {
    pub(crate) registry: Arc<FrameSourceRegistry>,
    pub(crate) adapter: Arc<DetectionAdapter>,
    pub(crate) smoother: Mutex<OccupancySmoother>,
    pub(crate) actuator: Arc<ActuatorHandle>,
    pub(crate) activity: Arc<ActivityLog>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) capture: CaptureConfig,
    pub(crate) status: watch::Sender<PipelineStatus>,
    pub(crate) signal: watch::Sender<RunState>,
}

/// PipelineOrchestrator instance
pub struct PipelineOrchestrator {
    shared: Arc<PipelineShared>,
    turn_off_on_stop: bool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PipelineOrchestrator {
    /// Create new PipelineOrchestrator
    pub fn new(
        registry: Arc<FrameSourceRegistry>,
        adapter: Arc<DetectionAdapter>,
        smoother: OccupancySmoother,
        actuator: Arc<ActuatorHandle>,
        activity: Arc<ActivityLog>,
        clock: Arc<dyn Clock>,
        settings: OrchestratorSettings,
    ) -> Self {
        let (status, _) = watch::channel(PipelineStatus::default());
        let (signal, _) = watch::channel(RunState::Stopping);
        Self {
            shared: Arc::new(PipelineShared {
                registry,
                adapter,
                smoother: Mutex::new(smoother),
                actuator,
                activity,
                clock,
                capture: settings.capture,
                status,
                signal,
            }),
            turn_off_on_stop: settings.turn_off_on_stop,
            task: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<FrameSourceRegistry> {
        &self.shared.registry
    }

    pub fn actuator(&self) -> &Arc<ActuatorHandle> {
        &self.shared.actuator
    }

    pub fn activity(&self) -> &Arc<ActivityLog> {
        &self.shared.activity
    }

    pub async fn is_running(&self) -> bool {
        self.task.lock().await.is_some()
    }

    /// Start the capture loop
    pub async fn start(&self) -> Result<()> {
        let mut task = self.task.lock().await;
        if task.is_some() {
            tracing::warn!("Pipeline already running");
            return Ok(());
        }
        if self.shared.registry.is_empty().await {
            return Err(Error::Validation(
                "no camera sources registered".to_string(),
            ));
        }

        self.shared.smoother.lock().await.reset();
        self.shared.signal.send_replace(RunState::Running);
        self.shared.status.send_modify(|s| {
            s.running = true;
            s.paused = false;
            s.started_at = Some(Utc::now());
            s.last_error = None;
        });

        tracing::info!("Starting pipeline");
        *task = Some(tokio::spawn(capture_loop::run(self.shared.clone())));
        Ok(())
    }

    /// Stop the capture loop and release the active source
    pub async fn stop(&self) -> Result<()> {
        let Some(task) = self.task.lock().await.take() else {
            tracing::warn!("Pipeline not running");
            return Ok(());
        };

        tracing::info!("Stopping pipeline");
        self.shared.signal.send_replace(RunState::Stopping);
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Capture loop ended abnormally");
        }

        let released = self.shared.registry.deactivate().await;
        self.shared.status.send_modify(|s| {
            s.running = false;
            s.paused = false;
            s.active_camera_id = None;
        });

        if self.turn_off_on_stop {
            let fade_ms = {
                let mut smoother = self.shared.smoother.lock().await;
                let now = self.shared.clock.now();
                smoother.advance(now);
                let fade = smoother
                    .config()
                    .fade_for_delta(smoother.state().current_brightness);
                smoother.align_to(0, now);
                fade
            };
            self.shared
                .actuator
                .submit(ActuationIntent::new(0, fade_ms, IntentSource::Shutdown));
            let mut entry = LightActivity::new(IntentSource::Shutdown, 0, fade_ms);
            if let Some(camera_id) = released {
                entry = entry.with_camera(camera_id);
            }
            self.shared.activity.record(entry).await;
            self.shared.status.send_modify(|s| {
                s.current_brightness = 0;
                s.target_brightness = 0;
                s.smoother_state = crate::smoother::StateTag::Off;
            });
        }

        tracing::info!("Pipeline stopped");
        Ok(())
    }

    /// Stop reading frames without releasing the source
    pub async fn pause(&self) -> Result<()> {
        self.ensure_running().await?;
        self.shared.signal.send_replace(RunState::Paused);
        self.shared.status.send_modify(|s| s.paused = true);
        tracing::info!("Pipeline paused");
        Ok(())
    }

    pub async fn resume(&self) -> Result<()> {
        self.ensure_running().await?;
        self.shared.smoother.lock().await.reset();
        self.shared.signal.send_replace(RunState::Running);
        self.shared.status.send_modify(|s| s.paused = false);
        tracing::info!("Pipeline resumed");
        Ok(())
    }

    /// Switch the camera feeding the pipeline
    ///
    /// While stopped this only selects the camera for the next start.
    pub async fn switch_camera(&self, camera_id: &str) -> Result<SwitchOutcome> {
        let running = self.is_running().await;

        if !running {
            let source = self.shared.registry.select(camera_id).await?;
            return Ok(SwitchOutcome {
                camera_id: source.id,
                camera_name: source.display_name,
                url: source.locator,
                processing_resumed: false,
            });
        }

        let source = self.shared.registry.switch_to(camera_id).await?;
        self.shared.smoother.lock().await.reset();
        self.shared.status.send_modify(|s| {
            s.active_camera_id = Some(source.id.clone());
            s.consecutive_detection_errors = 0;
            s.last_error = None;
        });

        tracing::info!(camera_id = %source.id, "Pipeline switched camera");
        Ok(SwitchOutcome {
            camera_id: source.id,
            camera_name: source.display_name,
            url: source.locator,
            processing_resumed: true,
        })
    }

    /// Set the lights directly, bypassing the smoother
    ///
    /// Non-zero values are clamped into the configured brightness range.
    /// Holds until the smoother next accepts a change.
    pub async fn manual_override(&self, brightness: u8) -> Result<ManualOverrideOutcome> {
        let current = self
            .shared
            .actuator
            .status()
            .last_published_brightness
            .unwrap_or(0);
        let (brightness, fade_ms) = {
            let smoother = self.shared.smoother.lock().await;
            let brightness = smoother.mapping().clamp_level(brightness);
            let fade_ms = smoother
                .config()
                .fade_for_delta(current.abs_diff(brightness));
            (brightness, fade_ms)
        };

        self.shared
            .actuator
            .submit(ActuationIntent::new(brightness, fade_ms, IntentSource::Manual));

        let mut entry = LightActivity::new(IntentSource::Manual, brightness, fade_ms);
        if let Some(camera_id) = self.shared.registry.active_camera_id().await {
            entry = entry.with_camera(camera_id);
        }
        self.shared.activity.record(entry).await;

        tracing::info!(brightness = brightness, fade_ms = fade_ms, "Manual override");
        Ok(ManualOverrideOutcome {
            brightness,
            fade_ms,
        })
    }

    /// Current status, including the actuator's
    pub fn status(&self) -> PipelineStatus {
        let mut status = self.shared.status.borrow().clone();
        status.light = Some(self.shared.actuator.status());
        status
    }

    /// Zero the frame and error counters
    pub fn reset_stats(&self) {
        self.shared.status.send_modify(|s| {
            s.frames_processed = 0;
            s.frame_errors = 0;
            s.detection_errors = 0;
            s.consecutive_detection_errors = 0;
            s.last_error = None;
        });
        tracing::info!("Pipeline counters reset");
    }

    /// Watch status updates
    pub fn subscribe(&self) -> watch::Receiver<PipelineStatus> {
        self.shared.status.subscribe()
    }

    async fn ensure_running(&self) -> Result<()> {
        if self.is_running().await {
            Ok(())
        } else {
            Err(Error::Validation("pipeline is not running".to_string()))
        }
    }
}
