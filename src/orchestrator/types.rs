//! Orchestrator types

use crate::actuator::ActuatorStatus;
use crate::error::{Error, Result};
use crate::smoother::StateTag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Capture loop configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Spacing between frame requests for snapshot sources
    pub frame_interval_ms: u64,
    /// Upper bound on a single frame read
    pub read_timeout_ms: u64,
    /// Consecutive read failures before the source is reopened
    pub max_read_failures: u32,
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 500,
            read_timeout_ms: 5000,
            max_read_failures: 3,
            reconnect_base_ms: 1000,
            reconnect_max_ms: 30_000,
        }
    }
}

impl CaptureConfig {
    pub fn validate(&self) -> Result<()> {
        if self.read_timeout_ms == 0 {
            return Err(Error::Config(
                "capture.read_timeout_ms must be positive".to_string(),
            ));
        }
        if self.max_read_failures == 0 {
            return Err(Error::Config(
                "capture.max_read_failures must be at least 1".to_string(),
            ));
        }
        if self.reconnect_base_ms == 0 || self.reconnect_max_ms < self.reconnect_base_ms {
            return Err(Error::Config(format!(
                "capture reconnect bounds invalid: base {}ms, max {}ms",
                self.reconnect_base_ms, self.reconnect_max_ms
            )));
        }
        Ok(())
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn reconnect_base(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }
}

/// Orchestrator settings beyond the components it wires together
#[derive(Debug, Clone, Default)]
pub struct OrchestratorSettings {
    pub capture: CaptureConfig,
    pub turn_off_on_stop: bool,
}

/// Pipeline status snapshot
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub running: bool,
    pub paused: bool,
    pub active_camera_id: Option<String>,
    pub frames_processed: u64,
    pub last_frame_time: Option<DateTime<Utc>>,
    pub current_brightness: u8,
    pub target_brightness: u8,
    pub occupancy: u32,
    pub smoother_state: StateTag,
    pub frame_errors: u64,
    pub detection_errors: u64,
    pub consecutive_detection_errors: u32,
    pub last_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub light: Option<ActuatorStatus>,
}

impl Default for PipelineStatus {
    fn default() -> Self {
        Self {
            running: false,
            paused: false,
            active_camera_id: None,
            frames_processed: 0,
            last_frame_time: None,
            current_brightness: 0,
            target_brightness: 0,
            occupancy: 0,
            smoother_state: StateTag::Off,
            frame_errors: 0,
            detection_errors: 0,
            consecutive_detection_errors: 0,
            last_error: None,
            started_at: None,
            light: None,
        }
    }
}

/// Result of a camera switch
#[derive(Debug, Clone, Serialize)]
pub struct SwitchOutcome {
    pub camera_id: String,
    pub camera_name: String,
    pub url: String,
    /// False when the pipeline is stopped and the camera was only selected
    pub processing_resumed: bool,
}

/// Result of a manual override
#[derive(Debug, Clone, Serialize)]
pub struct ManualOverrideOutcome {
    pub brightness: u8,
    pub fade_ms: u64,
}

/// Signal from the control surface to the capture loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunState {
    Running,
    Paused,
    Stopping,
}
