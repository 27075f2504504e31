//! PipelineConfig - Pipeline Configuration File
//!
//! ## Responsibilities
//!
//! - Deserialize the pipeline JSON document
//! - Validate every section before any component is built
//! - Fall back to defaults when no file exists
//!
//! Each section is the configuration struct of the component it feeds.

use crate::actuator::{ActuatorConfig, TransportConfig};
use crate::detection::FilterPolicy;
use crate::error::{Error, Result};
use crate::frame_source::RegisterSourceRequest;
use crate::orchestrator::CaptureConfig;
use crate::smoother::{BrightnessMapping, SmootherConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Placeholder for masked secrets
const REDACTED: &str = "********";

/// Whole pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub cameras: Vec<RegisterSourceRequest>,
    /// Camera opened on start. First registered camera when unset.
    pub default_camera: Option<String>,
    pub detection: FilterPolicy,
    pub brightness: BrightnessMapping,
    pub smoothing: SmootherConfig,
    pub actuator: ActuatorConfig,
    pub transport: TransportConfig,
    pub capture: CaptureConfig,
}

impl PipelineConfig {
    /// Load from `path`, or defaults if the file does not exist
    pub async fn load(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await? {
            tracing::warn!(
                path = %path.display(),
                "Pipeline config not found, using defaults"
            );
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }

        let raw = tokio::fs::read_to_string(path).await?;
        let config = Self::from_json(&raw).map_err(|e| match e {
            Error::Config(message) => Error::Config(format!("{}: {}", path.display(), message)),
            other => other,
        })?;

        tracing::info!(
            path = %path.display(),
            cameras = config.cameras.len(),
            transport = config.transport.kind(),
            "Pipeline config loaded"
        );
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| Error::Config(format!("invalid JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Copy safe to expose over the Control API (credentials masked)
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if let TransportConfig::Mqtt { password, .. } = &mut config.transport {
            if password.is_some() {
                *password = Some(REDACTED.to_string());
            }
        }
        config
    }

    pub fn validate(&self) -> Result<()> {
        self.detection.validate()?;
        self.brightness.validate()?;
        self.smoothing.validate()?;
        self.actuator.validate()?;
        self.transport.validate()?;
        self.capture.validate()?;

        let mut seen = HashSet::new();
        for camera in &self.cameras {
            if camera.id.trim().is_empty() {
                return Err(Error::Config("camera id must not be empty".to_string()));
            }
            if camera.url.trim().is_empty() {
                return Err(Error::Config(format!("camera {} has an empty url", camera.id)));
            }
            if !seen.insert(camera.id.as_str()) {
                return Err(Error::Config(format!("duplicate camera id: {}", camera.id)));
            }
        }

        if let Some(default_camera) = &self.default_camera {
            if !seen.contains(default_camera.as_str()) {
                return Err(Error::Config(format!(
                    "default_camera {} is not a configured camera",
                    default_camera
                )));
            }
        }
        Ok(())
    }
}
