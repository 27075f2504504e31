//! Application state
//!
//! Holds the process configuration and the components shared by handlers

use crate::detection::HttpDetector;
use crate::orchestrator::PipelineOrchestrator;
use crate::pipeline_config::PipelineConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Pipeline configuration file
    pub pipeline_config: PathBuf,
    /// Inference server URL
    pub detector_url: String,
    /// Start the pipeline at boot
    pub auto_start: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            pipeline_config: std::env::var("PIPELINE_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config/pipeline.json")),
            detector_url: std::env::var("DETECTOR_URL")
                .unwrap_or_else(|_| "http://localhost:9000".to_string()),
            auto_start: std::env::var("AUTO_START")
                .ok()
                .map(|v| parse_flag(&v))
                .unwrap_or(true),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// PipelineOrchestrator (detection to actuation loop)
    pub orchestrator: Arc<PipelineOrchestrator>,
    /// Validated pipeline configuration the components were built from
    pub pipeline: Arc<PipelineConfig>,
    /// Inference server client, for health reporting
    pub detector: Option<Arc<HttpDetector>>,
    /// Process start time
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        orchestrator: Arc<PipelineOrchestrator>,
        pipeline: Arc<PipelineConfig>,
        detector: Option<Arc<HttpDetector>>,
    ) -> Self {
        Self {
            config,
            orchestrator,
            pipeline,
            detector,
            started_at: Instant::now(),
        }
    }
}
