//! Shared API models
//!
//! Response and request types used by the Control API.

use serde::{Deserialize, Serialize};

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_sec: u64,
    pub pipeline_running: bool,
    pub detector_connected: bool,
    pub transport_connected: bool,
}

/// Switch camera request
#[derive(Debug, Clone, Deserialize)]
pub struct SwitchCameraRequest {
    pub camera_id: String,
}

/// Manual override request
///
/// Values above 100 are clamped.
#[derive(Debug, Clone, Deserialize)]
pub struct ManualOverrideRequest {
    pub brightness: u32,
}

/// Lights-on query
///
/// Without a brightness the lights go to the configured maximum.
#[derive(Debug, Clone, Deserialize)]
pub struct LightsOnQuery {
    pub brightness: Option<u32>,
}

/// Activity query
#[derive(Debug, Clone, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<usize>,
}
