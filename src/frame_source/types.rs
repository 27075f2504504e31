//! Frame source types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Camera source as exposed to the Control API
///
/// `is_active` is computed from the registry's active slot at listing time,
/// so at most one entry carries `true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraSource {
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "url")]
    pub locator: String,
    #[serde(default)]
    pub is_active: bool,
}

impl CameraSource {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        locator: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            locator: locator.into(),
            is_active: false,
        }
    }
}

/// Register request (Control API / configuration)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterSourceRequest {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub url: String,
}

impl From<RegisterSourceRequest> for CameraSource {
    fn from(req: RegisterSourceRequest) -> Self {
        let display_name = req.name.unwrap_or_else(|| req.id.clone());
        CameraSource::new(req.id, display_name, req.url)
    }
}

/// One decoded frame
///
/// Pixel data is opaque to the core; it is handed to the detector as-is.
#[derive(Debug, Clone)]
pub struct Frame {
    pub camera_id: String,
    pub sequence: u64,
    pub data: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

/// Frame read failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Source has no more frames
    #[error("end of stream")]
    EndOfStream,
    /// Read failed, the source may recover
    #[error("read failed: {0}")]
    Read(String),
    /// Source was switched away or released while this reader held it
    #[error("source retired")]
    Retired,
}
