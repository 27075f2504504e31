//! HTTP detector client
//!
//! Posts a frame to a remote inference server and maps its boxes to
//! [`Detection`]s.

use super::{Detection, Detector};
use crate::error::{Error, Result};
use crate::frame_source::Frame;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;

/// Detect response from the inference server
#[derive(Debug, Clone, Deserialize)]
pub struct DetectResponse {
    #[serde(default)]
    pub detections: Vec<RawDetection>,
}

/// One box as returned by the inference server
#[derive(Debug, Clone, Deserialize)]
pub struct RawDetection {
    pub label: String,
    pub conf: f32,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl From<RawDetection> for Detection {
    fn from(raw: RawDetection) -> Self {
        let width = (raw.x2 - raw.x1).abs();
        let height = (raw.y2 - raw.y1).abs();
        Detection {
            class_name: raw.label,
            confidence: raw.conf,
            bounding_area: width * height,
        }
    }
}

/// Inference server client
pub struct HttpDetector {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDetector {
    /// Create new detector client
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    /// Create new detector client with custom timeout
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    /// Check inference server health
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/healthz", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>> {
        let url = format!("{}/v1/detect", self.base_url);

        let form = Form::new()
            .part(
                "image",
                Part::bytes(frame.data.clone())
                    .file_name("frame.jpg")
                    .mime_str("image/jpeg")?,
            )
            .text("camera_id", frame.camera_id.clone())
            .text("captured_at", frame.captured_at.to_rfc3339());

        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Detection(format!("detector unreachable: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Detection(format!(
                "detector returned {} - {}",
                status, body
            )));
        }

        let parsed: DetectResponse = resp
            .json()
            .await
            .map_err(|e| Error::Detection(format!("invalid detector response: {}", e)))?;

        Ok(parsed.detections.into_iter().map(Detection::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_detect_response() {
        let json = r#"{"detections":[
            {"label":"person","conf":0.91,"x1":10,"y1":20,"x2":60,"y2":120},
            {"label":"chair","conf":0.4,"x1":0,"y1":0,"x2":5,"y2":5}
        ]}"#;
        let parsed: DetectResponse = serde_json::from_str(json).unwrap();
        let detections: Vec<Detection> = parsed.detections.into_iter().map(Detection::from).collect();

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].class_name, "person");
        assert_eq!(detections[0].bounding_area, 5000.0);
        assert_eq!(detections[1].bounding_area, 25.0);
    }

    #[test]
    fn test_missing_detections_is_empty() {
        let parsed: DetectResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.detections.is_empty());
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let detector = HttpDetector::new("http://localhost:9000/").unwrap();
        assert_eq!(detector.base_url(), "http://localhost:9000");
    }
}
