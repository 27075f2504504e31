//! HTTP snapshot connector
//!
//! Treats a camera's snapshot URL as a frame stream: each `next_frame` is one
//! GET, paced to the configured frame interval.

use super::{CameraSource, Frame, FrameError, FrameStream, SourceConnector};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tokio::time::Instant;

/// Connector for `http://` / `https://` snapshot locators
pub struct HttpSnapshotConnector {
    client: reqwest::Client,
    frame_interval: Duration,
}

impl HttpSnapshotConnector {
    /// Create new connector
    ///
    /// * `request_timeout` - Per-request timeout (connect probe and each frame)
    /// * `frame_interval` - Minimum spacing between frame requests
    pub fn new(request_timeout: Duration, frame_interval: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            frame_interval,
        })
    }

    fn check_locator(source: &CameraSource) -> Result<()> {
        let locator = source.locator.to_ascii_lowercase();
        if locator.starts_with("http://") || locator.starts_with("https://") {
            Ok(())
        } else {
            Err(Error::SourceConnect {
                camera_id: source.id.clone(),
                message: format!("unsupported locator scheme: {}", source.locator),
            })
        }
    }
}

#[async_trait]
impl SourceConnector for HttpSnapshotConnector {
    async fn connect(&self, source: &CameraSource) -> Result<Box<dyn FrameStream>> {
        Self::check_locator(source)?;

        // Probe once so an unreachable camera fails the connect, not the first read
        let resp = self
            .client
            .get(&source.locator)
            .send()
            .await
            .map_err(|e| Error::SourceConnect {
                camera_id: source.id.clone(),
                message: e.to_string(),
            })?;
        if !resp.status().is_success() {
            return Err(Error::SourceConnect {
                camera_id: source.id.clone(),
                message: format!("snapshot endpoint returned {}", resp.status()),
            });
        }

        tracing::debug!(camera_id = %source.id, url = %source.locator, "Snapshot source reachable");

        Ok(Box::new(HttpSnapshotStream {
            client: self.client.clone(),
            camera_id: source.id.clone(),
            url: source.locator.clone(),
            frame_interval: self.frame_interval,
            next_at: None,
            sequence: 0,
        }))
    }
}

struct HttpSnapshotStream {
    client: reqwest::Client,
    camera_id: String,
    url: String,
    frame_interval: Duration,
    next_at: Option<Instant>,
    sequence: u64,
}

#[async_trait]
impl FrameStream for HttpSnapshotStream {
    async fn next_frame(&mut self) -> std::result::Result<Frame, FrameError> {
        if let Some(at) = self.next_at {
            tokio::time::sleep_until(at).await;
        }
        self.next_at = Some(Instant::now() + self.frame_interval);

        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FrameError::Read(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(FrameError::Read(format!(
                "snapshot HTTP error: {}",
                resp.status()
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| FrameError::Read(e.to_string()))?;
        if bytes.is_empty() {
            return Err(FrameError::Read("empty snapshot body".to_string()));
        }

        self.sequence += 1;
        Ok(Frame {
            camera_id: self.camera_id.clone(),
            sequence: self.sequence,
            data: bytes.to_vec(),
            captured_at: Utc::now(),
        })
    }

    async fn close(&mut self) {
        tracing::debug!(camera_id = %self.camera_id, frames = self.sequence, "Snapshot stream closed");
    }
}
