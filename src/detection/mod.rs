//! DetectionAdapter - Frame to Occupancy Count
//!
//! ## Responsibilities
//!
//! - Run the configured detector on a frame
//! - Apply the filter policy (classes, confidence, box area)
//! - Produce one occupancy observation per processed frame
//!
//! The adapter is stateless across frames. A detector failure is returned
//! to the caller and never turned into a zero count.

mod http_detector;
mod types;

pub use http_detector::HttpDetector;
pub use types::*;

use crate::error::Result;
use crate::frame_source::Frame;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Instant;

/// Object detector backend
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>>;
}

/// DetectionAdapter instance
pub struct DetectionAdapter {
    detector: Arc<dyn Detector>,
    policy: FilterPolicy,
}

impl DetectionAdapter {
    /// Create new DetectionAdapter
    pub fn new(detector: Arc<dyn Detector>, policy: FilterPolicy) -> Self {
        Self { detector, policy }
    }

    pub fn policy(&self) -> &FilterPolicy {
        &self.policy
    }

    /// Count qualifying occupants on `frame`, stamped with `now`
    pub async fn observe(&self, frame: &Frame, now: Instant) -> Result<OccupancyObservation> {
        let detections = self.detector.detect(frame).await?;
        let count = self.policy.count_qualifying(&detections);

        tracing::trace!(
            camera_id = %frame.camera_id,
            sequence = frame.sequence,
            detections = detections.len(),
            count = count,
            "Frame observed"
        );

        Ok(OccupancyObservation {
            count,
            timestamp: now,
        })
    }
}
