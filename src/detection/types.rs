//! Detection types and filter policy

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::time::Instant;

/// One object reported by the detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_name: String,
    /// 0.0 - 1.0
    pub confidence: f32,
    /// Area of the bounding box in pixels
    pub bounding_area: f64,
}

impl Detection {
    pub fn new(class_name: impl Into<String>, confidence: f32, bounding_area: f64) -> Self {
        Self {
            class_name: class_name.into(),
            confidence,
            bounding_area,
        }
    }
}

/// Occupancy observed on a single frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccupancyObservation {
    pub count: u32,
    pub timestamp: Instant,
}

/// Which detections count as occupants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterPolicy {
    /// Classes that count
    pub target_classes: HashSet<String>,
    /// Classes that never count, even if also targeted
    pub ignore_classes: HashSet<String>,
    pub min_confidence: f32,
    pub min_area: f64,
    /// No upper bound when unset
    pub max_area: Option<f64>,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self {
            target_classes: ["person".to_string()].into_iter().collect(),
            ignore_classes: HashSet::new(),
            min_confidence: 0.5,
            min_area: 0.0,
            max_area: None,
        }
    }
}

impl FilterPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.target_classes.is_empty() {
            return Err(Error::Config(
                "detection.target_classes must name at least one class".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(Error::Config(format!(
                "detection.min_confidence must be within 0.0-1.0, got {}",
                self.min_confidence
            )));
        }
        if self.min_area < 0.0 {
            return Err(Error::Config(format!(
                "detection.min_area must not be negative, got {}",
                self.min_area
            )));
        }
        if let Some(max_area) = self.max_area {
            if max_area < self.min_area {
                return Err(Error::Config(format!(
                    "detection.max_area ({}) is below min_area ({})",
                    max_area, self.min_area
                )));
            }
        }
        Ok(())
    }

    /// Whether a detection counts as an occupant
    pub fn qualifies(&self, detection: &Detection) -> bool {
        if self.ignore_classes.contains(&detection.class_name) {
            return false;
        }
        if !self.target_classes.contains(&detection.class_name) {
            return false;
        }
        if detection.confidence < self.min_confidence {
            return false;
        }
        if detection.bounding_area < self.min_area {
            return false;
        }
        match self.max_area {
            Some(max_area) => detection.bounding_area <= max_area,
            None => true,
        }
    }

    pub fn count_qualifying(&self, detections: &[Detection]) -> u32 {
        let count = detections.iter().filter(|d| self.qualifies(d)).count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }
}
