//! ActivityLog - Light Change History (Ring Buffer)
//!
//! ## Responsibilities
//!
//! - Record every brightness change handed to the actuator
//! - Provide latest-first queries for the Control API
//!
//! History is in memory only and bounded by the buffer capacity.

use crate::actuator::IntentSource;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::RwLock;

/// Default number of entries kept
pub const DEFAULT_CAPACITY: usize = 1000;

/// One light change
#[derive(Debug, Clone, Serialize)]
pub struct LightActivity {
    pub activity_id: u64,
    pub kind: IntentSource,
    pub camera_id: Option<String>,
    pub brightness: u8,
    pub fade_ms: u64,
    /// Occupancy count that triggered the change (smoothing only)
    pub occupancy: Option<u32>,
    pub recorded_at: DateTime<Utc>,
}

impl LightActivity {
    pub fn new(kind: IntentSource, brightness: u8, fade_ms: u64) -> Self {
        Self {
            activity_id: 0,
            kind,
            camera_id: None,
            brightness,
            fade_ms,
            occupancy: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_camera(mut self, camera_id: impl Into<String>) -> Self {
        self.camera_id = Some(camera_id.into());
        self
    }

    pub fn with_occupancy(mut self, count: u32) -> Self {
        self.occupancy = Some(count);
        self
    }
}

struct ActivityRingBuffer {
    entries: VecDeque<LightActivity>,
    capacity: usize,
    next_id: u64,
}

impl ActivityRingBuffer {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            next_id: 1,
        }
    }

    fn push(&mut self, mut entry: LightActivity) -> u64 {
        entry.activity_id = self.next_id;
        self.next_id += 1;

        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        self.next_id - 1
    }

    fn latest(&self, count: usize) -> Vec<LightActivity> {
        self.entries.iter().rev().take(count).cloned().collect()
    }
}

/// ActivityLog instance
pub struct ActivityLog {
    buffer: RwLock<ActivityRingBuffer>,
}

impl ActivityLog {
    /// Create new ActivityLog
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: RwLock::new(ActivityRingBuffer::new(capacity)),
        }
    }

    pub async fn record(&self, entry: LightActivity) -> u64 {
        let mut buffer = self.buffer.write().await;
        let id = buffer.push(entry);
        tracing::debug!(activity_id = id, "Light activity recorded");
        id
    }

    /// Latest entries, newest first
    pub async fn latest(&self, count: usize) -> Vec<LightActivity> {
        self.buffer.read().await.latest(count)
    }

    pub async fn count(&self) -> usize {
        self.buffer.read().await.entries.len()
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
