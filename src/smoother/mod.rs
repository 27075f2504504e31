//! OccupancySmoother - Debounced Brightness Target
//!
//! ## Responsibilities
//!
//! - Map occupancy counts to a brightness target
//! - Debounce reversals (rise after fall, fall after rise) within a window
//! - Let changes that continue the current direction through immediately
//! - Hold the lights on until the room has been empty for the off delay
//! - Derive a fade duration for every accepted change
//!
//! The smoother is a pure state machine: every call takes the observation
//! timestamp, no clock is read internally.

mod mapping;

pub use mapping::{BrightnessMapping, FULL_BRIGHTNESS};

use crate::actuator::MIN_SAFE_DURATION_MS;
use crate::detection::OccupancyObservation;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Smoother timing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmootherConfig {
    /// Minimum spacing between a change and its reversal
    pub debounce_window_ms: u64,
    /// How long the count must stay at zero before turning off
    pub off_delay_ms: u64,
    pub fade_ms_per_percent: u64,
    pub min_fade_ms: u64,
    pub max_fade_ms: u64,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self {
            debounce_window_ms: 1500,
            off_delay_ms: 10_000,
            fade_ms_per_percent: 20,
            min_fade_ms: 500,
            max_fade_ms: 3000,
        }
    }
}

impl SmootherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_fade_ms > self.max_fade_ms {
            return Err(Error::Config(format!(
                "smoothing.min_fade_ms ({}) is above max_fade_ms ({})",
                self.min_fade_ms, self.max_fade_ms
            )));
        }
        Ok(())
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }

    pub fn off_delay(&self) -> Duration {
        Duration::from_millis(self.off_delay_ms)
    }

    /// Fade for a brightness delta, within the safe bounds
    pub fn fade_for_delta(&self, delta: u8) -> u64 {
        let floor = self.min_fade_ms.max(MIN_SAFE_DURATION_MS);
        let ceiling = self.max_fade_ms.max(floor);
        (u64::from(delta) * self.fade_ms_per_percent).clamp(floor, ceiling)
    }
}

/// Coarse smoother state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateTag {
    Off,
    RampUp,
    Hold,
    RampDown,
}

/// Smoother state snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccupancyState {
    pub current_brightness: u8,
    pub target_brightness: u8,
    pub last_observed_count: u32,
    pub last_change_time: Option<Instant>,
    pub state_tag: StateTag,
}

/// Accepted target change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmoothingEvent {
    pub new_target_brightness: u8,
    pub fade_duration_ms: u64,
    /// Count that triggered the change
    pub occupancy: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Rising,
    Falling,
}

#[derive(Debug, Clone, Copy)]
struct Ramp {
    from: u8,
    to: u8,
    started: Instant,
    duration: Duration,
}

impl Ramp {
    fn level_at(&self, now: Instant) -> Option<u8> {
        let elapsed = now.saturating_duration_since(self.started);
        if elapsed >= self.duration || self.duration.is_zero() {
            return None;
        }
        let progress = elapsed.as_secs_f64() / self.duration.as_secs_f64();
        let from = f64::from(self.from);
        let level = from + (f64::from(self.to) - from) * progress;
        Some(level.round().clamp(0.0, f64::from(FULL_BRIGHTNESS)) as u8)
    }
}

/// OccupancySmoother instance
#[derive(Debug, Clone)]
pub struct OccupancySmoother {
    mapping: BrightnessMapping,
    config: SmootherConfig,
    current_brightness: u8,
    target_brightness: u8,
    last_observed_count: u32,
    last_change_time: Option<Instant>,
    motion: Option<Direction>,
    ramp: Option<Ramp>,
    zero_since: Option<Instant>,
    pending_drop: bool,
}

impl OccupancySmoother {
    /// Create new smoother, starting from off
    pub fn new(mapping: BrightnessMapping, config: SmootherConfig) -> Self {
        Self {
            mapping,
            config,
            current_brightness: 0,
            target_brightness: 0,
            last_observed_count: 0,
            last_change_time: None,
            motion: None,
            ramp: None,
            zero_since: None,
            pending_drop: false,
        }
    }

    /// Feed one observation. Returns the accepted change, if any.
    pub fn update(&mut self, observation: OccupancyObservation) -> Option<SmoothingEvent> {
        let now = observation.timestamp;
        self.advance(now);
        self.last_observed_count = observation.count;

        if observation.count == 0 {
            self.zero_since.get_or_insert(now);
        } else {
            self.zero_since = None;
        }

        let mapped = self.mapping.map(observation.count);
        if mapped == self.target_brightness {
            self.pending_drop = false;
            return None;
        }

        let direction = if mapped > self.target_brightness {
            Direction::Rising
        } else {
            Direction::Falling
        };

        let window_elapsed = self
            .last_change_time
            .map(|t| now.saturating_duration_since(t) >= self.config.debounce_window())
            .unwrap_or(true);
        let continues = self.motion == Some(direction);

        if !window_elapsed && !continues {
            tracing::trace!(
                count = observation.count,
                mapped = mapped,
                target = self.target_brightness,
                "Reversal suppressed by debounce"
            );
            self.pending_drop = direction == Direction::Falling;
            return None;
        }

        if mapped == 0 {
            let held = self
                .zero_since
                .map(|since| now.saturating_duration_since(since) >= self.config.off_delay())
                .unwrap_or(false);
            if !held {
                self.pending_drop = true;
                return None;
            }
        }

        self.pending_drop = false;
        Some(self.accept(mapped, direction, now, observation.count))
    }

    fn accept(&mut self, target: u8, direction: Direction, now: Instant, count: u32) -> SmoothingEvent {
        let from = self.current_brightness;
        let fade_duration_ms = self.config.fade_for_delta(from.abs_diff(target));

        self.ramp = Some(Ramp {
            from,
            to: target,
            started: now,
            duration: Duration::from_millis(fade_duration_ms),
        });
        self.target_brightness = target;
        self.last_change_time = Some(now);
        self.motion = Some(direction);

        tracing::debug!(
            from = from,
            target = target,
            count = count,
            fade_ms = fade_duration_ms,
            "Brightness target changed"
        );

        SmoothingEvent {
            new_target_brightness: target,
            fade_duration_ms,
            occupancy: count,
        }
    }

    /// Move the ramp forward to `now`
    pub fn advance(&mut self, now: Instant) {
        if let Some(ramp) = self.ramp {
            match ramp.level_at(now) {
                Some(level) => self.current_brightness = level,
                None => {
                    self.current_brightness = ramp.to;
                    self.ramp = None;
                }
            }
        }
    }

    /// Forget debounce history (after a camera switch)
    ///
    /// Brightness and target are kept so the lights do not jump.
    pub fn reset(&mut self) {
        self.last_change_time = None;
        self.motion = None;
        self.zero_since = None;
        self.pending_drop = false;
    }

    /// Align with a brightness set outside the smoother (manual override)
    pub fn align_to(&mut self, brightness: u8, now: Instant) {
        let (_, high) = self.mapping.bounds();
        let brightness = brightness.min(high);
        self.advance(now);
        self.ramp = None;
        self.current_brightness = brightness;
        self.target_brightness = brightness;
        self.reset();
    }

    pub fn state_tag(&self) -> StateTag {
        if let Some(ramp) = self.ramp {
            return if ramp.to > ramp.from {
                StateTag::RampUp
            } else {
                StateTag::RampDown
            };
        }
        if self.pending_drop {
            StateTag::RampDown
        } else if self.target_brightness == 0 {
            StateTag::Off
        } else {
            StateTag::Hold
        }
    }

    /// Snapshot as of the last observation
    pub fn state(&self) -> OccupancyState {
        OccupancyState {
            current_brightness: self.current_brightness,
            target_brightness: self.target_brightness,
            last_observed_count: self.last_observed_count,
            last_change_time: self.last_change_time,
            state_tag: self.state_tag(),
        }
    }

    pub fn mapping(&self) -> &BrightnessMapping {
        &self.mapping
    }

    pub fn config(&self) -> &SmootherConfig {
        &self.config
    }

    pub fn target_brightness(&self) -> u8 {
        self.target_brightness
    }
}
