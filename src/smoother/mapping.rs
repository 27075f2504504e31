//! Occupancy count to brightness mapping

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Upper bound of any brightness value (percent)
pub const FULL_BRIGHTNESS: u8 = 100;

/// Count to brightness mapping
///
/// `0 -> 0`, `1 -> min_brightness + step`, then linear up to
/// `max_brightness` at `saturation_count`. A non-empty `levels` table
/// replaces the formula: `levels[0]` is the brightness for one occupant,
/// counts past the end of the table use its last entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrightnessMapping {
    pub min_brightness: u8,
    pub max_brightness: u8,
    pub step: u8,
    pub saturation_count: u32,
    pub levels: Vec<u8>,
}

impl Default for BrightnessMapping {
    fn default() -> Self {
        Self {
            min_brightness: 10,
            max_brightness: 100,
            step: 20,
            saturation_count: 5,
            levels: Vec::new(),
        }
    }
}

impl BrightnessMapping {
    pub fn validate(&self) -> Result<()> {
        if self.max_brightness > FULL_BRIGHTNESS {
            return Err(Error::Config(format!(
                "brightness.max_brightness must be <= {}, got {}",
                FULL_BRIGHTNESS, self.max_brightness
            )));
        }
        if self.min_brightness > self.max_brightness {
            return Err(Error::Config(format!(
                "brightness.min_brightness ({}) is above max_brightness ({})",
                self.min_brightness, self.max_brightness
            )));
        }
        if self.saturation_count == 0 {
            return Err(Error::Config(
                "brightness.saturation_count must be at least 1".to_string(),
            ));
        }
        if let Some(level) = self.levels.iter().find(|l| **l > FULL_BRIGHTNESS) {
            return Err(Error::Config(format!(
                "brightness.levels entry {} is above {}",
                level, FULL_BRIGHTNESS
            )));
        }
        if self.levels.windows(2).any(|w| w[1] < w[0]) {
            return Err(Error::Config(
                "brightness.levels must be non-decreasing".to_string(),
            ));
        }
        Ok(())
    }

    /// Effective `(low, high)` bounds with bad configuration clamped
    pub fn bounds(&self) -> (u8, u8) {
        let high = self.max_brightness.min(FULL_BRIGHTNESS);
        let low = self.min_brightness.min(high);
        (low, high)
    }

    /// Clamp a directly requested brightness into the configured range.
    /// Zero stays off.
    pub fn clamp_level(&self, brightness: u8) -> u8 {
        if brightness == 0 {
            return 0;
        }
        let (low, high) = self.bounds();
        brightness.clamp(low, high)
    }

    /// Brightness for `count` occupants
    ///
    /// Non-decreasing in `count` for any configuration.
    pub fn map(&self, count: u32) -> u8 {
        if count == 0 {
            return 0;
        }
        let (low, high) = self.bounds();

        if !self.levels.is_empty() {
            let index = (count as usize).min(self.levels.len());
            return self.levels[..index]
                .iter()
                .map(|level| (*level).clamp(low, high))
                .max()
                .unwrap_or(low);
        }

        let first = (u16::from(low) + u16::from(self.step)).min(u16::from(high)) as u64;
        let high = u64::from(high);
        if count >= self.saturation_count || self.saturation_count <= 1 {
            return high as u8;
        }

        // Rounded linear interpolation from `first` at 1 to `high` at saturation
        let span = high - first;
        let steps = u64::from(self.saturation_count - 1);
        let value = first + (span * u64::from(count - 1) + steps / 2) / steps;
        value.min(high) as u8
    }
}
