//! Light command encoding

use crate::smoother::FULL_BRIGHTNESS;
use serde::{Deserialize, Serialize};

/// Which channels of the `RRGGBBWW` value carry the brightness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelLayout {
    #[default]
    White,
    Rgb,
    Rgbw,
}

impl ChannelLayout {
    /// Encode a brightness percent as 8 hex digits
    pub fn encode(&self, brightness: u8) -> String {
        let level = channel_level(brightness);
        match self {
            ChannelLayout::White => format!("000000{:02x}", level),
            ChannelLayout::Rgb => format!("{0:02x}{0:02x}{0:02x}00", level),
            ChannelLayout::Rgbw => format!("{0:02x}{0:02x}{0:02x}{0:02x}", level),
        }
    }
}

/// `0..=100` percent to `0..=255` channel value
pub fn channel_level(brightness: u8) -> u8 {
    let brightness = brightness.min(FULL_BRIGHTNESS);
    (f64::from(brightness) / f64::from(FULL_BRIGHTNESS) * 255.0).round() as u8
}

/// One actuation message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightCommand {
    pub brightness: u8,
    pub color_value: String,
    pub duration_ms: u64,
}

impl LightCommand {
    pub fn new(brightness: u8, duration_ms: u64, layout: ChannelLayout) -> Self {
        Self {
            brightness,
            color_value: layout.encode(brightness),
            duration_ms,
        }
    }

    pub fn payload(&self) -> LightPayload {
        LightPayload {
            all: self.color_value.clone(),
            duration: self.duration_ms,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&self.payload())
    }
}

/// Wire format of an actuation message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightPayload {
    pub all: String,
    pub duration: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_white_channel() {
        let layout = ChannelLayout::White;
        assert_eq!(layout.encode(0), "00000000");
        assert_eq!(layout.encode(100), "000000ff");
        assert_eq!(layout.encode(50), "00000080");
        assert_eq!(layout.encode(150), "000000ff");
    }

    #[test]
    fn test_encode_other_layouts() {
        assert_eq!(ChannelLayout::Rgb.encode(100), "ffffff00");
        assert_eq!(ChannelLayout::Rgbw.encode(100), "ffffffff");
        assert_eq!(ChannelLayout::Rgbw.encode(0), "00000000");
    }

    #[test]
    fn test_payload_json() {
        let command = LightCommand::new(100, 800, ChannelLayout::White);
        let json: serde_json::Value = serde_json::from_slice(&command.to_json().unwrap()).unwrap();
        assert_eq!(json["all"], "000000ff");
        assert_eq!(json["duration"], 800);
    }
}
