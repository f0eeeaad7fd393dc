//! Device-level commands and their inner byte encodings.
//!
//! Both frame variants carry a short inner command terminated by an 8-bit
//! additive checksum. The inner layouts differ per firmware generation.

use bytes::{BufMut, Bytes, BytesMut};

/// Marker byte for commands inside a legacy frame
pub const LEGACY_MARKER_COMMAND: u8 = 0x0B;

/// Marker byte for state queries inside a legacy frame
pub const LEGACY_MARKER_QUERY: u8 = 0x0A;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Ask the controller to report its state on the notify characteristic
    QueryState,
    Power(bool),
    Rgb { r: u8, g: u8, b: u8 },
    /// Temperature and brightness in percent; temperature 0 is warmest
    White { temperature: u8, brightness: u8 },
    /// Preset ("symphony") animation
    Mode { mode: u8, speed: u8, brightness: u8 },
}

impl DeviceCommand {
    /// Inner command for generation-2+ firmware, carried in an obfuscated frame
    pub fn frame_payload(&self) -> Bytes {
        let body: Vec<u8> = match *self {
            DeviceCommand::QueryState => vec![0x81, 0x8A, 0x8B],
            DeviceCommand::Power(on) => vec![0x71, power_byte(on), 0x0F],
            DeviceCommand::Rgb { r, g, b } => vec![0x31, r, g, b, 0x00, 0x00, 0xF0, 0x0F],
            DeviceCommand::White {
                temperature,
                brightness,
            } => {
                let (warm, cold) = white_levels(temperature, brightness);
                vec![0x31, 0x00, 0x00, 0x00, warm, cold, 0x0F, 0x0F]
            }
            DeviceCommand::Mode {
                mode,
                speed,
                brightness,
            } => vec![0x38, mode, speed, brightness],
        };
        with_checksum(&body)
    }

    /// Inner command for generation-1 firmware, carried in a legacy frame
    pub fn legacy_payload(&self) -> Bytes {
        let body: Vec<u8> = match *self {
            DeviceCommand::QueryState => vec![0x81, 0x8A, 0x8B],
            DeviceCommand::Power(on) => {
                vec![0x3B, power_byte(on), 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x32, 0x00, 0x00]
            }
            DeviceCommand::Rgb { r, g, b } => {
                let (hue, saturation, value) = rgb_to_hsv(r, g, b);
                vec![
                    0x3B,
                    0xA1,
                    (hue / 2) as u8,
                    saturation,
                    value,
                    0x00,
                    0x00,
                    0x00,
                    0x00,
                    0x00,
                    0x00,
                    0x00,
                ]
            }
            DeviceCommand::White {
                temperature,
                brightness,
            } => vec![
                0x3B,
                0xB1,
                0x00,
                0x00,
                0x00,
                temperature.min(100),
                brightness.min(100),
                0x00,
                0x00,
                0x00,
                0x00,
                0x00,
            ],
            // Sent bare: generation-1 firmware takes no checksum on preset mode.
            DeviceCommand::Mode {
                mode,
                speed,
                brightness,
            } => return Bytes::from(vec![0x38, mode, speed, brightness]),
        };
        with_checksum(&body)
    }

    pub fn legacy_marker(&self) -> u8 {
        match self {
            DeviceCommand::QueryState => LEGACY_MARKER_QUERY,
            _ => LEGACY_MARKER_COMMAND,
        }
    }
}

fn power_byte(on: bool) -> u8 {
    if on { 0x23 } else { 0x24 }
}

fn with_checksum(body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(body.len() + 1);
    buf.put_slice(body);
    buf.put_u8(additive_checksum(body));
    buf.freeze()
}

/// 8-bit wrapping sum of all bytes
pub fn additive_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Split a brightness percentage into warm/cold channel levels (0-255)
fn white_levels(temperature: u8, brightness: u8) -> (u8, u8) {
    let temperature = temperature.min(100) as u32;
    let level = brightness.min(100) as u32 * 255 / 100;
    let cold = level * temperature / 100;
    let warm = level - cold;
    (warm as u8, cold as u8)
}

/// Convert RGB to (hue degrees 0-359, saturation %, value %)
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u16, u8, u8) {
    let (rf, gf, bf) = (r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * ((gf - bf) / delta).rem_euclid(6.0)
    } else if max == gf {
        60.0 * ((bf - rf) / delta + 2.0)
    } else {
        60.0 * ((rf - gf) / delta + 4.0)
    };
    let saturation = if max == 0.0 { 0.0 } else { delta / max };

    (
        (hue.round() as u16) % 360,
        (saturation * 100.0).round() as u8,
        (max * 100.0).round() as u8,
    )
}
