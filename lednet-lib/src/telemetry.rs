//! Telemetry decoding for LEDnetWF state reports.
//!
//! The controller answers a state query on the notify characteristic with a
//! JSON envelope `{"payload": "<hex>"}`. The decoded payload has a fixed
//! layout; fields are interpreted according to the mode byte.
//!
//! Decoding never fails the caller. Anything unreadable becomes a snapshot
//! with [`Mode::Unknown`] and the offending input kept in `diagnostic`.

use crate::chunk::to_text;
use crate::constants::*;
use crate::error::{LedError, Result};
use chrono::{DateTime, Utc};
use num_enum::{FromPrimitive, IntoPrimitive};
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use tracing::{debug, warn};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Fixed prefix of a state report
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct StateReportRaw {
    pub header: u8,
    pub model: u8,
    pub power: u8,
    pub preset: u8,
    pub mode: u8,
    pub white_brightness: u8,
    /// Red in RGB mode, brightness in symphony mode
    pub channel_1: u8,
    /// Green in RGB mode, speed in symphony mode
    pub channel_2: u8,
    pub channel_3: u8,
    pub white_temperature: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, FromPrimitive, IntoPrimitive, Serialize)]
#[repr(u8)]
pub enum Power {
    On = 0x23,
    Off = 0x24,
    #[num_enum(catch_all)]
    Unknown(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum Mode {
    Rgb,
    White,
    /// Animated preset, by index
    Symphony(u8),
    Unknown,
}

impl Mode {
    pub fn from_selector(selector: u8) -> Self {
        match selector {
            MODE_RGB => Mode::Rgb,
            MODE_WHITE => Mode::White,
            MODE_SYMPHONY_FIRST..=MODE_SYMPHONY_LAST => Mode::Symphony(selector),
            _ => Mode::Unknown,
        }
    }
}

/// Snapshot of a controller's state. Each decode replaces the previous one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceState {
    pub power: Option<Power>,
    pub mode: Mode,
    pub rgb: Option<(u8, u8, u8)>,
    pub white_temperature: Option<u8>,
    pub white_brightness: Option<u8>,
    pub symphony_speed: Option<u8>,
    pub symphony_brightness: Option<u8>,
    pub firmware_version: Option<u8>,
    pub last_updated: DateTime<Utc>,
    /// Raw input kept when the mode or payload could not be interpreted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl Default for DeviceState {
    /// Nothing known yet
    fn default() -> Self {
        Self {
            power: None,
            mode: Mode::Unknown,
            rgb: None,
            white_temperature: None,
            white_brightness: None,
            symphony_speed: None,
            symphony_brightness: None,
            firmware_version: None,
            last_updated: Utc::now(),
            diagnostic: None,
        }
    }
}

impl DeviceState {
    fn unknown(diagnostic: String) -> Self {
        Self {
            diagnostic: Some(diagnostic),
            ..Self::default()
        }
    }

    pub fn is_on(&self) -> bool {
        self.power == Some(Power::On)
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    payload: Option<String>,
}

/// Decode a hex-decoded state payload
pub fn decode_payload(payload: &[u8]) -> DeviceState {
    match parse_report(payload) {
        Ok(state) => state,
        Err(e) => {
            warn!(payload = %hex::encode(payload), "Unreadable telemetry: {}", e);
            DeviceState::unknown(hex::encode(payload))
        }
    }
}

/// Decode a reassembled notification carrying the JSON envelope
pub fn decode_notification(message: &[u8]) -> DeviceState {
    let text = to_text(message);
    match extract_payload(&text) {
        Ok(payload) => decode_payload(&payload),
        Err(e) => {
            warn!(response = %text, "Unreadable notification: {}", e);
            DeviceState::unknown(text)
        }
    }
}

fn extract_payload(text: &str) -> Result<Vec<u8>> {
    // Vendor firmware may emit bytes before the JSON object.
    let start = text
        .find('{')
        .ok_or_else(|| LedError::MalformedTelemetry("no JSON object in notification".to_string()))?;
    let envelope: Envelope = serde_json::from_str(&text[start..])?;
    let payload = envelope
        .payload
        .ok_or_else(|| LedError::MalformedTelemetry("missing payload field".to_string()))?;
    debug!(%payload, "Response payload");
    Ok(hex::decode(payload.trim())?)
}

fn parse_report(payload: &[u8]) -> Result<DeviceState> {
    let (raw, rest) = StateReportRaw::ref_from_prefix(payload).map_err(|_| {
        LedError::MalformedTelemetry(format!(
            "expected at least {} bytes, got {}",
            TELEMETRY_MIN_LEN,
            payload.len()
        ))
    })?;

    let power = Power::from_primitive(raw.power);
    if let Power::Unknown(byte) = power {
        warn!("Unknown power byte: {:#04x}", byte);
    }

    let mut state = DeviceState {
        power: Some(power),
        mode: Mode::from_selector(raw.mode),
        rgb: None,
        white_temperature: None,
        white_brightness: None,
        symphony_speed: None,
        symphony_brightness: None,
        firmware_version: rest.first().copied(),
        last_updated: Utc::now(),
        diagnostic: None,
    };

    match state.mode {
        Mode::Rgb => state.rgb = Some((raw.channel_1, raw.channel_2, raw.channel_3)),
        Mode::White => {
            state.white_temperature = Some(raw.white_temperature);
            state.white_brightness = Some(raw.white_brightness);
        }
        Mode::Symphony(_) => {
            state.symphony_brightness = Some(raw.channel_1);
            state.symphony_speed = Some(raw.channel_2);
        }
        Mode::Unknown => {
            warn!(mode = raw.mode, payload = %hex::encode(payload), "Unknown mode");
            state.diagnostic = Some(hex::encode(payload));
        }
    }
    Ok(state)
}
