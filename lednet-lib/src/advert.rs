//! Protocol variant selection from advertised device names.
//!
//! `LEDnetWF` controllers append a two-digit hex firmware generation to their
//! name (`LEDnetWF0100…`, `LEDnetWF0200…`). Generation 1 speaks the plain
//! legacy frame; later generations use the obfuscated frame.

use crate::constants::{BLE2JSON_NAME, LEDNET_NAME_PREFIX};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use strum_macros::Display;

static LEDNET_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{}(?P<generation>[0-9A-Fa-f]{{2}})?", LEDNET_NAME_PREFIX))
        .expect("static regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum ProtocolVariant {
    /// 16-bit sequence, plain inner command
    #[strum(to_string = "legacy")]
    Legacy,
    /// 26-byte obfuscated frame
    #[strum(to_string = "obfuscated")]
    Obfuscated,
}

impl ProtocolVariant {
    pub fn for_generation(generation: u8) -> Self {
        if generation <= 1 {
            ProtocolVariant::Legacy
        } else {
            ProtocolVariant::Obfuscated
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceKind {
    LedNet {
        generation: Option<u8>,
        variant: ProtocolVariant,
    },
    /// Self-describing JSON vendor, passed through untouched
    Ble2Json,
}

/// Classify a peripheral by its advertised name
pub fn classify(name: &str) -> Option<DeviceKind> {
    if name == BLE2JSON_NAME {
        return Some(DeviceKind::Ble2Json);
    }
    let captures = LEDNET_NAME.captures(name)?;
    let generation = captures
        .name("generation")
        .and_then(|m| u8::from_str_radix(m.as_str(), 16).ok());
    // Names without a generation come from current firmware.
    let variant = generation.map_or(ProtocolVariant::Obfuscated, ProtocolVariant::for_generation);
    Some(DeviceKind::LedNet { generation, variant })
}
