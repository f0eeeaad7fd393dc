use std::io;
use std::time::Duration;
use thiserror::Error;

/// The primary error type for the `lednet-lib` library.
#[derive(Error, Debug)]
pub enum LedError {
    #[error("Checksum mismatch: frame carries {expected:#06x}, computed {actual:#06x}")]
    Checksum { expected: u16, actual: u16 },

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Payload of {len} bytes exceeds the frame maximum of {max}")]
    OversizedPayload { len: usize, max: usize },

    #[error("Refusing to encode an empty payload")]
    EmptyPayload,

    #[error("No endpoint mapped for path {0}")]
    UnknownEndpoint(String),

    #[error("Device {0} disconnected")]
    Disconnected(String),

    #[error("Read on characteristic {characteristic} timed out after {timeout:?}")]
    ReadTimeout { characteristic: String, timeout: Duration },

    #[error("A read is already pending on characteristic {0}")]
    Busy(String),

    #[error("Malformed telemetry: {0}")]
    MalformedTelemetry(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timeout during transport operation: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LedError>;
