//! Plain command frame used by generation-1 LEDnetWF firmware.
//!
//! ```text
//! [0..2] sequence, 16-bit big-endian
//! [2..5] 80 00 00
//! [5]    inner length
//! [6]    inner length + 1
//! [7]    marker (0x0B command, 0x0A query)
//! [8..]  inner command (checksum included except for preset mode)
//! ```

use crate::command::DeviceCommand;
use crate::constants::{LEGACY_HEADER_LEN, LEGACY_PREFIX};
use crate::error::{LedError, Result};
use crate::sequence::SequenceCounter;
use bytes::{BufMut, Bytes, BytesMut};
use std::sync::Arc;

/// Build a legacy frame around an inner command
pub fn wrap(sequence: u16, marker: u8, inner: &[u8]) -> Result<Bytes> {
    // Both length bytes must fit.
    if inner.len() >= u8::MAX as usize {
        return Err(LedError::OversizedPayload {
            len: inner.len(),
            max: u8::MAX as usize - 1,
        });
    }
    let len = inner.len() as u8;

    let mut buf = BytesMut::with_capacity(LEGACY_HEADER_LEN + inner.len());
    buf.put_u16(sequence);
    buf.put_slice(&LEGACY_PREFIX);
    buf.put_u8(len);
    buf.put_u8(len + 1);
    buf.put_u8(marker);
    buf.put_slice(inner);
    Ok(buf.freeze())
}

/// A legacy frame split into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyFrame {
    pub sequence: u16,
    pub marker: u8,
    pub inner: Bytes,
}

impl TryFrom<Bytes> for LegacyFrame {
    type Error = LedError;

    fn try_from(mut bytes: Bytes) -> Result<Self> {
        if bytes.len() < LEGACY_HEADER_LEN {
            return Err(LedError::MalformedFrame(format!(
                "legacy frame too short: {} bytes",
                bytes.len()
            )));
        }
        let header = bytes.split_to(LEGACY_HEADER_LEN);
        if header[2..5] != LEGACY_PREFIX {
            return Err(LedError::MalformedFrame("legacy prefix mismatch".to_string()));
        }
        let len = header[5] as usize;
        if header[6] as usize != len + 1 || bytes.len() != len {
            return Err(LedError::MalformedFrame(format!(
                "legacy length fields {}/{} do not match {} inner bytes",
                header[5],
                header[6],
                bytes.len()
            )));
        }
        Ok(LegacyFrame {
            sequence: u16::from_be_bytes([header[0], header[1]]),
            marker: header[7],
            inner: bytes,
        })
    }
}

#[derive(Debug, Clone)]
pub struct LegacyCodec {
    counter: Arc<SequenceCounter>,
}

impl LegacyCodec {
    pub fn new(counter: Arc<SequenceCounter>) -> Self {
        Self { counter }
    }

    pub fn encode(&self, command: &DeviceCommand) -> Result<Bytes> {
        wrap(self.counter.next(), command.legacy_marker(), &command.legacy_payload())
    }
}
