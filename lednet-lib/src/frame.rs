//! Obfuscated 26-byte command frame used by generation-2+ LEDnetWF firmware.
//!
//! # Wire layout (before obfuscation)
//!
//! ```text
//! [0]      magic 0x5A
//! [1]      protocol 0x71
//! [2]      reserved
//! [3]      opcode
//! [4]      reserved
//! [5]      sub-opcode
//! [6]      sequence (low byte of the shared counter)
//! [7..10]  target, 24-bit big-endian
//! [10..12] reserved
//! [12]     selector
//! [13..22] payload (up to 9 bytes, zero padded)
//! [23]     nonce
//! [24..26] checksum, big-endian
//! ```
//!
//! Encoding XORs the whole buffer with a nonce-derived key, XORs a fixed window
//! with the vendor substitution table, appends an additive checksum and finally
//! swaps every byte pair from index 2 on. None of this is encryption.

use crate::constants::*;
use crate::error::{LedError, Result};
use crate::sequence::SequenceCounter;
use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;

/// A command to be carried in an obfuscated frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    pub opcode: u8,
    pub sub_opcode: u8,
    /// 24-bit target field
    pub target: u32,
    pub selector: u8,
    pub payload: Bytes,
}

impl CommandFrame {
    /// Wrap an inner device command with the standard command header values
    pub fn command(inner: impl Into<Bytes>) -> Self {
        let payload = inner.into();
        Self {
            opcode: FRAME_OPCODE_COMMAND,
            sub_opcode: FRAME_SUB_OPCODE_COMMAND,
            target: 0,
            selector: payload.len() as u8,
            payload,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.payload.is_empty() {
            return Err(LedError::EmptyPayload);
        }
        if self.payload.len() > MAX_FRAME_PAYLOAD {
            return Err(LedError::OversizedPayload {
                len: self.payload.len(),
                max: MAX_FRAME_PAYLOAD,
            });
        }
        if self.target > 0x00FF_FFFF {
            return Err(LedError::MalformedFrame(format!(
                "target {:#x} does not fit in 24 bits",
                self.target
            )));
        }
        Ok(())
    }

    /// Encode with an explicit sequence number and nonce
    pub fn encode_with(&self, sequence: u8, nonce: u8) -> Result<[u8; FRAME_LEN]> {
        self.validate()?;

        let mut buf = [0u8; FRAME_LEN];
        buf[0] = FRAME_MAGIC;
        buf[1] = FRAME_PROTOCOL;
        buf[OFFSET_OPCODE] = self.opcode;
        buf[OFFSET_SUB_OPCODE] = self.sub_opcode;
        buf[OFFSET_SEQUENCE] = sequence;
        buf[OFFSET_TARGET..OFFSET_TARGET + 3].copy_from_slice(&self.target.to_be_bytes()[1..]);
        buf[OFFSET_SELECTOR] = self.selector;
        buf[OFFSET_PAYLOAD..OFFSET_PAYLOAD + self.payload.len()].copy_from_slice(&self.payload);
        buf[OFFSET_NONCE] = nonce;

        xor_key(&mut buf, layer_key(nonce));
        xor_window(&mut buf);

        let checksum = checksum(&buf);
        buf[OFFSET_CHECKSUM..].copy_from_slice(&checksum.to_be_bytes());

        swap_pairs(&mut buf);
        Ok(buf)
    }
}

/// Fields recovered from a validated frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedFrame {
    pub opcode: u8,
    pub sub_opcode: u8,
    pub sequence: u8,
    pub target: u32,
    pub selector: u8,
    /// Whole payload region, zero padded
    pub payload: [u8; MAX_FRAME_PAYLOAD],
    pub nonce: u8,
}

impl DecodedFrame {
    /// Payload prefix whose length is given by the selector, as written by
    /// [`CommandFrame::command`]
    pub fn inner_command(&self) -> &[u8] {
        let len = (self.selector as usize).min(MAX_FRAME_PAYLOAD);
        &self.payload[..len]
    }
}

/// Validate and unscramble a raw frame
pub fn decode_frame(raw: &[u8]) -> Result<DecodedFrame> {
    let mut buf: [u8; FRAME_LEN] = raw.try_into().map_err(|_| {
        LedError::MalformedFrame(format!("expected {} bytes, got {}", FRAME_LEN, raw.len()))
    })?;

    swap_pairs(&mut buf);

    // Byte 0 sits outside the substitution window, so it exposes the layer-1 key.
    let key = buf[0] ^ FRAME_MAGIC;
    let expected = u16::from_be_bytes([buf[OFFSET_CHECKSUM], buf[OFFSET_CHECKSUM + 1]]);

    // The checksum was summed while its own slots still held obfuscated zeros.
    let mut scratch = buf;
    for (i, byte) in scratch.iter_mut().enumerate().skip(OFFSET_CHECKSUM) {
        *byte = key ^ window_mask(i);
    }
    let actual = checksum(&scratch);
    if actual != expected {
        return Err(LedError::Checksum { expected, actual });
    }

    xor_window(&mut buf);
    xor_key(&mut buf, key);

    if buf[1] != FRAME_PROTOCOL {
        return Err(LedError::MalformedFrame(format!(
            "unexpected protocol byte {:#04x}",
            buf[1]
        )));
    }
    let nonce = buf[OFFSET_NONCE];
    if layer_key(nonce) != key {
        return Err(LedError::MalformedFrame("nonce does not match frame key".to_string()));
    }

    let mut payload = [0u8; MAX_FRAME_PAYLOAD];
    payload.copy_from_slice(&buf[OFFSET_PAYLOAD..OFFSET_PAYLOAD + MAX_FRAME_PAYLOAD]);

    Ok(DecodedFrame {
        opcode: buf[OFFSET_OPCODE],
        sub_opcode: buf[OFFSET_SUB_OPCODE],
        sequence: buf[OFFSET_SEQUENCE],
        target: u32::from_be_bytes([0, buf[OFFSET_TARGET], buf[OFFSET_TARGET + 1], buf[OFFSET_TARGET + 2]]),
        selector: buf[OFFSET_SELECTOR],
        payload,
        nonce,
    })
}

/// Stateful front end: draws sequence numbers from a shared counter and a
/// fresh random nonce per frame.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    counter: Arc<SequenceCounter>,
}

impl FrameCodec {
    pub fn new(counter: Arc<SequenceCounter>) -> Self {
        Self { counter }
    }

    pub fn encode(&self, frame: &CommandFrame) -> Result<[u8; FRAME_LEN]> {
        // Reject before consuming a sequence number.
        frame.validate()?;
        let sequence = self.counter.next() as u8;
        let nonce: u8 = rand::random();
        debug!(sequence, nonce, opcode = frame.opcode, "Encoding frame");
        frame.encode_with(sequence, nonce)
    }

    pub fn decode(&self, raw: &[u8]) -> Result<DecodedFrame> {
        decode_frame(raw)
    }
}

fn layer_key(nonce: u8) -> u8 {
    nonce ^ KEY_CONST_A ^ KEY_CONST_B
}

fn window_mask(index: usize) -> u8 {
    if (WINDOW_START..WINDOW_START + WINDOW_LEN).contains(&index) {
        SUBSTITUTION_TABLE[index - WINDOW_START]
    } else {
        0
    }
}

fn xor_key(buf: &mut [u8; FRAME_LEN], key: u8) {
    for byte in buf.iter_mut() {
        *byte ^= key;
    }
}

fn xor_window(buf: &mut [u8; FRAME_LEN]) {
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte ^= window_mask(i);
    }
}

fn checksum(buf: &[u8]) -> u16 {
    buf.iter().fold(0u16, |acc, &b| acc.wrapping_add(b as u16))
}

/// Swap `buf[i]` and `buf[i + 1]` for every even `i >= 2`. Self-inverse for
/// even lengths.
fn swap_pairs(buf: &mut [u8; FRAME_LEN]) {
    for i in (2..FRAME_LEN - 1).step_by(2) {
        buf.swap(i, i + 1);
    }
}
