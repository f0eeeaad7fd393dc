//! Chunk reassembly and send-side splitting.
//!
//! Messages carry no length prefix: a chunk shorter than the transport's
//! maximum chunk size terminates the message. Bodies sent by this crate are
//! padded so their final chunk is always short.

use crate::constants::CHUNK_FILLER;
use bytes::{Bytes, BytesMut};
use tracing::trace;

/// Accumulates chunks of one logical message
#[derive(Debug)]
pub struct ChunkReassembler {
    max_chunk: usize,
    buffer: BytesMut,
}

impl ChunkReassembler {
    pub fn new(max_chunk: usize) -> Self {
        Self {
            max_chunk,
            buffer: BytesMut::new(),
        }
    }

    /// Append a chunk; returns the whole message once a short chunk arrives
    pub fn push(&mut self, chunk: &[u8]) -> Option<Bytes> {
        self.buffer.extend_from_slice(chunk);
        if is_terminal(chunk, self.max_chunk) {
            trace!(len = self.buffer.len(), "Message complete");
            Some(self.buffer.split().freeze())
        } else {
            None
        }
    }

    /// Bytes accumulated so far
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

/// Whether `chunk` ends a message
pub fn is_terminal(chunk: &[u8], max_chunk: usize) -> bool {
    chunk.len() < max_chunk
}

/// Append the filler byte when the body would end on a chunk boundary
pub fn pad_body(body: &[u8], max_chunk: usize) -> Bytes {
    let mut buf = BytesMut::with_capacity(body.len() + 1);
    buf.extend_from_slice(body);
    if body.len() % max_chunk == 0 {
        buf.extend_from_slice(&[CHUNK_FILLER]);
    }
    buf.freeze()
}

/// Pad and split a body into transport-sized chunks
pub fn split_body(body: &[u8], max_chunk: usize) -> Vec<Bytes> {
    let padded = pad_body(body, max_chunk);
    (0..padded.len())
        .step_by(max_chunk)
        .map(|start| padded.slice(start..(start + max_chunk).min(padded.len())))
        .collect()
}

/// Render a message byte-per-character, as the vendor firmware transmits it
pub fn to_text(message: &[u8]) -> String {
    message.iter().map(|&b| b as char).collect()
}
