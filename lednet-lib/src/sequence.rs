use std::sync::atomic::{AtomicU16, Ordering};

/// Monotonic frame sequence counter.
///
/// Shared by `Arc` between every codec that needs it; incrementing never
/// blocks. The value wraps at 16 bits, and 8-bit frame variants take the low
/// byte, so both wrap consistently.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    value: AtomicU16,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(value: u16) -> Self {
        Self {
            value: AtomicU16::new(value),
        }
    }

    /// Returns the current value and advances the counter
    pub fn next(&self) -> u16 {
        self.value.fetch_add(1, Ordering::Relaxed)
    }
}
