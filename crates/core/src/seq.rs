// crates/core/src/seq.rs
//! Process-wide progress sequence allocation.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counter shared by every tracker in the process.
///
/// Each emitted [`crate::record::ProgressRecord`] is stamped with the next
/// value so the remote consumer can order updates across tags and detect
/// gaps. Trackers never make local decisions based on the value.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    next: AtomicU64,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next sequence number. Starts at 0, strictly increasing,
    /// never hands the same value to two callers.
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}
