//! Segment range and persisted segment state.

use serde::{Deserialize, Serialize};

/// The locally owned slice of a claimed range.
///
/// `next..=end` are the IDs not yet handed out. A fresh range is empty
/// (`next = 1`, `end = 0`) so the first request claims from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentRange {
    next: i64,
    end: i64,
}

impl SegmentRange {
    /// An empty range.
    #[must_use]
    pub const fn empty() -> Self {
        Self { next: 1, end: 0 }
    }

    /// Hand out the next ID, or `None` when the range is used up.
    pub const fn advance(&mut self) -> Option<i64> {
        if self.next > self.end {
            return None;
        }
        let id = self.next;
        self.next += 1;
        Some(id)
    }

    /// Replace the range with `(new_max - step, new_max]`.
    pub const fn adopt(&mut self, new_max: i64, step: i64) {
        self.next = new_max - step + 1;
        self.end = new_max;
    }

    /// Number of IDs left in the range.
    #[must_use]
    pub const fn remaining(&self) -> i64 {
        if self.next > self.end {
            0
        } else {
            self.end - self.next + 1
        }
    }

    /// Inclusive upper bound of the claimed range.
    #[must_use]
    pub const fn end(&self) -> i64 {
        self.end
    }
}

impl Default for SegmentRange {
    fn default() -> Self {
        Self::empty()
    }
}

/// Persistent row of the shared store, as kept by the file backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentState {
    /// Business tag.
    pub biz_tag: String,

    /// Highest ID claimed so far.
    pub max_id: i64,

    /// Step the row was initialized with (informational).
    pub step: i64,

    /// Number of claims applied.
    pub version: u64,

    /// Last update timestamp (milliseconds since epoch).
    pub updated_at: i64,
}

impl SegmentState {
    /// Create a new row with nothing claimed yet.
    #[must_use]
    pub fn new(biz_tag: String, step: i64) -> Self {
        Self {
            biz_tag,
            max_id: 0,
            step,
            version: 0,
            updated_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}
