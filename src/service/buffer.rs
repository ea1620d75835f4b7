//! Fixed-capacity buffer of pre-generated IDs.

use crate::config::BufferConfig;
use crate::error::Result;
use crate::service::IdGenerator;

/// Ordered batch of IDs with a read cursor.
///
/// IDs before the cursor have been served exactly once and are never served
/// again from this buffer.
#[derive(Debug, Clone)]
pub struct IdBuffer {
    ids: Vec<i64>,
    cursor: usize,
    capacity: usize,
    refill_threshold: usize,
}

impl IdBuffer {
    /// An exhausted buffer sized by `config`.
    #[must_use]
    pub const fn empty(config: BufferConfig) -> Self {
        Self {
            ids: Vec::new(),
            cursor: 0,
            capacity: config.capacity,
            refill_threshold: config.refill_threshold,
        }
    }

    /// Serve the next ID.
    pub fn take(&mut self) -> Option<i64> {
        let id = *self.ids.get(self.cursor)?;
        self.cursor += 1;
        Some(id)
    }

    /// IDs not yet served.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.ids.len() - self.cursor
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// IDs served since the last fill.
    #[must_use]
    pub const fn consumed(&self) -> usize {
        self.cursor
    }

    /// Whether the consumed count has reached the refill threshold.
    #[must_use]
    pub const fn past_threshold(&self) -> bool {
        self.cursor >= self.refill_threshold
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    fn commit(&mut self, ids: Vec<i64>) {
        self.ids = ids;
        self.cursor = 0;
    }
}

/// Fill `buffer` with exactly `capacity` IDs from `generator`.
///
/// IDs are collected aside and only committed once all of them were
/// generated, so a failed fill leaves the buffer as it was.
///
/// # Errors
///
/// Returns the first error reported by the generator.
pub async fn fill_buffer(buffer: &mut IdBuffer, generator: &dyn IdGenerator) -> Result<()> {
    let mut ids = Vec::with_capacity(buffer.capacity);
    for _ in 0..buffer.capacity {
        ids.push(generator.next_id().await?);
    }
    buffer.commit(ids);
    Ok(())
}
