//! Storage trait definitions.
//!
//! The shared store holds one monotonically increasing `max_id` per business
//! tag. Allocators claim exclusive ranges by atomically adding their step to
//! it; backends differ only in how that add-and-read is made atomic.

use async_trait::async_trait;

use crate::error::StorageResult;

/// Shared store that hands out exclusive ID ranges.
#[async_trait]
pub trait RangeStore: Send + Sync {
    /// Create the row for `biz_tag` if it does not exist yet.
    ///
    /// This is idempotent - an existing row is never modified.
    async fn initialize(&self, biz_tag: &str, step: i64) -> StorageResult<()>;

    /// Atomically add `step` to the tag's `max_id` and return the new value.
    ///
    /// The caller owns `(new_max - step, new_max]` exclusively.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the tag has no row, or a backend
    /// error if the update could not be applied. A failed claim leaves
    /// `max_id` unchanged.
    async fn claim(&self, biz_tag: &str, step: i64) -> StorageResult<i64>;

    /// Check if the storage backend is healthy and reachable.
    async fn health_check(&self) -> StorageResult<()>;

    /// Get the storage backend name.
    fn backend_name(&self) -> &'static str;

    /// Release connections held by the backend.
    async fn close(&self) {}
}
