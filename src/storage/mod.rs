//! Storage layer module.
//!
//! This module provides the trait-based shared range store, allowing different
//! backends to be used without changing the allocation logic.

pub mod factory;
pub mod file;
pub mod mysql;
pub mod postgres;
pub mod redis;
pub mod traits;

pub use factory::create_store;
pub use file::FileRangeStore;
pub use traits::RangeStore;

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory store with injectable failures.

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::RangeStore;
    use crate::error::{StorageError, StorageResult};

    #[derive(Default)]
    pub struct MemoryRangeStore {
        rows: Mutex<HashMap<String, i64>>,
        failures: AtomicUsize,
        claims: AtomicUsize,
    }

    impl MemoryRangeStore {
        /// Fail the next `n` claims with `Unavailable`.
        pub fn set_failures(&self, n: usize) {
            self.failures.store(n, Ordering::SeqCst);
        }

        /// Successful claims so far.
        pub fn claims(&self) -> usize {
            self.claims.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RangeStore for MemoryRangeStore {
        async fn initialize(&self, biz_tag: &str, _step: i64) -> StorageResult<()> {
            self.rows.lock().entry(biz_tag.to_string()).or_insert(0);
            Ok(())
        }

        async fn claim(&self, biz_tag: &str, step: i64) -> StorageResult<i64> {
            let failed = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                return Err(StorageError::Unavailable);
            }

            let mut rows = self.rows.lock();
            let max_id = rows
                .get_mut(biz_tag)
                .ok_or_else(|| StorageError::NotFound(biz_tag.to_string()))?;
            *max_id += step;
            self.claims.fetch_add(1, Ordering::SeqCst);
            Ok(*max_id)
        }

        async fn health_check(&self) -> StorageResult<()> {
            Ok(())
        }

        fn backend_name(&self) -> &'static str {
            "memory"
        }
    }
}
