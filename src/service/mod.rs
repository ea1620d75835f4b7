//! Service layer module.
//!
//! Contains the ID generators, the double-buffered pools in front of them and
//! the allocation facade used by the request handlers.

pub mod allocation;
pub mod buffer;
pub mod pool;
pub mod retry;
pub mod segment;
pub mod snowflake;

use async_trait::async_trait;

use crate::domain::IdMode;
use crate::error::Result;

pub use allocation::AllocationService;
pub use buffer::IdBuffer;
pub use pool::BufferPool;
pub use retry::ExponentialBackoff;
pub use segment::SegmentAllocator;
pub use snowflake::{Clock, SnowflakeGenerator, SystemClock};

/// Source of unique IDs that a buffer can be filled from.
#[async_trait]
pub trait IdGenerator: Send + Sync {
    /// Produce the next ID.
    async fn next_id(&self) -> Result<i64>;

    /// Mode this generator serves.
    fn mode(&self) -> IdMode;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Generators with scripted behaviour for pool tests.

    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::IdGenerator;
    use crate::domain::IdMode;
    use crate::error::{AppError, Result};

    /// Hands out 1, 2, 3, ... and counts calls.
    pub struct CountingGenerator {
        mode: IdMode,
        next: AtomicI64,
        pub calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl CountingGenerator {
        pub fn new(mode: IdMode) -> Self {
            Self {
                mode,
                next: AtomicI64::new(1),
                calls: AtomicUsize::new(0),
                delay: None,
            }
        }

        /// Sleep before every ID, to keep background fills in flight.
        pub fn with_delay(mode: IdMode, delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::new(mode)
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IdGenerator for CountingGenerator {
        async fn next_id(&self) -> Result<i64> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.next.fetch_add(1, Ordering::SeqCst))
        }

        fn mode(&self) -> IdMode {
            self.mode
        }
    }

    /// Fails while a failure budget remains, then counts up from 1.
    pub struct FlakyGenerator {
        mode: IdMode,
        failures: AtomicUsize,
        next: AtomicI64,
    }

    impl FlakyGenerator {
        pub fn new(mode: IdMode, failures: usize) -> Self {
            Self {
                mode,
                failures: AtomicUsize::new(failures),
                next: AtomicI64::new(1),
            }
        }

        /// Fail the next `n` calls.
        pub fn fail_next(&self, n: usize) {
            self.failures.store(n, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl IdGenerator for FlakyGenerator {
        async fn next_id(&self) -> Result<i64> {
            let failed = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                return Err(AppError::RangeExhaustion {
                    biz_tag: "test".to_string(),
                    reason: "store offline".to_string(),
                });
            }
            Ok(self.next.fetch_add(1, Ordering::SeqCst))
        }

        fn mode(&self) -> IdMode {
            self.mode
        }
    }
}
