//! Segment ID allocator.
//!
//! Claims contiguous ranges of `step` IDs from the shared store and hands
//! them out locally. Ranges claimed by different instances never overlap
//! because the store's add-and-read is atomic.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::SegmentConfig;
use crate::domain::{IdMode, SegmentRange};
use crate::error::{AppError, Result};
use crate::service::IdGenerator;
use crate::service::retry::ExponentialBackoff;
use crate::storage::RangeStore;
use crate::telemetry::IdMetrics;

/// Range-based ID generator for one business tag.
pub struct SegmentAllocator {
    biz_tag: String,
    step: i64,
    range: Mutex<SegmentRange>,
    store: Arc<dyn RangeStore>,
    backoff: ExponentialBackoff,
    metrics: Arc<dyn IdMetrics>,
}

impl SegmentAllocator {
    /// Create an allocator, making sure the tag exists in the store.
    ///
    /// No range is claimed until the first ID is requested.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the tag cannot be initialized.
    pub async fn new(
        config: &SegmentConfig,
        store: Arc<dyn RangeStore>,
        metrics: Arc<dyn IdMetrics>,
    ) -> Result<Self> {
        store.initialize(&config.biz_tag, config.step).await?;

        Ok(Self {
            biz_tag: config.biz_tag.clone(),
            step: config.step,
            range: Mutex::new(SegmentRange::empty()),
            store,
            backoff: ExponentialBackoff::from_config(&config.retry),
            metrics,
        })
    }

    /// Hand out the next ID, claiming a new range when the current one is used up.
    ///
    /// # Errors
    ///
    /// Returns `RangeExhaustion` if no range could be claimed within the retry budget.
    pub async fn next_id(&self) -> Result<i64> {
        let mut range = self.range.lock().await;
        if let Some(id) = range.advance() {
            return Ok(id);
        }

        let new_max = self.fetch_new_range().await?;
        range.adopt(new_max, self.step);
        range.advance().ok_or_else(|| {
            AppError::Internal(format!("claimed range ending at {new_max} is empty"))
        })
    }

    /// Claim a fresh range if fewer than half a step remain.
    ///
    /// Returns whether a range was claimed. Unused IDs of the replaced range
    /// are skipped.
    ///
    /// # Errors
    ///
    /// Returns `RangeExhaustion` if the claim failed within the retry budget.
    pub async fn preload_once(&self) -> Result<bool> {
        let mut range = self.range.lock().await;
        if range.remaining() >= self.step / 2 {
            return Ok(false);
        }

        let new_max = self.fetch_new_range().await?;
        range.adopt(new_max, self.step);
        Ok(true)
    }

    /// Run [`preload_once`](Self::preload_once) every `period` until the
    /// returned task is aborted.
    pub fn start_preload(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match self.preload_once().await {
                    Ok(true) => debug!(biz_tag = %self.biz_tag, "Preloaded segment range"),
                    Ok(false) => {}
                    Err(e) => error!(biz_tag = %self.biz_tag, error = %e, "Segment preload failed"),
                }
            }
        })
    }

    /// IDs left in the current range.
    pub async fn remaining(&self) -> i64 {
        self.range.lock().await.remaining()
    }

    /// Release the store's connections.
    pub async fn close(&self) {
        self.store.close().await;
    }

    async fn fetch_new_range(&self) -> Result<i64> {
        let store = &self.store;
        let biz_tag = self.biz_tag.as_str();
        let step = self.step;
        let started = Instant::now();

        match self
            .backoff
            .retry("claim_range", move || store.claim(biz_tag, step))
            .await
        {
            Ok(new_max) => {
                let elapsed = started.elapsed();
                self.metrics.observe_fetch_latency(elapsed.as_secs_f64());
                info!(
                    biz_tag,
                    new_max,
                    step,
                    duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "Claimed new segment range"
                );
                Ok(new_max)
            }
            Err(e) => {
                error!(biz_tag, error = %e, "Giving up on segment range claim");
                Err(AppError::RangeExhaustion {
                    biz_tag: biz_tag.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl IdGenerator for SegmentAllocator {
    async fn next_id(&self) -> Result<i64> {
        Self::next_id(self).await
    }

    fn mode(&self) -> IdMode {
        IdMode::Segment
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::config::RetryConfig;
    use crate::storage::testing::MemoryRangeStore;
    use crate::telemetry::NoopMetrics;
    use crate::telemetry::testing::RecordingMetrics;

    fn config(step: i64) -> SegmentConfig {
        SegmentConfig {
            biz_tag: "orders".to_string(),
            step,
            preload_interval_secs: 1,
            retry: RetryConfig {
                initial_interval_ms: 100,
                max_interval_ms: 400,
                max_elapsed_ms: 1000,
                multiplier: 2.0,
                randomization_factor: 0.0,
            },
        }
    }

    async fn allocator(step: i64, store: Arc<MemoryRangeStore>) -> SegmentAllocator {
        SegmentAllocator::new(&config(step), store, Arc::new(NoopMetrics))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_ids_are_sequential_across_ranges() {
        let store = Arc::new(MemoryRangeStore::default());
        let allocator = allocator(10, store.clone()).await;

        for expected in 1..=25 {
            assert_eq!(allocator.next_id().await.unwrap(), expected);
        }
        assert_eq!(store.claims(), 3);
        assert_eq!(allocator.remaining().await, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_instances_sharing_a_store_never_overlap() {
        let store = Arc::new(MemoryRangeStore::default());
        let first = Arc::new(allocator(7, store.clone()).await);
        let second = Arc::new(allocator(7, store.clone()).await);

        let mut handles = Vec::new();
        for allocator in [first.clone(), second.clone(), first, second] {
            handles.push(tokio::spawn(async move {
                let mut ids = Vec::new();
                for _ in 0..250 {
                    ids.push(allocator.next_id().await.unwrap());
                }
                ids
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.await.unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_store_failures_are_retried() {
        let store = Arc::new(MemoryRangeStore::default());
        let allocator = allocator(10, store.clone()).await;
        store.set_failures(2);

        assert_eq!(allocator.next_id().await.unwrap(), 1);
        assert_eq!(store.claims(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retry_budget_surfaces_and_next_call_retries() {
        let store = Arc::new(MemoryRangeStore::default());
        let allocator = allocator(10, store.clone()).await;
        store.set_failures(usize::MAX);

        let err = allocator.next_id().await.unwrap_err();
        assert!(matches!(
            err,
            AppError::RangeExhaustion { ref biz_tag, .. } if biz_tag == "orders"
        ));

        store.set_failures(0);
        assert_eq!(allocator.next_id().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_preload_claims_when_below_half_step() {
        let store = Arc::new(MemoryRangeStore::default());
        let allocator = allocator(10, store.clone()).await;

        for _ in 0..5 {
            allocator.next_id().await.unwrap();
        }
        assert!(!allocator.preload_once().await.unwrap());
        assert_eq!(store.claims(), 1);

        allocator.next_id().await.unwrap();
        assert!(allocator.preload_once().await.unwrap());
        assert_eq!(store.claims(), 2);
        assert_eq!(allocator.next_id().await.unwrap(), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn test_preload_task_runs_on_interval() {
        let store = Arc::new(MemoryRangeStore::default());
        let allocator = Arc::new(allocator(10, store.clone()).await);

        let handle = allocator.clone().start_preload(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        handle.abort();

        assert_eq!(store.claims(), 1);
        assert_eq!(allocator.remaining().await, 10);
    }

    #[tokio::test]
    async fn test_fetch_latency_is_recorded() {
        let store = Arc::new(MemoryRangeStore::default());
        let metrics = Arc::new(RecordingMetrics::default());
        let allocator = SegmentAllocator::new(&config(10), store, metrics.clone())
            .await
            .unwrap();

        allocator.next_id().await.unwrap();
        assert_eq!(metrics.fetch_latencies.lock().len(), 1);
    }
}
