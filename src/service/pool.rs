//! Double-buffered ID pool.
//!
//! Each pool owns a primary buffer that requests are served from and a
//! secondary buffer that is refilled in the background. When the primary runs
//! dry the two are swapped; only when both are empty does a caller fill the
//! primary itself.
//!
//! Lock order is secondary then primary. While holding the primary lock the
//! secondary is only ever probed with `try_lock`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::config::BufferConfig;
use crate::domain::IdMode;
use crate::error::{AppError, Result};
use crate::service::IdGenerator;
use crate::service::buffer::{IdBuffer, fill_buffer};
use crate::telemetry::{IdMetrics, Slot};

/// Serve from primary, serve after a swap, serve after a synchronous fill.
const MAX_SERVE_ATTEMPTS: usize = 3;

/// Two buffer slots in front of one generator.
pub struct BufferPool {
    mode: IdMode,
    generator: Arc<dyn IdGenerator>,
    config: BufferConfig,
    metrics: Arc<dyn IdMetrics>,
    primary: Mutex<IdBuffer>,
    secondary: Mutex<IdBuffer>,
    refill_in_flight: AtomicBool,
    refill_dispatches: AtomicU64,
}

impl BufferPool {
    /// Create a pool with both slots empty.
    pub fn new(
        generator: Arc<dyn IdGenerator>,
        config: BufferConfig,
        metrics: Arc<dyn IdMetrics>,
    ) -> Self {
        Self {
            mode: generator.mode(),
            generator,
            config,
            metrics,
            primary: Mutex::new(IdBuffer::empty(config)),
            secondary: Mutex::new(IdBuffer::empty(config)),
            refill_in_flight: AtomicBool::new(false),
            refill_dispatches: AtomicU64::new(0),
        }
    }

    /// Mode this pool serves.
    #[must_use]
    pub const fn mode(&self) -> IdMode {
        self.mode
    }

    /// Serve one ID.
    ///
    /// Never blocks on the generator unless both buffers are exhausted.
    ///
    /// # Errors
    ///
    /// Returns `Generation` if the synchronous fill failed, or `PoolStarved`
    /// if no ID could be served within the attempt limit.
    pub async fn serve(self: &Arc<Self>) -> Result<i64> {
        for _ in 0..MAX_SERVE_ATTEMPTS {
            {
                let mut primary = self.primary.lock().await;
                if let Some(id) = primary.take() {
                    self.metrics.increment_generated(self.mode);
                    self.metrics
                        .set_buffer_remaining(self.mode, Slot::Primary, primary.remaining());
                    if primary.past_threshold() {
                        self.refill_secondary_if_exhausted();
                    }
                    return Ok(id);
                }
            }

            {
                let mut secondary = self.secondary.lock().await;
                if !secondary.is_exhausted() {
                    let mut primary = self.primary.lock().await;
                    if primary.is_exhausted() {
                        std::mem::swap(&mut *primary, &mut *secondary);
                        *secondary = IdBuffer::empty(self.config);
                        debug!(
                            mode = %self.mode,
                            remaining = primary.remaining(),
                            "Swapped buffers"
                        );
                        self.metrics
                            .set_buffer_remaining(self.mode, Slot::Primary, primary.remaining());
                        self.metrics.set_buffer_remaining(self.mode, Slot::Secondary, 0);
                        drop(primary);
                        drop(secondary);
                        self.dispatch_refill();
                    }
                    continue;
                }
            }

            let mut primary = self.primary.lock().await;
            if primary.is_exhausted() {
                self.fill(&mut primary, Slot::Primary).await?;
            }
            if let Some(id) = primary.take() {
                self.metrics.increment_generated(self.mode);
                self.metrics
                    .set_buffer_remaining(self.mode, Slot::Primary, primary.remaining());
                return Ok(id);
            }
        }

        Err(AppError::PoolStarved(self.mode))
    }

    /// Fill both slots.
    ///
    /// # Errors
    ///
    /// Returns `Generation` if either fill failed.
    pub async fn warm_up(&self) -> Result<()> {
        self.fill_primary().await?;
        self.fill_secondary().await
    }

    /// Fill the primary slot if it is exhausted.
    ///
    /// # Errors
    ///
    /// Returns `Generation` if the generator failed.
    pub async fn fill_primary(&self) -> Result<()> {
        let mut primary = self.primary.lock().await;
        if primary.is_exhausted() {
            self.fill(&mut primary, Slot::Primary).await?;
        }
        Ok(())
    }

    /// Fill the secondary slot if it is exhausted.
    ///
    /// # Errors
    ///
    /// Returns `Generation` if the generator failed.
    pub async fn fill_secondary(&self) -> Result<()> {
        let mut secondary = self.secondary.lock().await;
        if secondary.is_exhausted() {
            self.fill(&mut secondary, Slot::Secondary).await?;
        }
        Ok(())
    }

    /// Unserved IDs in the (primary, secondary) slots.
    pub async fn remaining(&self) -> (usize, usize) {
        let primary = self.primary.lock().await.remaining();
        let secondary = self.secondary.lock().await.remaining();
        (primary, secondary)
    }

    /// Number of background refills dispatched so far.
    #[must_use]
    pub fn refill_dispatches(&self) -> u64 {
        self.refill_dispatches.load(Ordering::Relaxed)
    }

    /// Whether a background refill is running.
    #[must_use]
    pub fn is_refilling(&self) -> bool {
        self.refill_in_flight.load(Ordering::Acquire)
    }

    fn refill_secondary_if_exhausted(self: &Arc<Self>) {
        // A held lock means a refill or swap is already dealing with it.
        let exhausted = self
            .secondary
            .try_lock()
            .is_ok_and(|secondary| secondary.is_exhausted());
        if exhausted {
            self.dispatch_refill();
        }
    }

    fn dispatch_refill(self: &Arc<Self>) {
        if self
            .refill_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.refill_dispatches.fetch_add(1, Ordering::Relaxed);
        debug!(mode = %self.mode, "Dispatching background refill");

        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut secondary = pool.secondary.lock().await;
            if secondary.is_exhausted()
                && let Err(e) = pool.fill(&mut secondary, Slot::Secondary).await
            {
                error!(mode = %pool.mode, error = %e, "Background buffer refill failed");
            }
            // Cleared before the slot is released: a swap that empties it next
            // must be able to dispatch again.
            pool.refill_in_flight.store(false, Ordering::Release);
            drop(secondary);
        });
    }

    async fn fill(&self, buffer: &mut IdBuffer, slot: Slot) -> Result<()> {
        let started = Instant::now();
        fill_buffer(buffer, self.generator.as_ref())
            .await
            .map_err(|e| AppError::Generation {
                mode: self.mode,
                source: Box::new(e),
            })?;

        self.metrics
            .set_buffer_remaining(self.mode, slot, buffer.remaining());
        info!(
            mode = %self.mode,
            buffer = slot.as_str(),
            size = buffer.remaining(),
            duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Buffer filled"
        );
        Ok(())
    }
}
