//! Request-facing allocation service.

use std::sync::Arc;

use tracing::{error, info};

use crate::domain::{IdMode, IdResponse};
use crate::error::Result;
use crate::service::pool::BufferPool;

/// Routes each request to the pool of its mode.
///
/// The two pools share nothing and never block each other.
pub struct AllocationService {
    snowflake: Arc<BufferPool>,
    segment: Arc<BufferPool>,
}

impl AllocationService {
    /// Create the service over one pool per mode.
    #[must_use]
    pub const fn new(snowflake: Arc<BufferPool>, segment: Arc<BufferPool>) -> Self {
        Self { snowflake, segment }
    }

    /// Allocate one ID in `mode`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMode` unless `mode` is exactly `snowflake` or
    /// `segment`, otherwise whatever the pool reports.
    pub async fn make_id(&self, mode: &str) -> Result<IdResponse> {
        let mode: IdMode = mode.parse()?;
        let id = self.pool(mode).serve().await?;
        Ok(IdResponse { id, mode })
    }

    /// Pool serving `mode`.
    #[must_use]
    pub const fn pool(&self, mode: IdMode) -> &Arc<BufferPool> {
        match mode {
            IdMode::Snowflake => &self.snowflake,
            IdMode::Segment => &self.segment,
        }
    }

    /// Fill every buffer ahead of traffic.
    ///
    /// Failures are logged and left for the first request to retry.
    pub async fn warm_up(&self) {
        for mode in IdMode::ALL {
            match self.pool(mode).warm_up().await {
                Ok(()) => info!(%mode, "Buffers warmed up"),
                Err(e) => error!(%mode, error = %e, "Buffer warm-up failed"),
            }
        }
    }
}
