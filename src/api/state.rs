//! Application state for Axum handlers.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::config::AppConfig;
use crate::error::Result;
use crate::service::{AllocationService, BufferPool, SegmentAllocator, SnowflakeGenerator};
use crate::storage::RangeStore;
use crate::telemetry::IdMetrics;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Shared range store.
    pub store: Arc<dyn RangeStore>,
    /// Segment allocator, kept for the preload task.
    pub segment: Arc<SegmentAllocator>,
    /// Allocation service.
    pub allocation: Arc<AllocationService>,
    /// Prometheus render handle, if metrics are enabled.
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    /// Build the generators, pools and allocation service.
    ///
    /// Buffers start empty; call [`AllocationService::warm_up`] to fill them.
    ///
    /// # Errors
    ///
    /// Returns an error if a site identifier is invalid or the segment tag
    /// cannot be initialized in the store.
    pub async fn new(
        config: Arc<AppConfig>,
        store: Arc<dyn RangeStore>,
        metrics: Arc<dyn IdMetrics>,
        metrics_handle: Option<PrometheusHandle>,
    ) -> Result<Self> {
        let snowflake = Arc::new(SnowflakeGenerator::new(
            &config.snowflake,
            Arc::clone(&metrics),
        )?);
        let segment = Arc::new(
            SegmentAllocator::new(&config.segment, Arc::clone(&store), Arc::clone(&metrics))
                .await?,
        );

        let allocation = Arc::new(AllocationService::new(
            Arc::new(BufferPool::new(snowflake, config.buffer, Arc::clone(&metrics))),
            Arc::new(BufferPool::new(
                segment.clone(),
                config.buffer,
                metrics,
            )),
        ));

        Ok(Self {
            config,
            store,
            segment,
            allocation,
            metrics_handle,
        })
    }
}
