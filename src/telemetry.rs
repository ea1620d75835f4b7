//! Metrics capability injected into generators and buffer pools.
//!
//! The core only talks to [`IdMetrics`]. [`PrometheusMetrics`] forwards to the
//! `metrics` facade, whose global recorder is installed once at startup by
//! [`install_prometheus`]. Recording never fails the caller.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::IdMode;
use crate::error::AppError;

/// Counter of IDs served, labelled by mode.
pub const ID_GENERATE_TOTAL: &str = "id_generate_total";
/// Gauge of IDs left in a buffer slot, labelled by mode and buffer.
pub const BUFFER_USAGE: &str = "buffer_usage";
/// Histogram of range claim latency against the shared store.
pub const STORE_FETCH_DURATION: &str = "store_fetch_duration_seconds";
/// Gauge of the last observed backward clock jump.
pub const CLOCK_OFFSET: &str = "clock_offset_milliseconds";

/// Buffer slot within a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// The buffer currently being served from.
    Primary,
    /// The standby buffer refilled in the background.
    Secondary,
}

impl Slot {
    /// Metrics label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }
}

/// Sink for the service's operational metrics.
pub trait IdMetrics: Send + Sync {
    /// One ID was handed to a caller.
    fn increment_generated(&self, mode: IdMode);

    /// A buffer slot now holds `remaining` unserved IDs.
    fn set_buffer_remaining(&self, mode: IdMode, slot: Slot, remaining: usize);

    /// A range claim against the shared store took `seconds`.
    fn observe_fetch_latency(&self, seconds: f64);

    /// The clock was seen `millis` behind the last issued timestamp.
    fn set_clock_offset(&self, millis: i64);
}

/// Records through the global `metrics` recorder.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrometheusMetrics;

impl IdMetrics for PrometheusMetrics {
    fn increment_generated(&self, mode: IdMode) {
        counter!(ID_GENERATE_TOTAL, "mode" => mode.as_str()).increment(1);
    }

    #[allow(clippy::cast_precision_loss)]
    fn set_buffer_remaining(&self, mode: IdMode, slot: Slot, remaining: usize) {
        gauge!(BUFFER_USAGE, "mode" => mode.as_str(), "buffer" => slot.as_str())
            .set(remaining as f64);
    }

    fn observe_fetch_latency(&self, seconds: f64) {
        histogram!(STORE_FETCH_DURATION).record(seconds);
    }

    #[allow(clippy::cast_precision_loss)]
    fn set_clock_offset(&self, millis: i64) {
        gauge!(CLOCK_OFFSET).set(millis as f64);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl IdMetrics for NoopMetrics {
    fn increment_generated(&self, _mode: IdMode) {}

    fn set_buffer_remaining(&self, _mode: IdMode, _slot: Slot, _remaining: usize) {}

    fn observe_fetch_latency(&self, _seconds: f64) {}

    fn set_clock_offset(&self, _millis: i64) {}
}

/// Install the Prometheus recorder as the process-wide `metrics` recorder.
///
/// # Errors
///
/// Returns an error if a recorder is already installed.
pub fn install_prometheus() -> Result<PrometheusHandle, AppError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| AppError::Internal(format!("failed to install metrics recorder: {e}")))?;

    metrics::describe_counter!(ID_GENERATE_TOTAL, "Total number of IDs generated");
    metrics::describe_gauge!(BUFFER_USAGE, "Number of remaining IDs in buffer");
    metrics::describe_histogram!(
        STORE_FETCH_DURATION,
        metrics::Unit::Seconds,
        "Range claim duration in seconds"
    );
    metrics::describe_gauge!(CLOCK_OFFSET, "Backward clock offset in milliseconds");

    Ok(handle)
}
