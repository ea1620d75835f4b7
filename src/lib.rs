//! # IDMaker Worker
//!
//! A distributed unique-ID allocation service with two interchangeable
//! generation modes:
//!
//! - **Snowflake**: 64-bit IDs packing a millisecond timestamp, two site
//!   identifiers and a per-millisecond sequence, generated locally
//! - **Segment**: IDs handed out from contiguous ranges claimed atomically
//!   from a shared store
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                            Worker Service                            │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌────────────┐   ┌─────────────┐   ┌─────────────┐  │
//! │  │ API Layer │ → │ Allocation │ → │ BufferPool  │ → │ Generators  │  │
//! │  │  (Axum)   │   │  Service   │   │ (2 buffers) │   │ + RangeStore│  │
//! │  └───────────┘   └────────────┘   └─────────────┘   └─────────────┘  │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod storage;
pub mod telemetry;

use std::net::SocketAddr;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use crate::api::create_router;
use crate::api::state::AppState;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::storage::create_store;
use crate::telemetry::{IdMetrics, NoopMetrics, PrometheusMetrics, install_prometheus};

/// Run the IDMaker worker service.
///
/// This function:
/// 1. Loads configuration from files and environment
/// 2. Initializes logging and metrics
/// 3. Connects the shared range store
/// 4. Builds the generators, buffer pools and allocation service
/// 5. Warms up the buffers and starts the segment preload task
/// 6. Starts the HTTP server and handles graceful shutdown
///
/// # Errors
///
/// Returns an error if:
/// - Configuration cannot be loaded
/// - The range store fails to initialize
/// - A site identifier is invalid
/// - HTTP server fails to bind
pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::load().map_err(|e| AppError::InvalidConfig(e.to_string()))?;

    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting IDMaker Worker"
    );

    let (metrics, metrics_handle): (Arc<dyn IdMetrics>, Option<PrometheusHandle>) =
        if config.observability.metrics_enabled {
            (Arc::new(PrometheusMetrics), Some(install_prometheus()?))
        } else {
            (Arc::new(NoopMetrics), None)
        };

    let store = create_store(&config.storage).await?;
    info!(backend = store.backend_name(), "Range store initialized");

    let state = AppState::new(Arc::new(config.clone()), store, metrics, metrics_handle).await?;
    state.allocation.warm_up().await;

    let preload = Arc::clone(&state.segment).start_preload(config.segment.preload_interval());

    let app = create_router(state.clone());

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    preload.abort();
    state.segment.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize logging based on configuration.
fn init_logging(config: &AppConfig) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.observability.log_format == "json" {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber.with(fmt::layer()).init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown");
        }
        () = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
