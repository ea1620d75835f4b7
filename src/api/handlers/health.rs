//! Health check handlers.

use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};

use crate::api::state::AppState;
use crate::error::ErrorCode;

/// Liveness probe - always returns 200 if the service is running.
pub async fn health() -> Json<Value> {
    Json(json!({
        "code": 0,
        "message": "success",
        "data": {
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

/// Readiness probe - checks that the shared range store is reachable.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let store_ok = match state.store.health_check().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                backend = state.store.backend_name(),
                error = %e,
                "Store health check failed"
            );
            false
        }
    };

    let status_code = if store_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = Json(json!({
        "code": if store_ok { 0 } else { ErrorCode::SERVICE_UNAVAILABLE.as_i32() },
        "message": if store_ok { "success" } else { "service unavailable" },
        "data": {
            "ready": store_ok,
            "components": {
                "store": {
                    "backend": state.store.backend_name(),
                    "healthy": store_ok
                }
            }
        }
    }));

    (status_code, response)
}

/// Prometheus metrics endpoint.
pub async fn metrics(State(state): State<AppState>) -> String {
    let mut output = String::new();

    output.push_str("# HELP idmaker_up Whether the service is up\n");
    output.push_str("# TYPE idmaker_up gauge\n");
    output.push_str("idmaker_up 1\n");

    if let Some(handle) = &state.metrics_handle {
        output.push_str(&handle.render());
    }

    output
}
