//! ID allocation handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use tracing::warn;

use crate::api::state::AppState;
use crate::domain::{ApiResponse, IdResponse, MakeIdRequest};
use crate::error::{AppError, Result};

/// Query parameters for ID allocation.
#[derive(Debug, Deserialize)]
pub struct MakeIdQuery {
    /// Generation mode.
    #[serde(default)]
    pub mode: String,
}

/// Allocate one ID, mode given as a query parameter.
pub async fn make_id_get(
    State(state): State<AppState>,
    Query(query): Query<MakeIdQuery>,
) -> Result<Json<ApiResponse<IdResponse>>> {
    allocate(&state, query.mode).await
}

/// Allocate one ID, mode given in a JSON body.
pub async fn make_id_post(
    State(state): State<AppState>,
    Json(request): Json<MakeIdRequest>,
) -> Result<Json<ApiResponse<IdResponse>>> {
    allocate(&state, request.mode).await
}

/// Run the allocation on its own task under the request deadline.
///
/// On timeout the task is detached, so a buffer fill in progress still
/// completes and serves later callers.
async fn allocate(state: &AppState, mode: String) -> Result<Json<ApiResponse<IdResponse>>> {
    let allocation = Arc::clone(&state.allocation);
    let task = tokio::spawn(async move { allocation.make_id(&mode).await });

    let timeout = state.config.server.request_timeout();
    let response = match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result?,
        Ok(Err(e)) => {
            return Err(AppError::Internal(format!("allocation task failed: {e}")));
        }
        Err(_) => {
            warn!(
                timeout_ms = state.config.server.request_timeout_ms,
                "Allocation exceeded request deadline"
            );
            return Err(AppError::Timeout);
        }
    };

    Ok(Json(ApiResponse::success(response)))
}
