//! Error handling module.
//!
//! This module provides unified error handling with proper HTTP status code mapping
//! and standardized API error responses.

pub mod codes;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::domain::IdMode;

pub use codes::ErrorCode;

/// Application-level error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Requested generation mode is not recognized.
    #[error("Invalid mode: {0}, must be 'snowflake' or 'segment'")]
    InvalidMode(String),

    /// A site identifier does not fit its 5-bit field.
    #[error("Invalid site id: datacenter_id={datacenter_id}, machine_id={machine_id} (each must be 0-31)")]
    InvalidSiteId {
        /// Configured datacenter identifier.
        datacenter_id: i64,
        /// Configured machine identifier.
        machine_id: i64,
    },

    /// Clock moved backwards further than the tolerated drift.
    #[error("Clock moved backwards: last={last}ms, current={current}ms")]
    ClockRegression {
        /// Last timestamp used by the generator.
        last: i64,
        /// Timestamp observed now.
        current: i64,
    },

    /// No range could be claimed within the retry budget.
    #[error("Range exhausted for '{biz_tag}': {reason}")]
    RangeExhaustion {
        /// Business tag whose range could not be claimed.
        biz_tag: String,
        /// Last store error seen.
        reason: String,
    },

    /// Filling a buffer failed.
    #[error("Failed to fill {mode} buffer: {source}")]
    Generation {
        /// Pool whose buffer failed to fill.
        mode: IdMode,
        /// Error reported by the generator.
        #[source]
        source: Box<AppError>,
    },

    /// The serve loop ran out of attempts without producing an ID.
    #[error("No buffered IDs available for {0}")]
    PoolStarved(IdMode),

    /// The request deadline elapsed.
    #[error("Request timed out")]
    Timeout,

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Storage backend error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get the error code for this error.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidMode(_) => ErrorCode::INVALID_MODE,
            Self::InvalidSiteId { .. } => ErrorCode::INVALID_SITE_ID,
            Self::InvalidConfig(_) => ErrorCode::INVALID_CONFIG,
            Self::ClockRegression { .. } => ErrorCode::CLOCK_REGRESSION,
            Self::RangeExhaustion { .. } => ErrorCode::RANGE_EXHAUSTED,
            Self::Generation { source, .. } => source.error_code(),
            Self::PoolStarved(_) => ErrorCode::POOL_STARVED,
            Self::Timeout => ErrorCode::TIMEOUT,
            Self::Storage(_) => ErrorCode::STORAGE_ERROR,
            Self::Internal(_) => ErrorCode::INTERNAL_ERROR,
        }
    }

    /// Get the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidMode(_) => StatusCode::BAD_REQUEST,
            Self::ClockRegression { .. } | Self::RangeExhaustion { .. } | Self::PoolStarved(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Generation { source, .. } => source.status_code(),
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::InvalidSiteId { .. }
            | Self::InvalidConfig(_)
            | Self::Storage(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Unwrap a buffer fill failure to the generator error behind it.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Generation { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code().as_i32();
        let message = self.to_string();

        tracing::error!(
            error_code = code,
            status = %status,
            message = %message,
            "Request failed"
        );

        let body = Json(json!({
            "code": code,
            "message": message,
            "data": null
        }));

        (status, body).into_response()
    }
}

/// Storage-specific error type.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Connection error.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Query execution error.
    #[error("Query failed: {0}")]
    Query(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Lock acquisition failed.
    #[error("Failed to acquire lock: {0}")]
    LockFailed(String),

    /// File I/O error.
    #[error("File I/O error: {0}")]
    FileIO(String),

    /// Data not found.
    #[error("Data not found: {0}")]
    NotFound(String),

    /// Backend not available.
    #[error("Storage backend unavailable")]
    Unavailable,
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::FileIO(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound(err.to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Connection(err.to_string())
            }
            other => Self::Query(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        Self::Query(err.to_string())
    }
}

impl From<deadpool_redis::PoolError> for StorageError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Self::Connection(err.to_string())
    }
}

/// Result type alias using `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Result type alias using `StorageError`.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
