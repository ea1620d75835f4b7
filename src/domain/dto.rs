//! Data Transfer Objects for API requests and responses.

use serde::{Deserialize, Serialize};

use super::IdMode;

/// Standard API response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Response code (0 = success, non-zero = error).
    pub code: i32,

    /// Human-readable message.
    pub message: String,

    /// Response data (null on error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Create a success response.
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            message: "success".to_string(),
            data: Some(data),
        }
    }
}

/// Request to allocate one ID.
#[derive(Debug, Clone, Deserialize)]
pub struct MakeIdRequest {
    /// Generation mode; validated by the allocation service.
    #[serde(default)]
    pub mode: String,
}

/// One allocated ID.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IdResponse {
    /// The allocated ID.
    pub id: i64,
    /// Mode that produced it.
    pub mode: IdMode,
}
