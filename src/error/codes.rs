//! Error code constants.
//!
//! Error codes are organized by category:
//! - 1xxx: Configuration errors
//! - 3xxx: Validation errors
//! - 4xxx: Resource errors
//! - 5xxx: Internal/System errors

/// Error code type with semantic categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(i32);

impl ErrorCode {
    // ===== Configuration Errors (1xxx) =====

    /// Invalid configuration parameters.
    pub const INVALID_CONFIG: Self = Self(1003);

    /// Site identifier outside its bit range.
    pub const INVALID_SITE_ID: Self = Self(1005);

    // ===== Validation Errors (3xxx) =====

    /// Unknown generation mode.
    pub const INVALID_MODE: Self = Self(3004);

    // ===== Resource Errors (4xxx) =====

    /// No range could be claimed from the shared store.
    pub const RANGE_EXHAUSTED: Self = Self(4003);

    /// No buffered ID could be served.
    pub const POOL_STARVED: Self = Self(4004);

    // ===== Internal/System Errors (5xxx) =====

    /// Storage backend error.
    pub const STORAGE_ERROR: Self = Self(5001);

    /// Internal server error.
    pub const INTERNAL_ERROR: Self = Self(5002);

    /// Service unavailable.
    pub const SERVICE_UNAVAILABLE: Self = Self(5003);

    /// System clock moved backwards beyond tolerance.
    pub const CLOCK_REGRESSION: Self = Self(5004);

    /// Request deadline exceeded.
    pub const TIMEOUT: Self = Self(5005);

    /// Get the error code as an i32.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Get the category of this error code.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self.0 {
            1000..=1999 => ErrorCategory::Configuration,
            3000..=3999 => ErrorCategory::Validation,
            4000..=4999 => ErrorCategory::Resource,
            5000..=5999 => ErrorCategory::Internal,
            _ => ErrorCategory::Unknown,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> Self {
        code.0
    }
}

/// Error category based on error code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Configuration-related errors (1xxx).
    Configuration,
    /// Validation errors (3xxx).
    Validation,
    /// Resource errors (4xxx).
    Resource,
    /// Internal/system errors (5xxx).
    Internal,
    /// Unknown category.
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Validation => write!(f, "validation"),
            Self::Resource => write!(f, "resource"),
            Self::Internal => write!(f, "internal"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_values() {
        assert_eq!(ErrorCode::INVALID_CONFIG.as_i32(), 1003);
        assert_eq!(ErrorCode::INVALID_MODE.as_i32(), 3004);
        assert_eq!(ErrorCode::RANGE_EXHAUSTED.as_i32(), 4003);
        assert_eq!(ErrorCode::CLOCK_REGRESSION.as_i32(), 5004);
        assert_eq!(i32::from(ErrorCode::TIMEOUT), 5005);
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(
            ErrorCode::INVALID_SITE_ID.category(),
            ErrorCategory::Configuration
        );
        assert_eq!(ErrorCode::INVALID_MODE.category(), ErrorCategory::Validation);
        assert_eq!(ErrorCode::POOL_STARVED.category(), ErrorCategory::Resource);
        assert_eq!(
            ErrorCode::STORAGE_ERROR.category(),
            ErrorCategory::Internal
        );
        assert_eq!(ErrorCategory::Resource.to_string(), "resource");
    }
}
