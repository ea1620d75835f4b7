//! Generation modes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// The two interchangeable ID generation strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdMode {
    /// Time-bit-packed IDs generated locally.
    Snowflake,
    /// IDs handed out from ranges claimed in the shared store.
    Segment,
}

impl IdMode {
    /// All modes, in a stable order.
    pub const ALL: [Self; 2] = [Self::Snowflake, Self::Segment];

    /// Wire name of the mode, also used as a metrics label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Snowflake => "snowflake",
            Self::Segment => "segment",
        }
    }
}

impl fmt::Display for IdMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdMode {
    type Err = AppError;

    /// Parse a mode name. Matching is exact: no trimming, no case folding.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "snowflake" => Ok(Self::Snowflake),
            "segment" => Ok(Self::Segment),
            other => Err(AppError::InvalidMode(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_modes() {
        assert_eq!("snowflake".parse::<IdMode>().unwrap(), IdMode::Snowflake);
        assert_eq!("segment".parse::<IdMode>().unwrap(), IdMode::Segment);
    }

    #[test]
    fn test_parse_is_exact() {
        for raw in ["", "Snowflake", " segment", "uuid"] {
            let err = raw.parse::<IdMode>().unwrap_err();
            assert!(matches!(err, AppError::InvalidMode(ref m) if m == raw));
        }
    }

    #[test]
    fn test_display_round_trips_wire_name() {
        for mode in IdMode::ALL {
            assert_eq!(mode.to_string().parse::<IdMode>().unwrap(), mode);
        }
    }
}
