//! Logging types
//!
//! This module contains the eight ordered severities and the payloads of
//! `logging/setLevel` and `notifications/message`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Log level enumeration, ascending severity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum LogLevel {
    /// Debug level
    Debug = 0,
    /// Info level
    Info = 1,
    /// Notice level
    Notice = 2,
    /// Warning level
    Warning = 3,
    /// Error level
    Error = 4,
    /// Critical level
    Critical = 5,
    /// Alert level
    Alert = 6,
    /// Emergency level
    Emergency = 7,
}

impl LogLevel {
    /// All levels, ascending
    pub const ALL: [Self; 8] = [
        Self::Debug,
        Self::Info,
        Self::Notice,
        Self::Warning,
        Self::Error,
        Self::Critical,
        Self::Alert,
        Self::Emergency,
    ];

    /// Wire name of the level
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Notice => "notice",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
            Self::Alert => "alert",
            Self::Emergency => "emergency",
        }
    }

    /// Numeric rank, 0 (debug) through 7 (emergency)
    #[must_use]
    pub const fn rank(self) -> u8 {
        self as u8
    }

    /// Inverse of [`rank`](Self::rank)
    #[must_use]
    pub const fn from_rank(rank: u8) -> Option<Self> {
        match rank {
            0 => Some(Self::Debug),
            1 => Some(Self::Info),
            2 => Some(Self::Notice),
            3 => Some(Self::Warning),
            4 => Some(Self::Error),
            5 => Some(Self::Critical),
            6 => Some(Self::Alert),
            7 => Some(Self::Emergency),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    /// Parse a wire level name. Unknown names are rejected, never remapped.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| Error::invalid_params(format!("unknown log level: {s}")))
    }
}

/// Set logging level request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetLevelRequest {
    /// Log level to set
    pub level: LogLevel,
}

/// Logging notification (`notifications/message`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingNotification {
    /// Log level
    pub level: LogLevel,
    /// Optional logger name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    /// Structured payload
    pub data: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_ordered() {
        for pair in LogLevel::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert!(LogLevel::Warning > LogLevel::Info);
        assert!(LogLevel::Error > LogLevel::Warning);
    }

    #[test]
    fn test_rank_round_trip() {
        for level in LogLevel::ALL {
            assert_eq!(LogLevel::from_rank(level.rank()), Some(level));
        }
        assert_eq!(LogLevel::from_rank(8), None);
    }

    #[test]
    fn test_unknown_level_rejected() {
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert!("verbose".parse::<LogLevel>().is_err());
        assert!("WARNING".parse::<LogLevel>().is_err());
        assert!(serde_json::from_str::<LogLevel>("\"trace\"").is_err());
    }
}
