//! Peer log filter
//!
//! Holds the minimum severity the peer asked for via `logging/setLevel`.
//! Records below the threshold are dropped before they are serialized.

use std::sync::atomic::{AtomicU8, Ordering};

use tandem_protocol::LogLevel;

/// Session-scoped minimum severity for outgoing log records
#[derive(Debug)]
pub struct LoggingFilter {
    threshold: AtomicU8,
}

impl Default for LoggingFilter {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}

impl LoggingFilter {
    /// Filter starting at `initial`
    #[must_use]
    pub fn new(initial: LogLevel) -> Self {
        Self {
            threshold: AtomicU8::new(initial.rank()),
        }
    }

    /// Replace the threshold; takes effect for the next record
    pub fn set_threshold(&self, level: LogLevel) {
        self.threshold.store(level.rank(), Ordering::Release);
    }

    /// Current threshold
    pub fn threshold(&self) -> LogLevel {
        LogLevel::from_rank(self.threshold.load(Ordering::Acquire)).unwrap_or(LogLevel::Info)
    }

    /// Whether a record at `level` reaches the peer
    pub fn should_emit(&self, level: LogLevel) -> bool {
        level.rank() >= self.threshold.load(Ordering::Acquire)
    }
}
