//! Transport state and kind.

use std::fmt;

/// The kind of adapter behind a [`Transport`](crate::Transport).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportType {
    /// In-process channel pair
    Channel,
    /// Newline-delimited standard I/O
    Stdio,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel => write!(f, "channel"),
            Self::Stdio => write!(f, "stdio"),
        }
    }
}

/// Connection lifecycle of a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportState {
    /// Not yet connected, or closed locally.
    Disconnected,
    /// Ready to send and receive.
    Connected,
    /// The peer went away or I/O failed.
    Failed {
        /// A description of the failure reason.
        reason: String,
    },
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connected => write!(f, "connected"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}
