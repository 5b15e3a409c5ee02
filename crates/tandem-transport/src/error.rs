//! Transport error types.

use thiserror::Error;

/// A specialized `Result` type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Represents errors that can occur during transport operations.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum TransportError {
    /// The transport was used before `connect` or after `close`.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// An established connection was lost.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Failed to send a message.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive a message.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Payload was not valid UTF-8 or JSON.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// A framing rule was violated.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// The transport was configured with invalid parameters.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// An underlying I/O error occurred.
    #[error("IO error: {0}")]
    Io(String),

    /// Message size exceeds the configured maximum.
    #[error("Message size ({size} bytes) exceeds maximum allowed ({max} bytes)")]
    MessageTooLarge {
        /// The actual size of the message in bytes
        size: usize,
        /// The maximum allowed size in bytes
        max: usize,
    },
}

impl TransportError {
    /// Whether the peer is gone for good
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::ConnectionLost(_) | Self::ConnectionFailed(_) | Self::Io(_)
        )
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationFailed(err.to_string())
    }
}

impl From<TransportError> for tandem_protocol::Error {
    fn from(err: TransportError) -> Self {
        use tandem_protocol::ErrorKind;

        let kind = match &err {
            TransportError::SerializationFailed(_) => ErrorKind::Serialization,
            TransportError::ProtocolError(_) => ErrorKind::InvalidRequest,
            TransportError::ConfigurationError(_) => ErrorKind::Configuration,
            TransportError::MessageTooLarge { .. } => ErrorKind::InvalidRequest,
            TransportError::ConnectionFailed(_)
            | TransportError::ConnectionLost(_)
            | TransportError::SendFailed(_)
            | TransportError::ReceiveFailed(_)
            | TransportError::Io(_) => ErrorKind::Transport,
        };

        tandem_protocol::Error::new(kind, err.to_string()).with_component("transport")
    }
}

/// Rejects messages larger than `max` bytes.
pub fn validate_message_size(size: usize, max: usize) -> TransportResult<()> {
    if size > max {
        return Err(TransportError::MessageTooLarge { size, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_protocol::ErrorKind;

    #[test]
    fn test_converts_to_protocol_error() {
        let err: tandem_protocol::Error = TransportError::ConnectionLost("eof".into()).into();
        assert_eq!(err.kind, ErrorKind::Transport);
        assert!(err.is_retryable());
        assert!(err.message.contains("eof"));

        let err: tandem_protocol::Error = TransportError::SerializationFailed("utf8".into()).into();
        assert_eq!(err.kind, ErrorKind::Serialization);
    }

    #[test]
    fn test_size_validation() {
        assert!(validate_message_size(10, 10).is_ok());
        assert!(matches!(
            validate_message_size(11, 10),
            Err(TransportError::MessageTooLarge { size: 11, max: 10 })
        ));
    }
}
