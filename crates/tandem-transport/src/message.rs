//! Transport message types.

use bytes::Bytes;

use crate::error::{TransportError, TransportResult};

/// One framed message as it crosses the transport boundary.
///
/// The payload is a single serialized JSON-RPC object. Adapters own framing;
/// the payload itself never carries a frame delimiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportMessage {
    /// The serialized message.
    pub payload: Bytes,
}

impl TransportMessage {
    /// Creates a new `TransportMessage` from a payload.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Serializes `value` into a new message.
    pub fn from_json<T: serde::Serialize>(value: &T) -> TransportResult<Self> {
        let bytes = serde_json::to_vec(value)?;
        Ok(Self::new(bytes))
    }

    /// Returns the size of the message payload in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    /// Borrows the payload as UTF-8 text.
    pub fn as_str(&self) -> TransportResult<&str> {
        std::str::from_utf8(&self.payload)
            .map_err(|e| TransportError::SerializationFailed(e.to_string()))
    }
}

impl From<String> for TransportMessage {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl From<Vec<u8>> for TransportMessage {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}
