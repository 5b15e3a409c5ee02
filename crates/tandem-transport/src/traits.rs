//! Core transport trait.

use async_trait::async_trait;

use crate::error::TransportResult;
use crate::message::TransportMessage;
use crate::metrics::TransportMetrics;
use crate::types::{TransportState, TransportType};

/// An ordered, bidirectional message channel to exactly one peer.
///
/// Implementations deliver whole messages in order and own their framing.
/// `receive` is called from a single task; `send` may be called from many,
/// and the caller serializes sends that must not interleave.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Returns the type of this transport.
    fn transport_type(&self) -> TransportType;

    /// Returns the current state of the transport.
    fn state(&self) -> TransportState;

    /// Prepares the transport for traffic. Idempotent.
    async fn connect(&self) -> TransportResult<()>;

    /// Sends a single message.
    async fn send(&self, message: TransportMessage) -> TransportResult<()>;

    /// Waits for the next message.
    ///
    /// `Ok(None)` means the peer closed the channel cleanly. After that, or
    /// after an error that [`is_disconnect`](crate::TransportError::is_disconnect),
    /// no further messages will arrive.
    async fn receive(&self) -> TransportResult<Option<TransportMessage>>;

    /// Closes the channel. Pending and later `receive` calls on the peer
    /// observe the close.
    async fn close(&self) -> TransportResult<()>;

    /// Returns a snapshot of the transport's traffic counters.
    fn metrics(&self) -> TransportMetrics;

    /// Returns `true` if the transport is currently in the `Connected` state.
    fn is_connected(&self) -> bool {
        matches!(self.state(), TransportState::Connected)
    }
}
