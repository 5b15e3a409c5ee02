//! In-process transport pair.
//!
//! [`ChannelTransport::pair`] returns two connected endpoints backed by bounded
//! `tokio::sync::mpsc` queues, one per direction. Each queued item is one
//! whole message, so no framing is needed. Closing either endpoint ends the
//! peer's receive stream after it drains what was already queued.

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Mutex as TokioMutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{TransportError, TransportResult, validate_message_size};
use crate::message::TransportMessage;
use crate::metrics::{AtomicMetrics, TransportMetrics};
use crate::traits::Transport;
use crate::types::{TransportState, TransportType};

/// Default queue depth per direction
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// One endpoint of an in-memory duplex channel
#[derive(Debug)]
pub struct ChannelTransport {
    outbound: Mutex<Option<mpsc::Sender<TransportMessage>>>,
    inbound: TokioMutex<mpsc::Receiver<TransportMessage>>,
    state: Mutex<TransportState>,
    closed: CancellationToken,
    metrics: AtomicMetrics,
    max_message_size: usize,
}

impl ChannelTransport {
    /// Two endpoints wired to each other, already connected
    #[must_use]
    pub fn pair() -> (Self, Self) {
        Self::pair_with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Two endpoints with `capacity` queued messages per direction
    #[must_use]
    pub fn pair_with_capacity(capacity: usize) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel(capacity.max(1));
        let (b_tx, a_rx) = mpsc::channel(capacity.max(1));
        (Self::endpoint(a_tx, a_rx), Self::endpoint(b_tx, b_rx))
    }

    fn endpoint(tx: mpsc::Sender<TransportMessage>, rx: mpsc::Receiver<TransportMessage>) -> Self {
        Self {
            outbound: Mutex::new(Some(tx)),
            inbound: TokioMutex::new(rx),
            state: Mutex::new(TransportState::Connected),
            closed: CancellationToken::new(),
            metrics: AtomicMetrics::default(),
            max_message_size: tandem_protocol::MAX_MESSAGE_SIZE,
        }
    }

    /// Override the largest accepted message
    #[must_use]
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    fn set_state(&self, new_state: TransportState) {
        let mut state = self.state.lock();
        if *state != new_state {
            trace!("Channel transport state: {} -> {}", *state, new_state);
            *state = new_state;
        }
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Channel
    }

    fn state(&self) -> TransportState {
        self.state.lock().clone()
    }

    async fn connect(&self) -> TransportResult<()> {
        if self.closed.is_cancelled() {
            return Err(TransportError::ConnectionFailed(
                "channel transport was closed".to_string(),
            ));
        }
        Ok(())
    }

    async fn send(&self, message: TransportMessage) -> TransportResult<()> {
        validate_message_size(message.size(), self.max_message_size)?;

        let sender = self.outbound.lock().clone().ok_or_else(|| {
            TransportError::ConnectionFailed("channel transport was closed".to_string())
        })?;

        let size = message.size();
        if sender.send(message).await.is_err() {
            self.set_state(TransportState::Failed {
                reason: "peer endpoint dropped".to_string(),
            });
            return Err(TransportError::ConnectionLost(
                "peer endpoint dropped".to_string(),
            ));
        }

        self.metrics.record_sent(size);
        trace!("Sent message: {} bytes", size);
        Ok(())
    }

    async fn receive(&self) -> TransportResult<Option<TransportMessage>> {
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            biased;
            () = self.closed.cancelled() => Ok(None),
            message = inbound.recv() => match message {
                Some(message) => {
                    self.metrics.record_received(message.size());
                    Ok(Some(message))
                }
                None => {
                    debug!("Peer closed channel transport");
                    self.set_state(TransportState::Failed {
                        reason: "peer closed".to_string(),
                    });
                    Ok(None)
                }
            },
        }
    }

    async fn close(&self) -> TransportResult<()> {
        self.outbound.lock().take();
        self.closed.cancel();
        self.set_state(TransportState::Disconnected);
        debug!("Channel transport closed");
        Ok(())
    }

    fn metrics(&self) -> TransportMetrics {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_messages_flow_both_ways_in_order() {
        let (a, b) = ChannelTransport::pair();

        for i in 0..3 {
            a.send(TransportMessage::new(format!("a{i}"))).await.unwrap();
        }
        b.send(TransportMessage::new("b0")).await.unwrap();

        for i in 0..3 {
            let message = b.receive().await.unwrap().unwrap();
            assert_eq!(message.as_str().unwrap(), format!("a{i}"));
        }
        assert_eq!(a.receive().await.unwrap().unwrap().as_str().unwrap(), "b0");
        assert_eq!(a.metrics().messages_sent, 3);
        assert_eq!(b.metrics().messages_received, 3);
    }

    #[tokio::test]
    async fn test_close_ends_peer_stream() {
        let (a, b) = ChannelTransport::pair();
        a.send(TransportMessage::new("last")).await.unwrap();
        a.close().await.unwrap();

        assert_eq!(b.receive().await.unwrap().unwrap().as_str().unwrap(), "last");
        assert!(b.receive().await.unwrap().is_none());
        assert!(!b.is_connected());
    }

    #[tokio::test]
    async fn test_local_close_unblocks_pending_receive() {
        let (a, _b) = ChannelTransport::pair();
        let a = std::sync::Arc::new(a);

        let reader = {
            let a = a.clone();
            tokio::spawn(async move { a.receive().await })
        };
        tokio::task::yield_now().await;
        a.close().await.unwrap();

        assert!(reader.await.unwrap().unwrap().is_none());
        assert!(a.send(TransportMessage::new("x")).await.is_err());
        assert!(a.connect().await.is_err());
    }

    #[tokio::test]
    async fn test_send_to_dropped_peer_fails() {
        let (a, b) = ChannelTransport::pair();
        drop(b);
        let err = a.send(TransportMessage::new("x")).await.unwrap_err();
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn test_oversized_message_rejected() {
        let (a, _b) = ChannelTransport::pair();
        let a = a.with_max_message_size(4);
        let err = a.send(TransportMessage::new("12345")).await.unwrap_err();
        assert!(matches!(err, TransportError::MessageTooLarge { size: 5, max: 4 }));
    }
}
