//! Standard I/O transport implementation.
//!
//! Newline-delimited JSON: one message per line, and no message may contain an
//! embedded `\n` or `\r`. A background task reads lines into a bounded queue
//! so the reader never blocks on a slow consumer for longer than the queue
//! depth allows.
//!
//! # Interior Mutability
//!
//! - `state`: `parking_lot::Mutex` (short-lived locks, never held across `.await`)
//! - `metrics`: `AtomicMetrics` (lock-free counters)
//! - I/O streams: `tokio::sync::Mutex` (held across `.await`)

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::{Mutex as TokioMutex, mpsc};
use bytes::BytesMut;
use tokio_util::codec::{Decoder, FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, error, trace, warn};

use crate::error::{TransportError, TransportResult, validate_message_size};
use crate::message::TransportMessage;
use crate::metrics::{AtomicMetrics, TransportMetrics};
use crate::traits::Transport;
use crate::types::{TransportState, TransportType};

type BoxedAsyncRead = Pin<Box<dyn AsyncRead + Send + Sync + 'static>>;
type BoxedAsyncWrite = Pin<Box<dyn AsyncWrite + Send + Sync + 'static>>;
type LineReader = FramedRead<BufReader<BoxedAsyncRead>, BoundedLines>;
type LineWriter = FramedWrite<BoxedAsyncWrite, LinesCodec>;

/// Inbound queue depth
const RECEIVE_QUEUE_DEPTH: usize = 1000;

/// One decoded input line, or the marker for a line that hit the length cap
#[derive(Debug)]
enum Line {
    Text(String),
    Oversized,
}

/// `LinesCodec` with a length cap that reports oversized lines as items.
///
/// The inner codec stops buffering at the cap and discards up to the next
/// newline, so memory stays bounded and the stream keeps going.
#[derive(Debug)]
struct BoundedLines(LinesCodec);

impl BoundedLines {
    fn new(max_length: usize) -> Self {
        Self(LinesCodec::new_with_max_length(max_length))
    }

    fn map(
        result: Result<Option<String>, LinesCodecError>,
    ) -> Result<Option<Line>, LinesCodecError> {
        match result {
            Ok(line) => Ok(line.map(Line::Text)),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Line::Oversized)),
            Err(e) => Err(e),
        }
    }
}

impl Decoder for BoundedLines {
    type Item = Line;
    type Error = LinesCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Line>, LinesCodecError> {
        Self::map(self.0.decode(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Line>, LinesCodecError> {
        Self::map(self.0.decode_eof(src))
    }
}

/// Source of the byte streams, consumed on `connect`
enum StreamSource {
    ProcessStdio,
    Raw {
        reader: BoxedAsyncRead,
        writer: BoxedAsyncWrite,
    },
    Taken,
}

impl std::fmt::Debug for StreamSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProcessStdio => write!(f, "ProcessStdio"),
            Self::Raw { .. } => write!(f, "Raw"),
            Self::Taken => write!(f, "Taken"),
        }
    }
}

/// Newline-delimited transport over stdin/stdout or any async byte pair
///
/// ```rust,ignore
/// use tandem_transport::{StdioTransport, Transport};
///
/// let transport = StdioTransport::new();
/// transport.connect().await?;
/// ```
pub struct StdioTransport {
    state: Arc<Mutex<TransportState>>,
    metrics: Arc<AtomicMetrics>,
    max_message_size: usize,
    source: Mutex<StreamSource>,
    writer: TokioMutex<Option<LineWriter>>,
    inbound: TokioMutex<Option<mpsc::Receiver<TransportResult<TransportMessage>>>>,
    reader_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport")
            .field("state", &*self.state.lock())
            .field("max_message_size", &self.max_message_size)
            .field("source", &*self.source.lock())
            .finish_non_exhaustive()
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl StdioTransport {
    /// Transport over the current process's stdin/stdout
    #[must_use]
    pub fn new() -> Self {
        Self::with_source(StreamSource::ProcessStdio)
    }

    /// Transport over arbitrary streams.
    ///
    /// `reader` is what we read from (for a child process, its stdout) and
    /// `writer` is what we write to (its stdin).
    pub fn from_raw<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Sync + 'static,
        W: AsyncWrite + Send + Sync + 'static,
    {
        Self::with_source(StreamSource::Raw {
            reader: Box::pin(reader),
            writer: Box::pin(writer),
        })
    }

    fn with_source(source: StreamSource) -> Self {
        Self {
            state: Arc::new(Mutex::new(TransportState::Disconnected)),
            metrics: Arc::new(AtomicMetrics::default()),
            max_message_size: tandem_protocol::MAX_MESSAGE_SIZE,
            source: Mutex::new(source),
            writer: TokioMutex::new(None),
            inbound: TokioMutex::new(None),
            reader_task: Mutex::new(None),
        }
    }

    /// Override the largest accepted line
    #[must_use]
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    fn set_state(state: &Mutex<TransportState>, new_state: TransportState) {
        let mut state = state.lock();
        if *state != new_state {
            trace!("Stdio transport state: {} -> {}", *state, new_state);
            *state = new_state;
        }
    }

    fn frame(message: &TransportMessage) -> TransportResult<String> {
        let line = message.as_str()?;
        if line.contains('\n') || line.contains('\r') {
            return Err(TransportError::ProtocolError(
                "message contains an embedded newline".to_string(),
            ));
        }
        Ok(line.to_string())
    }

    fn spawn_reader(
        mut reader: LineReader,
        sender: mpsc::Sender<TransportResult<TransportMessage>>,
        state: Arc<Mutex<TransportState>>,
        metrics: Arc<AtomicMetrics>,
        max_message_size: usize,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(result) = reader.next().await {
                match result {
                    Ok(Line::Oversized) => {
                        warn!("Dropping inbound line longer than {} bytes", max_message_size);
                        metrics
                            .frames_rejected
                            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    }
                    Ok(Line::Text(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        if let Err(e) = validate_message_size(line.len(), max_message_size) {
                            warn!("Dropping inbound line: {}", e);
                            metrics
                                .frames_rejected
                                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                            continue;
                        }
                        trace!("Received line: {} bytes", line.len());
                        metrics.record_received(line.len());
                        let message = TransportMessage::new(line.to_string());
                        if sender.send(Ok(message)).await.is_err() {
                            debug!("Receive queue closed, stopping reader task");
                            return;
                        }
                    }
                    Err(e) => {
                        error!("Failed to read from input: {}", e);
                        Self::set_state(
                            &state,
                            TransportState::Failed {
                                reason: e.to_string(),
                            },
                        );
                        let _ = sender
                            .send(Err(TransportError::ReceiveFailed(e.to_string())))
                            .await;
                        return;
                    }
                }
            }

            debug!("Input reached end of stream");
            Self::set_state(
                &state,
                TransportState::Failed {
                    reason: "end of stream".to_string(),
                },
            );
        })
    }
}

#[async_trait]
impl Transport for StdioTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Stdio
    }

    fn state(&self) -> TransportState {
        self.state.lock().clone()
    }

    async fn connect(&self) -> TransportResult<()> {
        let source = std::mem::replace(&mut *self.source.lock(), StreamSource::Taken);
        let (reader, writer): (BoxedAsyncRead, BoxedAsyncWrite) = match source {
            StreamSource::ProcessStdio => {
                (Box::pin(tokio::io::stdin()), Box::pin(tokio::io::stdout()))
            }
            StreamSource::Raw { reader, writer } => (reader, writer),
            StreamSource::Taken => {
                if self.is_connected() {
                    return Ok(());
                }
                return Err(TransportError::ConfigurationError(
                    "stdio streams already consumed".to_string(),
                ));
            }
        };

        let line_reader = FramedRead::new(
            BufReader::new(reader),
            BoundedLines::new(self.max_message_size),
        );
        *self.writer.lock().await = Some(FramedWrite::new(writer, LinesCodec::new()));

        let (tx, rx) = mpsc::channel(RECEIVE_QUEUE_DEPTH);
        *self.inbound.lock().await = Some(rx);
        *self.reader_task.lock() = Some(Self::spawn_reader(
            line_reader,
            tx,
            self.state.clone(),
            self.metrics.clone(),
            self.max_message_size,
        ));

        Self::set_state(&self.state, TransportState::Connected);
        debug!("Stdio transport connected");
        Ok(())
    }

    async fn send(&self, message: TransportMessage) -> TransportResult<()> {
        let line = Self::frame(&message)?;
        validate_message_size(line.len(), self.max_message_size)?;

        let mut writer = self.writer.lock().await;
        let Some(writer) = writer.as_mut() else {
            return Err(TransportError::ConnectionFailed(
                "stdio transport is not connected".to_string(),
            ));
        };

        let size = line.len();
        if let Err(e) = writer.send(line).await {
            error!("Failed to send message: {}", e);
            Self::set_state(
                &self.state,
                TransportState::Failed {
                    reason: e.to_string(),
                },
            );
            return Err(TransportError::SendFailed(e.to_string()));
        }

        self.metrics.record_sent(size);
        trace!("Sent message: {} bytes", size);
        Ok(())
    }

    async fn receive(&self) -> TransportResult<Option<TransportMessage>> {
        let mut inbound = self.inbound.lock().await;
        let Some(receiver) = inbound.as_mut() else {
            return Ok(None);
        };
        match receiver.recv().await {
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    async fn close(&self) -> TransportResult<()> {
        if let Some(handle) = self.reader_task.lock().take() {
            handle.abort();
        }
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = SinkExt::<String>::close(&mut writer).await;
        }
        Self::set_state(&self.state, TransportState::Disconnected);
        debug!("Stdio transport closed");
        Ok(())
    }

    fn metrics(&self) -> TransportMetrics {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_reads_one_message_per_line() {
        let (mut peer, ours) = tokio::io::duplex(4096);
        let (read_half, write_half) = tokio::io::split(ours);
        let transport = StdioTransport::from_raw(read_half, write_half);
        transport.connect().await.unwrap();

        peer.write_all(b"{\"a\":1}\n\n{\"b\":2}\r\n").await.unwrap();

        let first = transport.receive().await.unwrap().unwrap();
        assert_eq!(first.as_str().unwrap(), "{\"a\":1}");
        let second = transport.receive().await.unwrap().unwrap();
        assert_eq!(second.as_str().unwrap(), "{\"b\":2}");

        drop(peer);
        assert!(transport.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_writes_newline_terminated_lines() {
        let (mut peer, ours) = tokio::io::duplex(4096);
        let (read_half, write_half) = tokio::io::split(ours);
        let transport = StdioTransport::from_raw(read_half, write_half);
        transport.connect().await.unwrap();

        transport
            .send(TransportMessage::new("{\"jsonrpc\":\"2.0\"}"))
            .await
            .unwrap();

        let mut buf = vec![0u8; 18];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"{\"jsonrpc\":\"2.0\"}\n");
    }

    #[tokio::test]
    async fn test_embedded_newline_rejected() {
        let (_peer, ours) = tokio::io::duplex(64);
        let (read_half, write_half) = tokio::io::split(ours);
        let transport = StdioTransport::from_raw(read_half, write_half);
        transport.connect().await.unwrap();

        let err = transport
            .send(TransportMessage::new("{\n}"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::ProtocolError(_)));
    }

    #[tokio::test]
    async fn test_oversized_line_dropped_stream_continues() {
        let (mut peer, ours) = tokio::io::duplex(4096);
        let (read_half, write_half) = tokio::io::split(ours);
        let transport = StdioTransport::from_raw(read_half, write_half).with_max_message_size(8);
        transport.connect().await.unwrap();

        peer.write_all(b"0123456789abcdef\n{}\n").await.unwrap();

        let message = transport.receive().await.unwrap().unwrap();
        assert_eq!(message.as_str().unwrap(), "{}");
        assert_eq!(transport.metrics().frames_rejected, 1);
    }

    #[tokio::test]
    async fn test_line_far_beyond_cap_is_discarded_without_buffering() {
        let (mut peer, ours) = tokio::io::duplex(1024);
        let (read_half, write_half) = tokio::io::split(ours);
        let transport = StdioTransport::from_raw(read_half, write_half).with_max_message_size(16);
        transport.connect().await.unwrap();

        let writer = tokio::spawn(async move {
            peer.write_all(&vec![b'x'; 256 * 1024]).await.unwrap();
            peer.write_all(b"\n{\"ok\":1}\n").await.unwrap();
            peer
        });

        let message = transport.receive().await.unwrap().unwrap();
        assert_eq!(message.as_str().unwrap(), "{\"ok\":1}");
        assert_eq!(transport.metrics().frames_rejected, 1);
        drop(writer.await.unwrap());
    }

    #[test]
    fn test_bounded_lines_resumes_after_oversized_line() {
        let mut codec = BoundedLines::new(4);
        let mut buf = BytesMut::from(&b"abcdefgh"[..]);
        assert!(matches!(codec.decode(&mut buf), Ok(Some(Line::Oversized))));
        buf.extend_from_slice(b"ij\nok\n");
        assert!(matches!(codec.decode(&mut buf), Ok(Some(Line::Text(line))) if line == "ok"));
    }

    #[tokio::test]
    async fn test_send_before_connect_fails() {
        let (_peer, ours) = tokio::io::duplex(64);
        let (read_half, write_half) = tokio::io::split(ours);
        let transport = StdioTransport::from_raw(read_half, write_half);
        assert!(transport.send(TransportMessage::new("{}")).await.is_err());
    }
}
