//! Adapter behavior shared by both transports
//!
//! Messages arrive whole and in order, concurrent senders never interleave
//! frames, and peer loss surfaces as end-of-stream.

use std::sync::Arc;

use tandem_transport::{
    ChannelTransport, StdioTransport, Transport, TransportError, TransportMessage, TransportState,
};

/// Two stdio transports wired back to back over in-memory pipes
async fn stdio_pair() -> (StdioTransport, StdioTransport) {
    let (a_io, b_io) = tokio::io::duplex(64 * 1024);
    let (a_read, a_write) = tokio::io::split(a_io);
    let (b_read, b_write) = tokio::io::split(b_io);
    let a = StdioTransport::from_raw(a_read, a_write);
    let b = StdioTransport::from_raw(b_read, b_write);
    a.connect().await.unwrap();
    b.connect().await.unwrap();
    (a, b)
}

async fn assert_ordered_delivery<T: Transport + 'static>(sender: Arc<T>, receiver: &T) {
    let count = 200;
    let writer = tokio::spawn(async move {
        for i in 0..count {
            let payload = format!(r#"{{"jsonrpc":"2.0","method":"tick","params":{{"n":{i}}}}}"#);
            sender.send(TransportMessage::new(payload)).await.unwrap();
        }
    });

    for i in 0..count {
        let message = receiver.receive().await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&message.payload).unwrap();
        assert_eq!(value["params"]["n"], i);
    }
    writer.await.unwrap();
}

#[tokio::test]
async fn test_channel_ordered_delivery() {
    let (a, b) = ChannelTransport::pair_with_capacity(8);
    assert_ordered_delivery(Arc::new(a), &b).await;
}

#[tokio::test]
async fn test_stdio_ordered_delivery() {
    let (a, b) = stdio_pair().await;
    assert_ordered_delivery(Arc::new(a), &b).await;
}

#[tokio::test]
async fn test_stdio_concurrent_senders_keep_frames_whole() {
    let (a, b) = stdio_pair().await;
    let a = Arc::new(a);

    let mut tasks = Vec::new();
    for task in 0..8 {
        let a = a.clone();
        tasks.push(tokio::spawn(async move {
            for n in 0..25 {
                let payload = format!(r#"{{"task":{task},"n":{n},"pad":"{}"}}"#, "x".repeat(512));
                a.send(TransportMessage::new(payload)).await.unwrap();
            }
        }));
    }

    for _ in 0..200 {
        let message = b.receive().await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&message.payload).unwrap();
        assert!(value["task"].is_u64());
    }
    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn test_stdio_peer_close_is_end_of_stream() {
    let (a, b) = stdio_pair().await;
    a.close().await.unwrap();
    assert!(b.receive().await.unwrap().is_none());
    assert!(matches!(b.state(), TransportState::Failed { .. }));
}

#[tokio::test]
async fn test_errors_convert_to_transport_kind() {
    let (a, b) = ChannelTransport::pair();
    drop(b);
    let err: TransportError = a.send(TransportMessage::new("{}")).await.unwrap_err();
    let err: tandem_protocol::Error = err.into();
    assert_eq!(err.kind, tandem_protocol::ErrorKind::Transport);
}
