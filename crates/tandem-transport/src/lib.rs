//! # Tandem Transport
//!
//! The transport boundary of the Tandem session engine: an ordered channel of
//! whole messages to exactly one peer.
//!
//! - **Trait**: [`Transport`] with `send`, `receive` (where `None` means the
//!   peer closed), `close` and `connect`
//! - **Adapters**: [`ChannelTransport`] for in-process pairs and
//!   [`StdioTransport`] for newline-delimited standard I/O
//! - **Errors**: [`TransportError`] converts into [`tandem_protocol::Error`]
//!   with kind `Transport` so session code sees a single error type
//!
//! ```rust
//! use tandem_transport::{ChannelTransport, Transport, TransportMessage};
//!
//! # tokio_test::block_on(async {
//! let (client, server) = ChannelTransport::pair();
//! client.send(TransportMessage::new(r#"{"jsonrpc":"2.0","method":"ping","id":1}"#)).await.unwrap();
//! let received = server.receive().await.unwrap().unwrap();
//! assert_eq!(received.size(), 40);
//! # });
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

mod channel;
mod error;
mod message;
mod metrics;
mod stdio;
mod traits;
mod types;

pub use channel::{ChannelTransport, DEFAULT_CHANNEL_CAPACITY};
pub use error::{TransportError, TransportResult, validate_message_size};
pub use message::TransportMessage;
pub use metrics::{AtomicMetrics, TransportMetrics};
pub use stdio::StdioTransport;
pub use traits::Transport;
pub use types::{TransportState, TransportType};
