//! # Tandem Protocol
//!
//! Wire-level building blocks for the Tandem bidirectional session engine.
//!
//! Two peers exchange JSON-RPC 2.0 messages over one ordered channel and either
//! side may issue requests. This crate owns everything that crosses the wire:
//!
//! - **JSON-RPC**: a closed [`JsonRpcMessage`] union (`Request | Response |
//!   Notification`) with explicit classification on decode
//! - **Identifiers**: [`MessageId`] for correlation and [`ProgressToken`] for
//!   progress, kept in separate namespaces
//! - **Payloads**: progress, cancellation, logging, completion and pagination
//!   parameter/result types
//! - **Errors**: a single [`Error`] type carrying an [`ErrorKind`] that maps to
//!   JSON-RPC error codes
//! - **Cursors**: the [`CursorCodec`], which signs and versions opaque
//!   pagination cursors so they survive restarts and reject tampering
//!
//! ## Example
//!
//! ```rust
//! use tandem_protocol::{JsonRpcMessage, MessageId};
//!
//! let raw = r#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#;
//! let message: JsonRpcMessage = serde_json::from_str(raw).unwrap();
//!
//! match message {
//!     JsonRpcMessage::Request(request) => {
//!         assert_eq!(request.method, "ping");
//!         assert_eq!(request.id, MessageId::Number(7));
//!     }
//!     other => panic!("unexpected message: {other:?}"),
//! }
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

pub mod cursor;
pub mod error;
pub mod jsonrpc;
pub mod methods;
pub mod types;

pub use cursor::{CURSOR_VERSION, CursorCodec, Position};
pub use error::{Error, ErrorContext, ErrorKind, Result};
pub use jsonrpc::{
    JsonRpcError, JsonRpcErrorCode, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, JsonRpcResponsePayload, JsonRpcVersion, ResponseId,
};
pub use types::{
    CancelledNotification, CompleteRequestParams, CompleteResult, CompletionContext,
    CompletionData, CompletionReference, Cursor, LogLevel, LoggingNotification, MessageId,
    PaginatedRequestParams, ProgressNotification, ProgressToken, RequestId, SetLevelRequest,
};

/// Largest single message, in bytes, that adapters accept by default.
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Crate version, used in handshake metadata.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
