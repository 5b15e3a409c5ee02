//! Unified error handling for the session engine.
//!
//! A single [`Error`] type is used across all Tandem crates. It carries an
//! [`ErrorKind`] for programmatic handling, a human-readable message, optional
//! structured data that travels to the peer, and optional local context that
//! never does.
//!
//! ## Taxonomy
//!
//! - **Protocol violations** (`ParseError`, `InvalidRequest`) are dropped or
//!   answered defensively; benign races never produce them.
//! - **Request-level input** (`InvalidParams`, `InvalidCursor`,
//!   `MethodNotFound`) is returned to the requester as a typed failure.
//! - **Session failures** (`Transport`, `SessionClosed`, `Timeout`,
//!   `Cancelled`) resolve pending requests.
//! - **Local programming errors** (`DuplicateId`) are fatal and must never be
//!   swallowed.
//!
//! ## Example
//!
//! ```rust
//! use tandem_protocol::{Error, ErrorKind, Result};
//!
//! fn lookup(page_size: usize) -> Result<usize> {
//!     if page_size == 0 {
//!         return Err(Error::invalid_params("page size must be positive"));
//!     }
//!     Ok(page_size)
//! }
//!
//! let err = lookup(0).unwrap_err();
//! assert_eq!(err.kind, ErrorKind::InvalidParams);
//! assert_eq!(err.jsonrpc_code(), -32602);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::jsonrpc::JsonRpcError;

/// Result type alias for Tandem operations
pub type Result<T> = std::result::Result<T, Error>;

/// Marker placed in `error.data.reason` for cursor failures, so the requester
/// can tell a bad cursor apart from other invalid params.
pub const INVALID_CURSOR_REASON: &str = "invalid_cursor";

/// Unified Tandem error type
///
/// The `context` field is boxed to keep `Result<T, Error>` small.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Error {
    /// Error classification
    pub kind: ErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Structured data sent to the peer alongside the message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Local context for tracing; never sent to the peer
    #[serde(skip)]
    pub context: Option<Box<ErrorContext>>,
}

/// Additional error context
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorContext {
    /// Operation being performed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    /// Component where error occurred
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    /// Request ID for tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Error classification for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    // === JSON-RPC Standard Errors ===
    /// Parse error (-32700)
    ParseError,
    /// Invalid request (-32600)
    InvalidRequest,
    /// Method not found (-32601)
    MethodNotFound,
    /// Invalid params (-32602)
    InvalidParams,
    /// Internal error (-32603)
    Internal,

    // === Session Errors ===
    /// Pagination cursor was not issued by this scope/version, or was altered
    InvalidCursor,
    /// The request was cancelled before it completed
    Cancelled,
    /// No response arrived within the caller's deadline
    Timeout,
    /// The session ended while the request was outstanding
    SessionClosed,
    /// Transport/network error
    Transport,
    /// An identifier was allocated twice; internal invariant violation
    DuplicateId,
    /// Invalid local configuration
    Configuration,
    /// Serialization error
    Serialization,
}

impl Error {
    /// Create a new error with kind and message
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
            context: None,
        }
    }

    /// Create a parse error
    #[must_use]
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseError, message)
    }

    /// Create an invalid request error
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    /// Create a method not found error
    #[must_use]
    pub fn method_not_found(method: impl Into<String>) -> Self {
        let method = method.into();
        Self::new(
            ErrorKind::MethodNotFound,
            format!("Method not found: {method}"),
        )
    }

    /// Create a validation/invalid params error
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParams, message)
    }

    /// Create an internal error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Create an invalid cursor error
    #[must_use]
    pub fn invalid_cursor(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidCursor, message)
            .with_data(serde_json::json!({ "reason": INVALID_CURSOR_REASON }))
            .with_component("cursor_codec")
    }

    /// Create a cancelled error
    #[must_use]
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    /// Create a timeout error
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Create a session closed error
    #[must_use]
    pub fn session_closed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SessionClosed, message)
    }

    /// Create a transport error
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    /// Create a duplicate id error
    #[must_use]
    pub fn duplicate_id(id: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::DuplicateId,
            format!("Request id {id} is already in flight"),
        )
        .with_component("correlation_table")
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create a serialization error
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Serialization, message)
    }

    /// Attach structured data for the peer
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Set the operation context
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.context
            .get_or_insert_with(Box::default)
            .operation = Some(operation.into());
        self
    }

    /// Set the component context
    #[must_use]
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.context
            .get_or_insert_with(Box::default)
            .component = Some(component.into());
        self
    }

    /// Set the request ID context
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.context
            .get_or_insert_with(Box::default)
            .request_id = Some(request_id.into());
        self
    }

    /// Whether retrying the same request may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Timeout | ErrorKind::Transport | ErrorKind::SessionClosed
        )
    }

    /// Whether this is a local invariant violation that must not be swallowed
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self.kind, ErrorKind::DuplicateId)
    }

    /// Get the JSON-RPC error code for this error
    #[must_use]
    pub const fn jsonrpc_code(&self) -> i32 {
        match self.kind {
            ErrorKind::ParseError => -32700,
            ErrorKind::InvalidRequest => -32600,
            ErrorKind::MethodNotFound => -32601,
            ErrorKind::InvalidParams | ErrorKind::InvalidCursor | ErrorKind::Serialization => {
                -32602
            }
            ErrorKind::Internal | ErrorKind::DuplicateId | ErrorKind::Configuration => -32603,
            ErrorKind::Cancelled => -32800,
            ErrorKind::Timeout => -32001,
            ErrorKind::SessionClosed => -32002,
            ErrorKind::Transport => -32003,
        }
    }

    /// Create an error from a JSON-RPC error code
    #[must_use]
    pub fn from_rpc_code(code: i32, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::from_i32(code), message)
    }

    /// Convert a peer's JSON-RPC error object into an [`Error`].
    ///
    /// Cursor failures are recognized by the `data.reason` marker.
    #[must_use]
    pub fn from_jsonrpc(error: JsonRpcError) -> Self {
        let is_cursor = error
            .data
            .as_ref()
            .and_then(|d| d.get("reason"))
            .and_then(Value::as_str)
            == Some(INVALID_CURSOR_REASON);

        let kind = if is_cursor {
            ErrorKind::InvalidCursor
        } else {
            ErrorKind::from_i32(error.code)
        };

        Self {
            kind,
            message: error.message,
            data: error.data,
            context: None,
        }
    }

    /// Build the JSON-RPC error object sent to the peer
    #[must_use]
    pub fn to_jsonrpc(&self) -> JsonRpcError {
        JsonRpcError {
            code: self.jsonrpc_code(),
            message: self.message.clone(),
            data: self.data.clone(),
        }
    }
}

impl ErrorKind {
    /// Create ErrorKind from a JSON-RPC error code.
    #[must_use]
    pub fn from_i32(code: i32) -> Self {
        match code {
            -32700 => Self::ParseError,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            -32800 => Self::Cancelled,
            -32001 => Self::Timeout,
            -32002 => Self::SessionClosed,
            -32003 => Self::Transport,
            _ => Self::Internal,
        }
    }

    /// Get a human-readable description
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid parameters",
            Self::Internal => "Internal error",
            Self::InvalidCursor => "Invalid cursor",
            Self::Cancelled => "Request cancelled",
            Self::Timeout => "Request timed out",
            Self::SessionClosed => "Session closed",
            Self::Transport => "Transport error",
            Self::DuplicateId => "Duplicate request id",
            Self::Configuration => "Configuration error",
            Self::Serialization => "Serialization error",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ctx) = &self.context {
            if let Some(op) = &ctx.operation {
                write!(f, " (operation: {op})")?;
            }
            if let Some(comp) = &ctx.component {
                write!(f, " (component: {comp})")?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        let kind = if err.is_syntax() || err.is_eof() {
            ErrorKind::ParseError
        } else if err.is_data() {
            ErrorKind::InvalidParams
        } else {
            ErrorKind::Serialization
        };
        Self::new(kind, format!("JSON error: {err}"))
    }
}

impl From<JsonRpcError> for Error {
    fn from(error: JsonRpcError) -> Self {
        Self::from_jsonrpc(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context() {
        let err = Error::internal("test")
            .with_operation("dispatch")
            .with_component("session")
            .with_request_id("req-123");

        let ctx = err.context.unwrap();
        assert_eq!(ctx.operation.as_deref(), Some("dispatch"));
        assert_eq!(ctx.component.as_deref(), Some("session"));
        assert_eq!(ctx.request_id.as_deref(), Some("req-123"));
    }

    #[test]
    fn test_jsonrpc_codes() {
        assert_eq!(Error::method_not_found("x").jsonrpc_code(), -32601);
        assert_eq!(Error::invalid_params("x").jsonrpc_code(), -32602);
        assert_eq!(Error::invalid_cursor("x").jsonrpc_code(), -32602);
        assert_eq!(Error::cancelled("x").jsonrpc_code(), -32800);
        assert_eq!(Error::duplicate_id(1).jsonrpc_code(), -32603);
    }

    #[test]
    fn test_cursor_errors_survive_the_wire() {
        let wire = Error::invalid_cursor("bad signature").to_jsonrpc();
        let back = Error::from_jsonrpc(wire);
        assert_eq!(back.kind, ErrorKind::InvalidCursor);

        let plain = Error::from_jsonrpc(Error::invalid_params("nope").to_jsonrpc());
        assert_eq!(plain.kind, ErrorKind::InvalidParams);
    }

    #[test]
    fn test_context_is_never_serialized() {
        let err = Error::internal("boom").with_request_id("secret-req");
        let json = serde_json::to_string(&err).unwrap();
        assert!(!json.contains("secret-req"));
    }

    #[test]
    fn test_retryable_and_fatal() {
        assert!(Error::timeout("x").is_retryable());
        assert!(Error::session_closed("x").is_retryable());
        assert!(!Error::invalid_params("x").is_retryable());
        assert!(Error::duplicate_id(4).is_fatal());
        assert!(!Error::internal("x").is_fatal());
    }

    #[test]
    fn test_serde_json_error_classification() {
        let syntax = serde_json::from_str::<Value>("{").unwrap_err();
        assert_eq!(Error::from(syntax).kind, ErrorKind::ParseError);

        let data = serde_json::from_str::<u32>("\"x\"").unwrap_err();
        assert_eq!(Error::from(data).kind, ErrorKind::InvalidParams);
    }
}
