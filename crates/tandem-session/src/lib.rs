//! # Tandem Session
//!
//! A bidirectional JSON-RPC session engine. Two peers share one ordered
//! transport and either side may issue requests; the session multiplexes
//! request/response exchanges with progress reporting, cooperative
//! cancellation, cursor pagination, severity-filtered logging and argument
//! completion.
//!
//! ## Components
//!
//! - [`correlation`]: outstanding request ids and their pending handles
//! - [`progress`]: progress tokens, monotonicity and cancellation flags
//! - [`logging`]: the peer's minimum log severity
//! - [`completion`]: provider lookup and result normalization
//! - [`pagination`]: the N+1 page protocol over signed cursors
//! - [`session`]: the composition root that routes every message
//!
//! All state is owned by one [`Session`]; nothing is process-global, so any
//! number of sessions can run side by side.
//!
//! ## Example
//!
//! ```rust
//! use serde_json::json;
//! use tandem_session::{Session, handler_fn};
//! use tandem_transport::ChannelTransport;
//!
//! # tokio_test::block_on(async {
//! let (left, right) = ChannelTransport::pair();
//!
//! let server = Session::builder()
//!     .handler("add", handler_fn(|params, _ctx| async move {
//!         let params = params.unwrap_or_default();
//!         let sum = params["a"].as_i64().unwrap_or(0) + params["b"].as_i64().unwrap_or(0);
//!         Ok(json!(sum))
//!     }))
//!     .start(right)
//!     .await
//!     .unwrap();
//! let client = Session::builder().start(left).await.unwrap();
//!
//! let sum = client.request("add", Some(json!({"a": 2, "b": 3}))).await.unwrap();
//! assert_eq!(sum, json!(5));
//!
//! client.close().await.unwrap();
//! server.closed().await;
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

pub mod completion;
pub mod config;
pub mod correlation;
mod emitter;
pub mod handler;
pub mod logging;
pub mod observability;
pub mod pagination;
pub mod progress;
pub mod session;

pub use completion::{CompletionProvider, CompletionRequest, CompletionResolver, completion_fn};
pub use config::{
    ConfigError, LoggingConfig, PaginationConfig, RequestConfig, SessionConfig,
    SessionConfigBuilder,
};
pub use correlation::{CorrelationTable, PendingHandle};
pub use handler::{
    HandlerContext, NotificationHandler, RequestHandler, handler_fn, notification_fn,
};
pub use logging::LoggingFilter;
pub use pagination::{Keyed, Page, PageSource, Paginator, VecSource, collect_all};
pub use progress::{
    CancelDisposition, InFlight, ProgressCoordinator, ProgressDisposition, ProgressObserver,
    ProgressUpdate,
};
pub use session::{RequestOptions, Session, SessionBuilder, SessionStats};

pub use tandem_protocol as protocol;
pub use tandem_transport as transport;
