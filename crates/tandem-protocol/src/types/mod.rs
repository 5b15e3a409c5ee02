//! Protocol payload types
//!
//! Each submodule covers one protocol feature. Everything is re-exported here so
//! callers can `use tandem_protocol::types::*`.

pub mod cancel;
pub mod completion;
pub mod core;
pub mod logging;
pub mod pagination;
pub mod progress;

pub use cancel::CancelledNotification;
pub use completion::{
    ArgumentInfo, CompleteRequestParams, CompleteResult, CompletionContext, CompletionData,
    CompletionReference, MAX_COMPLETION_VALUES,
};
pub use self::core::{MessageId, RequestId};
pub use logging::{LogLevel, LoggingNotification, SetLevelRequest};
pub use pagination::{Cursor, PaginatedRequestParams};
pub use progress::{ProgressNotification, ProgressToken, RequestMeta};
