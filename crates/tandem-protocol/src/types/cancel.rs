//! Cancellation notification

use serde::{Deserialize, Serialize};

use super::core::RequestId;

/// Parameters of `notifications/cancelled`
///
/// Sent by a requester that no longer wants the result of `request_id`.
/// Receivers treat it as a hint; an unknown or finished id is not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelledNotification {
    /// Id of the request being cancelled
    #[serde(rename = "requestId")]
    pub request_id: RequestId,
    /// Optional reason, for logging only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CancelledNotification {
    /// Create a cancellation for `request_id`
    pub fn new(request_id: RequestId, reason: Option<String>) -> Self {
        Self { request_id, reason }
    }
}
