//! Method names the session engine understands itself.
//!
//! Everything else is routed to application handlers.

/// Handshake request; never cancellable
pub const INITIALIZE: &str = "initialize";

/// Handshake completion notification
pub const INITIALIZED: &str = "notifications/initialized";

/// Liveness probe, answered with an empty object
pub const PING: &str = "ping";

/// Cooperative cancellation of an in-flight request
pub const CANCELLED: &str = "notifications/cancelled";

/// Progress report for a request that carried a progress token
pub const PROGRESS: &str = "notifications/progress";

/// Log record emitted to the peer
pub const MESSAGE: &str = "notifications/message";

/// Adjust the peer's minimum log severity
pub const SET_LEVEL: &str = "logging/setLevel";

/// Argument autocompletion
pub const COMPLETE: &str = "completion/complete";
