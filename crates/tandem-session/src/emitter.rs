//! Outbound path: serialize and hand messages to the transport.
//!
//! Every outbound message goes through one async lock so that id allocation
//! and emission of a request happen as a unit, and log records are filtered
//! before they cost a serialization.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};
use tracing::trace;

use tandem_protocol::jsonrpc::utils::serialize_message;
use tandem_protocol::{
    Error, JsonRpcMessage, JsonRpcNotification, LogLevel, LoggingNotification, Result, methods,
};
use tandem_transport::{Transport, TransportMessage};

use crate::logging::LoggingFilter;

pub(crate) struct Emitter {
    transport: Arc<dyn Transport>,
    send_lock: Mutex<()>,
    filter: Arc<LoggingFilter>,
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("transport", &self.transport)
            .field("threshold", &self.filter.threshold())
            .finish()
    }
}

impl Emitter {
    pub(crate) fn new(transport: Arc<dyn Transport>, filter: Arc<LoggingFilter>) -> Self {
        Self {
            transport,
            send_lock: Mutex::new(()),
            filter,
        }
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Hold the send path; pass the guard to [`send_locked`](Self::send_locked)
    pub(crate) async fn lock(&self) -> MutexGuard<'_, ()> {
        self.send_lock.lock().await
    }

    /// Send while the caller already holds the send lock
    pub(crate) async fn send_locked(
        &self,
        _guard: &MutexGuard<'_, ()>,
        message: &JsonRpcMessage,
    ) -> Result<()> {
        let bytes = serialize_message(message)?;
        trace!(method = message.method(), id = ?message.id(), size = bytes.len(), "Sending message");
        self.transport
            .send(TransportMessage::new(bytes))
            .await
            .map_err(Error::from)
    }

    pub(crate) async fn send(&self, message: &JsonRpcMessage) -> Result<()> {
        let guard = self.lock().await;
        self.send_locked(&guard, message).await
    }

    pub(crate) async fn notify<P: Serialize>(&self, method: &str, params: &P) -> Result<()> {
        let params = serde_json::to_value(params)?;
        let params = (!params.is_null()).then_some(params);
        self.send(&JsonRpcNotification::new(method, params).into())
            .await
    }

    /// Emit a log record if the peer's threshold lets it through.
    ///
    /// Returns whether the record was sent.
    pub(crate) async fn log(
        &self,
        level: LogLevel,
        logger: Option<&str>,
        data: Value,
    ) -> Result<bool> {
        if !self.filter.should_emit(level) {
            trace!(%level, threshold = %self.filter.threshold(), "Suppressed log record");
            return Ok(false);
        }
        let record = LoggingNotification {
            level,
            logger: logger.map(str::to_string),
            data,
        };
        self.notify(methods::MESSAGE, &record).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tandem_transport::ChannelTransport;

    #[tokio::test]
    async fn test_suppressed_records_never_reach_transport() {
        let (local, remote) = ChannelTransport::pair();
        let filter = Arc::new(LoggingFilter::new(LogLevel::Warning));
        let emitter = Emitter::new(Arc::new(local), filter);

        assert!(!emitter.log(LogLevel::Info, None, json!("quiet")).await.unwrap());
        assert!(
            emitter
                .log(LogLevel::Error, Some("db"), json!({"code": 7}))
                .await
                .unwrap()
        );

        let message = remote.receive().await.unwrap().unwrap();
        let value: Value = serde_json::from_slice(&message.payload).unwrap();
        assert_eq!(value["method"], "notifications/message");
        assert_eq!(value["params"]["level"], "error");
        assert_eq!(value["params"]["logger"], "db");
        assert_eq!(emitter.transport().metrics().messages_sent, 1);
    }
}
