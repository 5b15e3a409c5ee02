//! Application handler boundary
//!
//! Request handlers are registered per method on the
//! [`SessionBuilder`](crate::SessionBuilder) and run on their own task. Each
//! invocation gets a [`HandlerContext`] for cancellation, progress and
//! logging.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use tandem_protocol::{
    JsonRpcMessage, JsonRpcNotification, LogLevel, ProgressNotification, ProgressToken, RequestId, Result,
    methods,
};

use crate::pagination::Paginator;
use crate::progress::{InFlight, Monotonic};
use crate::session::Session;

/// Handles one request method
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Produce the result for `params`, or a typed error the peer will see
    async fn handle(&self, params: Option<Value>, context: HandlerContext) -> Result<Value>;
}

/// Handles one application notification method.
///
/// Runs on the routing task, so it should return quickly and must not wait
/// for responses from the peer.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    /// Process the notification; errors are logged, never sent
    async fn handle(&self, params: Option<Value>) -> Result<()>;
}

/// [`RequestHandler`] backed by an async function
pub struct FnHandler<F, Fut> {
    f: F,
    _future: PhantomData<fn() -> Fut>,
}

impl<F, Fut> fmt::Debug for FnHandler<F, Fut> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

/// Wrap an async function as a [`RequestHandler`]
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F, Fut>
where
    F: Fn(Option<Value>, HandlerContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    FnHandler {
        f,
        _future: PhantomData,
    }
}

#[async_trait]
impl<F, Fut> RequestHandler for FnHandler<F, Fut>
where
    F: Fn(Option<Value>, HandlerContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    async fn handle(&self, params: Option<Value>, context: HandlerContext) -> Result<Value> {
        (self.f)(params, context).await
    }
}

/// [`NotificationHandler`] backed by an async function
pub struct FnNotificationHandler<F, Fut> {
    f: F,
    _future: PhantomData<fn() -> Fut>,
}

impl<F, Fut> fmt::Debug for FnNotificationHandler<F, Fut> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnNotificationHandler")
            .finish_non_exhaustive()
    }
}

/// Wrap an async function as a [`NotificationHandler`]
pub fn notification_fn<F, Fut>(f: F) -> FnNotificationHandler<F, Fut>
where
    F: Fn(Option<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    FnNotificationHandler {
        f,
        _future: PhantomData,
    }
}

#[async_trait]
impl<F, Fut> NotificationHandler for FnNotificationHandler<F, Fut>
where
    F: Fn(Option<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    async fn handle(&self, params: Option<Value>) -> Result<()> {
        (self.f)(params).await
    }
}

/// Per-invocation handle given to a [`RequestHandler`]
///
/// Cheap to clone; clones share the same progress stream and cancellation
/// flag.
#[derive(Clone)]
pub struct HandlerContext {
    request_id: RequestId,
    method: Arc<str>,
    cancel: CancellationToken,
    progress_token: Option<ProgressToken>,
    progress: Arc<Mutex<ProgressState>>,
    session: Session,
}

/// Local progress state shared by every clone of one context
#[derive(Debug, Default)]
struct ProgressState {
    last: Monotonic,
    finished: bool,
}

impl fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerContext")
            .field("request_id", &self.request_id)
            .field("method", &self.method)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("progress_token", &self.progress_token)
            .finish()
    }
}

impl HandlerContext {
    pub(crate) fn new(in_flight: InFlight, method: &str, session: Session) -> Self {
        Self {
            request_id: in_flight.request_id,
            method: Arc::from(method),
            cancel: in_flight.cancel,
            progress_token: in_flight.progress_token,
            progress: Arc::new(Mutex::new(ProgressState::default())),
            session,
        }
    }

    /// Stop all further progress from this invocation, including from clones
    /// that outlive the handler. Called before the response is sent.
    pub(crate) fn finish(&self) {
        self.progress.lock().finished = true;
    }

    /// Id the peer sent this request under
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Method being handled
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Whether the peer cancelled this request or the session ended.
    ///
    /// Long-running handlers should poll this and return early; the session
    /// drops the response of a cancelled request either way.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the request is cancelled
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// Token the peer asked progress under, if it opted in
    pub fn progress_token(&self) -> Option<&ProgressToken> {
        self.progress_token.as_ref()
    }

    /// Report progress to the peer.
    ///
    /// Returns `Ok(false)` without sending anything when the peer did not
    /// supply a progress token, `progress` does not exceed the last value
    /// reported, or the request has already been answered.
    pub async fn report_progress(
        &self,
        progress: f64,
        total: Option<f64>,
        message: Option<String>,
    ) -> Result<bool> {
        let Some(token) = &self.progress_token else {
            trace!(request_id = %self.request_id, "No progress token; not reporting");
            return Ok(false);
        };
        // Checked under the send lock so nothing follows the response
        let emitter = &self.session.inner.emitter;
        let guard = emitter.lock().await;
        {
            let mut state = self.progress.lock();
            if state.finished {
                debug!(request_id = %self.request_id, progress, "Request finished; dropping progress");
                return Ok(false);
            }
            if !state.last.advance(progress) {
                debug!(request_id = %self.request_id, progress, "Dropping non-increasing local progress");
                return Ok(false);
            }
        }

        let notification = ProgressNotification {
            progress_token: token.clone(),
            progress,
            total,
            message,
        };
        let params = serde_json::to_value(&notification)?;
        let message: JsonRpcMessage = JsonRpcNotification::new(methods::PROGRESS, Some(params)).into();
        emitter.send_locked(&guard, &message).await?;
        Ok(true)
    }

    /// Emit a log record to the peer, subject to its threshold
    pub async fn log(&self, level: LogLevel, logger: Option<&str>, data: Value) -> Result<bool> {
        self.session.log(level, logger, data).await
    }

    /// Paginator for a listing, with cursors bound to `scope`
    pub fn paginator(&self, scope: &str) -> Paginator {
        self.session.inner.paginator.for_scope(scope)
    }

    /// The session this request arrived on, for requests back to the peer
    pub fn peer(&self) -> &Session {
        &self.session
    }
}
