//! The session engine
//!
//! A [`Session`] owns one transport and everything scoped to it: the
//! correlation table, the progress/cancellation coordinator, the peer log
//! filter, the completion resolver and the paginator. One routing task is the
//! only reader of the transport:
//!
//! ```text
//!                    ┌─────────────── routing task ───────────────┐
//! transport.receive ─┤ Response      ──► CorrelationTable::resolve │
//!                    │ ping/setLevel ──► answered inline           │
//!                    │ Request       ──► spawned handler task      │
//!                    │ cancelled     ──► Coordinator (inbound)     │
//!                    │ progress      ──► Coordinator (outbound)    │
//!                    │ other notif.  ──► NotificationHandler       │
//!                    └─────────────────────────────────────────────┘
//! ```
//!
//! Losing the transport resolves every pending request with `SessionClosed`
//! and cancels every running handler.

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use tandem_protocol::jsonrpc::utils::parse_slice;
use tandem_protocol::types::RequestMeta;
use tandem_protocol::{
    CancelledNotification, CompleteRequestParams, CompleteResult, CompletionReference,
    CursorCodec, Error, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    JsonRpcResponsePayload, LogLevel, ProgressNotification, RequestId, Result, SetLevelRequest,
    methods,
};
use tandem_transport::{Transport, TransportMessage, TransportMetrics};

use crate::completion::{CompletionProvider, CompletionResolver};
use crate::config::SessionConfig;
use crate::correlation::CorrelationTable;
use crate::emitter::Emitter;
use crate::handler::{HandlerContext, NotificationHandler, RequestHandler};
use crate::logging::LoggingFilter;
use crate::pagination::Paginator;
use crate::progress::{ProgressCoordinator, ProgressObserver};

/// Cursor scope used when a handler does not pick one
const DEFAULT_CURSOR_SCOPE: &str = "session";

/// Per-call overrides for [`Session::request_with`]
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Response deadline; falls back to the configured default
    pub timeout: Option<Duration>,
    /// Opt in to progress; accepted reports are forwarded here
    pub progress: Option<ProgressObserver>,
    /// Abandon the request when this token fires
    pub cancel: Option<CancellationToken>,
}

impl RequestOptions {
    /// Options with every field unset
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the response deadline
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Ask the peer for progress and forward it to `observer`
    #[must_use]
    pub fn with_progress(mut self, observer: ProgressObserver) -> Self {
        self.progress = Some(observer);
        self
    }

    /// Abandon the request when `token` is cancelled
    #[must_use]
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Point-in-time counters for one session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStats {
    /// Outbound requests awaiting a response
    pub pending_requests: usize,
    /// Inbound requests our handlers are working on
    pub in_flight_handlers: usize,
    /// Progress reports dropped as late, unknown or non-increasing
    pub dropped_progress: u64,
    /// Current peer log threshold
    pub log_threshold: LogLevel,
    /// Transport counters
    pub transport: TransportMetrics,
}

pub(crate) struct SessionInner {
    pub(crate) emitter: Emitter,
    pub(crate) paginator: Paginator,
    table: CorrelationTable,
    coordinator: ProgressCoordinator,
    filter: Arc<LoggingFilter>,
    completions: CompletionResolver,
    handlers: HashMap<String, Arc<dyn RequestHandler>>,
    notification_handlers: HashMap<String, Arc<dyn NotificationHandler>>,
    handler_slots: Arc<Semaphore>,
    default_timeout: Option<Duration>,
    shutdown: CancellationToken,
    close_reason: Mutex<Option<String>>,
    router: Mutex<Option<JoinHandle<()>>>,
}

/// One bidirectional session with a single peer
///
/// Cheap to clone; every clone drives the same session.
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("pending", &self.inner.table.len())
            .field("in_flight", &self.inner.coordinator.in_flight())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Configures and starts a [`Session`]
pub struct SessionBuilder {
    config: SessionConfig,
    handlers: HashMap<String, Arc<dyn RequestHandler>>,
    notification_handlers: HashMap<String, Arc<dyn NotificationHandler>>,
    completions: CompletionResolver,
}

impl fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("config", &self.config)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field(
                "notification_handlers",
                &self.notification_handlers.keys().collect::<Vec<_>>(),
            )
            .field("completions", &self.completions)
            .finish()
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    /// Builder with default configuration and no handlers
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            handlers: HashMap::new(),
            notification_handlers: HashMap::new(),
            completions: CompletionResolver::new(),
        }
    }

    /// Replace the configuration
    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Handle requests for `method`.
    ///
    /// `ping` and `logging/setLevel` are answered by the engine and never
    /// reach a registered handler. A handler for `completion/complete`
    /// replaces the built-in resolver.
    pub fn handler(
        mut self,
        method: impl Into<String>,
        handler: impl RequestHandler + 'static,
    ) -> Self {
        let method = method.into();
        if method == methods::PING || method == methods::SET_LEVEL {
            warn!(%method, "Handler for engine-owned method will never run");
        }
        self.handlers.insert(method, Arc::new(handler));
        self
    }

    /// Handle notifications for `method`
    pub fn notification_handler(
        mut self,
        method: impl Into<String>,
        handler: impl NotificationHandler + 'static,
    ) -> Self {
        self.notification_handlers
            .insert(method.into(), Arc::new(handler));
        self
    }

    /// Provide completions for `argument` of `reference`
    pub fn completion(
        mut self,
        reference: &CompletionReference,
        argument: &str,
        provider: impl CompletionProvider + 'static,
    ) -> Self {
        self.completions
            .register(reference, argument, Arc::new(provider));
        self
    }

    /// Connect `transport` and start routing
    pub async fn start(self, transport: impl Transport + 'static) -> Result<Session> {
        self.start_shared(Arc::new(transport)).await
    }

    /// Connect a shared transport and start routing.
    ///
    /// # Errors
    ///
    /// `Configuration` for invalid settings; `Transport` if connecting fails.
    pub async fn start_shared(self, transport: Arc<dyn Transport>) -> Result<Session> {
        let config = self.config;
        config
            .validate()
            .map_err(|e| Error::configuration(e.to_string()))?;

        let mut codec = match config
            .cursor_key_bytes()
            .map_err(|e| Error::configuration(e.to_string()))?
        {
            Some(key) => CursorCodec::new(DEFAULT_CURSOR_SCOPE, key)?,
            None => CursorCodec::ephemeral(DEFAULT_CURSOR_SCOPE),
        };
        if let Some(max_age) = config.pagination.cursor_max_age {
            codec = codec.with_max_age(max_age);
        }

        if !transport.is_connected() {
            transport.connect().await?;
        }

        let filter = Arc::new(LoggingFilter::new(config.logging.initial_level));
        let inner = Arc::new(SessionInner {
            emitter: Emitter::new(transport, filter.clone()),
            paginator: Paginator::new(
                codec,
                config.pagination.default_page_size,
                config.pagination.max_page_size,
            ),
            table: CorrelationTable::new(),
            coordinator: ProgressCoordinator::new(),
            filter,
            completions: self.completions,
            handlers: self.handlers,
            notification_handlers: self.notification_handlers,
            handler_slots: Arc::new(Semaphore::new(config.requests.max_in_flight_handlers)),
            default_timeout: config.requests.default_timeout,
            shutdown: CancellationToken::new(),
            close_reason: Mutex::new(None),
            router: Mutex::new(None),
        });

        let session = Session { inner };
        let router = tokio::spawn(session.clone().route_incoming());
        *session.inner.router.lock() = Some(router);

        info!(
            handlers = session.inner.handlers.len(),
            threshold = %session.inner.filter.threshold(),
            "Session started"
        );
        Ok(session)
    }
}

impl Session {
    /// Start configuring a session
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    // === Outbound ===

    /// Send a request and wait for its result with default options
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.request_with(method, params, RequestOptions::default())
            .await
    }

    /// Send a request and wait for its result.
    ///
    /// On timeout or local cancellation the pending entry is removed, the
    /// peer is sent `notifications/cancelled` (never for `initialize`), and
    /// the call fails with `Timeout` or `Cancelled`. A response arriving
    /// afterwards is discarded.
    pub async fn request_with(
        &self,
        method: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> Result<Value> {
        let inner = &self.inner;
        let RequestOptions {
            timeout,
            progress,
            cancel,
        } = options;

        let progress_token = progress
            .is_some()
            .then(|| inner.coordinator.allocate_token());
        let params = match &progress_token {
            Some(token) => Some(RequestMeta::attach_progress_token(params, token)?),
            None => params,
        };

        let handle = {
            let guard = inner.emitter.lock().await;
            let handle = inner.table.register(method, progress_token.clone())?;
            let id = handle.id().clone();
            if let Some(token) = progress_token {
                inner.coordinator.attach(id.clone(), token, progress);
            }

            let request = JsonRpcRequest::new(method, params, id.clone());
            if let Err(e) = inner.emitter.send_locked(&guard, &request.into()).await {
                inner.table.remove(&id);
                inner.coordinator.detach(&id);
                return Err(e.with_operation(method));
            }
            handle
        };

        let id = handle.id().clone();
        let _cleanup = PendingCleanup {
            inner,
            id: id.clone(),
        };

        let timeout = timeout.or(inner.default_timeout);
        let deadline = async move {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };
        let cancel = cancel.unwrap_or_default();

        tokio::select! {
            outcome = handle => outcome,
            () = deadline => {
                self.abandon(&id, method, "timeout").await;
                Err(Error::timeout(format!("no response to {method} within {timeout:?}"))
                    .with_request_id(id.to_string()))
            }
            () = cancel.cancelled() => {
                self.abandon(&id, method, "cancelled by requester").await;
                Err(Error::cancelled(format!("{method} was cancelled"))
                    .with_request_id(id.to_string()))
            }
        }
    }

    /// Stop waiting for `id` and tell the peer, unless it already answered
    async fn abandon(&self, id: &RequestId, method: &str, reason: &str) {
        let inner = &self.inner;
        let was_pending = inner.table.remove(id);
        inner.coordinator.detach(id);
        if !was_pending {
            return;
        }
        if method == methods::INITIALIZE {
            debug!(request_id = %id, "Not cancelling initialize request");
            return;
        }

        let notice = CancelledNotification::new(id.clone(), Some(reason.to_string()));
        if let Err(e) = inner.emitter.notify(methods::CANCELLED, &notice).await {
            debug!(request_id = %id, error = %e, "Failed to send cancellation");
        }
    }

    /// Send a notification
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        if self.is_closed() {
            return Err(Error::session_closed(self.close_reason()).with_operation(method));
        }
        self.inner
            .emitter
            .send(&JsonRpcNotification::new(method, params).into())
            .await
    }

    /// Emit a log record to the peer if its threshold allows.
    ///
    /// Returns whether the record was sent.
    pub async fn log(&self, level: LogLevel, logger: Option<&str>, data: Value) -> Result<bool> {
        self.inner.emitter.log(level, logger, data).await
    }

    /// Ask the peer to only send log records at `level` or above
    pub async fn set_peer_log_level(&self, level: LogLevel) -> Result<()> {
        let params = serde_json::to_value(SetLevelRequest { level })?;
        self.request(methods::SET_LEVEL, Some(params)).await?;
        Ok(())
    }

    /// Round-trip a `ping`
    pub async fn ping(&self) -> Result<()> {
        self.request(methods::PING, None).await?;
        Ok(())
    }

    // === Lifecycle ===

    /// End the session: fail pending requests, cancel handlers, close the
    /// transport and wait for the routing task.
    pub async fn close(&self) -> Result<()> {
        self.terminate("session closed locally");
        let transport_result = self.inner.emitter.transport().close().await;

        let router = self.inner.router.lock().take();
        if let Some(router) = router {
            let _ = router.await;
        }
        transport_result.map_err(Error::from)
    }

    /// Resolves once the session has ended for any reason
    pub async fn closed(&self) {
        self.inner.shutdown.cancelled().await;
    }

    /// Whether the session has ended
    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    fn close_reason(&self) -> String {
        self.inner
            .close_reason
            .lock()
            .clone()
            .unwrap_or_else(|| "session closed".to_string())
    }

    /// Current counters
    pub fn stats(&self) -> SessionStats {
        let inner = &self.inner;
        SessionStats {
            pending_requests: inner.table.len(),
            in_flight_handlers: inner.coordinator.in_flight(),
            dropped_progress: inner.coordinator.dropped_reports(),
            log_threshold: inner.filter.threshold(),
            transport: inner.emitter.transport().metrics(),
        }
    }

    /// Current peer log threshold
    pub fn log_threshold(&self) -> LogLevel {
        self.inner.filter.threshold()
    }

    /// Paginator bound to `scope`, for listings served outside a handler
    pub fn paginator(&self, scope: &str) -> Paginator {
        self.inner.paginator.for_scope(scope)
    }

    fn terminate(&self, reason: &str) {
        let inner = &self.inner;
        {
            let mut close_reason = inner.close_reason.lock();
            if close_reason.is_some() {
                return;
            }
            *close_reason = Some(reason.to_string());
        }

        let pending = inner.table.cancel_all(reason);
        let handlers = inner.coordinator.cancel_all_inbound();
        inner.shutdown.cancel();
        inner.handler_slots.close();
        info!(reason, pending, handlers, "Session terminated");
    }

    // === Inbound ===

    async fn route_incoming(self) {
        let transport = self.inner.emitter.transport().clone();
        let shutdown = self.inner.shutdown.clone();
        debug!("Session routing task started");

        loop {
            let received = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                received = transport.receive() => received,
            };

            match received {
                Ok(Some(message)) => self.route(message).await,
                Ok(None) => {
                    self.terminate("transport closed by peer");
                    break;
                }
                Err(e) if e.is_disconnect() => {
                    self.terminate(&format!("transport failed: {e}"));
                    break;
                }
                Err(e) => warn!(error = %e, "Transport receive error"),
            }
        }

        debug!("Session routing task terminated");
    }

    async fn route(&self, message: TransportMessage) {
        let message = match parse_slice(&message.payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, size = message.size(), "Dropping malformed message");
                return;
            }
        };

        match message {
            JsonRpcMessage::Response(response) => self.on_response(response),
            JsonRpcMessage::Request(request) => self.on_request(request).await,
            JsonRpcMessage::Notification(notification) => {
                self.on_notification(notification).await;
            }
        }
    }

    fn on_response(&self, response: JsonRpcResponse) {
        let Some(id) = response.request_id().cloned() else {
            warn!("Dropping response with null id");
            return;
        };
        trace!(request_id = %id, success = response.is_success(), "Routing response");

        let outcome = match response.payload {
            JsonRpcResponsePayload::Success { result } => Ok(result),
            JsonRpcResponsePayload::Error { error } => Err(Error::from_jsonrpc(error)),
        };
        if self.inner.table.resolve(&id, outcome) {
            self.inner.coordinator.detach(&id);
        }
    }

    async fn on_request(&self, request: JsonRpcRequest) {
        trace!(request_id = %request.id, method = %request.method, "Routing request");
        let inner = &self.inner;

        match request.method.as_str() {
            methods::PING => {
                self.respond(request.id, Ok(json!({}))).await;
                return;
            }
            methods::SET_LEVEL => {
                let outcome = self.apply_set_level(request.params);
                self.respond(request.id, outcome).await;
                return;
            }
            _ => {}
        }

        let dispatch = match inner.handlers.get(&request.method) {
            Some(handler) => Dispatch::Handler(handler.clone()),
            None if request.method == methods::COMPLETE => Dispatch::Completion,
            None => {
                debug!(method = %request.method, "No handler registered");
                let err = Error::method_not_found(request.method.clone());
                self.respond(request.id, Err(err)).await;
                return;
            }
        };

        let progress_token = RequestMeta::progress_token(request.params.as_ref());
        let in_flight = match inner
            .coordinator
            .begin(request.id.clone(), &request.method, progress_token)
        {
            Ok(in_flight) => in_flight,
            // A reply under a reused id would settle the peer's original request
            Err(e) => {
                debug!(error = %e, "Dropping request with duplicate id");
                return;
            }
        };

        let session = self.clone();
        tokio::spawn(async move {
            let JsonRpcRequest {
                id, method, params, ..
            } = request;
            let cancel = in_flight.cancel.clone();

            let permit = tokio::select! {
                permit = session.inner.handler_slots.clone().acquire_owned() => permit.ok(),
                () = cancel.cancelled() => None,
            };
            let outcome = match permit {
                Some(_permit) => {
                    let context = HandlerContext::new(in_flight, &method, session.clone());
                    let work = session.dispatch(dispatch, params, context.clone());
                    let outcome = match AssertUnwindSafe(work).catch_unwind().await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            warn!(request_id = %id, %method, "Handler panicked");
                            Err(Error::internal("handler panicked"))
                        }
                    };
                    context.finish();
                    outcome
                }
                None => Err(Error::cancelled("cancelled before a handler slot was free")),
            };

            if session.inner.coordinator.finish(&id) {
                debug!(request_id = %id, %method, "Request was cancelled; suppressing response");
                return;
            }
            if let Err(e) = &outcome {
                debug!(request_id = %id, %method, error = %e, "Handler failed");
            }
            session.respond(id, outcome).await;
        });
    }

    async fn dispatch(
        &self,
        dispatch: Dispatch,
        params: Option<Value>,
        context: HandlerContext,
    ) -> Result<Value> {
        match dispatch {
            Dispatch::Handler(handler) => handler.handle(params, context).await,
            Dispatch::Completion => {
                let params = params
                    .ok_or_else(|| Error::invalid_params("completion/complete requires params"))?;
                let params: CompleteRequestParams = serde_json::from_value(params)?;
                let completion = self
                    .inner
                    .completions
                    .complete(&params.reference, &params.argument, params.context.as_ref())
                    .await?;
                Ok(serde_json::to_value(CompleteResult { completion })?)
            }
        }
    }

    fn apply_set_level(&self, params: Option<Value>) -> Result<Value> {
        let params =
            params.ok_or_else(|| Error::invalid_params("logging/setLevel requires params"))?;
        let SetLevelRequest { level } = serde_json::from_value(params)?;
        self.inner.filter.set_threshold(level);
        debug!(%level, "Peer changed log threshold");
        Ok(json!({}))
    }

    async fn respond(&self, id: RequestId, outcome: Result<Value>) {
        let response = match outcome {
            Ok(result) => JsonRpcResponse::success(result, id.clone()),
            Err(e) => JsonRpcResponse::error_response(e.to_jsonrpc(), id.clone()),
        };
        if let Err(e) = self.inner.emitter.send(&response.into()).await {
            debug!(request_id = %id, error = %e, "Failed to send response");
        }
    }

    async fn on_notification(&self, notification: JsonRpcNotification) {
        let inner = &self.inner;
        match notification.method.as_str() {
            methods::CANCELLED => {
                match parse_params::<CancelledNotification>(notification.params) {
                    Ok(cancel) => {
                        inner
                            .coordinator
                            .on_cancel_requested(&cancel.request_id, cancel.reason.as_deref());
                    }
                    Err(e) => warn!(error = %e, "Dropping malformed cancellation"),
                }
            }
            methods::PROGRESS => match parse_params::<ProgressNotification>(notification.params) {
                Ok(report) => {
                    inner.coordinator.on_progress(
                        &report.progress_token,
                        report.progress,
                        report.total,
                        report.message,
                    );
                }
                Err(e) => warn!(error = %e, "Dropping malformed progress"),
            },
            method => match inner.notification_handlers.get(method) {
                Some(handler) => {
                    if let Err(e) = handler.handle(notification.params).await {
                        warn!(%method, error = %e, "Notification handler failed");
                    }
                }
                None => debug!(%method, "Unhandled notification"),
            },
        }
    }
}

enum Dispatch {
    Handler(Arc<dyn RequestHandler>),
    Completion,
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> Result<T> {
    let params = params.ok_or_else(|| Error::invalid_params("missing params"))?;
    Ok(serde_json::from_value(params)?)
}

/// Removes the table entry and progress link when the requester stops
/// waiting, including when its future is dropped.
struct PendingCleanup<'a> {
    inner: &'a SessionInner,
    id: RequestId,
}

impl Drop for PendingCleanup<'_> {
    fn drop(&mut self) {
        self.inner.table.remove(&self.id);
        self.inner.coordinator.detach(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_protocol::ErrorKind;
    use tandem_transport::ChannelTransport;

    async fn raw_peer() -> (Session, ChannelTransport) {
        let (local, remote) = ChannelTransport::pair();
        let session = Session::builder().start(local).await.unwrap();
        (session, remote)
    }

    async fn next_json(transport: &ChannelTransport) -> Value {
        let message = transport.receive().await.unwrap().unwrap();
        serde_json::from_slice(&message.payload).unwrap()
    }

    async fn send_json(transport: &ChannelTransport, value: Value) {
        transport
            .send(TransportMessage::new(value.to_string()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_ping_answered_by_engine() {
        let (_session, peer) = raw_peer().await;
        send_json(&peer, json!({"jsonrpc": "2.0", "id": 1, "method": "ping"})).await;
        let reply = next_json(&peer).await;
        assert_eq!(reply, json!({"jsonrpc": "2.0", "id": 1, "result": {}}));
    }

    #[tokio::test]
    async fn test_unknown_method_is_method_not_found() {
        let (_session, peer) = raw_peer().await;
        send_json(&peer, json!({"jsonrpc": "2.0", "id": "a", "method": "nope"})).await;
        let reply = next_json(&peer).await;
        assert_eq!(reply["id"], "a");
        assert_eq!(reply["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn test_set_level_with_unknown_name_is_invalid_params() {
        let (session, peer) = raw_peer().await;
        send_json(
            &peer,
            json!({"jsonrpc": "2.0", "id": 2, "method": "logging/setLevel", "params": {"level": "verbose"}}),
        )
        .await;
        let reply = next_json(&peer).await;
        assert_eq!(reply["error"]["code"], -32602);
        assert_eq!(session.log_threshold(), LogLevel::Info);
    }

    #[tokio::test]
    async fn test_late_response_is_ignored() {
        let (session, peer) = raw_peer().await;
        let requester = session.clone();
        let call = tokio::spawn(async move {
            requester
                .request_with(
                    "slow",
                    None,
                    RequestOptions::new().with_timeout(Duration::from_millis(20)),
                )
                .await
        });

        let request = next_json(&peer).await;
        let err = call.await.unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);

        let cancel = next_json(&peer).await;
        assert_eq!(cancel["method"], "notifications/cancelled");
        assert_eq!(cancel["params"]["requestId"], request["id"]);

        send_json(&peer, json!({"jsonrpc": "2.0", "id": request["id"], "result": 1})).await;
        send_json(&peer, json!({"jsonrpc": "2.0", "id": 5, "method": "ping"})).await;
        assert_eq!(next_json(&peer).await["id"], 5);
        assert_eq!(session.stats().pending_requests, 0);
        assert!(!session.is_closed());
    }

    #[tokio::test]
    async fn test_reused_in_flight_id_is_dropped() {
        let (local, peer) = ChannelTransport::pair();
        let _session = Session::builder()
            .handler(
                "hold",
                crate::handler::handler_fn(|_, ctx| async move {
                    ctx.cancelled().await;
                    Ok(json!("released"))
                }),
            )
            .start(local)
            .await
            .unwrap();

        let hold = json!({"jsonrpc": "2.0", "id": 7, "method": "hold"});
        send_json(&peer, hold.clone()).await;
        send_json(&peer, hold).await;
        send_json(&peer, json!({"jsonrpc": "2.0", "id": 8, "method": "ping"})).await;
        assert_eq!(next_json(&peer).await, json!({"jsonrpc": "2.0", "id": 8, "result": {}}));

        send_json(
            &peer,
            json!({"jsonrpc": "2.0", "method": "notifications/cancelled", "params": {"requestId": 7}}),
        )
        .await;
        send_json(&peer, json!({"jsonrpc": "2.0", "id": 9, "method": "ping"})).await;
        assert_eq!(next_json(&peer).await["id"], 9);
    }

    #[tokio::test]
    async fn test_malformed_message_does_not_stop_routing() {
        let (_session, peer) = raw_peer().await;
        peer.send(TransportMessage::new("{not json")).await.unwrap();
        send_json(&peer, json!({"jsonrpc": "2.0", "id": 9, "method": "ping"})).await;
        assert_eq!(next_json(&peer).await["id"], 9);
    }
}
