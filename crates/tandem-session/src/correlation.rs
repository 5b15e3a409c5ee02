//! Correlation table for outbound requests
//!
//! Every request we send is registered here before it reaches the transport.
//! The routing task resolves entries as responses arrive; the requester holds
//! a [`PendingHandle`] and awaits the outcome.
//!
//! ```text
//! register ──► pending ──► resolve(id, result) ──► handle yields result
//!                 │
//!                 ├──► remove(id)          (timeout / local cancel)
//!                 └──► cancel_all(reason)  (transport lost, session closed)
//! ```
//!
//! Identifiers come from a per-table counter and are never reused while
//! pending. A response for an id that is no longer pending is a benign race
//! and is discarded quietly.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, error, trace};

use tandem_protocol::{Error, ProgressToken, RequestId, Result};

struct PendingEntry {
    method: String,
    created: Instant,
    progress_token: Option<ProgressToken>,
    slot: oneshot::Sender<Result<Value>>,
}

#[derive(Default)]
struct TableState {
    pending: HashMap<RequestId, PendingEntry>,
    closed: Option<String>,
}

/// Tracks outbound requests awaiting a response
pub struct CorrelationTable {
    next_id: AtomicI64,
    state: Mutex<TableState>,
}

impl std::fmt::Debug for CorrelationTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CorrelationTable")
            .field("pending", &state.pending.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationTable {
    /// Empty table; the first allocated id is `1`
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            state: Mutex::new(TableState::default()),
        }
    }

    /// Allocate a fresh id and register a pending request under it.
    ///
    /// # Errors
    ///
    /// `SessionClosed` once [`cancel_all`](Self::cancel_all) has run, and
    /// `DuplicateId` if the allocated id is somehow still pending.
    pub fn register(
        &self,
        method: &str,
        progress_token: Option<ProgressToken>,
    ) -> Result<PendingHandle> {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.register_with_id(id, method, progress_token)
    }

    /// Register a pending request under a caller-chosen id.
    ///
    /// # Errors
    ///
    /// `SessionClosed` once the table is closed; `DuplicateId` if `id` is
    /// already pending. The existing entry is left untouched.
    pub fn register_with_id(
        &self,
        id: RequestId,
        method: &str,
        progress_token: Option<ProgressToken>,
    ) -> Result<PendingHandle> {
        let mut state = self.state.lock();

        if let Some(reason) = &state.closed {
            return Err(Error::session_closed(reason.clone()).with_operation(method));
        }
        if state.pending.contains_key(&id) {
            error!(request_id = %id, method, "Request id allocated twice");
            return Err(Error::duplicate_id(&id).with_operation(method));
        }

        let (slot, receiver) = oneshot::channel();
        state.pending.insert(
            id.clone(),
            PendingEntry {
                method: method.to_string(),
                created: Instant::now(),
                progress_token: progress_token.clone(),
                slot,
            },
        );
        trace!(request_id = %id, method, "Registered pending request");

        Ok(PendingHandle {
            id,
            progress_token,
            receiver,
        })
    }

    /// Deliver the outcome for `id`.
    ///
    /// Returns `false` when nothing was pending under `id` (already resolved,
    /// timed out, or never sent). That case is logged, not an error.
    pub fn resolve(&self, id: &RequestId, outcome: Result<Value>) -> bool {
        let entry = self.state.lock().pending.remove(id);
        match entry {
            Some(entry) => {
                trace!(
                    request_id = %id,
                    method = %entry.method,
                    elapsed_ms = entry.created.elapsed().as_millis() as u64,
                    "Resolved pending request"
                );
                // The requester may have stopped waiting; that is fine.
                let _ = entry.slot.send(outcome);
                true
            }
            None => {
                debug!(request_id = %id, "Discarding response for unknown request id");
                false
            }
        }
    }

    /// Forget `id` without resolving it. Returns whether it was pending.
    pub fn remove(&self, id: &RequestId) -> bool {
        self.state.lock().pending.remove(id).is_some()
    }

    /// Resolve every pending request with `SessionClosed` and refuse new ones.
    ///
    /// Returns how many requests were pending.
    pub fn cancel_all(&self, reason: &str) -> usize {
        let drained: Vec<(RequestId, PendingEntry)> = {
            let mut state = self.state.lock();
            state.closed.get_or_insert_with(|| reason.to_string());
            state.pending.drain().collect()
        };

        let count = drained.len();
        for (id, entry) in drained {
            let err = Error::session_closed(reason.to_string())
                .with_operation(entry.method)
                .with_request_id(id.to_string());
            let _ = entry.slot.send(Err(err));
        }
        if count > 0 {
            debug!(count, reason, "Cancelled all pending requests");
        }
        count
    }

    /// Number of pending requests
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.state.lock().pending.is_empty()
    }

    /// Whether `id` is pending
    pub fn contains(&self, id: &RequestId) -> bool {
        self.state.lock().pending.contains_key(id)
    }

    /// Progress token registered for `id`, if any
    pub fn progress_token(&self, id: &RequestId) -> Option<ProgressToken> {
        self.state
            .lock()
            .pending
            .get(id)
            .and_then(|entry| entry.progress_token.clone())
    }

    /// Whether [`cancel_all`](Self::cancel_all) has run
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed.is_some()
    }
}

/// The requester's side of one pending request
///
/// Awaiting the handle yields the response result, or `SessionClosed` if the
/// table was torn down first.
#[derive(Debug)]
pub struct PendingHandle {
    id: RequestId,
    progress_token: Option<ProgressToken>,
    receiver: oneshot::Receiver<Result<Value>>,
}

impl PendingHandle {
    /// Id the request was sent under
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Progress token attached to the request, if any
    pub fn progress_token(&self) -> Option<&ProgressToken> {
        self.progress_token.as_ref()
    }

    /// Wait for the outcome
    pub async fn wait(self) -> Result<Value> {
        self.await
    }

    /// Wait at most `timeout`.
    ///
    /// On expiry this returns `Timeout` and leaves the table entry in place;
    /// the caller decides whether to remove it and notify the peer.
    pub async fn wait_timeout(&mut self, timeout: Duration) -> Result<Value> {
        match tokio::time::timeout(timeout, &mut *self).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::timeout(format!(
                "no response for request {} within {:?}",
                self.id, timeout
            ))),
        }
    }
}

impl Future for PendingHandle {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(|outcome| {
            outcome.unwrap_or_else(|_| Err(Error::session_closed("request was abandoned")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tandem_protocol::ErrorKind;

    #[tokio::test]
    async fn test_resolve_delivers_to_handle() {
        let table = CorrelationTable::new();
        let handle = table.register("tools/call", None).unwrap();
        let id = handle.id().clone();
        assert_eq!(id, RequestId::Number(1));
        assert!(table.contains(&id));

        assert!(table.resolve(&id, Ok(json!({"ok": true}))));
        assert_eq!(handle.wait().await.unwrap(), json!({"ok": true}));
        assert!(table.is_empty());
    }

    #[test]
    fn test_ids_are_unique() {
        let table = CorrelationTable::new();
        let a = table.register("a", None).unwrap();
        let b = table.register("b", None).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_duplicate_id_is_fatal_and_keeps_original() {
        let table = CorrelationTable::new();
        let _first = table
            .register_with_id(RequestId::from("x"), "first", None)
            .unwrap();
        let err = table
            .register_with_id(RequestId::from("x"), "second", None)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::DuplicateId);
        assert!(err.is_fatal());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_unknown_response_is_discarded() {
        let table = CorrelationTable::new();
        assert!(!table.resolve(&RequestId::Number(99), Ok(Value::Null)));
    }

    #[tokio::test]
    async fn test_second_resolve_is_ignored() {
        let table = CorrelationTable::new();
        let handle = table.register("m", None).unwrap();
        let id = handle.id().clone();
        assert!(table.resolve(&id, Ok(json!(1))));
        assert!(!table.resolve(&id, Ok(json!(2))));
        assert_eq!(handle.await.unwrap(), json!(1));
    }

    #[tokio::test]
    async fn test_cancel_all_resolves_everything_and_closes() {
        let table = CorrelationTable::new();
        let a = table.register("a", None).unwrap();
        let b = table.register("b", Some(ProgressToken::from("p-1"))).unwrap();
        let b_id = b.id().clone();

        assert_eq!(table.cancel_all("transport lost"), 2);
        assert!(table.is_empty());
        assert!(table.is_closed());

        assert_eq!(a.await.unwrap_err().kind, ErrorKind::SessionClosed);
        assert_eq!(b.await.unwrap_err().kind, ErrorKind::SessionClosed);
        assert!(!table.resolve(&b_id, Ok(Value::Null)));

        let err = table.register("c", None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::SessionClosed);
    }

    #[tokio::test]
    async fn test_wait_timeout_leaves_entry() {
        let table = CorrelationTable::new();
        let mut handle = table.register("slow", None).unwrap();
        let err = handle
            .wait_timeout(Duration::from_millis(10))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(table.contains(handle.id()));
        assert!(table.remove(handle.id()));
    }

    #[test]
    fn test_progress_token_lookup() {
        let table = CorrelationTable::new();
        let handle = table.register("m", Some(ProgressToken::Number(5))).unwrap();
        assert_eq!(handle.progress_token(), Some(&ProgressToken::Number(5)));
        assert_eq!(table.progress_token(handle.id()), Some(ProgressToken::Number(5)));
    }
}
