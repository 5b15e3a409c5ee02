//! Progress and cancellation coordination
//!
//! The coordinator owns both directions of the two "racing" side channels:
//!
//! - **Outbound** (we asked): progress tokens we attached to our requests, the
//!   last accepted value per token, and an optional observer to forward
//!   accepted reports to.
//! - **Inbound** (we were asked): one entry per request our handlers are
//!   working on, holding its cancellation token and the peer's progress token.
//!
//! Nothing here ever fails a request. Late, duplicate or non-increasing
//! reports are dropped; cancellation of an unknown or finished request is a
//! no-op.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use tandem_protocol::{Error, ProgressToken, RequestId, Result, methods};

/// One accepted progress report
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Request the report belongs to
    pub request_id: RequestId,
    /// Progress so far
    pub progress: f64,
    /// Total amount of work, if known
    pub total: Option<f64>,
    /// Human-readable progress message
    pub message: Option<String>,
}

/// Receives accepted progress reports for one request
pub type ProgressObserver = mpsc::UnboundedSender<ProgressUpdate>;

/// What happened to an inbound progress report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressDisposition {
    /// Recorded and forwarded to the observer
    Accepted,
    /// Not greater than the last accepted value
    NotIncreasing,
    /// No live request owns the token
    UnknownToken,
}

/// What happened to an inbound cancellation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelDisposition {
    /// The request's flag is now set
    Cancelled,
    /// The flag was already set
    AlreadyCancelled,
    /// The target is the handshake, which cannot be cancelled
    RejectedInitialize,
    /// No in-flight request has that id
    Unknown,
}

/// Values accepted so far for one progress stream
///
/// The first finite value is accepted; afterwards only strictly greater ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct Monotonic {
    last: Option<f64>,
}

impl Monotonic {
    /// Record `value` if it advances the stream
    pub fn advance(&mut self, value: f64) -> bool {
        let advances = value.is_finite() && self.last.is_none_or(|last| value > last);
        if advances {
            self.last = Some(value);
        }
        advances
    }

    /// Last accepted value
    pub fn last(&self) -> Option<f64> {
        self.last
    }
}

#[derive(Debug)]
struct OutboundProgress {
    request_id: RequestId,
    stream: Monotonic,
    observer: Option<ProgressObserver>,
}

#[derive(Debug)]
struct InboundEntry {
    method: String,
    cancel: CancellationToken,
}

/// Handler-side view of one inbound request
#[derive(Debug, Clone)]
pub struct InFlight {
    /// Id the peer sent the request under
    pub request_id: RequestId,
    /// Set when the peer cancels the request or the session ends
    pub cancel: CancellationToken,
    /// Token the peer asked progress to be reported under
    pub progress_token: Option<ProgressToken>,
}

/// Session-scoped progress and cancellation state
#[derive(Debug, Default)]
pub struct ProgressCoordinator {
    next_token: AtomicU64,
    outbound: DashMap<ProgressToken, OutboundProgress>,
    tokens_by_request: DashMap<RequestId, ProgressToken>,
    inbound: DashMap<RequestId, InboundEntry>,
    dropped_reports: AtomicU64,
}

impl ProgressCoordinator {
    /// Empty coordinator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // === Outbound: requests we sent ===

    /// Allocate a token that is unique within this session
    pub fn allocate_token(&self) -> ProgressToken {
        let n = self.next_token.fetch_add(1, Ordering::Relaxed) + 1;
        ProgressToken::String(format!("p-{n}"))
    }

    /// Link `token` to `request_id` so reports under it are accepted
    pub fn attach(
        &self,
        request_id: RequestId,
        token: ProgressToken,
        observer: Option<ProgressObserver>,
    ) {
        self.tokens_by_request
            .insert(request_id.clone(), token.clone());
        self.outbound.insert(
            token,
            OutboundProgress {
                request_id,
                stream: Monotonic::default(),
                observer,
            },
        );
    }

    /// Allocate a fresh token and link it to `request_id`
    pub fn attach_token(
        &self,
        request_id: RequestId,
        observer: Option<ProgressObserver>,
    ) -> ProgressToken {
        let token = self.allocate_token();
        self.attach(request_id, token.clone(), observer);
        token
    }

    /// Handle a progress report from the peer
    pub fn on_progress(
        &self,
        token: &ProgressToken,
        progress: f64,
        total: Option<f64>,
        message: Option<String>,
    ) -> ProgressDisposition {
        let Some(mut entry) = self.outbound.get_mut(token) else {
            self.dropped_reports.fetch_add(1, Ordering::Relaxed);
            debug!(%token, progress, "Dropping progress for unknown token");
            return ProgressDisposition::UnknownToken;
        };

        if !entry.stream.advance(progress) {
            self.dropped_reports.fetch_add(1, Ordering::Relaxed);
            debug!(
                %token,
                progress,
                last = entry.stream.last(),
                "Dropping non-increasing progress"
            );
            return ProgressDisposition::NotIncreasing;
        }

        trace!(%token, progress, ?total, "Accepted progress");
        let update = ProgressUpdate {
            request_id: entry.request_id.clone(),
            progress,
            total,
            message,
        };
        let observer_gone = entry
            .observer
            .as_ref()
            .is_some_and(|observer| observer.send(update).is_err());
        if observer_gone {
            entry.observer = None;
        }
        ProgressDisposition::Accepted
    }

    /// Stop accepting progress for `request_id`
    pub fn detach(&self, request_id: &RequestId) {
        if let Some((_, token)) = self.tokens_by_request.remove(request_id) {
            self.outbound.remove(&token);
        }
    }

    /// Number of progress tokens currently accepted
    pub fn tracked_tokens(&self) -> usize {
        self.outbound.len()
    }

    /// Reports dropped as unknown or non-increasing since the session began
    pub fn dropped_reports(&self) -> u64 {
        self.dropped_reports.load(Ordering::Relaxed)
    }

    // === Inbound: requests we are handling ===

    /// Record that a handler started working on `request_id`.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` if the peer reused an id that is still in flight.
    pub fn begin(
        &self,
        request_id: RequestId,
        method: &str,
        progress_token: Option<ProgressToken>,
    ) -> Result<InFlight> {
        use dashmap::mapref::entry::Entry;

        let cancel = CancellationToken::new();
        match self.inbound.entry(request_id.clone()) {
            Entry::Occupied(_) => {
                warn!(request_id = %request_id, method, "Peer reused an in-flight request id");
                return Err(Error::invalid_request(format!(
                    "request id {request_id} is already in flight"
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(InboundEntry {
                    method: method.to_string(),
                    cancel: cancel.clone(),
                });
            }
        }

        Ok(InFlight {
            request_id,
            cancel,
            progress_token,
        })
    }

    /// Handle `notifications/cancelled` from the peer
    pub fn on_cancel_requested(
        &self,
        request_id: &RequestId,
        reason: Option<&str>,
    ) -> CancelDisposition {
        let Some(entry) = self.inbound.get(request_id) else {
            debug!(request_id = %request_id, "Ignoring cancellation of unknown request");
            return CancelDisposition::Unknown;
        };

        if entry.method == methods::INITIALIZE {
            warn!(request_id = %request_id, "Ignoring cancellation of initialize request");
            return CancelDisposition::RejectedInitialize;
        }
        if entry.cancel.is_cancelled() {
            return CancelDisposition::AlreadyCancelled;
        }

        debug!(request_id = %request_id, reason, "Peer cancelled request");
        entry.cancel.cancel();
        CancelDisposition::Cancelled
    }

    /// Whether the peer cancelled `request_id`
    pub fn is_cancelled(&self, request_id: &RequestId) -> bool {
        self.inbound
            .get(request_id)
            .is_some_and(|entry| entry.cancel.is_cancelled())
    }

    /// Remove the entry for a finished handler.
    ///
    /// Returns `true` if the request had been cancelled, in which case the
    /// response must not be sent.
    pub fn finish(&self, request_id: &RequestId) -> bool {
        self.inbound
            .remove(request_id)
            .is_some_and(|(_, entry)| entry.cancel.is_cancelled())
    }

    /// Cancel every in-flight handler, e.g. when the transport is gone
    pub fn cancel_all_inbound(&self) -> usize {
        let mut count = 0;
        for entry in self.inbound.iter() {
            if !entry.cancel.is_cancelled() {
                entry.cancel.cancel();
                count += 1;
            }
        }
        count
    }

    /// Number of requests our handlers are working on
    pub fn in_flight(&self) -> usize {
        self.inbound.len()
    }
}
