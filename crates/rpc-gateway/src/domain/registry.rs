//! Correlation Registry - outstanding calls keyed by correlation id.
//!
//! Each registered call owns a oneshot completion slot and a deadline.
//! Exactly one terminal transition is honoured per registration:
//!
//! ```text
//!            resolve()           ┌───────────┐
//!        ┌─────────────────────► │ FULFILLED │
//!        │                       └───────────┘
//!  ┌─────┴─────┐  expire()/deadline ┌───────────┐
//!  │  PENDING  │ ─────────────────► │ TIMED OUT │
//!  └─────┬─────┘                    └───────────┘
//!        │   fail()/cancel()     ┌───────────┐
//!        └─────────────────────► │  FAILED   │
//!                                └───────────┘
//! ```
//!
//! Every transition removes the entry before signalling, so the map never
//! holds a call past its terminal state. Removal goes through the map's
//! per-shard lock, which makes a resolve racing an expiry (or a fresh
//! registration reusing a just-expired id) resolve to a single winner.

use crate::domain::error::CallError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use shared_types::{CorrelationId, Payload, RpcResponse};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Terminal (or pending) outcome of a call.
pub type CallOutcome = Result<RpcResponse, CallError>;

/// Lifecycle state of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Pending,
    Fulfilled,
    TimedOut,
    Failed,
}

impl CallState {
    /// Terminal state a finished call ended in.
    pub fn of(outcome: &CallOutcome) -> Self {
        match outcome {
            Ok(_) => CallState::Fulfilled,
            Err(CallError::Timeout { .. }) => CallState::TimedOut,
            Err(_) => CallState::Failed,
        }
    }
}

/// Deadline used when `now + timeout` is not representable.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Smallest sweep period; `tokio::time::interval` rejects zero.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Deadline `timeout` from now, clamped for unbounded timeouts.
pub fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// One outstanding RPC attempt.
#[derive(Debug, Clone)]
pub struct Call {
    pub correlation_id: CorrelationId,
    pub request_queue: String,
    pub reply_queue: String,
    pub payload: Payload,
    pub deadline: Instant,
}

impl Call {
    /// A call with a fresh correlation id and a deadline `timeout` from now.
    pub fn new(
        request_queue: impl Into<String>,
        reply_queue: impl Into<String>,
        payload: Payload,
        timeout: Duration,
    ) -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            request_queue: request_queue.into(),
            reply_queue: reply_queue.into(),
            payload,
            deadline: deadline_after(timeout),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}

/// A registered call waiting for its outcome
struct PendingCall {
    call: Call,
    /// Distinguishes this registration from later ones reusing the id
    slot: u64,
    registered_at: Instant,
    sender: oneshot::Sender<CallOutcome>,
}

impl PendingCall {
    fn timeout_error(&self) -> CallError {
        CallError::Timeout {
            queue: self.call.request_queue.clone(),
            after: self.call.deadline.saturating_duration_since(self.registered_at),
        }
    }
}

/// Statistics for the registry
#[derive(Debug, Default)]
pub struct RegistryStats {
    /// Total calls registered
    pub registered: AtomicU64,
    /// Calls resolved by a matching reply
    pub fulfilled: AtomicU64,
    /// Calls failed by a transport or protocol error
    pub failed: AtomicU64,
    /// Calls that reached their deadline
    pub timed_out: AtomicU64,
    /// Calls abandoned by their caller
    pub cancelled: AtomicU64,
    /// Replies with no pending call (late, duplicate or foreign)
    pub dropped_replies: AtomicU64,
}

impl RegistryStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Tracks outstanding calls.
///
/// Flow:
/// 1. Client builds a [`Call`] and calls `register()` to get a [`Waiter`]
/// 2. Client publishes the request tagged with the call's correlation id
/// 3. Reply listener receives the response and calls `resolve()`
/// 4. Client awaits the waiter, which times out at the call's deadline
#[derive(Default)]
pub struct CorrelationRegistry {
    pending: DashMap<CorrelationId, PendingCall>,
    next_slot: AtomicU64,
    stats: Arc<RegistryStats>,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call and get the waitable for its outcome.
    ///
    /// Fails if the correlation id is still pending.
    pub fn register(self: &Arc<Self>, call: Call) -> Result<Waiter, CallError> {
        let correlation_id = call.correlation_id.clone();
        let slot = self.next_slot.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let deadline = call.deadline;

        match self.pending.entry(correlation_id.clone()) {
            Entry::Occupied(_) => {
                warn!(correlation_id = %correlation_id, "Correlation id reused while pending");
                return Err(CallError::DuplicateCorrelationId(correlation_id));
            }
            Entry::Vacant(vacant) => {
                debug!(
                    correlation_id = %correlation_id,
                    queue = %call.request_queue,
                    reply_to = %call.reply_queue,
                    "Registered call"
                );
                let now = Instant::now();
                let pending = PendingCall {
                    call,
                    slot,
                    registered_at: now,
                    sender: tx,
                };
                let timeout = pending.timeout_error();
                vacant.insert(pending);
                RegistryStats::bump(&self.stats.registered);

                Ok(Waiter {
                    correlation_id,
                    slot,
                    deadline,
                    timeout,
                    receiver: rx,
                    registry: Arc::clone(self),
                    settled: false,
                })
            }
        }
    }

    /// Fulfil a pending call with its reply.
    ///
    /// Returns true iff a pending call existed. Replies for unknown or
    /// already-settled ids are dropped here.
    pub fn resolve(&self, correlation_id: &CorrelationId, response: RpcResponse) -> bool {
        let Some((_, pending)) = self.pending.remove(correlation_id) else {
            RegistryStats::bump(&self.stats.dropped_replies);
            // Synthetic ids carry no issue time.
            debug!(
                correlation_id = %correlation_id,
                issued_at_ms = correlation_id.timestamp_ms(),
                "Reply for unknown or expired correlation id dropped"
            );
            return false;
        };

        RegistryStats::bump(&self.stats.fulfilled);
        debug!(
            correlation_id = %correlation_id,
            queue = %pending.call.request_queue,
            elapsed_ms = pending.registered_at.elapsed().as_millis() as u64,
            "Call fulfilled"
        );
        // A closed receiver means the caller is gone; nothing to tell it.
        let _ = pending.sender.send(Ok(response));
        true
    }

    /// Fail a pending call. Returns true iff a pending call existed.
    pub fn fail(&self, correlation_id: &CorrelationId, error: CallError) -> bool {
        let Some((_, pending)) = self.pending.remove(correlation_id) else {
            return false;
        };

        RegistryStats::bump(&self.stats.failed);
        warn!(
            correlation_id = %correlation_id,
            queue = %pending.call.request_queue,
            error = %error,
            "Call failed"
        );
        let _ = pending.sender.send(Err(error));
        true
    }

    /// Time out every call whose deadline is at or before `now`.
    ///
    /// Returns the number of calls expired.
    pub fn expire(&self, now: Instant) -> usize {
        let due: Vec<CorrelationId> = self
            .pending
            .iter()
            .filter(|entry| entry.call.deadline <= now)
            .map(|entry| entry.key().clone())
            .collect();

        let mut expired = 0;
        for correlation_id in due {
            let Some((_, pending)) = self
                .pending
                .remove_if(&correlation_id, |_, p| p.call.deadline <= now)
            else {
                continue;
            };
            RegistryStats::bump(&self.stats.timed_out);
            warn!(
                correlation_id = %correlation_id,
                queue = %pending.call.request_queue,
                elapsed_ms = now.saturating_duration_since(pending.registered_at).as_millis() as u64,
                "Call timed out"
            );
            let error = pending.timeout_error();
            let _ = pending.sender.send(Err(error));
            expired += 1;
        }
        expired
    }

    /// Deregister a pending call on behalf of its caller.
    pub fn cancel(&self, correlation_id: &CorrelationId) -> bool {
        let Some((_, pending)) = self.pending.remove(correlation_id) else {
            return false;
        };
        RegistryStats::bump(&self.stats.cancelled);
        debug!(correlation_id = %correlation_id, "Call cancelled");
        let _ = pending.sender.send(Err(CallError::Cancelled));
        true
    }

    /// Waiter-side expiry: remove only the waiter's own registration.
    fn expire_slot(&self, correlation_id: &CorrelationId, slot: u64) -> bool {
        if self
            .pending
            .remove_if(correlation_id, |_, p| p.slot == slot)
            .is_none()
        {
            return false;
        }
        RegistryStats::bump(&self.stats.timed_out);
        warn!(correlation_id = %correlation_id, "Call timed out");
        true
    }

    /// Waiter-side cancellation on drop.
    fn cancel_slot(&self, correlation_id: &CorrelationId, slot: u64) {
        if self
            .pending
            .remove_if(correlation_id, |_, p| p.slot == slot)
            .is_some()
        {
            RegistryStats::bump(&self.stats.cancelled);
            debug!(correlation_id = %correlation_id, "Waiter dropped; call deregistered");
        }
    }

    /// Count a reply that could not be attributed to any call.
    pub fn note_dropped_reply(&self) {
        RegistryStats::bump(&self.stats.dropped_replies);
    }

    /// Number of pending calls
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Check if a correlation id is pending
    pub fn contains(&self, correlation_id: &CorrelationId) -> bool {
        self.pending.contains_key(correlation_id)
    }

    /// `Pending` while registered; `None` once settled or never seen.
    pub fn state(&self, correlation_id: &CorrelationId) -> Option<CallState> {
        self.contains(correlation_id).then_some(CallState::Pending)
    }

    /// Get statistics
    pub fn stats(&self) -> &RegistryStats {
        &self.stats
    }
}

/// The caller's handle on a registered call.
///
/// Dropping a waiter before it settles deregisters the call; a reply that
/// arrives afterwards is treated as unknown.
pub struct Waiter {
    correlation_id: CorrelationId,
    slot: u64,
    deadline: Instant,
    timeout: CallError,
    receiver: oneshot::Receiver<CallOutcome>,
    registry: Arc<CorrelationRegistry>,
    settled: bool,
}

impl Waiter {
    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Suspend until the call settles or its deadline passes.
    pub async fn wait(mut self) -> CallOutcome {
        let outcome = match tokio::time::timeout_at(self.deadline, &mut self.receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(CallError::Cancelled),
            Err(_) => {
                if self
                    .registry
                    .expire_slot(&self.correlation_id, self.slot)
                {
                    Err(self.timeout.clone())
                } else {
                    // Another path removed the entry and is sending right now.
                    match (&mut self.receiver).await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(self.timeout.clone()),
                    }
                }
            }
        };
        self.settled = true;
        outcome
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        if !self.settled {
            self.registry.cancel_slot(&self.correlation_id, self.slot);
        }
    }
}

/// Spawn a background task that expires overdue calls every `interval`.
pub fn spawn_sweeper(registry: Arc<CorrelationRegistry>, interval: Duration) -> JoinHandle<()> {
    if interval < MIN_SWEEP_INTERVAL {
        warn!(interval_ms = interval.as_millis() as u64, "Sweep interval too small; clamped");
    }
    let interval = interval.max(MIN_SWEEP_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let expired = registry.expire(Instant::now());
            if expired > 0 {
                debug!(expired, "Swept expired calls");
            }
        }
    })
}
