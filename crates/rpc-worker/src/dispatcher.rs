//! # Dispatcher
//!
//! Consumes every routed queue and answers each request on its `reply_to`
//! queue with the request's correlation id.
//!
//! ## Per-Queue Worker
//!
//! ```text
//!   ┌──────┐  delivery  ┌────────────┐ reply published ┌────────┐
//!   │ IDLE │ ─────────► │ PROCESSING │ ──────────────► │ ACKING │
//!   └──────┘            └────────────┘                 └────────┘
//!      ▲                      │ publish failed             │
//!      │                      ▼ nack(requeue) + reconnect  │
//!      └───────────────────────────────────────────────────┘
//! ```
//!
//! - One task per queue; each holds at most `prefetch` unacked messages and
//!   handles them one at a time, in order.
//! - Different queues run independently and concurrently.
//! - The source message is acked only after its reply was published; a
//!   crash in between means redelivery, never a lost request.
//! - Handler errors, handler panics, malformed bodies and unrouted queues
//!   all produce a `status = failed` reply.

use crate::config::WorkerConfig;
use crate::error::HandlerError;
use crate::registry::HandlerRegistry;
use parking_lot::Mutex;
use shared_bus::{ConnectionManager, ConnectionState, Delivery, MessageChannel};
use shared_types::{Envelope, ProtocolError, RpcRequest, RpcResponse};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

/// State of one queue worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Processing,
    Acking,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Idle => write!(f, "idle"),
            WorkerState::Processing => write!(f, "processing"),
            WorkerState::Acking => write!(f, "acking"),
        }
    }
}

/// What to do with a consumed message once it has been handled.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Publish `envelope` to `reply_to`, then ack the source message.
    Reply { reply_to: String, envelope: Envelope },
    /// No caller can be answered; ack and forget.
    Drop,
}

/// Dispatcher counters
#[derive(Debug, Default)]
pub struct DispatcherStats {
    /// Requests answered by a handler (success or business failure)
    pub handled: AtomicU64,
    /// Handler errors and panics
    pub handler_failures: AtomicU64,
    /// Malformed or unanswerable envelopes
    pub protocol_errors: AtomicU64,
    /// Requests on queues with no handler
    pub unrecognized: AtomicU64,
    /// Replies successfully published
    pub responses_published: AtomicU64,
    /// Deliveries flagged as redelivered by the broker
    pub redeliveries: AtomicU64,
}

impl DispatcherStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Worker-side dispatcher over a frozen route table.
pub struct Dispatcher {
    connection: Arc<ConnectionManager>,
    routes: HandlerRegistry,
    config: WorkerConfig,
    stats: Arc<DispatcherStats>,
    states: Arc<Mutex<HashMap<String, WorkerState>>>,
}

impl Dispatcher {
    pub fn new(
        connection: Arc<ConnectionManager>,
        routes: HandlerRegistry,
        config: WorkerConfig,
    ) -> Self {
        Self {
            connection,
            routes,
            config,
            stats: Arc::new(DispatcherStats::default()),
            states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Every queue this dispatcher consumes: routed ones, then extras.
    pub fn queues(&self) -> Vec<String> {
        let mut queues: Vec<String> = self.routes.queues().map(str::to_string).collect();
        for extra in &self.config.extra_queues {
            if !queues.contains(extra) {
                queues.push(extra.clone());
            }
        }
        queues
    }

    pub fn stats(&self) -> &Arc<DispatcherStats> {
        &self.stats
    }

    /// Start one worker task per queue. Workers stop when `shutdown`
    /// flips to `true` (or its sender is dropped), between messages.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> DispatcherHandle {
        let queues = self.queues();
        let dispatcher = Arc::new(self);
        let tasks = queues
            .into_iter()
            .map(|queue| {
                let dispatcher = Arc::clone(&dispatcher);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { dispatcher.run_queue(queue, shutdown).await })
            })
            .collect();

        DispatcherHandle {
            tasks,
            stats: Arc::clone(&dispatcher.stats),
            states: Arc::clone(&dispatcher.states),
        }
    }

    fn set_state(&self, queue: &str, state: WorkerState) {
        self.states.lock().insert(queue.to_string(), state);
    }

    async fn run_queue(&self, queue: String, mut shutdown: watch::Receiver<bool>) {
        self.set_state(&queue, WorkerState::Idle);

        'connect: loop {
            if *shutdown.borrow() || self.connection.state() == ConnectionState::Closed {
                break;
            }

            let channel = tokio::select! {
                _ = shutdown.changed() => break 'connect,
                result = self.connection.channel() => match result {
                    Ok(channel) => channel,
                    Err(e) => {
                        warn!(queue = %queue, error = %e, "Worker cannot reach broker");
                        tokio::select! {
                            _ = shutdown.changed() => break 'connect,
                            _ = tokio::time::sleep(self.config.reconnect.max_delay) => continue 'connect,
                        }
                    }
                },
            };

            let consumer = match channel.declare_queue(&queue).await {
                Ok(()) => channel.consume(&queue, self.config.prefetch).await,
                Err(e) => Err(e),
            };
            let mut consumer = match consumer {
                Ok(consumer) => consumer,
                Err(e) => {
                    warn!(queue = %queue, error = %e, "Consumer setup failed");
                    self.connection.invalidate(&channel).await;
                    continue 'connect;
                }
            };
            info!(queue = %queue, prefetch = self.config.prefetch, "Consuming requests");

            loop {
                let delivery = tokio::select! {
                    _ = shutdown.changed() => break 'connect,
                    delivery = consumer.recv() => delivery,
                };
                let Some(delivery) = delivery else {
                    warn!(queue = %queue, "Consumer cancelled by broker");
                    self.connection.invalidate(&channel).await;
                    continue 'connect;
                };

                if !self.settle(&queue, &channel, delivery).await {
                    self.connection.invalidate(&channel).await;
                    continue 'connect;
                }
            }
        }

        self.set_state(&queue, WorkerState::Idle);
        info!(queue = %queue, "Worker stopped");
    }

    /// Handle one delivery end to end. Returns false when the channel
    /// must be replaced.
    async fn settle(&self, queue: &str, channel: &Arc<dyn MessageChannel>, delivery: Delivery) -> bool {
        self.set_state(queue, WorkerState::Processing);
        if delivery.redelivered {
            DispatcherStats::bump(&self.stats.redeliveries);
            debug!(queue = %queue, tag = delivery.delivery_tag, "Processing redelivered message");
        }

        let disposition = self.process(queue, &delivery.envelope).await;
        if let Disposition::Reply { reply_to, envelope } = disposition {
            if let Err(e) = channel.publish(&reply_to, envelope).await {
                warn!(queue = %queue, reply_to = %reply_to, error = %e, "Reply publish failed; requeueing request");
                if let Err(e) = delivery.nack(true).await {
                    debug!(queue = %queue, error = %e, "Nack failed; broker will redeliver");
                }
                self.set_state(queue, WorkerState::Idle);
                return false;
            }
            DispatcherStats::bump(&self.stats.responses_published);
        }

        self.set_state(queue, WorkerState::Acking);
        if let Err(e) = delivery.ack().await {
            warn!(queue = %queue, tag = delivery.delivery_tag, error = %e, "Ack failed");
        }
        self.set_state(queue, WorkerState::Idle);
        true
    }

    /// Decide the reply for a request consumed from `queue`.
    pub async fn process(&self, queue: &str, envelope: &Envelope) -> Disposition {
        let reply_to = match envelope.require_reply_to() {
            Ok(reply_to) => reply_to.to_string(),
            Err(e) => {
                DispatcherStats::bump(&self.stats.protocol_errors);
                warn!(queue = %queue, error = %e, "Request dropped");
                return Disposition::Drop;
            }
        };
        let correlation_id = match envelope.require_correlation_id() {
            Ok(id) => id.clone(),
            Err(e) => {
                DispatcherStats::bump(&self.stats.protocol_errors);
                warn!(queue = %queue, reply_to = %reply_to, error = %e, "Request dropped");
                return Disposition::Drop;
            }
        };

        debug!(correlation_id = %correlation_id, queue = %queue, reply_to = %reply_to, "Request received");
        let response = self.respond(queue, envelope).await;

        match Envelope::reply(&response, correlation_id.clone()) {
            Ok(envelope) => Disposition::Reply { reply_to, envelope },
            Err(e) => {
                error!(correlation_id = %correlation_id, error = %e, "Reply could not be encoded");
                Disposition::Drop
            }
        }
    }

    async fn respond(&self, queue: &str, envelope: &Envelope) -> RpcResponse {
        let Some(handler) = self.routes.get(queue) else {
            DispatcherStats::bump(&self.stats.unrecognized);
            warn!(queue = %queue, "No handler for queue");
            return RpcResponse::failed(ProtocolError::UnknownQueue(queue.to_string()).to_string());
        };

        let request = match envelope
            .decode_payload()
            .and_then(|payload| RpcRequest::decode(queue, &payload))
        {
            Ok(request) => request,
            Err(e) => {
                DispatcherStats::bump(&self.stats.protocol_errors);
                warn!(queue = %queue, error = %e, "Invalid request");
                return RpcResponse::failed(e.to_string());
            }
        };

        // Run on its own task so a panicking handler fails one request
        // instead of the whole worker.
        let handler = Arc::clone(handler);
        let mut task = HandlerTask(tokio::spawn(async move { handler.handle(request).await }));
        match (&mut task.0).await {
            Ok(Ok(response)) => {
                DispatcherStats::bump(&self.stats.handled);
                response
            }
            Ok(Err(e)) => {
                DispatcherStats::bump(&self.stats.handler_failures);
                warn!(queue = %queue, error = %e, "Handler failed");
                RpcResponse::failed(e.to_string())
            }
            Err(e) => {
                DispatcherStats::bump(&self.stats.handler_failures);
                error!(queue = %queue, error = %e, "Handler panicked");
                RpcResponse::failed(panic_cause(e))
            }
        }
    }
}

/// In-flight handler. Aborted when dropped, so a worker stopped
/// mid-request takes its handler down with it.
struct HandlerTask(JoinHandle<Result<RpcResponse, HandlerError>>);

impl Drop for HandlerTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Message carried by a handler panic, if it has one.
fn panic_cause(error: JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }
    let payload = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    match payload.downcast_ref::<String>() {
        Some(message) => message.clone(),
        None => "handler panicked".to_string(),
    }
}

/// Running dispatcher.
pub struct DispatcherHandle {
    tasks: Vec<JoinHandle<()>>,
    stats: Arc<DispatcherStats>,
    states: Arc<Mutex<HashMap<String, WorkerState>>>,
}

impl DispatcherHandle {
    pub fn stats(&self) -> &DispatcherStats {
        &self.stats
    }

    pub fn queue_state(&self, queue: &str) -> Option<WorkerState> {
        self.states.lock().get(queue).copied()
    }

    /// Number of queue workers.
    pub fn worker_count(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every worker to stop.
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!(error = %e, "Worker task failed");
                }
            }
        }
    }

    /// Wait up to `grace` for workers to stop, then abort the rest.
    /// Returns `false` if any worker had to be aborted.
    pub async fn join_within(self, grace: Duration) -> bool {
        let aborts: Vec<AbortHandle> = self.tasks.iter().map(JoinHandle::abort_handle).collect();
        match tokio::time::timeout(grace, self.join()).await {
            Ok(()) => true,
            Err(_) => {
                for abort in aborts {
                    abort.abort();
                }
                false
            }
        }
    }

    /// Stop workers immediately, mid-message if need be. Unacked requests
    /// are redelivered by the broker.
    pub fn abort(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
