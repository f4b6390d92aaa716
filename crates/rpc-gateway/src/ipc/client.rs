//! RPC client: a call that feels synchronous over fire-and-forget queues.
//!
//! ```text
//! call() ──► declare request + reply queue ──► ensure reply listener
//!        ──► register waiter ──► publish(request, correlation id, reply_to)
//!        ──► await waiter (reply | deadline)
//! ```

use crate::domain::config::GatewayConfig;
use crate::domain::error::CallError;
use crate::domain::registry::{deadline_after, spawn_sweeper, Call, CallOutcome, CorrelationRegistry, Waiter};
use crate::ipc::listener::ReplyListener;
use shared_bus::{ConnectionManager, MessageChannel, TransportError};
use shared_types::{reply_queue_for, CorrelationId, Envelope, Payload, RpcRequest};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Publish attempts per call; the second one runs on a fresh channel.
const PUBLISH_ATTEMPTS: usize = 2;

/// Gateway-side RPC client.
///
/// One client serves any number of concurrent calls. Calls sharing a reply
/// queue share its listener; replies are told apart only by correlation id.
pub struct RpcClient {
    connection: Arc<ConnectionManager>,
    registry: Arc<CorrelationRegistry>,
    listeners: Mutex<HashMap<String, JoinHandle<()>>>,
    sweeper: JoinHandle<()>,
    config: GatewayConfig,
}

impl RpcClient {
    /// Create a client. Must be called within a tokio runtime.
    pub fn new(connection: Arc<ConnectionManager>, config: GatewayConfig) -> Self {
        let registry = Arc::new(CorrelationRegistry::new());
        let sweeper = spawn_sweeper(Arc::clone(&registry), config.sweep_interval);
        Self {
            connection,
            registry,
            listeners: Mutex::new(HashMap::new()),
            sweeper,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<CorrelationRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Number of calls currently waiting for a reply
    pub fn pending_count(&self) -> usize {
        self.registry.len()
    }

    /// Issue a typed request on its own queue, replying on the matching
    /// `_response_queue`.
    pub async fn request(&self, request: &RpcRequest, timeout: Option<Duration>) -> CallOutcome {
        let payload = request.to_payload()?;
        let request_queue = request.queue();
        let reply_queue = reply_queue_for(request_queue);
        let timeout = timeout.unwrap_or(self.config.call_timeout);
        self.call(request_queue, &reply_queue, &payload, timeout)
            .await
    }

    /// Send `payload` to `request_queue` and wait for the reply on
    /// `reply_queue`.
    pub async fn call(
        &self,
        request_queue: &str,
        reply_queue: &str,
        payload: &Payload,
        timeout: Duration,
    ) -> CallOutcome {
        self.call_with_correlation_id(
            CorrelationId::new(),
            request_queue,
            reply_queue,
            payload,
            timeout,
        )
        .await
    }

    /// As [`Self::call`], with a caller-chosen correlation id.
    ///
    /// Fails with `DuplicateCorrelationId` if the id is still in flight.
    pub async fn call_with_correlation_id(
        &self,
        correlation_id: CorrelationId,
        request_queue: &str,
        reply_queue: &str,
        payload: &Payload,
        timeout: Duration,
    ) -> CallOutcome {
        let envelope = Envelope::request(payload, correlation_id.clone(), reply_queue)?;
        let call = Call {
            correlation_id,
            request_queue: request_queue.to_string(),
            reply_queue: reply_queue.to_string(),
            payload: payload.clone(),
            deadline: deadline_after(timeout),
        };
        let waiter = self.registry.register(call)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .publish(&waiter, request_queue, reply_queue, envelope.clone())
                .await
            {
                Ok(()) => break,
                Err(PublishFailure::Deadline) => break,
                Err(PublishFailure::Transport(e, channel)) => {
                    if let Some(channel) = channel {
                        self.connection.invalidate(&channel).await;
                    }
                    if attempt >= PUBLISH_ATTEMPTS {
                        return self.abort(waiter, CallError::Transport(e));
                    }
                    warn!(
                        correlation_id = %waiter.correlation_id(),
                        queue = %request_queue,
                        error = %e,
                        "Publish failed; retrying on a fresh channel"
                    );
                }
            }
        }

        waiter.wait().await
    }

    /// Declare both queues, make sure replies are consumed, then publish.
    async fn publish(
        &self,
        waiter: &Waiter,
        request_queue: &str,
        reply_queue: &str,
        envelope: Envelope,
    ) -> Result<(), PublishFailure> {
        let channel = match tokio::time::timeout_at(waiter.deadline(), self.connection.channel())
            .await
        {
            Ok(Ok(channel)) => channel,
            Ok(Err(e)) => return Err(PublishFailure::Transport(e, None)),
            Err(_) => return Err(PublishFailure::Deadline),
        };

        let result = async {
            channel.declare_queue(request_queue).await?;
            channel.declare_queue(reply_queue).await?;
            self.ensure_listener(reply_queue).await;
            channel.publish(request_queue, envelope).await
        }
        .await;

        match result {
            Ok(()) => {
                debug!(
                    correlation_id = %waiter.correlation_id(),
                    queue = %request_queue,
                    reply_to = %reply_queue,
                    "Request published"
                );
                Ok(())
            }
            Err(e) => Err(PublishFailure::Transport(e, Some(channel))),
        }
    }

    /// Start the listener for `reply_queue` unless one is running.
    async fn ensure_listener(&self, reply_queue: &str) {
        let mut listeners = self.listeners.lock().await;
        if listeners
            .get(reply_queue)
            .is_some_and(|handle| !handle.is_finished())
        {
            return;
        }
        let listener = ReplyListener::new(
            reply_queue,
            self.config.reply_prefetch,
            Arc::clone(&self.connection),
            Arc::clone(&self.registry),
        );
        listeners.insert(reply_queue.to_string(), tokio::spawn(listener.run()));
        debug!(reply_to = %reply_queue, "Reply listener started");
    }

    /// Settle a call that never reached the broker. Leaves no registry entry.
    fn abort(&self, waiter: Waiter, error: CallError) -> CallOutcome {
        self.registry.fail(waiter.correlation_id(), error.clone());
        drop(waiter);
        Err(error)
    }

    /// Stop listeners and the sweeper. Pending calls still time out.
    pub async fn shutdown(&self) {
        let mut listeners = self.listeners.lock().await;
        for (_, handle) in listeners.drain() {
            handle.abort();
        }
        self.sweeper.abort();
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        for (_, handle) in self.listeners.get_mut().drain() {
            handle.abort();
        }
        self.sweeper.abort();
    }
}

enum PublishFailure {
    /// The call's deadline passed before a channel was available.
    Deadline,
    Transport(TransportError, Option<Arc<dyn MessageChannel>>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_bus::{BackoffPolicy, InMemoryBroker};
    use shared_types::{queues, Credentials, RpcResponse};
    use std::sync::atomic::Ordering;
    use tokio::time::Instant;

    fn client(broker: &InMemoryBroker, max_attempts: u32) -> RpcClient {
        let config = GatewayConfig {
            reconnect: BackoffPolicy {
                initial_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(20),
                multiplier: 2.0,
                max_attempts,
            },
            ..GatewayConfig::default()
        };
        let connection = Arc::new(ConnectionManager::new(
            Arc::new(broker.connector()),
            config.reconnect.clone(),
        ));
        RpcClient::new(connection, config)
    }

    /// Answers every request on `queue` with `status = success` plus an echo.
    fn spawn_echo_worker(broker: &InMemoryBroker, queue: &'static str) -> JoinHandle<()> {
        let broker = broker.clone();
        tokio::spawn(async move {
            let channel = broker.open_channel().unwrap();
            channel.declare_queue(queue).await.unwrap();
            let mut consumer = channel.consume(queue, 1).await.unwrap();
            while let Some(delivery) = consumer.recv().await {
                let payload = delivery.envelope.decode_payload().unwrap();
                let reply = RpcResponse::success().with_field("echo", payload);
                let envelope = Envelope::reply(
                    &reply,
                    delivery.envelope.correlation_id.clone().unwrap(),
                )
                .unwrap();
                let reply_to = delivery.envelope.reply_to.clone().unwrap();
                channel.publish(&reply_to, envelope).await.unwrap();
                delivery.ack().await.unwrap();
            }
        })
    }

    #[tokio::test]
    async fn test_request_round_trip() {
        let broker = InMemoryBroker::new();
        let worker = spawn_echo_worker(&broker, queues::AUTHORIZATION);
        let client = client(&broker, 3);

        let request = RpcRequest::Authorization(Credentials {
            email: "a@x.com".into(),
            password: "p".into(),
        });
        let response = client
            .request(&request, Some(Duration::from_secs(2)))
            .await
            .unwrap();

        assert!(response.is_success());
        assert_eq!(
            response.field("echo"),
            Some(&serde_json::json!({"email": "a@x.com", "password": "p"}))
        );
        assert_eq!(client.pending_count(), 0);
        assert!(broker.queue_exists("authorization_response_queue"));
        worker.abort();
    }

    #[tokio::test]
    async fn test_unbounded_timeout_still_completes() {
        let broker = InMemoryBroker::new();
        let worker = spawn_echo_worker(&broker, queues::EXAMS);
        let client = client(&broker, 3);

        let response = client
            .call("exams_queue", "exams_response_queue", &Payload::new(), Duration::MAX)
            .await
            .unwrap();

        assert!(response.is_success());
        assert_eq!(client.pending_count(), 0);
        worker.abort();
    }

    #[tokio::test]
    async fn test_call_without_worker_times_out() {
        let broker = InMemoryBroker::new();
        let client = client(&broker, 3);
        let started = Instant::now();

        let outcome = client
            .call("exams_queue", "exams_response_queue", &Payload::new(), Duration::from_millis(100))
            .await;

        assert!(matches!(outcome, Err(CallError::Timeout { .. })));
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(client.pending_count(), 0);
        // The request stays queued for a worker that may start later.
        assert_eq!(broker.queue_depth("exams_queue"), 1);
    }

    #[tokio::test]
    async fn test_unreachable_broker_fails_fast_without_leak() {
        let broker = InMemoryBroker::new();
        broker.set_online(false);
        let client = client(&broker, 2);
        let started = Instant::now();

        let outcome = client
            .call("exams_queue", "exams_response_queue", &Payload::new(), Duration::from_secs(5))
            .await;

        assert!(matches!(
            outcome,
            Err(CallError::Transport(TransportError::Unreachable(_)))
        ));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(client.pending_count(), 0);
        assert_eq!(client.registry().stats().failed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_duplicate_correlation_id_rejected() {
        let broker = InMemoryBroker::new();
        let client = Arc::new(client(&broker, 3));
        let id = CorrelationId::from_raw("same");

        let first = {
            let client = Arc::clone(&client);
            let id = id.clone();
            tokio::spawn(async move {
                client
                    .call_with_correlation_id(
                        id,
                        "exams_queue",
                        "exams_response_queue",
                        &Payload::new(),
                        Duration::from_millis(300),
                    )
                    .await
            })
        };
        while client.pending_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let second = client
            .call_with_correlation_id(
                id.clone(),
                "exams_queue",
                "exams_response_queue",
                &Payload::new(),
                Duration::from_millis(300),
            )
            .await;

        assert_eq!(second, Err(CallError::DuplicateCorrelationId(id)));
        assert!(first.await.unwrap().unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn test_reconnects_after_broker_restart() {
        let broker = InMemoryBroker::new();
        let client = client(&broker, 5);
        let _ = client
            .call("exams_queue", "exams_response_queue", &Payload::new(), Duration::from_millis(20))
            .await;

        broker.set_online(false);
        broker.set_online(true);
        let worker = spawn_echo_worker(&broker, "cancel_exam_queue");

        let outcome = client
            .call(
                "cancel_exam_queue",
                "cancel_exam_response_queue",
                &Payload::new(),
                Duration::from_secs(2),
            )
            .await;

        assert!(outcome.unwrap().is_success());
        worker.abort();
    }
}
