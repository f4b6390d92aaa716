//! Reply listener: consumes a reply queue and routes each response to the
//! pending call with the same correlation id.

use crate::domain::error::CallError;
use crate::domain::registry::CorrelationRegistry;
use shared_bus::{ConnectionManager, ConnectionState, Delivery};
use shared_types::RpcResponse;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Background consumer of one reply queue.
///
/// Survives broker restarts: when its consumer is cancelled it reconnects
/// through the shared [`ConnectionManager`] and resumes consuming.
pub struct ReplyListener {
    queue: String,
    prefetch: u16,
    connection: Arc<ConnectionManager>,
    registry: Arc<CorrelationRegistry>,
}

impl ReplyListener {
    pub fn new(
        queue: impl Into<String>,
        prefetch: u16,
        connection: Arc<ConnectionManager>,
        registry: Arc<CorrelationRegistry>,
    ) -> Self {
        Self {
            queue: queue.into(),
            prefetch,
            connection,
            registry,
        }
    }

    /// Run the listener loop until the connection is closed.
    pub async fn run(self) {
        loop {
            if self.connection.state() == ConnectionState::Closed {
                break;
            }

            let channel = match self.connection.channel().await {
                Ok(channel) => channel,
                Err(e) => {
                    warn!(queue = %self.queue, error = %e, "Reply listener cannot reach broker");
                    tokio::time::sleep(self.connection.backoff().max_delay).await;
                    continue;
                }
            };

            let consumer = match channel.declare_queue(&self.queue).await {
                Ok(()) => channel.consume(&self.queue, self.prefetch).await,
                Err(e) => Err(e),
            };
            let mut consumer = match consumer {
                Ok(consumer) => consumer,
                Err(e) => {
                    warn!(queue = %self.queue, error = %e, "Reply consumer setup failed");
                    self.connection.invalidate(&channel).await;
                    continue;
                }
            };

            info!(queue = %self.queue, "Consuming replies");
            while let Some(delivery) = consumer.recv().await {
                handle_delivery(&self.registry, delivery).await;
            }

            warn!(queue = %self.queue, "Reply consumer cancelled by broker");
            self.connection.invalidate(&channel).await;
        }
        debug!(queue = %self.queue, "Reply listener stopped");
    }
}

/// Route one reply to its pending call, then ack it.
///
/// Replies are always acked: a reply nobody waits for is dropped, never
/// redelivered.
pub async fn handle_delivery(registry: &CorrelationRegistry, delivery: Delivery) {
    let envelope = &delivery.envelope;
    match envelope.require_correlation_id() {
        Err(e) => {
            registry.note_dropped_reply();
            warn!(queue = %delivery.queue, error = %e, "Reply dropped");
        }
        Ok(correlation_id) => match envelope.decode_body::<RpcResponse>() {
            Ok(response) => {
                registry.resolve(correlation_id, response);
            }
            Err(e) => {
                warn!(
                    correlation_id = %correlation_id,
                    queue = %delivery.queue,
                    error = %e,
                    "Malformed reply"
                );
                if !registry.fail(correlation_id, CallError::Protocol(e)) {
                    registry.note_dropped_reply();
                }
            }
        },
    }

    if let Err(e) = delivery.ack().await {
        warn!(queue = %delivery.queue, error = %e, "Failed to ack reply");
    }
}
