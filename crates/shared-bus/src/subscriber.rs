//! # Consumer
//!
//! The receiving side of a channel: a stream of [`Delivery`] values that
//! must each be acked or nacked.

use crate::error::TransportError;
use async_trait::async_trait;
use shared_types::Envelope;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tracing::debug;

/// Settles deliveries with the broker that issued them.
#[async_trait]
pub trait Acker: Send + Sync {
    async fn ack(&self, queue: &str, delivery_tag: u64) -> Result<(), TransportError>;

    async fn nack(&self, queue: &str, delivery_tag: u64, requeue: bool)
        -> Result<(), TransportError>;
}

/// A message handed to a consumer and not yet settled.
pub struct Delivery {
    /// Queue the message was consumed from.
    pub queue: String,
    /// Broker-assigned tag, unique per queue.
    pub delivery_tag: u64,
    /// Set when the message was delivered before and not acked.
    pub redelivered: bool,
    pub envelope: Envelope,
    acker: Arc<dyn Acker>,
}

impl Delivery {
    pub fn new(
        queue: impl Into<String>,
        delivery_tag: u64,
        redelivered: bool,
        envelope: Envelope,
        acker: Arc<dyn Acker>,
    ) -> Self {
        Self {
            queue: queue.into(),
            delivery_tag,
            redelivered,
            envelope,
            acker,
        }
    }

    /// Acknowledge: the broker forgets the message.
    pub async fn ack(&self) -> Result<(), TransportError> {
        self.acker.ack(&self.queue, self.delivery_tag).await
    }

    /// Reject, optionally putting the message back at the head of the queue.
    pub async fn nack(&self, requeue: bool) -> Result<(), TransportError> {
        self.acker
            .nack(&self.queue, self.delivery_tag, requeue)
            .await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("queue", &self.queue)
            .field("delivery_tag", &self.delivery_tag)
            .field("redelivered", &self.redelivered)
            .field("correlation_id", &self.envelope.correlation_id)
            .finish()
    }
}

/// A consumer handle on one queue.
///
/// When dropped, the broker is told to cancel the consumer and requeue
/// everything it had not settled.
pub struct Consumer {
    queue: String,
    receiver: mpsc::UnboundedReceiver<Delivery>,
    on_drop: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Consumer {
    pub fn new(
        queue: impl Into<String>,
        receiver: mpsc::UnboundedReceiver<Delivery>,
        on_drop: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            queue: queue.into(),
            receiver,
            on_drop: Some(Box::new(on_drop)),
        }
    }

    /// Receive the next delivery.
    ///
    /// # Returns
    ///
    /// - `Some(delivery)` - The next message
    /// - `None` - The consumer was cancelled by the broker (connection lost)
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.receiver.recv().await
    }

    /// Try to receive the next delivery without blocking.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.receiver.try_recv().ok()
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        if let Some(cancel) = self.on_drop.take() {
            cancel();
        }
        debug!(queue = %self.queue, "Consumer dropped");
    }
}

impl Stream for Consumer {
    type Item = Delivery;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("queue", &self.queue)
            .finish()
    }
}
