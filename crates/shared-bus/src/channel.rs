//! # Message Channel
//!
//! The minimal capability surface the RPC bridge needs from a broker:
//! declare a durable queue, publish an envelope to it, and consume from it
//! with a prefetch window. Acknowledgement happens on the [`Delivery`]
//! handed out by the consumer.
//!
//! [`Delivery`]: crate::subscriber::Delivery

use crate::error::TransportError;
use crate::subscriber::Consumer;
use async_trait::async_trait;
use shared_types::Envelope;
use std::sync::Arc;

/// One logical channel on a broker connection.
///
/// Channels are shared by every concurrent publisher in a process; each
/// `publish` is a single atomic frame.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Ensure a durable queue exists. Idempotent.
    async fn declare_queue(&self, queue: &str) -> Result<(), TransportError>;

    /// Publish an envelope to a queue through the default exchange.
    ///
    /// Publishing to a queue that does not exist is not an error: the
    /// broker drops the message.
    async fn publish(&self, queue: &str, envelope: Envelope) -> Result<(), TransportError>;

    /// Start consuming a declared queue.
    ///
    /// `prefetch` bounds unacknowledged deliveries held by this consumer;
    /// `0` means unbounded.
    async fn consume(&self, queue: &str, prefetch: u16) -> Result<Consumer, TransportError>;

    /// Whether the channel can still be used.
    fn is_open(&self) -> bool;
}

/// Opens channels to a broker.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn MessageChannel>, TransportError>;
}

/// Identity comparison for shared channels.
pub(crate) fn same_channel(a: &Arc<dyn MessageChannel>, b: &Arc<dyn MessageChannel>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
