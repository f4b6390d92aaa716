//! Transport-level errors.

use thiserror::Error;

/// Broker connectivity and channel failures.
///
/// Fatal to the operation that raised it, never to the process: callers
/// invalidate their channel and reconnect on the next attempt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Broker cannot be reached.
    #[error("Broker unreachable: {0}")]
    Unreachable(String),

    /// Broker refused the operation.
    #[error("Operation rejected by broker: {0}")]
    Rejected(String),

    /// Consuming from a queue that was never declared.
    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    /// Ack/nack for a delivery the broker no longer tracks.
    #[error("Unknown delivery tag {tag} on {queue}")]
    UnknownDeliveryTag { queue: String, tag: u64 },

    /// Channel or connection was closed.
    #[error("Channel closed")]
    Closed,
}
