//! Worker error types.

use thiserror::Error;

/// Failure raised by a business handler.
///
/// Never crosses the queue boundary as an error: the dispatcher turns it
/// into a `status = failed` response carrying the display text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// A business rule refused the request.
    #[error("{0}")]
    Rejected(String),

    /// A downstream collaborator (storage, HTTP backend) failed.
    #[error("Backend unavailable: {0}")]
    Backend(String),

    /// Anything else.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Route table construction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// Queue name is not a known request queue.
    #[error("No request shape is defined for queue {0}")]
    UnknownQueue(String),

    /// A handler is already bound to this queue.
    #[error("Handler already registered for queue {0}")]
    Duplicate(String),
}

/// Worker configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Invalid prefetch window
    #[error("invalid prefetch: {0}")]
    InvalidPrefetch(String),
    /// Unusable reconnect policy
    #[error("invalid backoff: {0}")]
    InvalidBackoff(String),
}
