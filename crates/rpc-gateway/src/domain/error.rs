//! Gateway error types.
//!
//! A call ends in exactly one outcome. Business failures are not errors
//! here: they arrive as an `RpcResponse` with `status = failed`.

use shared_bus::TransportError;
use shared_types::{CorrelationId, ProtocolError};
use std::time::Duration;
use thiserror::Error;

/// Why a call produced no response.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    /// No reply arrived before the deadline. The worker may still finish
    /// later; its effects are not rolled back.
    #[error("No reply from {queue} within {}ms", .after.as_millis())]
    Timeout { queue: String, after: Duration },

    /// Broker unreachable or publish rejected.
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    /// Request could not be encoded, or the reply could not be read.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The id is still registered for another call.
    #[error("Correlation id already in flight: {0}")]
    DuplicateCorrelationId(CorrelationId),

    /// The caller stopped waiting.
    #[error("Call cancelled")]
    Cancelled,
}

impl CallError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CallError::Timeout { .. })
    }

    /// HTTP status the upstream boundary reports for this outcome.
    pub fn status_code(&self) -> u16 {
        match self {
            CallError::Timeout { .. } => 504,
            _ => 500,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Unusable reconnect policy
    #[error("invalid backoff: {0}")]
    InvalidBackoff(String),
}
