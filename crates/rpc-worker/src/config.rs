//! Worker configuration with validation.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use shared_bus::{BackoffPolicy, DEFAULT_WORKER_PREFETCH};

/// Dispatcher configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Unacked messages each queue consumer may hold
    pub prefetch: u16,
    /// Queues consumed without a handler; every request on them is
    /// answered with an "unrecognized destination" failure
    pub extra_queues: Vec<String>,
    /// Broker reconnect policy
    pub reconnect: BackoffPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            prefetch: DEFAULT_WORKER_PREFETCH,
            extra_queues: Vec::new(),
            reconnect: BackoffPolicy::default(),
        }
    }
}

impl WorkerConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefetch == 0 {
            return Err(ConfigError::InvalidPrefetch(
                "prefetch cannot be 0 (unbounded)".into(),
            ));
        }
        self.reconnect
            .validate()
            .map_err(|reason| ConfigError::InvalidBackoff(reason.into()))
    }
}
