//! Gateway configuration with validation.

use crate::domain::error::ConfigError;
use serde::{Deserialize, Serialize};
use shared_bus::BackoffPolicy;
use std::time::Duration;

/// Gateway-side RPC configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Timeout for calls that do not pass their own
    #[serde(with = "humantime_serde")]
    pub call_timeout: Duration,
    /// How often the registry sweeps expired calls
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
    /// Unacked replies held by each reply-queue consumer (0 = unbounded)
    pub reply_prefetch: u16,
    /// Broker reconnect policy
    pub reconnect: BackoffPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(5),
            sweep_interval: Duration::from_millis(250),
            reply_prefetch: 64,
            reconnect: BackoffPolicy::default(),
        }
    }
}

impl GatewayConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.call_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "call_timeout cannot be 0".into(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "sweep_interval cannot be 0".into(),
            ));
        }
        if self.sweep_interval > self.call_timeout {
            return Err(ConfigError::InvalidTimeout(
                "sweep_interval must not exceed call_timeout".into(),
            ));
        }
        self.reconnect
            .validate()
            .map_err(|reason| ConfigError::InvalidBackoff(reason.into()))
    }
}
