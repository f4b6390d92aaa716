//! # Node Configuration
//!
//! Unified configuration for the gateway side, both workers and telemetry.
//!
//! Defaults come from each component; environment variables override
//! individual fields. Unparsable overrides are logged and ignored, then the
//! whole configuration is validated once.

use campus_telemetry::TelemetryConfig;
use rpc_gateway::GatewayConfig;
use rpc_worker::WorkerConfig;
use shared_bus::BackoffPolicy;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Complete node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Log output.
    pub telemetry: TelemetryConfig,
    /// RPC client used by the gateway facade.
    pub gateway: GatewayConfig,
    /// Registration/authorization worker.
    pub auth: WorkerConfig,
    /// Exams/retakes worker.
    pub decanat: WorkerConfig,
    /// Seed the in-memory stores with the test account and a timetable.
    pub seed_data: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            telemetry: TelemetryConfig::default(),
            gateway: GatewayConfig::default(),
            auth: WorkerConfig::default(),
            decanat: WorkerConfig::default(),
            seed_data: true,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("gateway: {0}")]
    Gateway(#[from] rpc_gateway::ConfigError),

    #[error("{service} worker: {source}")]
    Worker {
        service: &'static str,
        source: rpc_worker::ConfigError,
    },
}

impl NodeConfig {
    /// Defaults with environment overrides applied.
    ///
    /// # Environment Variables
    ///
    /// - `CAMPUS_RPC_TIMEOUT_MS`: default call timeout
    /// - `CAMPUS_SWEEP_INTERVAL_MS`: registry expiry sweep period
    /// - `CAMPUS_REPLY_PREFETCH`: reply consumer prefetch
    /// - `CAMPUS_WORKER_PREFETCH`: prefetch of every worker queue
    /// - `CAMPUS_RECONNECT_INITIAL_MS`: first reconnect delay
    /// - `CAMPUS_RECONNECT_MAX_MS`: reconnect delay cap
    /// - `CAMPUS_RECONNECT_MAX_ATTEMPTS`: attempts per reconnect cycle
    /// - `CAMPUS_SEED_DATA`: seed the in-memory stores (default: true)
    /// - plus the telemetry variables (`CAMPUS_LOG_LEVEL`, ...)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self {
            telemetry: TelemetryConfig::from_lookup(&lookup),
            ..Self::default()
        };

        if let Some(ms) = parsed::<u64>(&lookup, "CAMPUS_RPC_TIMEOUT_MS") {
            config.gateway.call_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parsed::<u64>(&lookup, "CAMPUS_SWEEP_INTERVAL_MS") {
            config.gateway.sweep_interval = Duration::from_millis(ms);
        }
        if let Some(prefetch) = parsed(&lookup, "CAMPUS_REPLY_PREFETCH") {
            config.gateway.reply_prefetch = prefetch;
        }
        if let Some(prefetch) = parsed(&lookup, "CAMPUS_WORKER_PREFETCH") {
            config.auth.prefetch = prefetch;
            config.decanat.prefetch = prefetch;
        }

        let initial = parsed::<u64>(&lookup, "CAMPUS_RECONNECT_INITIAL_MS");
        let max = parsed::<u64>(&lookup, "CAMPUS_RECONNECT_MAX_MS");
        let attempts = parsed::<u32>(&lookup, "CAMPUS_RECONNECT_MAX_ATTEMPTS");
        for policy in config.backoff_policies_mut() {
            if let Some(ms) = initial {
                policy.initial_delay = Duration::from_millis(ms);
            }
            if let Some(ms) = max {
                policy.max_delay = Duration::from_millis(ms);
            }
            if let Some(attempts) = attempts {
                policy.max_attempts = attempts;
            }
        }

        if let Some(value) = lookup("CAMPUS_SEED_DATA") {
            config.seed_data = !(value.eq_ignore_ascii_case("false") || value == "0");
        }

        config
    }

    fn backoff_policies_mut(&mut self) -> [&mut BackoffPolicy; 3] {
        [
            &mut self.gateway.reconnect,
            &mut self.auth.reconnect,
            &mut self.decanat.reconnect,
        ]
    }

    /// Validate every component configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gateway.validate()?;
        self.auth
            .validate()
            .map_err(|source| ConfigError::Worker { service: "auth", source })?;
        self.decanat
            .validate()
            .map_err(|source| ConfigError::Worker { service: "decanat", source })?;
        Ok(())
    }
}

fn parsed<T: FromStr>(lookup: impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = key, value = %raw, "Ignoring unparsable override");
            None
        }
    }
}
