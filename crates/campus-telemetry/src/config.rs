//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for log output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name attached to every event
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error) or a full
    /// `EnvFilter` directive such as `info,rpc_gateway=debug`
    pub log_level: String,

    /// Whether to enable JSON formatted logs
    pub json_logs: bool,

    /// Include thread ids in each line
    pub thread_ids: bool,

    /// Include the event target (module path)
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "campus-rpc".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            thread_ids: false,
            with_target: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `CAMPUS_SERVICE_NAME`: Service name (default: campus-rpc)
    /// - `CAMPUS_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `CAMPUS_JSON_LOGS`: Enable JSON logs (default: false in dev, true in containers)
    /// - `CAMPUS_THREAD_IDS`: Include thread ids (default: false)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Self::from_env`] over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let is_container =
            lookup("KUBERNETES_SERVICE_HOST").is_some() || lookup("DOCKER_CONTAINER").is_some();

        Self {
            service_name: lookup("CAMPUS_SERVICE_NAME").unwrap_or(defaults.service_name),

            log_level: lookup("CAMPUS_LOG_LEVEL")
                .or_else(|| lookup("RUST_LOG"))
                .unwrap_or(defaults.log_level),

            json_logs: lookup("CAMPUS_JSON_LOGS")
                .map(|v| is_truthy(&v))
                .unwrap_or(is_container),

            thread_ids: lookup("CAMPUS_THREAD_IDS")
                .map(|v| is_truthy(&v))
                .unwrap_or(defaults.thread_ids),

            with_target: defaults.with_target,
        }
    }

    /// Configuration for one named service of the node.
    pub fn for_service(service: &str) -> Self {
        let mut config = Self::from_env();
        config.service_name = service.to_string();
        config
    }
}

fn is_truthy(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}
