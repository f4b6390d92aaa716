//! # Campus Telemetry
//!
//! Log setup shared by every campus RPC service.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use campus_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! init_telemetry(&config)?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `CAMPUS_SERVICE_NAME` | `campus-rpc` | Service name on the startup event |
//! | `CAMPUS_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `CAMPUS_JSON_LOGS` | `false` | JSON lines instead of human output |
//! | `CAMPUS_THREAD_IDS` | `false` | Include thread ids |

mod config;
mod subscriber;

pub use config::TelemetryConfig;
pub use subscriber::env_filter;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter {0}")]
    Filter(String),

    #[error("Global subscriber already installed: {0}")]
    AlreadyInitialized(String),
}

/// Install the global tracing subscriber described by `config`.
///
/// Fails if the filter does not parse or a subscriber is already set.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    subscriber::init_subscriber(config)?;

    tracing::info!(
        service = %config.service_name,
        level = %config.log_level,
        json = config.json_logs,
        "Telemetry initialized"
    );
    Ok(())
}

/// Span carrying the RPC context fields used across the bridge.
///
/// ```rust,ignore
/// let _span = rpc_span!("call", correlation_id = %id, queue = %queue).entered();
/// ```
#[macro_export]
macro_rules! rpc_span {
    ($name:expr, $($field:tt)*) => {
        tracing::info_span!($name, $($field)*)
    };
}
