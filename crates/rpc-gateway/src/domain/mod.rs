//! Domain types for the gateway: configuration, errors and the
//! correlation registry.

pub mod config;
pub mod error;
pub mod registry;

// Re-exports for convenience
pub use config::GatewayConfig;
pub use error::{CallError, ConfigError};
pub use registry::{
    spawn_sweeper, Call, CallOutcome, CallState, CorrelationRegistry, RegistryStats, Waiter,
};
