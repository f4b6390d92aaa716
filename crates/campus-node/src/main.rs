//! # Campus Node
//!
//! Entry point: telemetry, configuration, node startup, a self-check call,
//! then wait for Ctrl+C.

use anyhow::{Context, Result};
use campus_node::adapters::SEED_USER_EMAIL;
use campus_node::{NodeConfig, NodeRuntime};
use campus_telemetry::{init_telemetry, rpc_span};
use tracing::{info, warn, Instrument};

#[tokio::main]
async fn main() -> Result<()> {
    let config = NodeConfig::from_env();
    init_telemetry(&config.telemetry).context("Failed to initialize telemetry")?;

    let seeded = config.seed_data;
    let runtime = NodeRuntime::start(config)
        .await
        .context("Failed to start campus node")?;

    if seeded {
        let reply = runtime
            .gateway()
            .authorize(SEED_USER_EMAIL, "self-check")
            .instrument(rpc_span!("self_check", email = SEED_USER_EMAIL))
            .await;
        if reply.is_success() {
            info!("Self-check call answered");
        } else {
            warn!(status = reply.status_code, body = %reply.body, "Self-check call failed");
        }
    }

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    runtime.shutdown().await;
    Ok(())
}
