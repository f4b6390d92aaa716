//! # Node Runtime
//!
//! Starts the gateway-side client and both workers over one broker, and
//! stops them in order.
//!
//! ## Startup Sequence
//!
//! 1. Validate configuration
//! 2. Build route tables for the auth and decanat workers
//! 3. Spawn one dispatcher per worker, each on its own connection
//! 4. Create the RPC client and the gateway facade
//!
//! ## Shutdown Sequence
//!
//! 1. Signal workers; each finishes its current message
//! 2. Wait for workers (bounded), abort stragglers
//! 3. Stop reply listeners and the expiry sweeper
//! 4. Close every connection

use crate::container::{ConfigError, NodeConfig, NodeContainer};
use crate::wiring::{auth_routes, decanat_routes};
use rpc_gateway::{GatewayService, RpcClient};
use rpc_worker::{Dispatcher, DispatcherHandle, RouteError};
use shared_bus::{ConnectionManager, InMemoryBroker};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

/// Workers get this long to finish their current message on shutdown.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("route table: {0}")]
    Routes(#[from] RouteError),
}

struct Worker {
    name: &'static str,
    handle: DispatcherHandle,
}

/// The running node.
pub struct NodeRuntime {
    container: Arc<NodeContainer>,
    gateway: GatewayService,
    client: Arc<RpcClient>,
    workers: Vec<Worker>,
    connections: Vec<Arc<ConnectionManager>>,
    shutdown_tx: watch::Sender<bool>,
}

impl NodeRuntime {
    /// Start a node over fresh in-memory collaborators.
    pub async fn start(config: NodeConfig) -> Result<Self, NodeError> {
        Self::start_with(NodeContainer::new(config)).await
    }

    /// Start a node over a prepared container.
    pub async fn start_with(container: NodeContainer) -> Result<Self, NodeError> {
        container.config.validate()?;
        let container = Arc::new(container);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut connections = Vec::new();

        let auth = auth_routes(Arc::clone(&container.users))?;
        let decanat = decanat_routes(Arc::clone(&container.office))?;

        let mut workers = Vec::new();
        for (name, routes, config) in [
            ("auth", auth, &container.config.auth),
            ("decanat", decanat, &container.config.decanat),
        ] {
            let connection = container.connection(&config.reconnect);
            connections.push(Arc::clone(&connection));
            let handle =
                Dispatcher::new(connection, routes, config.clone()).spawn(shutdown_rx.clone());
            info!(worker = name, queues = handle.worker_count(), "Worker started");
            workers.push(Worker { name, handle });
        }

        let connection = container.connection(&container.config.gateway.reconnect);
        connections.push(Arc::clone(&connection));
        let client = Arc::new(RpcClient::new(connection, container.config.gateway.clone()));
        let gateway = GatewayService::new(Arc::clone(&client));

        info!(
            call_timeout_ms = container.config.gateway.call_timeout.as_millis() as u64,
            "Campus node running"
        );

        Ok(Self {
            container,
            gateway,
            client,
            workers,
            connections,
            shutdown_tx,
        })
    }

    /// Entry point for gateway calls.
    pub fn gateway(&self) -> &GatewayService {
        &self.gateway
    }

    pub fn client(&self) -> &Arc<RpcClient> {
        &self.client
    }

    pub fn broker(&self) -> &InMemoryBroker {
        &self.container.broker
    }

    pub fn container(&self) -> &Arc<NodeContainer> {
        &self.container
    }

    /// Running dispatcher of the named worker (`auth` or `decanat`).
    pub fn worker(&self, name: &str) -> Option<&DispatcherHandle> {
        self.workers.iter().find(|w| w.name == name).map(|w| &w.handle)
    }

    /// Stop the node gracefully.
    pub async fn shutdown(self) {
        info!("Initiating graceful shutdown...");
        if self.shutdown_tx.send(true).is_err() {
            warn!("No worker was listening for shutdown");
        }

        for worker in self.workers {
            if !worker.handle.join_within(SHUTDOWN_GRACE).await {
                warn!(worker = worker.name, "Worker did not stop in time; aborted");
            }
        }

        self.client.shutdown().await;
        for connection in &self.connections {
            connection.close().await;
        }
        info!("Shutdown complete");
    }
}
