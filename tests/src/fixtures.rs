//! Builders shared by the integration scenarios.

use rpc_gateway::{GatewayConfig, RpcClient};
use rpc_worker::{handler_fn, Dispatcher, DispatcherHandle, Handler, HandlerRegistry, WorkerConfig};
use serde_json::Value;
use shared_bus::{BackoffPolicy, ConnectionManager, InMemoryBroker};
use shared_types::{Payload, RpcResponse};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Email the auth handlers treat as already registered.
pub const TAKEN_EMAIL: &str = "test@example.com";

/// Backoff short enough for tests to reconnect in milliseconds.
pub fn fast_backoff() -> BackoffPolicy {
    BackoffPolicy {
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(40),
        multiplier: 2.0,
        max_attempts: 3,
    }
}

pub fn connection(broker: &InMemoryBroker) -> Arc<ConnectionManager> {
    Arc::new(ConnectionManager::new(
        Arc::new(broker.connector()),
        fast_backoff(),
    ))
}

pub fn gateway_config(call_timeout: Duration) -> GatewayConfig {
    GatewayConfig {
        call_timeout,
        sweep_interval: Duration::from_millis(10),
        reply_prefetch: 64,
        reconnect: fast_backoff(),
    }
}

pub fn client(broker: &InMemoryBroker, call_timeout: Duration) -> Arc<RpcClient> {
    Arc::new(RpcClient::new(connection(broker), gateway_config(call_timeout)))
}

pub fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => panic!("payload must be an object, got {other}"),
    }
}

/// Registration handler: every email but [`TAKEN_EMAIL`] succeeds.
pub fn registration_handler() -> Arc<dyn Handler> {
    handler_fn(|request| async move {
        if request.email() == Some(TAKEN_EMAIL) {
            Ok(RpcResponse::failed("A user with this email is already registered"))
        } else {
            Ok(RpcResponse::success())
        }
    })
}

/// Running dispatcher plus its shutdown switch.
pub struct Workers {
    handle: DispatcherHandle,
    shutdown: watch::Sender<bool>,
}

impl Workers {
    pub fn spawn(broker: &InMemoryBroker, routes: HandlerRegistry) -> Self {
        let config = WorkerConfig {
            reconnect: fast_backoff(),
            ..WorkerConfig::default()
        };
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = Dispatcher::new(connection(broker), routes, config).spawn(shutdown_rx);
        Self { handle, shutdown }
    }

    pub fn handle(&self) -> &DispatcherHandle {
        &self.handle
    }

    pub async fn stop(self) {
        self.shutdown.send(true).unwrap();
        assert!(self.handle.join_within(Duration::from_secs(1)).await);
    }
}

/// Poll until `queue` has `consumers` consumers.
pub async fn wait_for_consumers(broker: &InMemoryBroker, queue: &str, consumers: usize) {
    for _ in 0..400 {
        if broker.consumer_count(queue) == consumers {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "{queue} has {} consumers, expected {consumers}",
        broker.consumer_count(queue)
    );
}
