// Allow missing docs for internal items in development
#![allow(missing_docs)]

//! RPC Gateway - the calling side of the request/response bridge.
//!
//! Lets an HTTP-facing service make calls that feel synchronous while the
//! transport is a set of fire-and-forget broker queues.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          RPC GATEWAY                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────┐                │
//! │  │        GatewayService (HTTP boundary)       │                │
//! │  │   success → 200 · failed → 400 · 5xx        │                │
//! │  └────────────────────┬────────────────────────┘                │
//! │                       │                                         │
//! │  ┌────────────────────┴────────────────────────┐                │
//! │  │                 RpcClient                   │                │
//! │  │   declare · register · publish · wait       │                │
//! │  └──────────┬─────────────────────▲────────────┘                │
//! │             │                     │ resolve(correlation id)     │
//! │  ┌──────────┴──────────┐  ┌───────┴─────────────┐               │
//! │  │ CorrelationRegistry │◄─┤ ReplyListener (per  │               │
//! │  │  (oneshot + sweep)  │  │    reply queue)     │               │
//! │  └─────────────────────┘  └───────▲─────────────┘               │
//! └─────────────┼─────────────────────┼─────────────────────────────┘
//!               ▼ request queue       │ reply queue
//!                         Broker
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use rpc_gateway::{GatewayConfig, GatewayService, RpcClient};
//!
//! let connection = Arc::new(ConnectionManager::new(connector, config.reconnect.clone()));
//! let service = GatewayService::new(Arc::new(RpcClient::new(connection, config)));
//! let reply = service.authorize("a@x.com", "secret").await;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod domain;
pub mod ipc;
pub mod service;

pub use domain::{
    spawn_sweeper, Call, CallError, CallOutcome, CallState, ConfigError, CorrelationRegistry,
    GatewayConfig, RegistryStats, Waiter,
};
pub use ipc::{handle_delivery, ReplyListener, RpcClient};
pub use service::{GatewayReply, GatewayService};
