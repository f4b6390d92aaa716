//! # Shared Bus - Broker Plumbing for the RPC Bridge
//!
//! A minimal message channel abstraction and the pieces around it:
//!
//! - [`MessageChannel`]: declare / publish / consume on durable queues.
//! - [`Consumer`] and [`Delivery`]: the receiving side with explicit ack/nack.
//! - [`InMemoryBroker`]: a single-process broker with prefetch, redelivery
//!   and an offline switch.
//! - [`ConnectionManager`]: owned connection lifecycle with reconnect backoff.
//!
//! ```text
//! ┌──────────────┐   publish(queue)   ┌──────────────┐   consume(queue)   ┌──────────────┐
//! │   Gateway    │ ─────────────────► │    Broker    │ ─────────────────► │    Worker    │
//! │              │ ◄───────────────── │              │ ◄───────────────── │              │
//! └──────────────┘  consume(reply_to) └──────────────┘  publish(reply_to) └──────────────┘
//! ```

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod broker;
pub mod channel;
pub mod connection;
pub mod error;
pub mod subscriber;

// Re-export main types
pub use broker::{InMemoryBroker, InMemoryConnector};
pub use channel::{Connector, MessageChannel};
pub use connection::{BackoffPolicy, ConnectionManager, ConnectionState};
pub use error::TransportError;
pub use subscriber::{Acker, Consumer, Delivery};

/// Prefetch used by worker consumers unless configured otherwise.
pub const DEFAULT_WORKER_PREFETCH: u16 = 1;
