//! Broker-facing side of the gateway.
//!
//! The client publishes requests; one listener per reply queue routes
//! responses back through the correlation registry.

pub mod client;
pub mod listener;

pub use client::RpcClient;
pub use listener::{handle_delivery, ReplyListener};
