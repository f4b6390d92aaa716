//! # RPC Worker
//!
//! The answering side of the request/response bridge: a route table from
//! request queue to business [`Handler`], and a [`Dispatcher`] that consumes
//! those queues and publishes every answer to the caller's reply queue.
//!
//! ## Guarantees
//!
//! - Every consumed request with a reply destination gets exactly one
//!   reply per delivery, `success` or `failed`; the dispatcher never leaves
//!   a caller to run into its timeout because of a handler failure.
//! - Source messages are acked only after the reply was published
//!   (at-least-once).
//! - A bad message never stops a worker.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod registry;

pub use config::WorkerConfig;
pub use dispatcher::{
    Dispatcher, DispatcherHandle, DispatcherStats, Disposition, WorkerState};
pub use error::{ConfigError, HandlerError, RouteError};
pub use handler::{handler_fn, FnHandler, Handler};
pub use registry::HandlerRegistry;
