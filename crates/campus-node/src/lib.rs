//! # Campus Node
//!
//! Hosts the campus RPC services in one process. The `main.rs` binary is a
//! thin shell around [`NodeRuntime`]; the library exists so the services
//! can be started from tests.
//!
//! ## Modular Structure
//!
//! - `container/` - Configuration and shared collaborators
//! - `adapters/` - Storage ports and in-memory adapters
//! - `handlers/` - Auth and decanat business services
//! - `wiring/` - Queue to service bindings
//! - `runtime` - Startup and shutdown
//!
//! ## Request Flow
//!
//! ```text
//! GatewayService ──► RpcClient ──publish──► [request queue] ──► Dispatcher
//!       ▲                │                                         │
//!       │          CorrelationRegistry                       AuthService /
//!       │                ▲                                  DecanatService
//!       └── reply ───────┴──── ReplyListener ◄── [reply queue] ◄───┘
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod container;
pub mod handlers;
pub mod runtime;
pub mod wiring;

pub use container::{ConfigError, NodeConfig, NodeContainer};
pub use runtime::{NodeError, NodeRuntime};
