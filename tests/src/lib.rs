//! # Campus RPC Test Suite
//!
//! Cross-crate scenarios that need a broker, a gateway-side client and real
//! workers at the same time.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs        # Broker, client and worker builders
//! └── integration/
//!     ├── e2e_flows.rs   # Gateway facade against the campus node
//!     ├── rpc_semantics.rs # Timeouts, failures, stray replies
//!     ├── concurrency.rs # Many callers, one reply queue
//!     └── reconnect.rs   # Broker outages and redelivery
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p campus-tests
//! cargo test -p campus-tests integration::reconnect::
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

#[cfg(test)]
pub mod fixtures;
pub mod integration;
