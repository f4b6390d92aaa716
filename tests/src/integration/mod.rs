//! Cross-crate integration scenarios.

mod concurrency;
mod e2e_flows;
mod reconnect;
mod rpc_semantics;
