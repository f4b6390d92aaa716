//! # Shared Types Crate
//!
//! Wire-level types shared by the gateway and the workers: correlation ids,
//! the message envelope, queue names, the typed request/response union and
//! protocol errors.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: queue names and message shapes are defined
//!   here and nowhere else.
//! - **Opaque Correlation**: the correlation id is the sole routing key for
//!   responses; it is compared byte-for-byte.
//! - **Validated Boundary**: payloads are decoded into [`RpcRequest`] before a
//!   handler sees them; unknown shapes are a [`ProtocolError`].

pub mod correlation;
pub mod envelope;
pub mod errors;
pub mod ipc;
pub mod queues;

pub use correlation::CorrelationId;
pub use envelope::{encode_body, DeliveryMode, Envelope, Payload};
pub use errors::ProtocolError;
pub use ipc::*;
pub use queues::reply_queue_for;
