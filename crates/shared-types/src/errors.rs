//! # Error Types
//!
//! Protocol-level errors raised while reading or building envelopes.
//! These never cross the queue boundary as exceptions: the worker turns
//! them into `failed` responses or drops the message, and the gateway
//! drops replies it cannot route.

use thiserror::Error;

/// Malformed or unroutable message content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Body is not valid UTF-8 JSON.
    #[error("Malformed body: {0}")]
    MalformedBody(String),

    /// Body parsed but is not a JSON object.
    #[error("Body must be a JSON object, got {found}")]
    NotAnObject { found: &'static str },

    /// Envelope carries no correlation id.
    #[error("Missing correlation id")]
    MissingCorrelationId,

    /// Request envelope carries no reply destination.
    #[error("Missing reply destination")]
    MissingReplyTo,

    /// Queue name is not part of the request union.
    #[error("Unrecognized destination: {0}")]
    UnknownQueue(String),

    /// Payload does not match the shape expected on this queue.
    #[error("Invalid payload for {queue}: {reason}")]
    InvalidPayload { queue: String, reason: String },

    /// Value could not be serialized.
    #[error("Encoding failed: {0}")]
    Encode(String),
}

impl ProtocolError {
    /// Short name of a JSON value's kind, for `NotAnObject`.
    pub fn kind_of(value: &serde_json::Value) -> &'static str {
        match value {
            serde_json::Value::Null => "null",
            serde_json::Value::Bool(_) => "boolean",
            serde_json::Value::Number(_) => "number",
            serde_json::Value::String(_) => "string",
            serde_json::Value::Array(_) => "array",
            serde_json::Value::Object(_) => "object",
        }
    }
}
