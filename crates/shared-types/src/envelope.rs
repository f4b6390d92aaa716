//! # Message Envelope
//!
//! The unit exchanged over the broker.
//!
//! - **Body**: UTF-8 JSON, an object for every request and response.
//! - **Correlation**: `correlation_id` is generated by the caller and echoed
//!   unchanged on the response.
//! - **Routing**: `reply_to` names the queue a response must be published to
//!   and is set on requests only.

use crate::correlation::CorrelationId;
use crate::errors::ProtocolError;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Structured payload carried in a request body.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Broker persistence hint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryMode {
    /// May be lost if the broker restarts.
    Transient,
    /// Written to durable storage by the broker.
    #[default]
    Persistent,
}

/// The wire unit for every message on the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Protocol version for forward compatibility.
    pub version: u16,

    /// Serialized body (UTF-8 JSON).
    pub body: Bytes,

    /// For requests: a freshly generated id.
    /// For responses: the id from the original request, byte-for-byte.
    pub correlation_id: Option<CorrelationId>,

    /// Queue the consumer must publish its response to. Requests only.
    pub reply_to: Option<String>,

    /// Persistence hint for the broker.
    pub delivery_mode: DeliveryMode,

    /// Unix timestamp (milliseconds) when the envelope was built.
    pub timestamp: u64,
}

impl Envelope {
    /// Current protocol version.
    pub const CURRENT_VERSION: u16 = 1;

    /// Bare envelope around an already-encoded body.
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            body: body.into(),
            correlation_id: None,
            reply_to: None,
            delivery_mode: DeliveryMode::Persistent,
            timestamp: now_ms(),
        }
    }

    /// Fire-and-forget message with no correlation metadata.
    pub fn message<T: Serialize>(value: &T) -> Result<Self, ProtocolError> {
        Ok(Self::new(encode_body(value)?))
    }

    /// Request envelope expecting a response on `reply_to`.
    pub fn request(
        payload: &Payload,
        correlation_id: CorrelationId,
        reply_to: impl Into<String>,
    ) -> Result<Self, ProtocolError> {
        Ok(Self::new(encode_body(payload)?)
            .with_correlation_id(correlation_id)
            .with_reply_to(reply_to))
    }

    /// Response envelope echoing the request's correlation id.
    pub fn reply<T: Serialize>(
        value: &T,
        correlation_id: CorrelationId,
    ) -> Result<Self, ProtocolError> {
        Ok(Self::new(encode_body(value)?).with_correlation_id(correlation_id))
    }

    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn transient(mut self) -> Self {
        self.delivery_mode = DeliveryMode::Transient;
        self
    }

    /// The correlation id, or `MissingCorrelationId`.
    pub fn require_correlation_id(&self) -> Result<&CorrelationId, ProtocolError> {
        self.correlation_id
            .as_ref()
            .ok_or(ProtocolError::MissingCorrelationId)
    }

    /// The reply destination, or `MissingReplyTo`.
    pub fn require_reply_to(&self) -> Result<&str, ProtocolError> {
        self.reply_to
            .as_deref()
            .filter(|queue| !queue.is_empty())
            .ok_or(ProtocolError::MissingReplyTo)
    }

    /// Decode the body into any deserializable type.
    pub fn decode_body<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        let text = std::str::from_utf8(&self.body)
            .map_err(|e| ProtocolError::MalformedBody(format!("invalid UTF-8: {e}")))?;
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedBody(e.to_string()))
    }

    /// Decode the body as a JSON object.
    pub fn decode_payload(&self) -> Result<Payload, ProtocolError> {
        match self.decode_body::<serde_json::Value>()? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(ProtocolError::NotAnObject {
                found: ProtocolError::kind_of(&other),
            }),
        }
    }

    /// Get the body as a string (if valid UTF-8).
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

/// Serialize a value into a JSON body.
pub fn encode_body<T: Serialize + ?Sized>(value: &T) -> Result<Bytes, ProtocolError> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| ProtocolError::Encode(e.to_string()))
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
