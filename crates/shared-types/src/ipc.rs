//! # RPC Message Shapes
//!
//! One request shape per request queue, validated at the worker boundary,
//! and the common response shape every worker answers with.
//!
//! ## Wire rules
//!
//! - Request bodies are JSON objects. Unknown fields are ignored so that
//!   front ends may send extra context (`type`, `date`).
//! - Response bodies are JSON objects with a `status` of `"success"` or
//!   `"failed"`, an optional `message`, and any number of data fields.

use crate::envelope::Payload;
use crate::errors::ProtocolError;
use crate::queues;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// AUTH
// =============================================================================

/// New account. Sent on `registration_queue`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email: String,
    pub password: String,
}

/// Login attempt. Sent on `authorization_queue`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

// =============================================================================
// EXAMS AND RETAKES
// =============================================================================

/// Enrolments of one student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrolmentQuery {
    pub email: String,
}

/// Enrolment on an exam. Sent on `enroll_to_exam_queue`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamEnrolment {
    pub email: String,
    pub exam_id: i64,
    /// Attempt kind as chosen by the student (e.g. "exam", "credit").
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// Enrolment on a retake. Sent on `enroll_to_retake_queue`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetakeEnrolment {
    pub email: String,
    pub retake_id: i64,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamCancellation {
    pub email: String,
    pub exam_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetakeCancellation {
    pub email: String,
    pub retake_id: i64,
}

// =============================================================================
// REQUEST UNION
// =============================================================================

/// Every request the workers understand, keyed by request queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcRequest {
    Registration(RegistrationRequest),
    Authorization(Credentials),
    ListExams,
    ExamEnrolments(EnrolmentQuery),
    EnrollToExam(ExamEnrolment),
    CancelExam(ExamCancellation),
    ListRetakes,
    RetakeEnrolments(EnrolmentQuery),
    EnrollToRetake(RetakeEnrolment),
    CancelRetake(RetakeCancellation),
}

impl RpcRequest {
    /// Validate a payload received on `queue`.
    pub fn decode(queue: &str, payload: &Payload) -> Result<Self, ProtocolError> {
        let request = match queue {
            queues::REGISTRATION => Self::Registration(parse(queue, payload)?),
            queues::AUTHORIZATION => Self::Authorization(parse(queue, payload)?),
            queues::EXAMS => Self::ListExams,
            queues::ENROLMENTS_EXAMS => Self::ExamEnrolments(parse(queue, payload)?),
            queues::ENROLL_TO_EXAM => Self::EnrollToExam(parse(queue, payload)?),
            queues::CANCEL_EXAM => Self::CancelExam(parse(queue, payload)?),
            queues::RETAKES => Self::ListRetakes,
            queues::ENROLMENTS_RETAKE => Self::RetakeEnrolments(parse(queue, payload)?),
            queues::ENROLL_TO_RETAKE => Self::EnrollToRetake(parse(queue, payload)?),
            queues::CANCEL_RETAKE => Self::CancelRetake(parse(queue, payload)?),
            other => return Err(ProtocolError::UnknownQueue(other.to_string())),
        };

        if let Some(email) = request.email() {
            if email.trim().is_empty() {
                return Err(ProtocolError::InvalidPayload {
                    queue: queue.to_string(),
                    reason: "email must not be empty".into(),
                });
            }
        }
        Ok(request)
    }

    /// Request queue this variant is sent on.
    pub fn queue(&self) -> &'static str {
        match self {
            Self::Registration(_) => queues::REGISTRATION,
            Self::Authorization(_) => queues::AUTHORIZATION,
            Self::ListExams => queues::EXAMS,
            Self::ExamEnrolments(_) => queues::ENROLMENTS_EXAMS,
            Self::EnrollToExam(_) => queues::ENROLL_TO_EXAM,
            Self::CancelExam(_) => queues::CANCEL_EXAM,
            Self::ListRetakes => queues::RETAKES,
            Self::RetakeEnrolments(_) => queues::ENROLMENTS_RETAKE,
            Self::EnrollToRetake(_) => queues::ENROLL_TO_RETAKE,
            Self::CancelRetake(_) => queues::CANCEL_RETAKE,
        }
    }

    /// Email of the student the request concerns, if any.
    pub fn email(&self) -> Option<&str> {
        match self {
            Self::Registration(r) => Some(&r.email),
            Self::Authorization(c) => Some(&c.email),
            Self::ExamEnrolments(q) | Self::RetakeEnrolments(q) => Some(&q.email),
            Self::EnrollToExam(e) => Some(&e.email),
            Self::CancelExam(c) => Some(&c.email),
            Self::EnrollToRetake(e) => Some(&e.email),
            Self::CancelRetake(c) => Some(&c.email),
            Self::ListExams | Self::ListRetakes => None,
        }
    }

    /// Body to publish on [`Self::queue`].
    pub fn to_payload(&self) -> Result<Payload, ProtocolError> {
        let value = match self {
            Self::Registration(r) => to_value(r)?,
            Self::Authorization(c) => to_value(c)?,
            Self::ExamEnrolments(q) | Self::RetakeEnrolments(q) => to_value(q)?,
            Self::EnrollToExam(e) => to_value(e)?,
            Self::CancelExam(c) => to_value(c)?,
            Self::EnrollToRetake(e) => to_value(e)?,
            Self::CancelRetake(c) => to_value(c)?,
            Self::ListExams | Self::ListRetakes => return Ok(Payload::new()),
        };
        match value {
            Value::Object(map) => Ok(map),
            other => Err(ProtocolError::NotAnObject {
                found: ProtocolError::kind_of(&other),
            }),
        }
    }
}

fn parse<T: DeserializeOwned>(queue: &str, payload: &Payload) -> Result<T, ProtocolError> {
    serde_json::from_value(Value::Object(payload.clone())).map_err(|e| {
        ProtocolError::InvalidPayload {
            queue: queue.to_string(),
            reason: e.to_string(),
        }
    })
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, ProtocolError> {
    serde_json::to_value(value).map_err(|e| ProtocolError::Encode(e.to_string()))
}

// =============================================================================
// RESPONSE
// =============================================================================

/// Outcome reported by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Failed,
}

/// Response body published to the caller's reply queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Result data (`exams`, `retakes`, `enrolments-exams`, ...).
    #[serde(flatten)]
    pub data: Payload,
}

impl RpcResponse {
    pub fn success() -> Self {
        Self {
            status: ResponseStatus::Success,
            message: None,
            data: Payload::new(),
        }
    }

    /// Failed response. The message is never empty.
    pub fn failed(message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.trim().is_empty() {
            message = "unknown error".to_string();
        }
        Self {
            status: ResponseStatus::Failed,
            message: Some(message),
            data: Payload::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}
