//! # Collaborator Ports
//!
//! Storage the worker services depend on. The node ships in-memory
//! adapters; a database-backed deployment implements the same traits.
//!
//! ## Ports
//!
//! - `UserDirectory` - accounts known to the auth service
//! - `StudyOffice` - exams, retakes and the enrolments on them

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

/// Date format accepted from students (`31-01-2025`).
pub const INPUT_DATE_FORMAT: &str = "%d-%m-%Y";

/// Date format used in replies (`2025-01-31`).
pub const OUTPUT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Storage failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The referenced record does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The record to create exists already.
    #[error("{0}")]
    AlreadyExists(String),

    /// Storage could not be reached.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub name: Option<String>,
    pub email: String,
}

/// Exams and retakes share one shape and differ only in their keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    Exam,
    Retake,
}

impl SessionKind {
    /// Wire name of the session id field.
    pub fn id_field(self) -> &'static str {
        match self {
            SessionKind::Exam => "exam_id",
            SessionKind::Retake => "retake_id",
        }
    }

    /// Response key of the session listing.
    pub fn list_key(self) -> &'static str {
        match self {
            SessionKind::Exam => "exams",
            SessionKind::Retake => "retakes",
        }
    }

    /// Response key of an enrolment listing.
    pub fn enrolments_key(self) -> &'static str {
        match self {
            SessionKind::Exam => "enrolments-exams",
            SessionKind::Retake => "enrolments-retake",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKind::Exam => write!(f, "exam"),
            SessionKind::Retake => write!(f, "retake"),
        }
    }
}

/// A scheduled exam or retake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: i64,
    pub name: String,
    pub date: NaiveDate,
}

impl Session {
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "date": self.date.format(OUTPUT_DATE_FORMAT).to_string(),
        })
    }
}

/// A student's enrolment on a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrolment {
    pub email: String,
    pub session_id: i64,
    /// Attempt type chosen by the student
    pub attempt: String,
    pub date: NaiveDate,
}

impl Enrolment {
    pub fn to_json(&self, kind: SessionKind) -> Value {
        let mut value = json!({
            "email": self.email,
            "type": self.attempt,
            "date": self.date.format(OUTPUT_DATE_FORMAT).to_string(),
        });
        if let Value::Object(map) = &mut value {
            map.insert(kind.id_field().to_string(), json!(self.session_id));
        }
        value
    }
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Fails with `AlreadyExists` if the email is taken.
    async fn insert(&self, user: User) -> Result<(), StoreError>;
}

#[async_trait]
pub trait StudyOffice: Send + Sync {
    /// All sessions of `kind`, ordered by id.
    async fn sessions(&self, kind: SessionKind) -> Result<Vec<Session>, StoreError>;

    async fn enrolments(&self, kind: SessionKind, email: &str)
        -> Result<Vec<Enrolment>, StoreError>;

    /// Fails with `NotFound` for an unknown session and `AlreadyExists`
    /// for a second enrolment of the same student.
    async fn enroll(&self, kind: SessionKind, enrolment: Enrolment) -> Result<(), StoreError>;

    /// Fails with `NotFound` if there is no such enrolment.
    async fn cancel(&self, kind: SessionKind, email: &str, session_id: i64)
        -> Result<(), StoreError>;
}
