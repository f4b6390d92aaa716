//! # Decanat Service
//!
//! Exams and retakes: timetable listings, a student's enrolments, enrolling
//! and cancelling. Both session kinds share one code path keyed by
//! [`SessionKind`].

use super::refusal;
use crate::adapters::{Enrolment, SessionKind, StudyOffice, INPUT_DATE_FORMAT};
use async_trait::async_trait;
use chrono::NaiveDate;
use rpc_worker::{Handler, HandlerError};
use serde_json::Value;
use shared_types::{RpcRequest, RpcResponse};
use std::sync::Arc;
use tracing::info;

pub const MISSING_ENROLMENT_FIELDS: &str = "Enrolment type and date are required";

pub struct DecanatService {
    office: Arc<dyn StudyOffice>,
}

/// Enrolment fields common to exams and retakes.
struct EnrolmentForm {
    email: String,
    session_id: i64,
    attempt: Option<String>,
    date: Option<String>,
}

impl DecanatService {
    pub fn new(office: Arc<dyn StudyOffice>) -> Self {
        Self { office }
    }

    async fn list_sessions(&self, kind: SessionKind) -> Result<RpcResponse, HandlerError> {
        match self.office.sessions(kind).await {
            Ok(sessions) => {
                let list: Vec<Value> = sessions.iter().map(|s| s.to_json()).collect();
                Ok(RpcResponse::success().with_field(kind.list_key(), list))
            }
            Err(e) => refusal(e),
        }
    }

    async fn list_enrolments(
        &self,
        kind: SessionKind,
        email: &str,
    ) -> Result<RpcResponse, HandlerError> {
        match self.office.enrolments(kind, email).await {
            Ok(enrolments) => {
                let list: Vec<Value> = enrolments.iter().map(|e| e.to_json(kind)).collect();
                Ok(RpcResponse::success().with_field(kind.enrolments_key(), list))
            }
            Err(e) => refusal(e),
        }
    }

    async fn enroll(
        &self,
        kind: SessionKind,
        form: EnrolmentForm,
    ) -> Result<RpcResponse, HandlerError> {
        let (Some(attempt), Some(date)) = (form.attempt, form.date) else {
            return Ok(RpcResponse::failed(MISSING_ENROLMENT_FIELDS));
        };
        if attempt.trim().is_empty() {
            return Ok(RpcResponse::failed(MISSING_ENROLMENT_FIELDS));
        }
        let date = match NaiveDate::parse_from_str(&date, INPUT_DATE_FORMAT) {
            Ok(date) => date,
            Err(_) => {
                return Ok(RpcResponse::failed(format!(
                    "Invalid date {}, expected DD-MM-YYYY",
                    date
                )))
            }
        };

        let enrolment = Enrolment {
            email: form.email,
            session_id: form.session_id,
            attempt,
            date,
        };
        let (email, session_id) = (enrolment.email.clone(), enrolment.session_id);
        match self.office.enroll(kind, enrolment).await {
            Ok(()) => {
                info!(%kind, email = %email, session_id, "Enrolled");
                Ok(RpcResponse::success())
            }
            Err(e) => refusal(e),
        }
    }

    async fn cancel(
        &self,
        kind: SessionKind,
        email: &str,
        session_id: i64,
    ) -> Result<RpcResponse, HandlerError> {
        match self.office.cancel(kind, email, session_id).await {
            Ok(()) => {
                info!(%kind, email = %email, session_id, "Enrolment cancelled");
                Ok(RpcResponse::success())
            }
            Err(e) => refusal(e),
        }
    }
}

#[async_trait]
impl Handler for DecanatService {
    async fn handle(&self, request: RpcRequest) -> Result<RpcResponse, HandlerError> {
        match request {
            RpcRequest::ListExams => self.list_sessions(SessionKind::Exam).await,
            RpcRequest::ListRetakes => self.list_sessions(SessionKind::Retake).await,
            RpcRequest::ExamEnrolments(q) => self.list_enrolments(SessionKind::Exam, &q.email).await,
            RpcRequest::RetakeEnrolments(q) => {
                self.list_enrolments(SessionKind::Retake, &q.email).await
            }
            RpcRequest::EnrollToExam(e) => {
                let form = EnrolmentForm {
                    email: e.email,
                    session_id: e.exam_id,
                    attempt: e.kind,
                    date: e.date,
                };
                self.enroll(SessionKind::Exam, form).await
            }
            RpcRequest::EnrollToRetake(e) => {
                let form = EnrolmentForm {
                    email: e.email,
                    session_id: e.retake_id,
                    attempt: e.kind,
                    date: e.date,
                };
                self.enroll(SessionKind::Retake, form).await
            }
            RpcRequest::CancelExam(c) => self.cancel(SessionKind::Exam, &c.email, c.exam_id).await,
            RpcRequest::CancelRetake(c) => {
                self.cancel(SessionKind::Retake, &c.email, c.retake_id).await
            }
            other @ (RpcRequest::Registration(_) | RpcRequest::Authorization(_)) => {
                Err(HandlerError::Internal(format!(
                    "decanat service cannot answer {}",
                    other.queue()
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStudyOffice;
    use serde_json::json;
    use shared_types::{EnrolmentQuery, ExamCancellation, ExamEnrolment, RetakeEnrolment};

    fn service() -> DecanatService {
        DecanatService::new(Arc::new(InMemoryStudyOffice::seeded()))
    }

    fn enroll_exam(exam_id: i64) -> RpcRequest {
        RpcRequest::EnrollToExam(ExamEnrolment {
            email: "a@x.com".into(),
            exam_id,
            kind: Some("exam".into()),
            date: Some("20-01-2025".into()),
        })
    }

    #[tokio::test]
    async fn test_list_exams_under_exams_key() {
        let response = service().handle(RpcRequest::ListExams).await.unwrap();

        assert!(response.is_success());
        let exams = response.field("exams").unwrap().as_array().unwrap();
        assert_eq!(exams.len(), 3);
        assert_eq!(exams[0]["date"], json!("2025-01-20"));
    }

    #[tokio::test]
    async fn test_list_retakes_under_retakes_key() {
        let response = service().handle(RpcRequest::ListRetakes).await.unwrap();
        assert_eq!(response.field("retakes").unwrap().as_array().unwrap().len(), 2);
        assert!(response.field("exams").is_none());
    }

    #[tokio::test]
    async fn test_enroll_list_cancel_exam() {
        let service = service();

        assert!(service.handle(enroll_exam(2)).await.unwrap().is_success());

        let listed = service
            .handle(RpcRequest::ExamEnrolments(EnrolmentQuery { email: "a@x.com".into() }))
            .await
            .unwrap();
        assert_eq!(
            listed.field("enrolments-exams"),
            Some(&json!([{
                "email": "a@x.com",
                "exam_id": 2,
                "type": "exam",
                "date": "2025-01-20",
            }]))
        );

        let cancel = RpcRequest::CancelExam(ExamCancellation {
            email: "a@x.com".into(),
            exam_id: 2,
        });
        assert!(service.handle(cancel.clone()).await.unwrap().is_success());
        assert!(!service.handle(cancel).await.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_enroll_twice_fails() {
        let service = service();
        assert!(service.handle(enroll_exam(1)).await.unwrap().is_success());

        let again = service.handle(enroll_exam(1)).await.unwrap();
        assert!(!again.is_success());
        assert!(again.message.unwrap().contains("already exists"));
    }

    #[tokio::test]
    async fn test_enroll_unknown_retake_fails() {
        let response = service()
            .handle(RpcRequest::EnrollToRetake(RetakeEnrolment {
                email: "a@x.com".into(),
                retake_id: 99,
                kind: Some("retake".into()),
                date: Some("10-02-2025".into()),
            }))
            .await
            .unwrap();

        assert!(!response.is_success());
        assert!(response.message.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_enroll_requires_type_and_valid_date() {
        let service = service();
        let missing = RpcRequest::EnrollToExam(ExamEnrolment {
            email: "a@x.com".into(),
            exam_id: 1,
            kind: None,
            date: Some("20-01-2025".into()),
        });
        assert_eq!(
            service.handle(missing).await.unwrap().message.as_deref(),
            Some(MISSING_ENROLMENT_FIELDS)
        );

        let bad_date = RpcRequest::EnrollToExam(ExamEnrolment {
            email: "a@x.com".into(),
            exam_id: 1,
            kind: Some("exam".into()),
            date: Some("2025-01-20".into()),
        });
        let response = service.handle(bad_date).await.unwrap();
        assert!(response.message.unwrap().starts_with("Invalid date"));
    }
}
