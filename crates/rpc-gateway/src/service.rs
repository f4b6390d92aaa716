//! Gateway service - the upstream boundary.
//!
//! One method per HTTP endpoint of the public API. Each translates its
//! arguments 1:1 into an [`RpcRequest`], issues the call and maps the
//! outcome onto an HTTP status:
//!
//! | Outcome              | Status |
//! |----------------------|--------|
//! | `status = success`   | 200    |
//! | `status = failed`    | 400    |
//! | timeout              | 504    |
//! | transport / protocol | 500    |

use crate::domain::error::CallError;
use crate::domain::registry::{CallOutcome, CallState};
use crate::ipc::client::RpcClient;
use serde::Serialize;
use serde_json::{json, Value};
use shared_types::{
    Credentials, EnrolmentQuery, ExamCancellation, ExamEnrolment, Payload, RegistrationRequest,
    RetakeCancellation, RetakeEnrolment, RpcRequest,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Status code and JSON body for the HTTP layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayReply {
    pub status_code: u16,
    pub body: Value,
}

impl GatewayReply {
    /// Map a call outcome onto an HTTP reply.
    pub fn from_outcome(outcome: CallOutcome) -> Self {
        match outcome {
            Ok(response) => {
                let status_code = if response.is_success() { 200 } else { 400 };
                let body = serde_json::to_value(&response).unwrap_or_else(|e| {
                    json!({"status": "failed", "message": format!("unencodable response: {e}")})
                });
                Self { status_code, body }
            }
            Err(error) => Self::error(error.status_code(), &error),
        }
    }

    fn error(status_code: u16, error: &dyn std::fmt::Display) -> Self {
        Self {
            status_code,
            body: json!({"status": "failed", "message": error.to_string()}),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Upstream facade over an [`RpcClient`].
#[derive(Clone)]
pub struct GatewayService {
    client: Arc<RpcClient>,
    timeout: Option<Duration>,
}

impl GatewayService {
    pub fn new(client: Arc<RpcClient>) -> Self {
        Self {
            client,
            timeout: None,
        }
    }

    /// Override the client's default call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn client(&self) -> &Arc<RpcClient> {
        &self.client
    }

    /// Issue any typed request.
    pub async fn dispatch(&self, request: RpcRequest) -> GatewayReply {
        let queue = request.queue();
        let outcome = self.client.request(&request, self.timeout).await;
        let state = CallState::of(&outcome);
        if let Err(e) = &outcome {
            warn!(queue = %queue, ?state, error = %e, "Call did not complete");
        }
        let reply = GatewayReply::from_outcome(outcome);
        info!(queue = %queue, ?state, status = reply.status_code, "Request served");
        reply
    }

    /// Forward a raw JSON body to `queue`, validating its shape first.
    ///
    /// A body that does not fit the queue is answered with 400 without
    /// reaching the broker.
    pub async fn forward(&self, queue: &str, body: &Payload) -> GatewayReply {
        match RpcRequest::decode(queue, body) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => {
                warn!(queue = %queue, error = %e, "Rejected request body");
                let error = CallError::Protocol(e);
                GatewayReply::error(400, &error)
            }
        }
    }

    pub async fn register(
        &self,
        name: Option<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> GatewayReply {
        self.dispatch(RpcRequest::Registration(RegistrationRequest {
            name,
            email: email.into(),
            password: password.into(),
        }))
        .await
    }

    pub async fn authorize(
        &self,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> GatewayReply {
        self.dispatch(RpcRequest::Authorization(Credentials {
            email: email.into(),
            password: password.into(),
        }))
        .await
    }

    pub async fn list_exams(&self) -> GatewayReply {
        self.dispatch(RpcRequest::ListExams).await
    }

    pub async fn list_retakes(&self) -> GatewayReply {
        self.dispatch(RpcRequest::ListRetakes).await
    }

    pub async fn exam_enrolments(&self, email: impl Into<String>) -> GatewayReply {
        self.dispatch(RpcRequest::ExamEnrolments(EnrolmentQuery {
            email: email.into(),
        }))
        .await
    }

    pub async fn retake_enrolments(&self, email: impl Into<String>) -> GatewayReply {
        self.dispatch(RpcRequest::RetakeEnrolments(EnrolmentQuery {
            email: email.into(),
        }))
        .await
    }

    pub async fn enroll_to_exam(&self, enrolment: ExamEnrolment) -> GatewayReply {
        self.dispatch(RpcRequest::EnrollToExam(enrolment)).await
    }

    pub async fn enroll_to_retake(&self, enrolment: RetakeEnrolment) -> GatewayReply {
        self.dispatch(RpcRequest::EnrollToRetake(enrolment)).await
    }

    pub async fn cancel_exam(&self, email: impl Into<String>, exam_id: i64) -> GatewayReply {
        self.dispatch(RpcRequest::CancelExam(ExamCancellation {
            email: email.into(),
            exam_id,
        }))
        .await
    }

    pub async fn cancel_retake(&self, email: impl Into<String>, retake_id: i64) -> GatewayReply {
        self.dispatch(RpcRequest::CancelRetake(RetakeCancellation {
            email: email.into(),
            retake_id,
        }))
        .await
    }
}
