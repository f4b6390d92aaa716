//! # Auth Service
//!
//! Registration and login against the user directory.

use super::refusal;
use crate::adapters::{StoreError, User, UserDirectory};
use async_trait::async_trait;
use rpc_worker::{Handler, HandlerError};
use shared_types::{Credentials, RegistrationRequest, RpcRequest, RpcResponse};
use std::sync::Arc;
use tracing::{debug, info};

pub const REGISTERED: &str = "Registration successful";
pub const ALREADY_REGISTERED: &str = "A user with this email is already registered";
pub const AUTHORIZED: &str = "Authorization successful";
pub const UNKNOWN_USER: &str = "No user with this email was found";
pub const MISSING_FIELDS: &str = "Required fields are missing";

pub struct AuthService {
    users: Arc<dyn UserDirectory>,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserDirectory>) -> Self {
        Self { users }
    }

    async fn register(&self, request: RegistrationRequest) -> Result<RpcResponse, HandlerError> {
        if request.password.is_empty() {
            return Ok(RpcResponse::failed(MISSING_FIELDS));
        }

        let known = self
            .users
            .find(&request.email)
            .await
            .map_err(|e| HandlerError::Backend(e.to_string()))?;
        if known.is_some() {
            debug!(email = %request.email, "Registration refused: email taken");
            return Ok(RpcResponse::failed(ALREADY_REGISTERED));
        }

        let user = User {
            name: request.name,
            email: request.email,
        };
        let email = user.email.clone();
        match self.users.insert(user).await {
            Ok(()) => {
                info!(email = %email, "User registered");
                Ok(RpcResponse::success().with_message(REGISTERED))
            }
            // Lost a race with a concurrent registration.
            Err(StoreError::AlreadyExists(_)) => {
                Ok(RpcResponse::failed(ALREADY_REGISTERED))
            }
            Err(e) => refusal(e),
        }
    }

    async fn authorize(&self, credentials: Credentials) -> Result<RpcResponse, HandlerError> {
        if credentials.password.is_empty() {
            return Ok(RpcResponse::failed(MISSING_FIELDS));
        }

        match self.users.find(&credentials.email).await {
            Ok(Some(_)) => Ok(RpcResponse::success().with_message(AUTHORIZED)),
            Ok(None) => {
                debug!(email = %credentials.email, "Authorization refused: unknown email");
                Ok(RpcResponse::failed(UNKNOWN_USER))
            }
            Err(e) => refusal(e),
        }
    }
}

#[async_trait]
impl Handler for AuthService {
    async fn handle(&self, request: RpcRequest) -> Result<RpcResponse, HandlerError> {
        match request {
            RpcRequest::Registration(request) => self.register(request).await,
            RpcRequest::Authorization(credentials) => self.authorize(credentials).await,
            other => Err(HandlerError::Internal(format!(
                "auth service cannot answer {}",
                other.queue()
            ))),
        }
    }
}
