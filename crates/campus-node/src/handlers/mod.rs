//! # Worker Services
//!
//! Business handlers bound to the request queues:
//!
//! - `AuthService` - `registration_queue`, `authorization_queue`
//! - `DecanatService` - exams and retakes: listings, enrolments, cancellations

pub mod auth;
pub mod decanat;

pub use auth::AuthService;
pub use decanat::DecanatService;

use crate::adapters::StoreError;
use rpc_worker::HandlerError;
use shared_types::RpcResponse;

/// Business refusals become `failed` replies; storage outages become
/// handler errors.
pub(crate) fn refusal(error: StoreError) -> Result<RpcResponse, HandlerError> {
    match error {
        StoreError::NotFound(message) | StoreError::AlreadyExists(message) => {
            Ok(RpcResponse::failed(message))
        }
        StoreError::Unavailable(reason) => Err(HandlerError::Backend(reason)),
    }
}
