//! # Route Wiring
//!
//! Binds the worker services to their request queues.
//!
//! | Worker  | Queues |
//! |---------|--------|
//! | auth    | `registration_queue`, `authorization_queue` |
//! | decanat | exams, retakes, enrolment listings, enroll and cancel queues |

use crate::adapters::{StudyOffice, UserDirectory};
use crate::handlers::{AuthService, DecanatService};
use rpc_worker::{Handler, HandlerRegistry, RouteError};
use shared_types::queues::{AUTH_QUEUES, DECANAT_QUEUES};
use std::sync::Arc;

pub fn auth_routes(users: Arc<dyn UserDirectory>) -> Result<HandlerRegistry, RouteError> {
    bind(&AUTH_QUEUES, Arc::new(AuthService::new(users)))
}

pub fn decanat_routes(office: Arc<dyn StudyOffice>) -> Result<HandlerRegistry, RouteError> {
    bind(&DECANAT_QUEUES, Arc::new(DecanatService::new(office)))
}

fn bind(queues: &[&str], service: Arc<dyn Handler>) -> Result<HandlerRegistry, RouteError> {
    let mut routes = HandlerRegistry::new();
    for queue in queues {
        routes.register(*queue, Arc::clone(&service))?;
    }
    Ok(routes)
}
