//! Route table: request queue name → handler.
//!
//! Populated once at startup and then frozen inside the dispatcher.

use crate::error::RouteError;
use crate::handler::Handler;
use shared_types::queues;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[derive(Default, Clone)]
pub struct HandlerRegistry {
    routes: BTreeMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `queue`.
    ///
    /// The queue must be one of the known request queues and must not be
    /// bound already.
    pub fn register(
        &mut self,
        queue: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Result<(), RouteError> {
        let queue = queue.into();
        if !queues::is_request_queue(&queue) {
            return Err(RouteError::UnknownQueue(queue));
        }
        if self.routes.contains_key(&queue) {
            return Err(RouteError::Duplicate(queue));
        }
        self.routes.insert(queue, handler);
        Ok(())
    }

    /// Builder-style [`Self::register`].
    pub fn with(
        mut self,
        queue: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Result<Self, RouteError> {
        self.register(queue, handler)?;
        Ok(self)
    }

    pub fn get(&self, queue: &str) -> Option<&Arc<dyn Handler>> {
        self.routes.get(queue)
    }

    /// Bound queues in name order.
    pub fn queues(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.routes.keys()).finish()
    }
}
