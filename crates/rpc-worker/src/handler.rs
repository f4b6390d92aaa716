//! Business handlers bound to request queues.

use crate::error::HandlerError;
use async_trait::async_trait;
use shared_types::{RpcRequest, RpcResponse};
use std::future::Future;
use std::sync::Arc;

/// A business function answering one kind of request.
///
/// Handlers return `Ok` with a `failed` response for expected refusals and
/// `Err` for everything else; both reach the caller as `status = failed`.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, request: RpcRequest) -> Result<RpcResponse, HandlerError>;
}

/// Adapter turning an async closure into a [`Handler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(RpcRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<RpcResponse, HandlerError>> + Send + 'static,
{
    async fn handle(&self, request: RpcRequest) -> Result<RpcResponse, HandlerError> {
        (self.0)(request).await
    }
}

/// Wrap an async closure as a shareable handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(RpcRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<RpcResponse, HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}
