//! Middleware chain implementation

use super::{HttpRequest, HttpResponse, Middleware, Next, RequestContext};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// A chain of middleware that processes requests in order
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
    handler: Arc<dyn Handler>,
}

/// The final handler that processes the request after all middleware
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle the request
    async fn handle(&self, request: HttpRequest, ctx: RequestContext) -> Result<HttpResponse>;
}

impl MiddlewareChain {
    /// Create a new middleware chain
    pub fn new(middlewares: Vec<Arc<dyn Middleware>>, handler: Arc<dyn Handler>) -> Self {
        Self {
            middlewares,
            handler,
        }
    }

    /// Execute the middleware chain
    pub async fn execute(&self, request: HttpRequest, ctx: RequestContext) -> Result<HttpResponse> {
        if self.middlewares.is_empty() {
            return self.handler.handle(request, ctx).await;
        }

        let executor = ChainExecutor {
            middlewares: &self.middlewares,
            handler: &self.handler,
            current: 0,
        };

        executor.run(request, ctx).await
    }
}

/// Internal executor for the middleware chain
struct ChainExecutor<'a> {
    middlewares: &'a [Arc<dyn Middleware>],
    handler: &'a Arc<dyn Handler>,
    current: usize,
}

#[async_trait]
impl<'a> Next for ChainExecutor<'a> {
    async fn run(&self, request: HttpRequest, ctx: RequestContext) -> Result<HttpResponse> {
        if self.current >= self.middlewares.len() {
            return self.handler.handle(request, ctx).await;
        }

        let middleware = &self.middlewares[self.current];
        let next = ChainExecutor {
            middlewares: self.middlewares,
            handler: self.handler,
            current: self.current + 1,
        };

        middleware.process(request, ctx, &next).await
    }
}
