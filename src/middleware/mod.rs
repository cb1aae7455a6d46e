//! Middleware module for request/response processing
//!
//! Every request passes through, in order:
//! - Access logging and request metrics
//! - CORS (when enabled)
//! - Request ID assignment
//! - Global rate limiting (when configured)
//!
//! before reaching the router.

mod access_log;
mod chain;
mod cors;
mod rate_limit;
mod request_id;

pub use access_log::AccessLogMiddleware;
pub use chain::*;
pub use cors::{CorsConfig, CorsMiddleware};
pub use rate_limit::RateLimiter;
pub use request_id::{RequestIdGenerator, RequestIdMiddleware, X_REQUEST_ID};

use crate::config::Config;
use crate::error::Result;
use crate::observability::Metrics;
use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Full;
use std::sync::Arc;

/// Type alias for the response body type
pub type BoxBody = Full<Bytes>;

/// HTTP request with its body already buffered
pub type HttpRequest = Request<Bytes>;

/// Type alias for HTTP response with our body type
pub type HttpResponse = Response<BoxBody>;

/// Context passed through the middleware chain
#[derive(Clone, Debug)]
pub struct RequestContext {
    /// Request ID, assigned by [`RequestIdMiddleware`]
    pub request_id: String,
    /// Peer address of the connection, if any
    pub client_ip: Option<String>,
    /// Start time of the request
    pub start_time: std::time::Instant,
}

impl RequestContext {
    /// Create a new request context
    pub fn new() -> Self {
        Self {
            request_id: String::new(),
            client_ip: None,
            start_time: std::time::Instant::now(),
        }
    }

    /// Create context with client IP
    pub fn with_client_ip(mut self, ip: String) -> Self {
        self.client_ip = Some(ip);
        self
    }

    /// Get elapsed time since request start
    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// The next handler in the middleware chain
#[async_trait]
pub trait Next: Send + Sync {
    /// Call the next handler
    async fn run(&self, request: HttpRequest, ctx: RequestContext) -> Result<HttpResponse>;
}

/// Middleware trait for processing requests and responses
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Process a request, optionally calling the next handler
    async fn process(
        &self,
        request: HttpRequest,
        ctx: RequestContext,
        next: &dyn Next,
    ) -> Result<HttpResponse>;

    /// Get the name of this middleware for logging
    fn name(&self) -> &'static str;
}

/// Create the middleware stack from configuration
pub fn create_middleware(config: &Config, metrics: Arc<Metrics>) -> Vec<Arc<dyn Middleware>> {
    let mut middlewares: Vec<Arc<dyn Middleware>> = Vec::new();

    // Logging wraps everything so rejected requests are logged and counted too
    middlewares.push(Arc::new(AccessLogMiddleware::new(
        config.logging.clone(),
        metrics.clone(),
    )));

    if config.server.enable_cors {
        middlewares.push(Arc::new(CorsMiddleware::new(CorsConfig::permissive())));
    }

    middlewares.push(Arc::new(RequestIdMiddleware::new()));

    if let Some(limiter) = RateLimiter::from_config(&config.rate_limit, metrics) {
        middlewares.push(Arc::new(limiter));
    }

    middlewares
}
