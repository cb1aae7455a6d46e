//! Request ID middleware
//!
//! Keeps a client-supplied `X-Request-ID` or generates one, writes it onto
//! the request before anything records it, and echoes it on every response.

use super::{HttpRequest, HttpResponse, Middleware, Next, RequestContext};
use crate::error::Result;
use async_trait::async_trait;
use http::header::HeaderName;
use http::HeaderValue;
use tracing::debug;

/// Request ID header name
pub const X_REQUEST_ID: &str = "x-request-id";

/// Request ID generator
#[derive(Debug, Default)]
pub struct RequestIdGenerator;

impl RequestIdGenerator {
    /// 16 lowercase hex characters from 8 random bytes
    pub fn generate(&self) -> String {
        format!("{:016x}", rand::random::<u64>())
    }
}

/// Request ID middleware
pub struct RequestIdMiddleware {
    generator: RequestIdGenerator,
    header_name: HeaderName,
}

impl RequestIdMiddleware {
    pub fn new() -> Self {
        Self {
            generator: RequestIdGenerator,
            header_name: HeaderName::from_static(X_REQUEST_ID),
        }
    }

    /// Extract or generate request ID from request
    fn get_or_generate_id(&self, request: &HttpRequest) -> String {
        if let Some(value) = request.headers().get(&self.header_name) {
            if let Ok(id) = value.to_str() {
                if !id.is_empty() {
                    debug!("Using existing request ID: {}", id);
                    return id.to_string();
                }
            }
        }

        let id = self.generator.generate();
        debug!("Generated new request ID: {}", id);
        id
    }
}

impl Default for RequestIdMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for RequestIdMiddleware {
    async fn process(
        &self,
        mut request: HttpRequest,
        mut ctx: RequestContext,
        next: &dyn Next,
    ) -> Result<HttpResponse> {
        let request_id = self.get_or_generate_id(&request);
        ctx.request_id = request_id.clone();

        let value = HeaderValue::from_str(&request_id).ok();
        if let Some(value) = &value {
            request
                .headers_mut()
                .insert(self.header_name.clone(), value.clone());
        }

        let mut response = next.run(request, ctx).await?;

        if let Some(value) = value {
            response.headers_mut().insert(self.header_name.clone(), value);
        }

        Ok(response)
    }

    fn name(&self) -> &'static str {
        "request_id"
    }
}
