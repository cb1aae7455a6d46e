//! CORS (Cross-Origin Resource Sharing) middleware

use super::{HttpRequest, HttpResponse, Middleware, Next, RequestContext};
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderValue};
use http::{Method, Response, StatusCode};
use http_body_util::Full;

/// CORS middleware configuration
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Allowed origins (use "*" for all)
    pub allowed_origins: Vec<String>,
    /// Allowed HTTP methods
    pub allowed_methods: Vec<String>,
    /// Allowed headers
    pub allowed_headers: Vec<String>,
    /// Headers to expose to the client
    pub expose_headers: Vec<String>,
}

impl CorsConfig {
    /// Allow everything from everywhere
    pub fn permissive() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allowed_headers: vec!["*".to_string()],
            expose_headers: vec!["*".to_string()],
        }
    }
}

/// CORS middleware. Adds the configured headers to every response and
/// answers `OPTIONS` directly with 200.
pub struct CorsMiddleware {
    headers: HeaderMap,
}

impl CorsMiddleware {
    pub fn new(config: CorsConfig) -> Self {
        let mut headers = HeaderMap::new();
        let entries = [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, config.allowed_origins),
            (header::ACCESS_CONTROL_ALLOW_METHODS, config.allowed_methods),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, config.allowed_headers),
            (header::ACCESS_CONTROL_EXPOSE_HEADERS, config.expose_headers),
        ];
        for (name, values) in entries {
            if values.is_empty() {
                continue;
            }
            if let Ok(value) = HeaderValue::from_str(&values.join(", ")) {
                headers.insert(name, value);
            }
        }
        Self { headers }
    }

    fn add_cors_headers(&self, response: &mut HttpResponse) {
        for (name, value) in &self.headers {
            response.headers_mut().insert(name.clone(), value.clone());
        }
    }
}

#[async_trait]
impl Middleware for CorsMiddleware {
    async fn process(
        &self,
        request: HttpRequest,
        ctx: RequestContext,
        next: &dyn Next,
    ) -> Result<HttpResponse> {
        if request.method() == Method::OPTIONS {
            let mut response = Response::new(Full::new(Bytes::new()));
            *response.status_mut() = StatusCode::OK;
            self.add_cors_headers(&mut response);
            return Ok(response);
        }

        let mut response = next.run(request, ctx).await?;
        self.add_cors_headers(&mut response);
        Ok(response)
    }

    fn name(&self) -> &'static str {
        "cors"
    }
}
