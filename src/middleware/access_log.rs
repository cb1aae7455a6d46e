//! Request/response logging and request metrics

use super::{HttpRequest, HttpResponse, Middleware, Next, RequestContext};
use crate::config::LoggingConfig;
use crate::error::Result;
use crate::observability::{format_headers, truncate_body, AccessLogEntry, Metrics};
use crate::render::client_ip;
use async_trait::async_trait;
use http::header::USER_AGENT;
use http_body_util::{BodyExt, Full};
use std::sync::Arc;
use tracing::info;

/// Outermost middleware: logs what the config asks for and records
/// `echo_requests_total` / `echo_request_duration_seconds`.
pub struct AccessLogMiddleware {
    config: LoggingConfig,
    metrics: Arc<Metrics>,
}

impl AccessLogMiddleware {
    pub fn new(config: LoggingConfig, metrics: Arc<Metrics>) -> Self {
        Self { config, metrics }
    }

    fn log_request(&self, request: &HttpRequest, client: &str) {
        let cfg = &self.config;
        if cfg.log_transaction {
            return;
        }
        if cfg.log_requests {
            info!(
                method = %request.method(),
                path = %request.uri().path(),
                client_ip = %client,
                "Request received"
            );
        }
        if cfg.log_headers {
            info!(headers = %format_headers(request.headers()), "Request headers");
        }
        if cfg.log_body && !request.body().is_empty() {
            info!(
                body = %truncate_body(request.body(), cfg.max_log_body_size),
                "Request body"
            );
        }
    }
}

#[async_trait]
impl Middleware for AccessLogMiddleware {
    async fn process(
        &self,
        request: HttpRequest,
        ctx: RequestContext,
        next: &dyn Next,
    ) -> Result<HttpResponse> {
        let start = ctx.start_time;
        let client = client_ip(request.headers(), &ctx);
        let method = request.method().to_string();
        let path = request.uri().path().to_string();
        let user_agent = request
            .headers()
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        self.log_request(&request, &client);

        // Keep a copy for the transaction block, which is written after the
        // response is known.
        let transaction_request = self
            .config
            .log_transaction
            .then(|| (request.headers().clone(), request.body().clone()));

        let response = next.run(request, ctx).await?;
        let elapsed = start.elapsed();

        let (parts, body) = response.into_parts();
        let body = body.collect().await.map(|c| c.to_bytes()).unwrap_or_default();
        let request_id = parts
            .headers
            .get(super::X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let cfg = &self.config;
        let limit = cfg.max_log_body_size;
        if let Some((req_headers, req_body)) = transaction_request {
            info!(
                request_id = %request_id,
                method = %method,
                path = %path,
                client_ip = %client,
                request_headers = %format_headers(&req_headers),
                request_body = %truncate_body(&req_body, limit),
                status = parts.status.as_u16(),
                response_headers = %format_headers(&parts.headers),
                response_body = %truncate_body(&body, limit),
                duration_ms = elapsed.as_millis() as u64,
                "Transaction"
            );
        } else {
            if cfg.log_response {
                info!(
                    request_id = %request_id,
                    status = parts.status.as_u16(),
                    size = body.len(),
                    "Response sent"
                );
            }
            if cfg.log_response_headers {
                info!(headers = %format_headers(&parts.headers), "Response headers");
            }
            if cfg.log_response_body && !body.is_empty() {
                info!(body = %truncate_body(&body, limit), "Response body");
            }
        }

        if cfg.log_requests {
            let mut entry = AccessLogEntry::new(request_id, client);
            entry.method = method.clone();
            entry.path = path.clone();
            entry.status = parts.status.as_u16();
            entry.response_size = body.len() as u64;
            entry.duration_ms = elapsed.as_millis() as u64;
            entry.user_agent = user_agent;
            entry.log_structured();
        }

        self.metrics
            .record_request(&method, &path, parts.status.as_u16(), elapsed);

        Ok(HttpResponse::from_parts(parts, Full::new(body)))
    }

    fn name(&self) -> &'static str {
        "access_log"
    }
}
