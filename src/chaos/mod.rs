//! Fault injection
//!
//! Decides whether a request is answered with a simulated failure instead of
//! the normal echo. Three controls are checked in order:
//! - forced status (`X-Echo-Status`)
//! - forced error keyword (`X-Echo-Error`)
//! - chaos rate (`X-Echo-Chaos`), one Bernoulli trial per request
//!
//! Every injected response is counted in `echo_chaos_errors_total{type}`.

use crate::directive::ResolvedDirectives;
use crate::middleware::{HttpRequest, HttpResponse, RequestContext};
use crate::observability::Metrics;
use crate::render::{echoed_body, text_response};
use crate::rng::{choose, RandomSource};
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use http::{Response, StatusCode};
use http_body_util::Full;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// How long the `timeout` error stalls before giving up on the request
pub const TIMEOUT_STALL: Duration = Duration::from_secs(65);

/// Statuses drawn by the `random` error keyword
pub const RANDOM_ERROR_STATUSES: [u16; 5] = [500, 502, 503, 504, 429];

/// Statuses drawn by a chaos hit
pub const CHAOS_STATUSES: [u16; 6] = [500, 502, 503, 504, 408, 429];

/// Kind of injected fault, used as the counter label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    Status,
    Timeout,
    Internal,
    BadGateway,
    Unavailable,
    GatewayTimeout,
    RateLimit,
    Random,
    Chaos,
}

impl FaultKind {
    pub fn label(&self) -> &'static str {
        match self {
            FaultKind::Status => "status",
            FaultKind::Timeout => "timeout",
            FaultKind::Internal => "internal",
            FaultKind::BadGateway => "bad_gateway",
            FaultKind::Unavailable => "unavailable",
            FaultKind::GatewayTimeout => "gateway_timeout",
            FaultKind::RateLimit => "rate_limit",
            FaultKind::Random => "random",
            FaultKind::Chaos => "chaos",
        }
    }
}

/// A decided fault, before it is turned into a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Respond with this status and the echoed body
    ForcedStatus(StatusCode),
    /// Stall, then end the request without a body
    Stall(Duration),
    /// Fixed plain-text error
    Simulated {
        kind: FaultKind,
        status: StatusCode,
        body: String,
    },
}

impl Fault {
    pub fn kind(&self) -> FaultKind {
        match self {
            Fault::ForcedStatus(_) => FaultKind::Status,
            Fault::Stall(_) => FaultKind::Timeout,
            Fault::Simulated { kind, .. } => *kind,
        }
    }

    fn simulated(kind: FaultKind, status: u16, body: impl Into<String>) -> Self {
        Fault::Simulated {
            kind,
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body: body.into(),
        }
    }
}

/// Parse a forced status in `[100, 599]`
pub fn parse_forced_status(value: &str) -> Option<StatusCode> {
    let code: u16 = value.trim().parse().ok()?;
    if (100..=599).contains(&code) {
        StatusCode::from_u16(code).ok()
    } else {
        None
    }
}

/// Parse a chaos rate in `(0, 100]`
pub fn parse_chaos_rate(value: &str) -> Option<u64> {
    let rate: u64 = value.trim().parse().ok()?;
    (1..=100).contains(&rate).then_some(rate)
}

/// Decides and renders injected faults
pub struct FaultInjector {
    rng: Arc<dyn RandomSource>,
    metrics: Arc<Metrics>,
}

impl FaultInjector {
    pub fn new(rng: Arc<dyn RandomSource>, metrics: Arc<Metrics>) -> Self {
        Self { rng, metrics }
    }

    /// Decide which fault, if any, applies to this request
    pub fn decide(&self, directives: &ResolvedDirectives) -> Option<Fault> {
        if let Some(status) = parse_forced_status(&directives.status) {
            return Some(Fault::ForcedStatus(status));
        }

        if let Some(fault) = self.error_keyword(&directives.error) {
            return Some(fault);
        }

        let rate = parse_chaos_rate(&directives.chaos)?;
        if self.rng.below(100) < rate {
            let status = choose(self.rng.as_ref(), &CHAOS_STATUSES)?;
            return Some(Fault::simulated(
                FaultKind::Chaos,
                status,
                format!("Chaos error injection: {}", status),
            ));
        }
        None
    }

    fn error_keyword(&self, value: &str) -> Option<Fault> {
        let fault = match value.trim().to_ascii_lowercase().as_str() {
            "timeout" => Fault::Stall(TIMEOUT_STALL),
            "500" | "internal" => {
                Fault::simulated(FaultKind::Internal, 500, "Simulated internal server error")
            }
            "502" | "bad-gateway" => {
                Fault::simulated(FaultKind::BadGateway, 502, "Simulated bad gateway")
            }
            "503" | "unavailable" => {
                Fault::simulated(FaultKind::Unavailable, 503, "Simulated service unavailable")
            }
            "504" | "gateway-timeout" => {
                Fault::simulated(FaultKind::GatewayTimeout, 504, "Simulated gateway timeout")
            }
            "429" | "rate-limit" => {
                Fault::simulated(FaultKind::RateLimit, 429, "Simulated rate limit exceeded")
            }
            "random" => {
                let status = choose(self.rng.as_ref(), &RANDOM_ERROR_STATUSES)?;
                Fault::simulated(
                    FaultKind::Random,
                    status,
                    format!("Random simulated error: {}", status),
                )
            }
            _ => return None,
        };
        Some(fault)
    }

    /// Decide, count and render a fault. `None` lets the pipeline continue.
    pub async fn intercept(
        &self,
        directives: &ResolvedDirectives,
        request: &HttpRequest,
        ctx: &RequestContext,
    ) -> Option<HttpResponse> {
        let fault = self.decide(directives)?;
        let kind = fault.kind();
        warn!(
            request_id = %ctx.request_id,
            kind = kind.label(),
            path = %request.uri().path(),
            "Injecting fault"
        );

        let response = match fault {
            Fault::ForcedStatus(status) => {
                let (body, content_type) = echoed_body(request, ctx);
                let mut response = Response::new(Full::new(body));
                *response.status_mut() = status;
                let headers = response.headers_mut();
                headers.insert("x-echo-status-forced", HeaderValue::from_static("true"));
                headers.insert(CONTENT_TYPE, content_type);
                response
            }
            Fault::Stall(duration) => {
                tokio::time::sleep(duration).await;
                Response::new(Full::new(Bytes::new()))
            }
            Fault::Simulated { kind, status, body } => {
                let mut response = text_response(status, body);
                if kind == FaultKind::RateLimit {
                    response
                        .headers_mut()
                        .insert(RETRY_AFTER, HeaderValue::from_static("60"));
                }
                response
            }
        };

        self.metrics.record_injection(kind.label());
        Some(response)
    }
}
