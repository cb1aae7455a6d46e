//! Control endpoints and request routing
//!
//! Provides endpoints for:
//! - Health, readiness and server info
//! - Request history and replay
//! - Scenario management
//! - Directive defaults
//! - Prometheus metrics
//!
//! Every other path goes to the echo pipeline.

use crate::error::{MirageError, Result};
use crate::middleware::{Handler, HttpRequest, HttpResponse, RequestContext, X_REQUEST_ID};
use crate::pipeline::EchoPipeline;
use crate::render::{
    client_ip, error_response, format_uptime, json_response, text_response, SERVER_VERSION,
};
use crate::replay::{LocalResponder, ReplayRequest};
use crate::scenario;
use crate::state::AppState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::header::{HeaderValue, ALLOW, CONTENT_TYPE, USER_AGENT};
use http::{Method, StatusCode};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tracing::{info, warn};

/// Admin paths and the methods each accepts
const ENDPOINTS: &[(&str, &[Method])] = &[
    ("/health", &[Method::GET]),
    ("/ready", &[Method::GET]),
    ("/info", &[Method::GET]),
    ("/history", &[Method::GET]),
    ("/replay", &[Method::POST]),
    ("/scenario", &[Method::GET, Method::POST]),
    ("/defaults", &[Method::GET, Method::POST]),
    ("/metrics", &[Method::GET]),
];

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
    uptime: String,
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<usize>,
}

#[derive(Serialize)]
struct InfoResponse {
    timestamp: DateTime<Utc>,
    method: String,
    url: String,
    path: String,
    query: BTreeMap<String, Vec<String>>,
    headers: BTreeMap<String, Vec<String>>,
    body_size: usize,
    remote_addr: String,
    user_agent: String,
    content_type: String,
    protocol: &'static str,
    tls: bool,
    request_id: String,
    server: ServerInfo,
}

#[derive(Serialize)]
struct ServerInfo {
    hostname: String,
    version: &'static str,
    platform: String,
    start_time: DateTime<Utc>,
    uptime: String,
    request_count: u64,
}

/// Terminal handler of the middleware chain
pub struct AdminRouter {
    state: Arc<AppState>,
    pipeline: EchoPipeline,
    /// The full server, used for self-replay
    local: Weak<dyn LocalResponder>,
}

impl AdminRouter {
    pub fn new(state: Arc<AppState>, local: Weak<dyn LocalResponder>) -> Self {
        Self {
            pipeline: EchoPipeline::new(state.clone()),
            state,
            local,
        }
    }

    async fn route(&self, request: HttpRequest, ctx: RequestContext) -> Result<HttpResponse> {
        let path = request.uri().path();
        let Some((_, methods)) = ENDPOINTS.iter().find(|(p, _)| *p == path) else {
            return Ok(self.pipeline.handle(request, ctx).await);
        };
        if !methods.contains(request.method()) {
            return Ok(method_not_allowed(methods));
        }

        match (request.method(), path) {
            (&Method::GET, "/health") => Ok(self.handle_health()),
            (&Method::GET, "/ready") => Ok(json_response(
                StatusCode::OK,
                &StatusResponse {
                    status: "ready",
                    count: None,
                },
            )),
            (&Method::GET, "/info") => Ok(self.handle_info(&request, &ctx)),
            (&Method::GET, "/history") => Ok(json_response(StatusCode::OK, &self.state.history.list())),
            (&Method::POST, "/replay") => self.handle_replay(&request).await,
            (&Method::GET, "/scenario") => {
                Ok(json_response(StatusCode::OK, &self.state.scenarios.list()))
            }
            (&Method::POST, "/scenario") => self.handle_scenario_update(&request),
            (&Method::GET, "/defaults") => {
                Ok(json_response(StatusCode::OK, &self.state.defaults.snapshot()))
            }
            (&Method::POST, "/defaults") => self.handle_defaults_update(&request),
            (&Method::GET, "/metrics") => self.handle_metrics(),
            _ => Ok(method_not_allowed(methods)),
        }
    }

    fn handle_health(&self) -> HttpResponse {
        json_response(
            StatusCode::OK,
            &HealthResponse {
                status: "healthy",
                timestamp: Utc::now(),
                uptime: format_uptime(self.state.identity.uptime()),
            },
        )
    }

    fn handle_info(&self, request: &HttpRequest, ctx: &RequestContext) -> HttpResponse {
        let headers = request.headers();
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };

        let mut header_map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in headers {
            header_map
                .entry(name.as_str().to_string())
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
        }

        let identity = &self.state.identity;
        let info = InfoResponse {
            timestamp: Utc::now(),
            method: request.method().to_string(),
            url: request
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| "/".to_string()),
            path: request.uri().path().to_string(),
            query: parse_query(request.uri().query().unwrap_or_default()),
            headers: header_map,
            body_size: request.body().len(),
            remote_addr: client_ip(headers, ctx),
            user_agent: header(USER_AGENT.as_str()),
            content_type: header(CONTENT_TYPE.as_str()),
            protocol: "HTTP/1.1",
            tls: false,
            request_id: header(X_REQUEST_ID),
            server: ServerInfo {
                hostname: identity.hostname.clone(),
                version: SERVER_VERSION,
                platform: format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
                start_time: identity.started_at,
                uptime: format_uptime(identity.uptime()),
                request_count: self.state.request_count(),
            },
        };
        json_response(StatusCode::OK, &info)
    }

    async fn handle_replay(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let replay: ReplayRequest = serde_json::from_slice(request.body())
            .map_err(|_| MirageError::InvalidRequest("Invalid request body".to_string()))?;

        let record = self
            .state
            .history
            .find(&replay.id)
            .ok_or_else(|| MirageError::NotFound("Request ID not found".to_string()))?;

        let local = self
            .local
            .upgrade()
            .ok_or_else(|| MirageError::Replay("server is shutting down".to_string()))?;

        info!(id = %replay.id, target = replay.target().unwrap_or("self"), "Replaying request");
        self.state
            .replayer
            .replay(&record, replay.target(), local.as_ref())
            .await
    }

    fn handle_scenario_update(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let content_type = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        let definitions = scenario::parse_definitions(request.body(), content_type)?;
        let count = self.state.scenarios.install(definitions)?;
        Ok(json_response(
            StatusCode::OK,
            &StatusResponse {
                status: "scenarios updated",
                count: Some(count),
            },
        ))
    }

    fn handle_defaults_update(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let values: BTreeMap<String, String> = serde_json::from_slice(request.body())
            .map_err(|e| MirageError::InvalidRequest(format!("Invalid defaults: {}", e)))?;
        let count = self.state.defaults.replace(values)?;
        info!("Replaced {} directive default(s)", count);
        Ok(json_response(
            StatusCode::OK,
            &StatusResponse {
                status: "defaults updated",
                count: Some(count),
            },
        ))
    }

    fn handle_metrics(&self) -> Result<HttpResponse> {
        let body = self.state.metrics.export()?;
        let mut response = text_response(StatusCode::OK, body);
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4"),
        );
        Ok(response)
    }
}

#[async_trait]
impl Handler for AdminRouter {
    async fn handle(&self, request: HttpRequest, ctx: RequestContext) -> Result<HttpResponse> {
        let request_id = ctx.request_id.clone();
        match self.route(request, ctx).await {
            Ok(response) => Ok(response),
            Err(e) => {
                warn!(request_id = %request_id, "{}", e);
                Ok(error_response(&e))
            }
        }
    }
}

fn method_not_allowed(methods: &[Method]) -> HttpResponse {
    let mut response = text_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
    let allow = methods
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if let Ok(value) = HeaderValue::from_str(&allow) {
        response.headers_mut().insert(ALLOW, value);
    }
    response
}

/// `a=1&a=2&b` as `{a: [1, 2], b: [""]}`; values are not percent-decoded
fn parse_query(query: &str) -> BTreeMap<String, Vec<String>> {
    let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        out.entry(key.to_string())
            .or_default()
            .push(value.to_string());
    }
    out
}
