//! Replay of recorded requests

use super::history::RequestRecord;
use crate::error::{MirageError, Result};
use crate::middleware::{HttpRequest, HttpResponse, RequestContext};
use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, Request, Response};
use http_body_util::Full;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Outbound replay timeout
pub const REPLAY_TIMEOUT: Duration = Duration::from_secs(30);

/// Headers that describe one connection and are never forwarded
const HOP_BY_HOP: &[&str] = &[
    "host",
    "connection",
    "content-length",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Body of `POST /replay`
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayRequest {
    pub id: String,
    #[serde(default)]
    pub target: Option<String>,
}

impl ReplayRequest {
    /// Target URL, treating an empty string as absent
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

/// Something that answers requests the way this server does
#[async_trait]
pub trait LocalResponder: Send + Sync {
    async fn respond(&self, request: HttpRequest, ctx: RequestContext) -> Result<HttpResponse>;
}

/// Re-issues recorded requests
pub struct Replayer {
    client: reqwest::Client,
}

impl Replayer {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REPLAY_TIMEOUT)
            .build()
            .map_err(|e| MirageError::Internal(format!("Failed to build replay client: {}", e)))?;

        Ok(Self { client })
    }

    /// Replay a record against `target`, or against `local` when no target
    /// is given. The response is returned as received; failures are not
    /// retried.
    pub async fn replay(
        &self,
        record: &RequestRecord,
        target: Option<&str>,
        local: &dyn LocalResponder,
    ) -> Result<HttpResponse> {
        let result = match target {
            Some(url) => self.replay_to_target(record, url).await,
            None => self.replay_to_self(record, local).await,
        };

        match &result {
            Ok(response) => {
                debug!(
                    id = %record.id,
                    target = target.unwrap_or("self"),
                    status = response.status().as_u16(),
                    "Replay completed"
                );
            }
            Err(e) => {
                warn!(id = %record.id, "{}", e);
            }
        }
        result
    }

    async fn replay_to_self(
        &self,
        record: &RequestRecord,
        local: &dyn LocalResponder,
    ) -> Result<HttpResponse> {
        let request = rebuild_request(record)?;
        let ctx = RequestContext::new();
        local.respond(request, ctx).await
    }

    async fn replay_to_target(&self, record: &RequestRecord, url: &str) -> Result<HttpResponse> {
        let method = parse_method(&record.method)?;
        let mut request = self.client.request(method, url);

        for (name, value) in record.header_map().iter() {
            if !HOP_BY_HOP.contains(&name.as_str()) {
                request = request.header(name, value);
            }
        }
        if !record.body.is_empty() {
            request = request.body(record.body.clone());
        }

        let upstream = request.send().await?;
        let status = upstream.status();
        let headers = upstream.headers().clone();
        let body = upstream
            .bytes()
            .await
            .map_err(|e| MirageError::Replay(format!("reading response body: {}", e)))?;

        let mut response = Response::new(Full::new(body));
        *response.status_mut() = status;
        for (name, value) in headers.iter() {
            if !HOP_BY_HOP.contains(&name.as_str()) {
                response.headers_mut().append(name, value.clone());
            }
        }
        Ok(response)
    }
}

fn parse_method(method: &str) -> Result<Method> {
    Method::from_bytes(method.as_bytes())
        .map_err(|_| MirageError::Replay(format!("Unknown method: {}", method)))
}

/// Turn a record back into a request equivalent to the original
pub fn rebuild_request(record: &RequestRecord) -> Result<HttpRequest> {
    let mut request = Request::builder()
        .method(parse_method(&record.method)?)
        .uri(record.url.as_str())
        .body(Bytes::from(record.body.clone()))
        .map_err(|e| MirageError::Replay(format!("Failed to create request: {}", e)))?;
    *request.headers_mut() = record.header_map();
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::text_response;
    use chrono::Utc;
    use http::StatusCode;
    use http_body_util::BodyExt;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;

    /// Captures what it was asked to answer
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(String, String, Bytes, Option<String>)>>,
    }

    #[async_trait]
    impl LocalResponder for Recorder {
        async fn respond(&self, request: HttpRequest, _ctx: RequestContext) -> Result<HttpResponse> {
            let header = request
                .headers()
                .get("x-trace")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            self.seen.lock().push((
                request.method().to_string(),
                request.uri().to_string(),
                request.body().clone(),
                header,
            ));
            Ok(text_response(StatusCode::ACCEPTED, "local"))
        }
    }

    fn record() -> RequestRecord {
        let mut headers = BTreeMap::new();
        headers.insert("x-trace".to_string(), vec!["t-1".to_string()]);
        RequestRecord {
            id: "r1".to_string(),
            timestamp: Utc::now(),
            method: "PUT".to_string(),
            url: "/items/3?force=1".to_string(),
            headers,
            body: b"{\"n\":3}".to_vec(),
        }
    }

    #[test]
    fn test_replay_request_target() {
        let req: ReplayRequest = serde_json::from_str(r#"{"id":"a","target":""}"#).unwrap();
        assert_eq!(req.target(), None);
        let req: ReplayRequest = serde_json::from_str(r#"{"id":"a"}"#).unwrap();
        assert_eq!(req.target(), None);
        let req: ReplayRequest =
            serde_json::from_str(r#"{"id":"a","target":"http://x/y"}"#).unwrap();
        assert_eq!(req.target(), Some("http://x/y"));
    }

    #[test]
    fn test_rebuild_request() {
        let request = rebuild_request(&record()).unwrap();
        assert_eq!(request.method(), Method::PUT);
        assert_eq!(request.uri(), "/items/3?force=1");
        assert_eq!(request.headers()["x-trace"], "t-1");
        assert_eq!(request.body(), &Bytes::from_static(b"{\"n\":3}"));
    }

    #[tokio::test]
    async fn test_replay_to_self() {
        let replayer = Replayer::new().unwrap();
        let local = Recorder::default();
        let response = replayer.replay(&record(), None, &local).await.unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from_static(b"local"));

        let seen = local.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "PUT");
        assert_eq!(seen[0].1, "/items/3?force=1");
        assert_eq!(seen[0].2, Bytes::from_static(b"{\"n\":3}"));
        assert_eq!(seen[0].3.as_deref(), Some("t-1"));
    }

    #[tokio::test]
    async fn test_replay_to_unreachable_target_fails() {
        let replayer = Replayer::new().unwrap();
        let local = Recorder::default();
        // port 9 (discard) on loopback is expected to refuse connections
        let result = replayer
            .replay(&record(), Some("http://127.0.0.1:9/nowhere"), &local)
            .await;
        assert!(matches!(result, Err(MirageError::Replay(_))));
        assert!(local.seen.lock().is_empty());
    }
}
