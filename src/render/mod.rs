//! Response rendering
//!
//! Builds the final echo response once no delay, fault or scenario has
//! taken over: reflected and custom headers, the request counter, the body
//! (request dump, random payload or echoed body) and optional gzip.

use crate::directive::{
    header_value, DirectiveDefaults, ResolvedDirectives, COMPRESS_HEADER, CONTENT_TYPE_HEADER,
    ECHO_HEADERS_HEADER, RESPONSE_SIZE_HEADER, SET_HEADER_PREFIX,
};
use crate::error::{ErrorResponse, MirageError, Result};
use crate::middleware::{HttpRequest, HttpResponse, RequestContext};
use crate::rng::RandomSource;
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use http::header::{
    HeaderMap, HeaderName, HeaderValue, CONTENT_ENCODING, CONTENT_TYPE, RETRY_AFTER,
};
use http::{Method, Response, StatusCode};
use http_body_util::Full;
use serde::Serialize;
use std::io::Write;
use std::time::{Duration, Instant};
use tracing::{error, warn};

/// Version reported by `X-Echo-Version` and the info endpoints
pub const SERVER_VERSION: &str = "1.0.0";

/// Largest payload `X-Echo-Response-Size` will generate (100 MiB)
pub const MAX_GENERATED_SIZE: usize = 100 * 1024 * 1024;

const TEXT_PLAIN: &str = "text/plain";
const OCTET_STREAM: &str = "application/octet-stream";

/// Identity reported by server-info headers and the info endpoints
#[derive(Debug, Clone)]
pub struct ServerIdentity {
    pub hostname: String,
    pub started: Instant,
    pub started_at: chrono::DateTime<Utc>,
}

impl ServerIdentity {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Human readable uptime such as `1h2m3s`
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h{}m{}s", h, m, s)
    } else if m > 0 {
        format!("{}m{}s", m, s)
    } else {
        format!("{}s", s)
    }
}

/// Plain-text response with the given status
pub fn text_response(status: StatusCode, body: impl Into<Bytes>) -> HttpResponse {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
    response
}

/// JSON response; serialization failures become a plain 500
pub fn json_response<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> HttpResponse {
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut response = Response::new(Full::new(Bytes::from(body)));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

/// Plain-text response for an error, with the status it maps to
pub fn error_response(err: &MirageError) -> HttpResponse {
    let ErrorResponse {
        status,
        message,
        retry_after,
    } = ErrorResponse::from(err);
    let mut response = text_response(status, message);
    if let Some(secs) = retry_after {
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(secs));
    }
    response
}

/// Client address: first `X-Forwarded-For` hop, else `X-Real-IP`, else the peer
pub fn client_ip(headers: &HeaderMap, ctx: &RequestContext) -> String {
    if let Some(forwarded) = header_value(headers, "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(real_ip) = header_value(headers, "x-real-ip") {
        return real_ip.trim().to_string();
    }
    ctx.client_ip.clone().unwrap_or_else(|| "-".to_string())
}

/// Textual dump of a request: request line, host, sorted headers, client
/// address and timestamp.
pub fn request_dump(request: &HttpRequest, ctx: &RequestContext) -> String {
    let uri = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("/");
    let host = header_value(request.headers(), "host")
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|a| a.to_string()))
        .unwrap_or_default();

    let mut out = format!(
        "{} {} {:?}\nHost: {}\n",
        request.method(),
        uri,
        request.version(),
        host
    );

    let mut names: Vec<&HeaderName> = request
        .headers()
        .keys()
        .filter(|name| name.as_str() != "host")
        .collect();
    names.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    for name in names {
        for value in request.headers().get_all(name) {
            out.push_str(&format!(
                "{}: {}\n",
                name,
                String::from_utf8_lossy(value.as_bytes())
            ));
        }
    }

    out.push_str(&format!(
        "\nClient-IP: {}\nTimestamp: {}\n",
        client_ip(request.headers(), ctx),
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    ));
    out
}

/// Content type for an echoed body
pub fn echo_content_type(headers: &HeaderMap) -> HeaderValue {
    headers
        .get(CONTENT_TYPE_HEADER)
        .filter(|v| !v.is_empty())
        .or_else(|| headers.get(CONTENT_TYPE).filter(|v| !v.is_empty()))
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(TEXT_PLAIN))
}

/// Request dump for a bodyless GET, otherwise the request body itself
pub fn echoed_body(request: &HttpRequest, ctx: &RequestContext) -> (Bytes, HeaderValue) {
    if request.method() == Method::GET && request.body().is_empty() {
        (
            Bytes::from(request_dump(request, ctx)),
            HeaderValue::from_static(TEXT_PLAIN),
        )
    } else {
        (request.body().clone(), echo_content_type(request.headers()))
    }
}

/// Gzip a payload
pub fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| MirageError::Internal(format!("Compression failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| MirageError::Internal(format!("Compression failed: {}", e)))
}

/// Renders the default echo response
pub struct EchoRenderer<'a> {
    pub defaults: &'a DirectiveDefaults,
    pub rng: &'a dyn RandomSource,
    pub identity: &'a ServerIdentity,
}

impl EchoRenderer<'_> {
    pub fn render(
        &self,
        request: &HttpRequest,
        ctx: &RequestContext,
        directives: &ResolvedDirectives,
        request_count: u64,
    ) -> HttpResponse {
        let headers = request.headers();
        let mut out = HeaderMap::new();

        reflect_headers(headers, &mut out);
        self.apply_custom_headers(headers, &mut out);

        if directives.server_info_enabled() {
            if let Ok(v) = HeaderValue::from_str(&self.identity.hostname) {
                out.insert("x-echo-server", v);
            }
            out.insert("x-echo-version", HeaderValue::from_static(SERVER_VERSION));
            if let Ok(v) = HeaderValue::from_str(&format_uptime(self.identity.uptime())) {
                out.insert("x-echo-uptime", v);
            }
        }

        out.insert("x-echo-request-count", HeaderValue::from(request_count));

        let body = if request.method() == Method::GET && request.body().is_empty() {
            out.insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
            Bytes::from(request_dump(request, ctx))
        } else if let Some(size) = header_value(headers, RESPONSE_SIZE_HEADER) {
            match size.trim().parse::<usize>() {
                Ok(size) if size > 0 => {
                    let mut payload = vec![0u8; size.min(MAX_GENERATED_SIZE)];
                    self.rng.fill(&mut payload);
                    out.insert(CONTENT_TYPE, HeaderValue::from_static(OCTET_STREAM));
                    Bytes::from(payload)
                }
                _ => Bytes::new(),
            }
        } else {
            out.insert(CONTENT_TYPE, echo_content_type(headers));
            request.body().clone()
        };

        let body = match header_value(headers, COMPRESS_HEADER) {
            Some(v) if v.eq_ignore_ascii_case("gzip") => match gzip(&body) {
                Ok(compressed) => {
                    out.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
                    Bytes::from(compressed)
                }
                Err(e) => {
                    warn!(request_id = %ctx.request_id, "{}", e);
                    body
                }
            },
            _ => body,
        };

        let mut response = Response::new(Full::new(body));
        *response.headers_mut() = out;
        response
    }

    /// Process-default custom headers, then per-request ones. A request
    /// header replaces the default of the same name entirely.
    fn apply_custom_headers(&self, headers: &HeaderMap, out: &mut HeaderMap) {
        for (name, value) in self.defaults.header_defaults() {
            if let Ok(value) = HeaderValue::from_str(&value) {
                out.insert(name, value);
            }
        }

        for name in headers.keys() {
            let Some(target) = name.as_str().strip_prefix(SET_HEADER_PREFIX) else {
                continue;
            };
            let Ok(target) = HeaderName::try_from(target) else {
                continue;
            };
            let mut values = headers.get_all(name).iter();
            if let Some(first) = values.next() {
                out.insert(target.clone(), first.clone());
            }
            for value in values {
                out.append(target.clone(), value.clone());
            }
        }
    }
}

/// `X-Echo-Headers: a,b` reflects the listed request headers as
/// `X-Echoed-<name>`.
fn reflect_headers(headers: &HeaderMap, out: &mut HeaderMap) {
    let Some(list) = header_value(headers, ECHO_HEADERS_HEADER) else {
        return;
    };
    for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let Some(value) = headers.get(name).filter(|v| !v.is_empty()) else {
            continue;
        };
        if let Ok(echoed) = HeaderName::try_from(format!("x-echoed-{}", name)) {
            out.insert(echoed, value.clone());
        }
    }
}
