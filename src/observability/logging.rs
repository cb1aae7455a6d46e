//! Access log entries and body/header formatting for request logging

use chrono::{DateTime, Utc};
use http::HeaderMap;
use serde::Serialize;
use std::borrow::Cow;

/// Access log entry
#[derive(Debug, Clone, Serialize)]
pub struct AccessLogEntry {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub client_ip: String,
    pub method: String,
    pub path: String,
    pub status: u16,
    /// Response body size in bytes
    pub response_size: u64,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl AccessLogEntry {
    pub fn new(request_id: String, client_ip: String) -> Self {
        Self {
            timestamp: Utc::now(),
            request_id,
            client_ip,
            method: String::new(),
            path: String::new(),
            status: 0,
            response_size: 0,
            duration_ms: 0,
            user_agent: None,
        }
    }

    /// Format as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Emit the entry as a structured `tracing` event
    pub fn log_structured(&self) {
        tracing::info!(
            request_id = %self.request_id,
            client_ip = %self.client_ip,
            method = %self.method,
            path = %self.path,
            status = self.status,
            duration_ms = self.duration_ms,
            response_size = self.response_size,
            "request completed"
        );
    }
}

/// Body text for logs, cut to `limit` bytes (0 means no limit)
pub fn truncate_body(body: &[u8], limit: usize) -> Cow<'_, str> {
    let cut = if limit > 0 && body.len() > limit {
        &body[..limit]
    } else {
        body
    };
    String::from_utf8_lossy(cut)
}

/// One-line `name: value` listing of a header map
pub fn format_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| format!("{}: {}", name, String::from_utf8_lossy(value.as_bytes())))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_truncate_body() {
        assert_eq!(truncate_body(b"hello world", 5), "hello");
        assert_eq!(truncate_body(b"hello", 0), "hello");
        assert_eq!(truncate_body(b"hi", 10), "hi");
    }

    #[test]
    fn test_format_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-a", HeaderValue::from_static("1"));
        headers.insert("x-b", HeaderValue::from_static("2"));
        headers.append("x-b", HeaderValue::from_static("3"));
        let formatted = format_headers(&headers);
        assert!(formatted.contains("x-a: 1"));
        assert!(formatted.contains("x-b: 2, x-b: 3"));
        assert_eq!(formatted.matches(", ").count(), 2);
        assert_eq!(format_headers(&HeaderMap::new()), "");
    }

    #[test]
    fn test_access_log_json() {
        let mut entry = AccessLogEntry::new("abc".into(), "127.0.0.1".into());
        entry.method = "GET".into();
        entry.status = 200;
        let json = entry.to_json();
        assert!(json.contains("\"request_id\":\"abc\""));
        assert!(!json.contains("user_agent"));
    }
}
