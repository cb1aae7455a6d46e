//! Bounded request history

use crate::middleware::{HttpRequest, X_REQUEST_ID};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use http::header::{HeaderMap, HeaderName, HeaderValue};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, VecDeque};

/// One recorded inbound request. Never mutated after capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Value of `X-Request-ID`, empty when the request had none
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    /// Raw request target (path and query)
    pub url: String,
    /// Lowercase header name to values in arrival order
    pub headers: BTreeMap<String, Vec<String>>,
    /// Body bytes, base64 encoded in JSON
    #[serde(serialize_with = "serialize_body", deserialize_with = "deserialize_body")]
    pub body: Vec<u8>,
}

impl RequestRecord {
    /// Snapshot a request as it entered the pipeline
    pub fn capture(request: &HttpRequest) -> Self {
        let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in request.headers() {
            headers
                .entry(name.as_str().to_string())
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
        }

        let id = request
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let url = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        Self {
            id,
            timestamp: Utc::now(),
            method: request.method().as_str().to_string(),
            url,
            headers,
            body: request.body().to_vec(),
        }
    }

    /// Rebuild the header map, skipping entries that are no longer valid
    pub fn header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, values) in &self.headers {
            let Ok(name) = HeaderName::try_from(name.as_str()) else {
                continue;
            };
            for value in values {
                if let Ok(value) = HeaderValue::from_str(value) {
                    map.append(name.clone(), value);
                }
            }
        }
        map
    }
}

fn serialize_body<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(body))
}

fn deserialize_body<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    STANDARD
        .decode(encoded.as_bytes())
        .map_err(serde::de::Error::custom)
}

/// FIFO buffer of recent requests, capped at a fixed capacity
pub struct HistoryStore {
    capacity: usize,
    records: Mutex<VecDeque<RequestRecord>>,
}

impl HistoryStore {
    /// A capacity of zero disables recording
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    /// Append a record, evicting the oldest when over capacity
    pub fn record(&self, record: RequestRecord) {
        if !self.is_enabled() {
            return;
        }
        let mut records = self.records.lock();
        records.push_back(record);
        while records.len() > self.capacity {
            records.pop_front();
        }
    }

    /// Snapshot of all records, oldest first
    pub fn list(&self) -> Vec<RequestRecord> {
        self.records.lock().iter().cloned().collect()
    }

    /// First (oldest) record with exactly this id
    pub fn find(&self, id: &str) -> Option<RequestRecord> {
        self.records.lock().iter().find(|r| r.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::Request;

    fn record(id: &str) -> RequestRecord {
        RequestRecord {
            id: id.to_string(),
            timestamp: Utc::now(),
            method: "GET".to_string(),
            url: "/".to_string(),
            headers: BTreeMap::new(),
            body: Vec::new(),
        }
    }

    #[test]
    fn test_capture() {
        let request = Request::builder()
            .method("POST")
            .uri("/orders?id=7")
            .header("x-request-id", "abc123")
            .header("accept", "text/plain")
            .header("accept", "application/json")
            .body(Bytes::from_static(b"payload"))
            .unwrap();
        let rec = RequestRecord::capture(&request);

        assert_eq!(rec.id, "abc123");
        assert_eq!(rec.method, "POST");
        assert_eq!(rec.url, "/orders?id=7");
        assert_eq!(rec.headers["accept"], vec!["text/plain", "application/json"]);
        assert_eq!(rec.body, b"payload");
        assert_eq!(rec.header_map().get_all("accept").iter().count(), 2);
    }

    #[test]
    fn test_capture_without_id() {
        let request = Request::builder().uri("/").body(Bytes::new()).unwrap();
        assert_eq!(RequestRecord::capture(&request).id, "");
    }

    #[test]
    fn test_fifo_eviction() {
        let store = HistoryStore::new(3);
        for i in 0..5 {
            store.record(record(&i.to_string()));
        }
        let ids: Vec<String> = store.list().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["2", "3", "4"]);
        assert_eq!(store.len(), 3);
        assert!(store.find("0").is_none());
        assert!(store.find("4").is_some());
    }

    #[test]
    fn test_disabled_store_records_nothing() {
        let store = HistoryStore::new(0);
        store.record(record("a"));
        assert!(store.is_empty());
        assert!(!store.is_enabled());
    }

    #[test]
    fn test_body_serializes_as_base64() {
        let mut rec = record("b64");
        rec.body = b"hello".to_vec();
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["body"], "aGVsbG8=");

        let back: RequestRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.body, b"hello");
    }
}
