//! Scripted per-path response sequences
//!
//! A scenario binds an exact request path to a list of canned responses.
//! Each visit serves the entry under the path's cursor and advances the
//! cursor modulo the list length, so the sequence loops forever. Installing
//! a definition for a path replaces the previous one and restarts its
//! cursor at zero.
//!
//! Definitions and cursors live together in a sharded map: the cursor
//! update for a path happens under that path's shard lock, which also
//! serializes it against replacement of the same path.

use crate::delay::DelaySpec;
use crate::error::{MirageError, Result};
use crate::middleware::{HttpRequest, HttpResponse, RequestContext};
use crate::render::request_dump;
use crate::rng::RandomSource;
use bytes::Bytes;
use dashmap::DashMap;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Response, StatusCode};
use http_body_util::Full;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// One canned response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioResponse {
    pub status: u16,
    #[serde(
        default,
        deserialize_with = "deserialize_delay",
        skip_serializing_if = "Option::is_none"
    )]
    pub delay: Option<DelaySpec>,
    #[serde(default)]
    pub body: String,
}

/// A path and the responses it cycles through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    pub path: String,
    #[serde(default)]
    pub responses: Vec<ScenarioResponse>,
}

impl ScenarioDefinition {
    pub fn validate(&self) -> Result<()> {
        if self.path.is_empty() {
            return Err(MirageError::InvalidRequest(
                "Invalid scenario data: empty path".to_string(),
            ));
        }
        if self.responses.is_empty() {
            return Err(MirageError::InvalidRequest(format!(
                "Invalid scenario data: no responses for {}",
                self.path
            )));
        }
        if let Some(bad) = self
            .responses
            .iter()
            .find(|r| !(100..=599).contains(&r.status))
        {
            return Err(MirageError::InvalidRequest(format!(
                "Invalid scenario data: status {} for {}",
                bad.status, self.path
            )));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDelay {
    Millis(u64),
    Text(String),
}

/// Empty or missing delay means none; bare numbers are milliseconds
fn deserialize_delay<'de, D>(deserializer: D) -> std::result::Result<Option<DelaySpec>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawDelay>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawDelay::Millis(ms)) => Ok(Some(DelaySpec::Fixed(ms))),
        Some(RawDelay::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(RawDelay::Text(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Parse a list of definitions. YAML when the content type says so,
/// JSON otherwise.
pub fn parse_definitions(body: &[u8], content_type: Option<&str>) -> Result<Vec<ScenarioDefinition>> {
    let is_yaml = content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("yaml"));
    let definitions: Vec<ScenarioDefinition> = if is_yaml {
        serde_yaml::from_slice(body)
            .map_err(|e| MirageError::InvalidRequest(format!("Invalid scenario data: {}", e)))?
    } else {
        serde_json::from_slice(body)
            .map_err(|e| MirageError::InvalidRequest(format!("Invalid scenario data: {}", e)))?
    };

    for definition in &definitions {
        definition.validate()?;
    }
    Ok(definitions)
}

/// Read a YAML scenario file
pub fn load_file(path: impl AsRef<Path>) -> Result<Vec<ScenarioDefinition>> {
    let path = path.as_ref();
    let content = std::fs::read(path)?;
    let definitions: Vec<ScenarioDefinition> = serde_yaml::from_slice(&content)?;
    for definition in &definitions {
        definition
            .validate()
            .map_err(|e| MirageError::ConfigParse(format!("{:?}: {}", path, e)))?;
    }
    Ok(definitions)
}

struct ScenarioSlot {
    responses: Arc<[ScenarioResponse]>,
    cursor: usize,
}

/// All installed scenarios with their cursors
#[derive(Default)]
pub struct ScenarioStore {
    slots: DashMap<String, ScenarioSlot>,
}

impl ScenarioStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install definitions, replacing existing paths and resetting their
    /// cursors. All definitions are validated before any is installed; a
    /// later duplicate path in the same batch wins.
    pub fn install(&self, definitions: Vec<ScenarioDefinition>) -> Result<usize> {
        for definition in &definitions {
            definition.validate()?;
        }

        let count = definitions.len();
        for definition in definitions {
            info!(
                path = %definition.path,
                responses = definition.responses.len(),
                "Installing scenario"
            );
            self.slots.insert(
                definition.path,
                ScenarioSlot {
                    responses: definition.responses.into(),
                    cursor: 0,
                },
            );
        }
        Ok(count)
    }

    /// Take the response under the cursor and advance it
    pub fn next(&self, path: &str) -> Option<ScenarioResponse> {
        let mut slot = self.slots.get_mut(path)?;
        let len = slot.responses.len();
        if len == 0 {
            return None;
        }
        let index = slot.cursor % len;
        slot.cursor = (index + 1) % len;
        Some(slot.responses[index].clone())
    }

    /// Current cursor of a path
    pub fn cursor(&self, path: &str) -> Option<usize> {
        self.slots.get(path).map(|slot| slot.cursor)
    }

    /// All definitions, sorted by path
    pub fn list(&self) -> Vec<ScenarioDefinition> {
        let mut definitions: Vec<ScenarioDefinition> = self
            .slots
            .iter()
            .map(|entry| ScenarioDefinition {
                path: entry.key().clone(),
                responses: entry.value().responses.to_vec(),
            })
            .collect();
        definitions.sort_by(|a, b| a.path.cmp(&b.path));
        definitions
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Serve the next scripted response for the request path, if the path
    /// has a scenario. The entry's delay is slept out before responding.
    pub async fn respond(
        &self,
        request: &HttpRequest,
        ctx: &RequestContext,
        rng: &dyn RandomSource,
    ) -> Option<HttpResponse> {
        let entry = self.next(request.uri().path())?;

        if let Some(delay) = entry.delay {
            let duration = delay.duration(rng);
            debug!(
                request_id = %ctx.request_id,
                delay_ms = duration.as_millis() as u64,
                "Scenario delay"
            );
            if !duration.is_zero() {
                tokio::time::sleep(duration).await;
            }
        }

        let body = if entry.body.is_empty() {
            Bytes::from(request_dump(request, ctx))
        } else {
            Bytes::from(entry.body)
        };

        let mut response = Response::new(Full::new(body));
        *response.status_mut() =
            StatusCode::from_u16(entry.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let headers = response.headers_mut();
        headers.insert("x-echo-scenario", HeaderValue::from_static("true"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Some(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SharedRng;
    use http::Request;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn definition(path: &str, statuses: &[u16]) -> ScenarioDefinition {
        ScenarioDefinition {
            path: path.to_string(),
            responses: statuses
                .iter()
                .map(|&status| ScenarioResponse {
                    status,
                    delay: None,
                    body: format!("{{\"status\":{}}}", status),
                })
                .collect(),
        }
    }

    #[test]
    fn test_cycle_loops() {
        let store = ScenarioStore::new();
        store.install(vec![definition("/roll", &[201, 202])]).unwrap();

        let statuses: Vec<u16> = (0..5).map(|_| store.next("/roll").unwrap().status).collect();
        assert_eq!(statuses, vec![201, 202, 201, 202, 201]);
    }

    #[test]
    fn test_unknown_path() {
        let store = ScenarioStore::new();
        assert!(store.next("/nothing").is_none());
        assert!(store.cursor("/nothing").is_none());
    }

    #[test]
    fn test_replace_resets_cursor() {
        let store = ScenarioStore::new();
        store.install(vec![definition("/roll", &[201, 202, 203])]).unwrap();
        store.next("/roll");
        assert_eq!(store.cursor("/roll"), Some(1));

        store.install(vec![definition("/roll", &[418, 419])]).unwrap();
        assert_eq!(store.cursor("/roll"), Some(0));
        assert_eq!(store.next("/roll").unwrap().status, 418);
    }

    #[test]
    fn test_install_rejects_invalid_batch_atomically() {
        let store = ScenarioStore::new();
        let result = store.install(vec![definition("/ok", &[200]), definition("/bad", &[])]);
        assert!(result.is_err());
        assert!(store.is_empty());

        assert!(store.install(vec![definition("/bad", &[700])]).is_err());
    }

    #[test]
    fn test_list_sorted() {
        let store = ScenarioStore::new();
        store
            .install(vec![definition("/b", &[200]), definition("/a", &[201])])
            .unwrap();
        let paths: Vec<String> = store.list().into_iter().map(|d| d.path).collect();
        assert_eq!(paths, vec!["/a", "/b"]);
    }

    #[test]
    fn test_parse_json() {
        let body = br#"[{"path":"/flaky","responses":[
            {"status":503,"delay":"100-200ms","body":""},
            {"status":200,"delay":"","body":"{\"ok\":true}"}
        ]}]"#;
        let defs = parse_definitions(body, Some("application/json")).unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(
            defs[0].responses[0].delay,
            Some(DelaySpec::Range { min: 100, max: 200 })
        );
        assert_eq!(defs[0].responses[1].delay, None);
    }

    #[test]
    fn test_parse_yaml() {
        let body = b"- path: /slow\n  responses:\n    - status: 200\n      delay: 50ms\n";
        let defs = parse_definitions(body, Some("application/x-yaml")).unwrap();
        assert_eq!(defs[0].responses[0].delay, Some(DelaySpec::Fixed(50)));
    }

    #[test]
    fn test_parse_malformed() {
        assert!(parse_definitions(b"{not json", None).is_err());
        let bad_delay = br#"[{"path":"/x","responses":[{"status":200,"delay":"soon"}]}]"#;
        assert!(parse_definitions(bad_delay, None).is_err());
        let numeric_delay = br#"[{"path":"/x","responses":[{"status":200,"delay":75}]}]"#;
        let defs = parse_definitions(numeric_delay, None).unwrap();
        assert_eq!(defs[0].responses[0].delay, Some(DelaySpec::Fixed(75)));
    }

    #[test]
    fn test_load_file() {
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        writeln!(
            file,
            "- path: /boot\n  responses:\n    - status: 202\n      body: started"
        )
        .unwrap();
        let defs = load_file(file.path()).unwrap();
        assert_eq!(defs[0].path, "/boot");
        assert_eq!(defs[0].responses[0].body, "started");
    }

    #[test]
    fn test_serialized_shape() {
        let def = ScenarioDefinition {
            path: "/x".into(),
            responses: vec![ScenarioResponse {
                status: 200,
                delay: Some(DelaySpec::Fixed(5)),
                body: String::new(),
            }],
        };
        let json = serde_json::to_value(&def).unwrap();
        assert_eq!(json["responses"][0]["delay"], "5ms");
    }

    #[tokio::test(start_paused = true)]
    async fn test_respond_applies_delay_and_headers() {
        let store = ScenarioStore::new();
        store
            .install(vec![ScenarioDefinition {
                path: "/slow".into(),
                responses: vec![ScenarioResponse {
                    status: 202,
                    delay: Some(DelaySpec::Fixed(150)),
                    body: String::new(),
                }],
            }])
            .unwrap();

        let rng = SharedRng::seeded(1);
        let request = Request::builder().uri("/slow").body(Bytes::new()).unwrap();
        let start = tokio::time::Instant::now();
        let response = store
            .respond(&request, &RequestContext::new(), &rng)
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_millis(150));
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.headers()["x-echo-scenario"], "true");
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
    }
}
