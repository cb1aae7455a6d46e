//! Request-control directives
//!
//! A directive is a named control such as `X-Echo-Delay`. Its effective value
//! for a request comes from exactly one source: the request header when it is
//! present and non-empty, otherwise the process-wide default (`ECHO_DELAY`),
//! which may itself be empty. Values are never merged or validated here.

use crate::error::{MirageError, Result};
use http::header::{HeaderMap, HeaderName};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Prefix of process defaults that set a custom response header
pub const HEADER_DEFAULT_PREFIX: &str = "ECHO_HEADER_";
/// Prefix of request headers that set a custom response header
pub const SET_HEADER_PREFIX: &str = "x-echo-set-header-";
/// Requested size of a generated random payload
pub const RESPONSE_SIZE_HEADER: &str = "x-echo-response-size";
/// Requested response compression
pub const COMPRESS_HEADER: &str = "x-echo-compress";
/// Comma separated request headers to reflect back
pub const ECHO_HEADERS_HEADER: &str = "x-echo-headers";
/// Override for the echoed content type
pub const CONTENT_TYPE_HEADER: &str = "x-echo-content-type";

/// Controls that can be set per request or as a process default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Directive {
    Delay,
    Jitter,
    RandomDelay,
    Exponential,
    Latency,
    Status,
    Error,
    Chaos,
    ServerInfo,
}

impl Directive {
    pub const ALL: [Directive; 9] = [
        Directive::Delay,
        Directive::Jitter,
        Directive::RandomDelay,
        Directive::Exponential,
        Directive::Latency,
        Directive::Status,
        Directive::Error,
        Directive::Chaos,
        Directive::ServerInfo,
    ];

    /// Request header carrying the directive (lowercase)
    pub const fn header(self) -> &'static str {
        match self {
            Directive::Delay => "x-echo-delay",
            Directive::Jitter => "x-echo-jitter",
            Directive::RandomDelay => "x-echo-random-delay",
            Directive::Exponential => "x-echo-exponential",
            Directive::Latency => "x-echo-latency",
            Directive::Status => "x-echo-status",
            Directive::Error => "x-echo-error",
            Directive::Chaos => "x-echo-chaos",
            Directive::ServerInfo => "x-echo-server-info",
        }
    }

    /// Name of the process default for the directive
    pub const fn default_key(self) -> &'static str {
        match self {
            Directive::Delay => "ECHO_DELAY",
            Directive::Jitter => "ECHO_JITTER",
            Directive::RandomDelay => "ECHO_RANDOM_DELAY",
            Directive::Exponential => "ECHO_EXPONENTIAL",
            Directive::Latency => "ECHO_LATENCY",
            Directive::Status => "ECHO_STATUS",
            Directive::Error => "ECHO_ERROR",
            Directive::Chaos => "ECHO_CHAOS",
            Directive::ServerInfo => "ECHO_SERVER_INFO",
        }
    }

    /// Look a directive up by its default key
    pub fn from_default_key(key: &str) -> Option<Directive> {
        Self::ALL.into_iter().find(|d| d.default_key() == key)
    }
}

/// Whether `key` names a directive default or a custom header default
pub fn is_default_key(key: &str) -> bool {
    Directive::from_default_key(key).is_some()
        || key
            .strip_prefix(HEADER_DEFAULT_PREFIX)
            .is_some_and(|name| !name.is_empty())
}

/// Process-wide directive defaults, replaceable at runtime
#[derive(Debug, Default)]
pub struct DirectiveDefaults {
    values: RwLock<BTreeMap<String, String>>,
}

impl DirectiveDefaults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture every recognised key from a set of variables, ignoring the rest
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, _)| is_default_key(k))
            .collect();
        Self {
            values: RwLock::new(values),
        }
    }

    /// Default value for a key, empty when unset
    pub fn get(&self, key: &str) -> String {
        self.values.read().get(key).cloned().unwrap_or_default()
    }

    /// Copy of all defaults
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.values.read().clone()
    }

    /// Replace every default at once. Unknown keys reject the whole update.
    pub fn replace(&self, values: BTreeMap<String, String>) -> Result<usize> {
        if let Some(bad) = values.keys().find(|k| !is_default_key(k)) {
            return Err(MirageError::InvalidRequest(format!(
                "Unknown default: {}",
                bad
            )));
        }
        let count = values.len();
        *self.values.write() = values;
        Ok(count)
    }

    /// Custom response headers configured by `ECHO_HEADER_<NAME>`.
    ///
    /// `ECHO_HEADER_X_TEAM` becomes `X-TEAM`; names that are not valid header
    /// names are skipped.
    pub fn header_defaults(&self) -> Vec<(HeaderName, String)> {
        self.values
            .read()
            .iter()
            .filter_map(|(key, value)| {
                let name = key.strip_prefix(HEADER_DEFAULT_PREFIX)?;
                let name = HeaderName::try_from(name.replace('_', "-")).ok()?;
                Some((name, value.clone()))
            })
            .collect()
    }
}

/// Effective value of one directive: header if non-empty, else the default
pub fn resolve(headers: &HeaderMap, defaults: &DirectiveDefaults, directive: Directive) -> String {
    match header_value(headers, directive.header()) {
        Some(value) => value.to_string(),
        None => defaults.get(directive.default_key()),
    }
}

/// Non-empty, visible-ASCII value of a request header
pub fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// All directives of one request, resolved once against a single snapshot
/// of the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedDirectives {
    pub delay: String,
    pub jitter: String,
    pub random_delay: String,
    pub exponential: String,
    pub latency: String,
    pub status: String,
    pub error: String,
    pub chaos: String,
    pub server_info: String,
}

impl ResolvedDirectives {
    pub fn resolve(headers: &HeaderMap, defaults: &DirectiveDefaults) -> Self {
        let snapshot = defaults.values.read();
        let pick = |d: Directive| match header_value(headers, d.header()) {
            Some(value) => value.to_string(),
            None => snapshot.get(d.default_key()).cloned().unwrap_or_default(),
        };

        Self {
            delay: pick(Directive::Delay),
            jitter: pick(Directive::Jitter),
            random_delay: pick(Directive::RandomDelay),
            exponential: pick(Directive::Exponential),
            latency: pick(Directive::Latency),
            status: pick(Directive::Status),
            error: pick(Directive::Error),
            chaos: pick(Directive::Chaos),
            server_info: pick(Directive::ServerInfo),
        }
    }

    pub fn get(&self, directive: Directive) -> &str {
        match directive {
            Directive::Delay => &self.delay,
            Directive::Jitter => &self.jitter,
            Directive::RandomDelay => &self.random_delay,
            Directive::Exponential => &self.exponential,
            Directive::Latency => &self.latency,
            Directive::Status => &self.status,
            Directive::Error => &self.error,
            Directive::Chaos => &self.chaos,
            Directive::ServerInfo => &self.server_info,
        }
    }

    pub fn server_info_enabled(&self) -> bool {
        self.server_info.trim().eq_ignore_ascii_case("true")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn defaults() -> DirectiveDefaults {
        DirectiveDefaults::from_vars([
            ("ECHO_DELAY", "250"),
            ("ECHO_ERROR", "unavailable"),
            ("ECHO_HEADER_X_TEAM", "platform"),
            ("ECHO_HISTORY_SIZE", "10"),
            ("PATH", "/usr/bin"),
        ])
    }

    #[test]
    fn test_header_beats_default() {
        let mut headers = HeaderMap::new();
        headers.insert("x-echo-delay", HeaderValue::from_static("10"));
        assert_eq!(resolve(&headers, &defaults(), Directive::Delay), "10");
    }

    #[test]
    fn test_empty_header_falls_back_to_default() {
        let mut headers = HeaderMap::new();
        headers.insert("x-echo-delay", HeaderValue::from_static(""));
        assert_eq!(resolve(&headers, &defaults(), Directive::Delay), "250");
    }

    #[test]
    fn test_missing_everywhere_is_empty() {
        let headers = HeaderMap::new();
        assert_eq!(resolve(&headers, &defaults(), Directive::Jitter), "");
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-echo-status"),
            HeaderValue::from_static("201"),
        );
        let resolved = ResolvedDirectives::resolve(&headers, &defaults());
        assert_eq!(resolved.status, "201");
        assert_eq!(resolved.error, "unavailable");
    }

    #[test]
    fn test_unrelated_vars_ignored() {
        let snapshot = defaults().snapshot();
        assert!(snapshot.contains_key("ECHO_DELAY"));
        assert!(snapshot.contains_key("ECHO_HEADER_X_TEAM"));
        assert!(!snapshot.contains_key("ECHO_HISTORY_SIZE"));
        assert!(!snapshot.contains_key("PATH"));
    }

    #[test]
    fn test_header_defaults_translate_names() {
        let headers = defaults().header_defaults();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].0.as_str(), "x-team");
        assert_eq!(headers[0].1, "platform");
    }

    #[test]
    fn test_replace_rejects_unknown_keys() {
        let defaults = defaults();
        let mut update = BTreeMap::new();
        update.insert("ECHO_CHAOS".to_string(), "50".to_string());
        update.insert("NOT_A_DIRECTIVE".to_string(), "1".to_string());
        assert!(defaults.replace(update).is_err());
        assert_eq!(defaults.get("ECHO_DELAY"), "250");
    }

    #[test]
    fn test_replace_swaps_all_defaults() {
        let defaults = defaults();
        let mut update = BTreeMap::new();
        update.insert("ECHO_CHAOS".to_string(), "50".to_string());
        assert_eq!(defaults.replace(update).ok(), Some(1));
        assert_eq!(defaults.get("ECHO_CHAOS"), "50");
        assert_eq!(defaults.get("ECHO_DELAY"), "");
    }

    #[test]
    fn test_server_info_flag() {
        let mut headers = HeaderMap::new();
        headers.insert("x-echo-server-info", HeaderValue::from_static("TRUE"));
        let resolved = ResolvedDirectives::resolve(&headers, &DirectiveDefaults::new());
        assert!(resolved.server_info_enabled());
    }
}
