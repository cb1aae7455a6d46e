//! Configuration type definitions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Listener and body limits
    #[serde(default)]
    pub server: ServerConfig,

    /// Request/response logging switches
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Request history
    #[serde(default)]
    pub history: HistoryConfig,

    /// Startup scenario file
    #[serde(default)]
    pub scenarios: ScenarioConfig,

    /// Global rate limit
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Name reported by server info headers and `/info`
    /// (defaults to the machine hostname)
    #[serde(default)]
    pub hostname: Option<String>,

    /// Seconds to wait for in-flight requests on shutdown
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Add permissive CORS headers
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Largest accepted request body in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            hostname: None,
            shutdown_timeout_secs: default_shutdown_timeout(),
            enable_cors: true,
            max_body_size: default_max_body_size(),
        }
    }
}

impl ServerConfig {
    /// `bind_address:port`
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_max_body_size() -> u64 {
    10 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

/// Logging switches for the access log middleware
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log the request line and an access log entry
    #[serde(default = "default_true")]
    pub log_requests: bool,

    #[serde(default)]
    pub log_headers: bool,

    #[serde(default)]
    pub log_body: bool,

    /// Log request and response together as one event after the response
    #[serde(default)]
    pub log_transaction: bool,

    #[serde(default)]
    pub log_response: bool,

    #[serde(default)]
    pub log_response_headers: bool,

    #[serde(default)]
    pub log_response_body: bool,

    /// Logged bodies are cut to this many bytes (0 means no limit)
    #[serde(default = "default_max_log_body_size")]
    pub max_log_body_size: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_requests: true,
            log_headers: false,
            log_body: false,
            log_transaction: false,
            log_response: false,
            log_response_headers: false,
            log_response_body: false,
            max_log_body_size: default_max_log_body_size(),
        }
    }
}

fn default_max_log_body_size() -> usize {
    2048
}

/// Request history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryConfig {
    /// Records kept; 0 disables recording
    #[serde(default = "default_history_size")]
    pub size: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            size: default_history_size(),
        }
    }
}

fn default_history_size() -> usize {
    100
}

/// Scenario file configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// YAML file loaded at startup when it exists
    #[serde(default = "default_scenario_file")]
    pub file: Option<PathBuf>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            file: default_scenario_file(),
        }
    }
}

fn default_scenario_file() -> Option<PathBuf> {
    Some(PathBuf::from("scenarios.yaml"))
}

/// Global token bucket; disabled unless both values are positive
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Sustained requests per second
    #[serde(default)]
    pub requests_per_second: f64,

    /// Bucket size
    #[serde(default)]
    pub burst: u32,
}

impl RateLimitConfig {
    pub fn is_enabled(&self) -> bool {
        self.requests_per_second > 0.0 && self.burst > 0
    }
}
