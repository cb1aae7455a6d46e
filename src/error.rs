//! Error types for Mirage

use http::StatusCode;
use std::io;
use thiserror::Error;

/// Seconds clients are told to wait after a rate limit rejection
pub const RETRY_AFTER_SECS: u64 = 60;

/// Result type alias for Mirage operations
pub type Result<T> = std::result::Result<T, MirageError>;

/// Main error type for Mirage
#[derive(Error, Debug)]
pub enum MirageError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file parsing errors
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Hyper errors
    #[error("Hyper error: {0}")]
    Hyper(String),

    /// HTTP protocol errors (invalid header names, malformed URIs, ...)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Malformed client input (scenario payloads, replay requests, defaults)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Request body larger than the configured limit
    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(u64),

    /// Lookup of an unknown resource (e.g. a replay id)
    #[error("{0}")]
    NotFound(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Replay execution failed (network error, unreadable upstream body)
    #[error("Replay failed: {0}")]
    Replay(String),

    /// Metrics registration/export errors
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<hyper::Error> for MirageError {
    fn from(err: hyper::Error) -> Self {
        MirageError::Hyper(err.to_string())
    }
}

impl From<http::Error> for MirageError {
    fn from(err: http::Error) -> Self {
        MirageError::Http(err.to_string())
    }
}

impl From<serde_yaml::Error> for MirageError {
    fn from(err: serde_yaml::Error) -> Self {
        MirageError::ConfigParse(err.to_string())
    }
}

impl From<toml::de::Error> for MirageError {
    fn from(err: toml::de::Error) -> Self {
        MirageError::ConfigParse(err.to_string())
    }
}

impl From<serde_json::Error> for MirageError {
    fn from(err: serde_json::Error) -> Self {
        MirageError::InvalidRequest(err.to_string())
    }
}

impl From<reqwest::Error> for MirageError {
    fn from(err: reqwest::Error) -> Self {
        MirageError::Replay(err.to_string())
    }
}

impl From<prometheus::Error> for MirageError {
    fn from(err: prometheus::Error) -> Self {
        MirageError::Metrics(err.to_string())
    }
}

/// Error response that can be converted to HTTP response
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    pub status: StatusCode,
    pub message: String,
    /// Value for a `Retry-After` header, in seconds
    pub retry_after: Option<u64>,
}

impl From<&MirageError> for ErrorResponse {
    fn from(err: &MirageError) -> Self {
        match err {
            MirageError::InvalidRequest(msg) => ErrorResponse {
                status: StatusCode::BAD_REQUEST,
                message: msg.clone(),
                retry_after: None,
            },
            MirageError::PayloadTooLarge(_) => ErrorResponse {
                status: StatusCode::PAYLOAD_TOO_LARGE,
                message: "Request body too large".to_string(),
                retry_after: None,
            },
            MirageError::NotFound(msg) => ErrorResponse {
                status: StatusCode::NOT_FOUND,
                message: msg.clone(),
                retry_after: None,
            },
            MirageError::RateLimitExceeded => ErrorResponse {
                status: StatusCode::TOO_MANY_REQUESTS,
                message: "Rate limit exceeded".to_string(),
                retry_after: Some(RETRY_AFTER_SECS),
            },
            other => ErrorResponse {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: other.to_string(),
                retry_after: None,
            },
        }
    }
}
