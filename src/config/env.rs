//! Environment variable overrides
//!
//! Variables are read through an [`EnvSource`] so tests can supply their
//! own map instead of touching the process environment. Booleans are true
//! only for the exact value `true`; numbers that fail to parse are errors.

use super::types::Config;
use crate::error::{MirageError, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

/// Where environment variables come from
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    /// Custom variables; `None` reads the process environment
    vars: Option<HashMap<String, String>>,
}

impl EnvSource {
    /// Read the real process environment
    pub fn process() -> Self {
        Self { vars: None }
    }

    /// Read from a fixed set of variables
    pub fn from_map<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: Some(
                vars.into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Value of a variable, treating an empty value as unset
    pub fn get(&self, name: &str) -> Option<String> {
        let value = match &self.vars {
            Some(vars) => vars.get(name).cloned(),
            None => std::env::var(name).ok(),
        };
        value.filter(|v| !v.is_empty())
    }

    /// Every variable, for capturing directive defaults
    pub fn vars(&self) -> Vec<(String, String)> {
        match &self.vars {
            Some(vars) => vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            None => std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
        }
    }

    fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).map(|v| v == "true")
    }

    fn get_parsed<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(name)
            .map(|v| {
                v.trim().parse::<T>().map_err(|e| {
                    MirageError::Config(format!("Invalid value '{}' for {}: {}", v, name, e))
                })
            })
            .transpose()
    }
}

/// Apply the recognised environment variables on top of `config`
pub fn apply_env_overrides(config: &mut Config, env: &EnvSource) -> Result<()> {
    let server = &mut config.server;
    if let Some(port) = env.get_parsed("PORT")? {
        server.port = port;
    }
    if let Some(addr) = env.get("BIND_ADDRESS") {
        server.bind_address = addr;
    }
    if let Some(cors) = env.get_bool("ENABLE_CORS") {
        server.enable_cors = cors;
    }
    if let Some(size) = env.get_parsed("MAX_BODY_SIZE")? {
        server.max_body_size = size;
    }

    let logging = &mut config.logging;
    let flags: [(&str, &mut bool); 7] = [
        ("LOG_REQUESTS", &mut logging.log_requests),
        ("LOG_HEADERS", &mut logging.log_headers),
        ("LOG_BODY", &mut logging.log_body),
        ("LOG_TRANSACTION", &mut logging.log_transaction),
        ("LOG_RESPONSE", &mut logging.log_response),
        ("LOG_RESPONSE_HEADERS", &mut logging.log_response_headers),
        ("LOG_RESPONSE_BODY", &mut logging.log_response_body),
    ];
    for (name, flag) in flags {
        if let Some(value) = env.get_bool(name) {
            *flag = value;
        }
    }
    if let Some(size) = env.get_parsed("MAX_LOG_BODY_SIZE")? {
        logging.max_log_body_size = size;
    }

    if let Some(size) = env.get_parsed("ECHO_HISTORY_SIZE")? {
        config.history.size = size;
    }
    if let Some(file) = env.get("ECHO_SCENARIO_FILE") {
        config.scenarios.file = Some(PathBuf::from(file));
    }

    if let Some(rps) = env.get_parsed("ECHO_RATE_LIMIT_RPS")? {
        config.rate_limit.requests_per_second = rps;
    }
    if let Some(burst) = env.get_parsed("ECHO_RATE_LIMIT_BURST")? {
        config.rate_limit.burst = burst;
    }

    Ok(())
}
