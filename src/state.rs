//! Per-instance server state
//!
//! Everything a request can read or mutate lives here. Each [`AppState`]
//! is independent, so several servers can run side by side in one process.

use crate::config::{Config, EnvSource};
use crate::directive::DirectiveDefaults;
use crate::error::Result;
use crate::observability::Metrics;
use crate::render::ServerIdentity;
use crate::replay::{HistoryStore, Replayer};
use crate::rng::{RandomSource, SharedRng};
use crate::scenario::{self, ScenarioStore};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared state of one server instance
pub struct AppState {
    pub config: Config,
    /// Process-level directive defaults (`ECHO_*`), editable at runtime
    pub defaults: DirectiveDefaults,
    pub scenarios: ScenarioStore,
    pub history: HistoryStore,
    pub rng: Arc<dyn RandomSource>,
    pub metrics: Arc<Metrics>,
    pub identity: ServerIdentity,
    pub replayer: Replayer,
    counter: AtomicU64,
}

impl AppState {
    /// Fresh state with empty defaults and an entropy-seeded generator
    pub fn new(config: Config) -> Result<Self> {
        let hostname = config
            .server
            .hostname
            .clone()
            .unwrap_or_else(system_hostname);

        Ok(Self {
            history: HistoryStore::new(config.history.size),
            config,
            defaults: DirectiveDefaults::new(),
            scenarios: ScenarioStore::new(),
            rng: Arc::new(SharedRng::from_entropy()),
            metrics: Arc::new(Metrics::new()?),
            identity: ServerIdentity::new(hostname),
            replayer: Replayer::new()?,
            counter: AtomicU64::new(0),
        })
    }

    /// State as the binary builds it: defaults captured from `env` and the
    /// configured scenario file loaded when present
    pub fn from_env(config: Config, env: &EnvSource) -> Result<Self> {
        let state = Self::new(config)?.with_defaults(DirectiveDefaults::from_vars(env.vars()));
        if let Some(path) = state.config.scenarios.file.clone() {
            state.load_scenario_file(&path);
        }
        Ok(state)
    }

    pub fn with_rng(mut self, rng: Arc<dyn RandomSource>) -> Self {
        self.rng = rng;
        self
    }

    pub fn with_defaults(mut self, defaults: DirectiveDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Install scenarios from a YAML file. A missing file is skipped and a
    /// malformed one is logged; neither stops the server.
    pub fn load_scenario_file(&self, path: &Path) -> usize {
        if !path.exists() {
            return 0;
        }
        match scenario::load_file(path).and_then(|defs| self.scenarios.install(defs)) {
            Ok(count) => {
                info!("Loaded {} scenario(s) from {:?}", count, path);
                count
            }
            Err(e) => {
                warn!("Ignoring scenario file {:?}: {}", path, e);
                0
            }
        }
    }

    /// Count a pipeline request and return the new total
    pub fn next_request_count(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Requests counted so far
    pub fn request_count(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

/// Best-effort machine hostname
fn system_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_counter() {
        let state = AppState::new(Config::default()).unwrap();
        assert_eq!(state.request_count(), 0);
        assert_eq!(state.next_request_count(), 1);
        assert_eq!(state.next_request_count(), 2);
        assert_eq!(state.request_count(), 2);
    }

    #[test]
    fn test_configured_hostname() {
        let mut config = Config::default();
        config.server.hostname = Some("echo-1".to_string());
        let state = AppState::new(config).unwrap();
        assert_eq!(state.identity.hostname, "echo-1");
    }

    #[test]
    fn test_defaults_captured_from_env() {
        let env = EnvSource::from_map([("ECHO_DELAY", "10"), ("PATH", "/bin")]);
        let mut config = Config::default();
        config.scenarios.file = None;
        let state = AppState::from_env(config, &env).unwrap();
        assert_eq!(state.defaults.get("ECHO_DELAY"), "10");
        assert_eq!(state.defaults.snapshot().len(), 1);
    }

    #[test]
    fn test_scenario_file_loading() {
        let state = AppState::new(Config::default()).unwrap();
        assert_eq!(state.load_scenario_file(Path::new("/nonexistent/scenarios.yaml")), 0);

        let mut bad = NamedTempFile::with_suffix(".yaml").unwrap();
        bad.write_all(b"- path: [not, a, string\n").unwrap();
        assert_eq!(state.load_scenario_file(bad.path()), 0);

        let mut good = NamedTempFile::with_suffix(".yaml").unwrap();
        good.write_all(b"- path: /flaky\n  responses:\n    - status: 503\n")
            .unwrap();
        assert_eq!(state.load_scenario_file(good.path()), 1);
        assert_eq!(state.scenarios.len(), 1);
    }
}
