//! Configuration module for Mirage
//!
//! Configuration comes from an optional YAML or TOML file, then the
//! environment variables listed in [`apply_env_overrides`] are applied on
//! top, then the result is validated.

mod env;
mod types;
mod validation;

pub use env::{apply_env_overrides, EnvSource};
pub use types::*;
pub use validation::validate_config;

use crate::error::{MirageError, Result};
use std::path::Path;
use tracing::info;

/// Load configuration from a file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let config = read_config(path.as_ref())?;
    validate_config(&config)?;
    Ok(config)
}

/// Build the effective configuration: file (or defaults), then environment
pub fn load_effective(path: Option<&Path>, env: &EnvSource) -> Result<Config> {
    let mut config = match path {
        Some(path) => read_config(path)?,
        None => Config::default(),
    };
    apply_env_overrides(&mut config, env)?;
    validate_config(&config)?;
    Ok(config)
}

fn read_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| MirageError::Config(format!("Failed to read config file {:?}: {}", path, e)))?;
    let config = parse_config(&content, path)?;
    info!("Configuration loaded from {:?}", path);
    Ok(config)
}

/// Parse configuration from string content
pub fn parse_config(content: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("yaml");

    match extension {
        "yaml" | "yml" => serde_yaml::from_str(content).map_err(|e| e.into()),
        "toml" => toml::from_str(content).map_err(|e| e.into()),
        _ => Err(MirageError::Config(format!(
            "Unsupported config format: {}",
            extension
        ))),
    }
}
