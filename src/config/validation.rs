//! Configuration validation

use super::types::*;
use crate::error::{MirageError, Result};
use std::net::{IpAddr, SocketAddr};

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_server(&config.server)?;
    validate_rate_limit(&config.rate_limit)?;
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<()> {
    server.bind_address.parse::<IpAddr>().map_err(|e| {
        MirageError::ConfigValidation(format!(
            "Invalid bind address '{}': {}",
            server.bind_address, e
        ))
    })?;

    server
        .listen_address()
        .parse::<SocketAddr>()
        .map_err(|e| MirageError::ConfigValidation(format!("Invalid listen address: {}", e)))?;

    if server.max_body_size == 0 {
        return Err(MirageError::ConfigValidation(
            "max_body_size must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_rate_limit(rate_limit: &RateLimitConfig) -> Result<()> {
    let rps = rate_limit.requests_per_second;
    if !rps.is_finite() || rps < 0.0 {
        return Err(MirageError::ConfigValidation(format!(
            "requests_per_second must be a non-negative number, got {}",
            rps
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_invalid_bind_address() {
        let mut config = Config::default();
        config.server.bind_address = "not-an-ip".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(MirageError::ConfigValidation(_))
        ));
    }

    #[test]
    fn test_negative_rate() {
        let mut config = Config::default();
        config.rate_limit.requests_per_second = -1.0;
        assert!(validate_config(&config).is_err());

        config.rate_limit.requests_per_second = f64::NAN;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_body_limit() {
        let mut config = Config::default();
        config.server.max_body_size = 0;
        assert!(validate_config(&config).is_err());
    }
}
