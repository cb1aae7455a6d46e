//! Observability module
//!
//! Provides:
//! - Prometheus metrics owned by each server instance
//! - Access log formatting helpers used by the logging middleware

mod logging;
mod metrics;

pub use logging::*;
pub use metrics::*;
