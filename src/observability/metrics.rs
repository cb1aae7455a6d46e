//! Prometheus metrics implementation

use crate::error::{MirageError, Result};
use prometheus::{
    exponential_buckets, Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metrics collector for one server instance
pub struct Metrics {
    /// Prometheus registry
    registry: Registry,

    /// Total requests by method, path and status
    pub requests_total: IntCounterVec,
    /// Request latency
    pub request_duration_seconds: Histogram,
    /// Injected faults by kind
    pub chaos_errors_total: IntCounterVec,
}

impl Metrics {
    /// Create a new metrics instance with its own registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("echo_requests_total", "Total number of requests processed"),
            &["method", "path", "status"],
        )
        .map_err(|e| MirageError::Metrics(format!("Failed to create metric: {}", e)))?;

        // ~10ms to ~163s
        let buckets = exponential_buckets(0.01, 2.0, 15)
            .map_err(|e| MirageError::Metrics(format!("Failed to create buckets: {}", e)))?;
        let request_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("echo_request_duration_seconds", "Request latency in seconds")
                .buckets(buckets),
        )
        .map_err(|e| MirageError::Metrics(format!("Failed to create metric: {}", e)))?;

        let chaos_errors_total = IntCounterVec::new(
            Opts::new(
                "echo_chaos_errors_total",
                "Total number of chaos-induced errors",
            ),
            &["type"],
        )
        .map_err(|e| MirageError::Metrics(format!("Failed to create metric: {}", e)))?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration_seconds.clone()))?;
        registry.register(Box::new(chaos_errors_total.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration_seconds,
            chaos_errors_total,
        })
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| MirageError::Metrics(format!("Failed to encode metrics: {}", e)))?;

        String::from_utf8(buffer).map_err(|e| {
            MirageError::Metrics(format!("Failed to convert metrics to string: {}", e))
        })
    }

    /// Record a completed request
    pub fn record_request(&self, method: &str, path: &str, status: u16, duration: Duration) {
        self.requests_total
            .with_label_values(&[method, path, &status.to_string()])
            .inc();
        self.request_duration_seconds
            .observe(duration.as_secs_f64());
    }

    /// Count one injected fault
    pub fn record_injection(&self, kind: &str) {
        self.chaos_errors_total.with_label_values(&[kind]).inc();
    }

    /// Faults injected so far for a kind
    pub fn injections(&self, kind: &str) -> u64 {
        self.chaos_errors_total.with_label_values(&[kind]).get()
    }

    /// Requests recorded so far across all labels
    pub fn requests_recorded(&self) -> u64 {
        self.registry
            .gather()
            .iter()
            .filter(|mf| mf.get_name() == "echo_requests_total")
            .flat_map(|mf| mf.get_metric())
            .map(|m| m.get_counter().get_value() as u64)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert!(metrics.export().is_ok());
    }

    #[test]
    fn test_record_request() {
        let metrics = Metrics::new().unwrap();
        metrics.record_request("GET", "/api/test", 200, Duration::from_millis(50));

        let export = metrics.export().unwrap();
        assert!(export.contains("echo_requests_total"));
        assert!(export.contains("echo_request_duration_seconds"));
        assert_eq!(metrics.requests_recorded(), 1);
    }

    #[test]
    fn test_record_injection() {
        let metrics = Metrics::new().unwrap();
        metrics.record_injection("chaos");
        metrics.record_injection("chaos");
        metrics.record_injection("timeout");

        assert_eq!(metrics.injections("chaos"), 2);
        assert_eq!(metrics.injections("timeout"), 1);
        assert_eq!(metrics.injections("random"), 0);
        assert!(metrics
            .export()
            .unwrap()
            .contains("echo_chaos_errors_total{type=\"chaos\"} 2"));
    }

    #[test]
    fn test_instances_are_independent() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.record_injection("status");
        assert_eq!(a.injections("status"), 1);
        assert_eq!(b.injections("status"), 0);
    }
}
