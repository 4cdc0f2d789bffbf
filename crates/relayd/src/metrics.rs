//! Prometheus metrics for dispatch

use prometheus::{
    register_histogram_with_registry, register_int_counter_vec_with_registry, Encoder, Histogram,
    IntCounterVec, Registry, TextEncoder,
};
use std::sync::Arc;
use tracing::warn;

/// Per-backend outcome label values
pub mod status {
    pub const OK: &str = "ok";
    pub const FAILED: &str = "failed";
    pub const SKIPPED: &str = "skipped";
    pub const UNREGISTERED: &str = "unregistered";
}

/// `backend` label for every name that is not in the registry. Classifier
/// output is model-generated, so unknown names share one series.
pub const UNKNOWN_BACKEND_LABEL: &str = "_unregistered";

#[derive(Clone)]
pub struct DispatchMetrics {
    pub requests_total: IntCounterVec,
    pub backend_outcomes_total: IntCounterVec,
    pub dispatch_duration_seconds: Histogram,
    registry: Arc<Registry>,
}

impl DispatchMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = register_int_counter_vec_with_registry!(
            "relay_dispatch_requests_total",
            "Total number of dispatch requests by result",
            &["result"],
            registry
        )?;

        let backend_outcomes_total = register_int_counter_vec_with_registry!(
            "relay_backend_outcomes_total",
            "Total number of per-backend outcomes by backend and status",
            &["backend", "status"],
            registry
        )?;

        let dispatch_duration_seconds = register_histogram_with_registry!(
            "relay_dispatch_duration_seconds",
            "Wall time from classification to aggregated response",
            vec![0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0],
            registry
        )?;

        Ok(Self {
            requests_total,
            backend_outcomes_total,
            dispatch_duration_seconds,
            registry: Arc::new(registry),
        })
    }

    /// Record the request-level result ("ok", "client_error", "classification_error")
    pub fn record_request(&self, result: &str) {
        self.requests_total.with_label_values(&[result]).inc();
    }

    pub fn record_outcome(&self, backend: &str, status: &str) {
        self.backend_outcomes_total
            .with_label_values(&[backend, status])
            .inc();
    }

    pub fn observe_duration(&self, secs: f64) {
        self.dispatch_duration_seconds.observe(secs);
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            warn!("Failed to encode metrics: {}", e);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}
