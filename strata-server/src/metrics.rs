//! Prometheus metrics.
//!
//! Components record through the [`MetricsRecorder`] trait so they can be
//! tested against a recorder of their own. [`Metrics`] is the production
//! implementation and also renders the `/metrics` exposition.

use std::collections::HashMap;

use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use tracing::debug;

pub const HTTP_REQUESTS_TOTAL: &str = "strata_http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "strata_http_request_duration_seconds";
pub const WRITE_REQUESTS_TOTAL: &str = "strata_write_requests_total";
pub const POINTS_WRITTEN_TOTAL: &str = "strata_points_written_total";
pub const ROWS_WRITTEN_TOTAL: &str = "strata_rows_written_total";
pub const PARSE_ERRORS_TOTAL: &str = "strata_parse_errors_total";
pub const STORAGE_ERRORS_TOTAL: &str = "strata_storage_errors_total";
pub const WRITE_DURATION_SECONDS: &str = "strata_write_duration_seconds";
pub const PANICS_RECOVERED_TOTAL: &str = "strata_panics_recovered_total";

/// Capability to record measurements.
pub trait MetricsRecorder: Send + Sync {
    fn increment_counter(&self, name: &'static str, value: u64);

    fn observe_histogram(&self, name: &'static str, value: f64);
}

/// Recorder that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

impl MetricsRecorder for NoopRecorder {
    fn increment_counter(&self, _name: &'static str, _value: u64) {}

    fn observe_histogram(&self, _name: &'static str, _value: f64) {}
}

/// Container for all Prometheus metrics.
pub struct Metrics {
    registry: Registry,
    counters: HashMap<&'static str, Counter>,
    histograms: HashMap<&'static str, Histogram>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics registry with all metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let mut counters = HashMap::new();
        let mut histograms = HashMap::new();

        for (name, help) in [
            (HTTP_REQUESTS_TOTAL, "Total number of HTTP requests"),
            (WRITE_REQUESTS_TOTAL, "Total number of write requests"),
            (POINTS_WRITTEN_TOTAL, "Total number of points persisted"),
            (ROWS_WRITTEN_TOTAL, "Total number of rows appended to storage"),
            (PARSE_ERRORS_TOTAL, "Total number of rejected line protocol bodies"),
            (STORAGE_ERRORS_TOTAL, "Total number of failed storage writes"),
            (PANICS_RECOVERED_TOTAL, "Total number of panics caught while handling requests"),
        ] {
            let counter = Counter::default();
            // The text encoder appends `_total` to counters itself.
            registry.register(
                name.strip_suffix("_total").unwrap_or(name),
                help,
                counter.clone(),
            );
            counters.insert(name, counter);
        }

        // Buckets from 1ms to ~8s
        for (name, help) in [
            (HTTP_REQUEST_DURATION_SECONDS, "HTTP request latency in seconds"),
            (WRITE_DURATION_SECONDS, "Time spent parsing and persisting a write request"),
        ] {
            let histogram = Histogram::new(exponential_buckets(0.001, 2.0, 14));
            registry.register(name, help, histogram.clone());
            histograms.insert(name, histogram);
        }

        Self {
            registry,
            counters,
            histograms,
        }
    }

    /// Encode all metrics to Prometheus text format.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if let Err(e) = prometheus_client::encoding::text::encode(&mut buffer, &self.registry) {
            debug!("Failed to encode metrics: {}", e);
        }
        buffer
    }
}

impl MetricsRecorder for Metrics {
    fn increment_counter(&self, name: &'static str, value: u64) {
        match self.counters.get(name) {
            Some(counter) => {
                counter.inc_by(value);
            }
            None => debug!("Ignoring unknown counter {}", name),
        }
    }

    fn observe_histogram(&self, name: &'static str, value: f64) {
        match self.histograms.get(name) {
            Some(histogram) => histogram.observe(value),
            None => debug!("Ignoring unknown histogram {}", name),
        }
    }
}
