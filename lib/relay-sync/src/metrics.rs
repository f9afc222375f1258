//! Prometheus metrics for registry refreshes

use anyhow::Result;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

/// Outcome label for a finished refresh
pub const OUTCOME_SUCCESS: &str = "success";
pub const OUTCOME_FAILURE: &str = "failure";
pub const OUTCOME_CANCELLED: &str = "cancelled";

/// Prometheus metrics collector for the refresh pipeline.
///
/// Clones share the same registry and metrics.
#[derive(Clone)]
pub struct RefreshMetrics {
    /// Refreshes attempted, by outcome
    pub refresh_total: IntCounterVec,
    /// Wall time of successful refreshes
    pub refresh_duration_seconds: Histogram,
    /// Records in the currently published snapshot
    pub registry_records: IntGauge,
    /// Server definitions dropped by validation
    pub dropped_records_total: IntCounter,
    /// Prometheus registry for metrics
    pub registry: Arc<Registry>,
}

impl RefreshMetrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let refresh_total = IntCounterVec::new(
            Opts::new("relay_refresh_total", "Registry refreshes attempted"),
            &["outcome"],
        )?;

        let refresh_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "relay_refresh_duration_seconds",
            "Registry refresh duration in seconds",
        ))?;

        let registry_records = IntGauge::new(
            "relay_registry_records",
            "Servers in the published registry snapshot",
        )?;

        let dropped_records_total = IntCounter::new(
            "relay_refresh_dropped_records_total",
            "Server definitions dropped as invalid",
        )?;

        registry.register(Box::new(refresh_total.clone()))?;
        registry.register(Box::new(refresh_duration_seconds.clone()))?;
        registry.register(Box::new(registry_records.clone()))?;
        registry.register(Box::new(dropped_records_total.clone()))?;

        // Export every outcome series from the start
        for outcome in [OUTCOME_SUCCESS, OUTCOME_FAILURE, OUTCOME_CANCELLED] {
            refresh_total.with_label_values(&[outcome]);
        }

        Ok(Self {
            refresh_total,
            refresh_duration_seconds,
            registry_records,
            dropped_records_total,
            registry,
        })
    }

    pub fn record_success(&self, records: usize, dropped: usize, duration: Duration) {
        self.refresh_total.with_label_values(&[OUTCOME_SUCCESS]).inc();
        self.refresh_duration_seconds.observe(duration.as_secs_f64());
        self.registry_records.set(records as i64);
        self.dropped_records_total.inc_by(dropped as u64);
    }

    pub fn record_failure(&self, dropped: usize) {
        self.refresh_total.with_label_values(&[OUTCOME_FAILURE]).inc();
        self.dropped_records_total.inc_by(dropped as u64);
    }

    pub fn record_cancelled(&self) {
        self.refresh_total.with_label_values(&[OUTCOME_CANCELLED]).inc();
    }

    /// Count of refreshes with the given outcome
    pub fn refresh_count(&self, outcome: &str) -> u64 {
        self.refresh_total.with_label_values(&[outcome]).get()
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
