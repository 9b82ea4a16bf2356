//! Observability infrastructure for the anomaly engine
//!
//! Prometheus metrics for detection throughput, baseline refreshes and
//! collaborator failures. Structured logging itself happens inline with
//! `tracing` at the call sites.

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};
use std::sync::OnceLock;

/// Histogram buckets for detection latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

struct EngineMetricsInner {
    detection_latency_seconds: Histogram,
    readings_checked: IntCounter,
    anomalies_detected: IntCounterVec,
    baseline_refreshes: IntCounter,
    baseline_refresh_errors: IntCounter,
    sink_errors: IntCounter,
    rescans: IntCounter,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            detection_latency_seconds: register_histogram!(
                "anomaly_engine_detection_latency_seconds",
                "Time spent running detectors over a reading or batch",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register detection_latency_seconds"),

            readings_checked: register_int_counter!(
                "anomaly_engine_readings_checked_total",
                "Total number of live readings checked"
            )
            .expect("Failed to register readings_checked_total"),

            anomalies_detected: register_int_counter_vec!(
                "anomaly_engine_anomalies_detected_total",
                "Total number of anomalies detected",
                &["method", "severity"]
            )
            .expect("Failed to register anomalies_detected_total"),

            baseline_refreshes: register_int_counter!(
                "anomaly_engine_baseline_refreshes_total",
                "Total number of baseline cache refreshes"
            )
            .expect("Failed to register baseline_refreshes_total"),

            baseline_refresh_errors: register_int_counter!(
                "anomaly_engine_baseline_refresh_errors_total",
                "Total number of failed baseline refreshes"
            )
            .expect("Failed to register baseline_refresh_errors_total"),

            sink_errors: register_int_counter!(
                "anomaly_engine_sink_errors_total",
                "Total number of failed anomaly sink appends"
            )
            .expect("Failed to register sink_errors_total"),

            rescans: register_int_counter!(
                "anomaly_engine_rescans_total",
                "Total number of periodic full re-scans"
            )
            .expect("Failed to register rescans_total"),
        }
    }
}

/// Engine metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Record a detection pass latency observation
    pub fn observe_detection_latency(&self, duration_secs: f64) {
        self.inner().detection_latency_seconds.observe(duration_secs);
    }

    /// Count one live reading check
    pub fn inc_readings_checked(&self) {
        self.inner().readings_checked.inc();
    }

    /// Count one detected anomaly by method and severity
    pub fn inc_anomalies_detected(&self, method: &str, severity: &str) {
        self.inner()
            .anomalies_detected
            .with_label_values(&[method, severity])
            .inc();
    }

    /// Count one successful baseline refresh
    pub fn inc_baseline_refreshes(&self) {
        self.inner().baseline_refreshes.inc();
    }

    /// Count one failed baseline refresh
    pub fn inc_baseline_refresh_errors(&self) {
        self.inner().baseline_refresh_errors.inc();
    }

    /// Count one failed sink append
    pub fn inc_sink_errors(&self) {
        self.inner().sink_errors.inc();
    }

    /// Count one periodic re-scan
    pub fn inc_rescans(&self) {
        self.inner().rescans.inc();
    }
}
