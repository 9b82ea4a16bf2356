//! Anomaly detection orchestration
//!
//! Runs every detector over a reading or a batch, deduplicates by
//! `(reading id, detection method)`, sorts newest first and grades
//! severity. Two triggers share one engine: the live per-reading check
//! and the periodic full re-scan, both reading the same baseline cache.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::baseline::{BaselineCache, ReadingsSource};
use crate::config::{ConfigError, EngineConfig};
use crate::detector::{RateOfChangeDetector, ZScoreDetector};
use crate::models::{AnalysisSummary, Anomaly, Metric, SensorReading, Severity};
use crate::observability::EngineMetrics;
use crate::stats::SampleStats;

/// External log of detected anomalies
///
/// Best-effort collaborator: append failures are reported and swallowed,
/// never propagated as detection failures.
#[async_trait]
pub trait AnomalySink: Send + Sync {
    /// Persist a batch of anomaly records
    async fn append(&self, anomalies: &[Anomaly]) -> Result<()>;
}

/// Result of one batch analysis pass
#[derive(Debug, Clone)]
pub struct BatchAnalysis {
    /// Deduplicated anomalies, newest first, capped to the caller's limit
    pub anomalies: Vec<Anomaly>,
    /// Counts and window statistics over the full (uncapped) result set
    pub summary: AnalysisSummary,
}

/// Result of one periodic re-scan
#[derive(Debug, Clone)]
pub struct RescanReport {
    pub summary: AnalysisSummary,
    /// High-severity anomalies forwarded to the sink
    pub high_severity: Vec<Anomaly>,
}

/// Orchestrates detectors over live readings and historical batches
pub struct AnomalyEngine {
    config: EngineConfig,
    cache: BaselineCache,
    zscore: ZScoreDetector,
    rate: RateOfChangeDetector,
    source: Arc<dyn ReadingsSource>,
    sink: Arc<dyn AnomalySink>,
    metrics: EngineMetrics,
}

impl AnomalyEngine {
    /// Build an engine; the only failure surface is configuration
    pub fn new(
        config: EngineConfig,
        source: Arc<dyn ReadingsSource>,
        sink: Arc<dyn AnomalySink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            cache: BaselineCache::new(config.window_size, config.max_age, config.zero_is_missing),
            zscore: ZScoreDetector::new(&config),
            rate: RateOfChangeDetector::new(&config),
            config,
            source,
            sink,
            metrics: EngineMetrics::new(),
        })
    }

    /// Analyze a chronologically ordered batch of readings
    ///
    /// Statistics are computed once over the whole batch per metric, then
    /// every detector scans independently. The returned anomaly list is
    /// capped to `top_k`; the summary counts the full result set.
    pub fn analyze_batch(&self, readings: &[SensorReading], top_k: usize) -> BatchAnalysis {
        let start = Instant::now();

        let temp_stats = self.batch_stats(readings, Metric::Temperature);
        let humidity_stats = self.batch_stats(readings, Metric::Humidity);

        let mut anomalies = Vec::new();
        anomalies.extend(self.zscore.detect_batch(readings, Metric::Temperature, &temp_stats));
        anomalies.extend(self.zscore.detect_batch(readings, Metric::Humidity, &humidity_stats));
        anomalies.extend(self.rate.detect_batch(readings, Metric::Temperature));
        anomalies.extend(self.rate.detect_batch(readings, Metric::Humidity));

        let anomalies = dedup_newest_first(anomalies);
        let summary = AnalysisSummary::build(readings, temp_stats, humidity_stats, &anomalies);

        for anomaly in &anomalies {
            self.record_anomaly(anomaly);
        }

        let mut capped = anomalies;
        capped.truncate(top_k);

        self.metrics
            .observe_detection_latency(start.elapsed().as_secs_f64());
        debug!(
            readings = readings.len(),
            anomalies = summary.anomalies.total,
            returned = capped.len(),
            "Batch analysis complete"
        );

        BatchAnalysis {
            anomalies: capped,
            summary,
        }
    }

    /// Check one newly ingested reading against the baseline
    ///
    /// Refreshes the cache first if it has gone stale; a failed refresh
    /// falls back to the previous snapshot. Found anomalies are returned
    /// and forwarded to the sink best-effort.
    pub async fn check_reading(&self, reading: &SensorReading, now: DateTime<Utc>) -> Vec<Anomaly> {
        let start = Instant::now();
        self.metrics.inc_readings_checked();

        if self.cache.is_stale(now).await {
            self.refresh_baseline(now).await;
        }

        let snapshot = self.cache.snapshot().await;
        let mut anomalies = Vec::new();

        for metric in Metric::ALL {
            let baseline = snapshot.metric(metric);
            if let Some(anomaly) = self.zscore.detect_one(reading, metric, &baseline.stats) {
                anomalies.push(anomaly);
            }
            // No prior value for this metric yet: rate check abstains
            if let Some(previous) = baseline.last_value {
                if let Some(anomaly) = self.rate.detect_one(reading, metric, previous) {
                    anomalies.push(anomaly);
                }
            }
        }

        self.cache.observe(reading).await;

        for anomaly in &anomalies {
            self.record_anomaly(anomaly);
        }
        if !anomalies.is_empty() {
            self.forward_to_sink(&anomalies).await;
        }

        self.metrics
            .observe_detection_latency(start.elapsed().as_secs_f64());
        anomalies
    }

    /// Periodic full re-scan over a freshly fetched window
    ///
    /// A reduced-noise safety net independent of the live path: forces a
    /// refresh, re-runs z-score detection across the window, and forwards
    /// only high-severity results to the sink.
    pub async fn rescan(&self, now: DateTime<Utc>) -> RescanReport {
        let start = Instant::now();
        self.metrics.inc_rescans();

        self.refresh_baseline(now).await;
        let snapshot = self.cache.snapshot().await;

        let mut anomalies = Vec::new();
        for metric in Metric::ALL {
            anomalies.extend(self.zscore.detect_batch(
                &snapshot.window,
                metric,
                &snapshot.metric(metric).stats,
            ));
        }
        let anomalies = dedup_newest_first(anomalies);

        for anomaly in &anomalies {
            self.record_anomaly(anomaly);
        }

        let high_severity: Vec<Anomaly> = anomalies
            .iter()
            .filter(|a| a.severity == Severity::High)
            .cloned()
            .collect();
        if !high_severity.is_empty() {
            self.forward_to_sink(&high_severity).await;
        }

        let summary = AnalysisSummary::build(
            &snapshot.window,
            snapshot.temperature.stats,
            snapshot.humidity.stats,
            &anomalies,
        );

        self.metrics
            .observe_detection_latency(start.elapsed().as_secs_f64());
        info!(
            readings = summary.readings_analyzed,
            anomalies = summary.anomalies.total,
            forwarded = high_severity.len(),
            "Periodic re-scan complete"
        );

        RescanReport {
            summary,
            high_severity,
        }
    }

    fn batch_stats(&self, readings: &[SensorReading], metric: Metric) -> SampleStats {
        let values: Vec<f64> = readings
            .iter()
            .filter_map(|r| r.metric_value(metric, self.config.zero_is_missing))
            .collect();
        SampleStats::compute(&values)
    }

    async fn refresh_baseline(&self, now: DateTime<Utc>) {
        match self.cache.refresh(self.source.as_ref(), now).await {
            Ok(()) => self.metrics.inc_baseline_refreshes(),
            Err(error) => {
                // Stale-but-valid: keep serving the previous snapshot
                warn!(error = %error, "Baseline refresh failed, keeping previous snapshot");
                self.metrics.inc_baseline_refresh_errors();
            }
        }
    }

    async fn forward_to_sink(&self, anomalies: &[Anomaly]) {
        if let Err(error) = self.sink.append(anomalies).await {
            warn!(
                error = %error,
                count = anomalies.len(),
                "Anomaly sink append failed, detection result unaffected"
            );
            self.metrics.inc_sink_errors();
        }
    }

    fn record_anomaly(&self, anomaly: &Anomaly) {
        self.metrics.inc_anomalies_detected(
            &anomaly.detection_method.to_string(),
            &anomaly.severity.to_string(),
        );
        match anomaly.severity {
            Severity::High => warn!(
                reading_id = anomaly.reading_id,
                metric = %anomaly.metric,
                method = %anomaly.detection_method,
                severity = %anomaly.severity,
                deviation = anomaly.deviation,
                value = anomaly.value,
                "High severity anomaly detected"
            ),
            _ => info!(
                reading_id = anomaly.reading_id,
                metric = %anomaly.metric,
                method = %anomaly.detection_method,
                severity = %anomaly.severity,
                deviation = anomaly.deviation,
                value = anomaly.value,
                "Anomaly detected"
            ),
        }
    }
}

/// Deduplicate by `(reading id, method)` keeping the first emission, then
/// stable-sort newest first
///
/// The same reading may legitimately carry one z-score and one
/// rate-of-change anomaly; it must never carry two of the same method.
fn dedup_newest_first(anomalies: Vec<Anomaly>) -> Vec<Anomaly> {
    let mut seen = HashSet::new();
    let mut unique: Vec<Anomaly> = anomalies
        .into_iter()
        .filter(|a| seen.insert((a.reading_id, a.detection_method)))
        .collect();
    unique.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    unique
}
