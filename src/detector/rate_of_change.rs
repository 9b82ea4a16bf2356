//! Rate-of-change detection
//!
//! Flags readings that moved too far from the immediately preceding reading
//! of the same metric. The very first reading of a window has no prior and
//! cannot be flagged; gaps (absent values) never act as a previous value.

use crate::config::EngineConfig;
use crate::models::{Anomaly, DetectionMethod, Metric, SensorReading, Severity};
use crate::stats::round2;

/// Multiple of the threshold above which an anomaly is graded high
const SEVERITY_HIGH_FACTOR: f64 = 2.0;

/// Multiple of the threshold above which an anomaly is graded medium
const SEVERITY_MEDIUM_FACTOR: f64 = 1.5;

/// Detects sudden changes between consecutive readings of one metric
pub struct RateOfChangeDetector {
    /// Max degrees of change between temperature readings
    pub temp_threshold: f64,
    /// Max percent of change between humidity readings
    pub humidity_threshold: f64,
    zero_is_missing: bool,
}

impl RateOfChangeDetector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            temp_threshold: config.temp_rate_threshold,
            humidity_threshold: config.humidity_rate_threshold,
            zero_is_missing: config.zero_is_missing,
        }
    }

    /// Per-metric change threshold
    pub fn threshold(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Temperature => self.temp_threshold,
            Metric::Humidity => self.humidity_threshold,
        }
    }

    /// Compare one reading against the previous value of the same metric
    pub fn detect_one(
        &self,
        reading: &SensorReading,
        metric: Metric,
        previous: f64,
    ) -> Option<Anomaly> {
        let value = reading.metric_value(metric, self.zero_is_missing)?;
        let threshold = self.threshold(metric);

        let delta = (value - previous).abs();
        if delta <= threshold {
            return None;
        }

        let severity = if delta > threshold * SEVERITY_HIGH_FACTOR {
            Severity::High
        } else if delta > threshold * SEVERITY_MEDIUM_FACTOR {
            Severity::Medium
        } else {
            Severity::Low
        };

        Some(Anomaly {
            reading_id: reading.id,
            timestamp: reading.timestamp,
            metric,
            value,
            expected_range: (round2(previous - threshold), round2(previous + threshold)),
            deviation: round2(delta),
            detection_method: DetectionMethod::RateOfChange,
            severity,
            message: format!(
                "{} changed by {:.1} (from {:.1} to {:.1}) - exceeds threshold of {}",
                metric.capitalized(),
                delta,
                previous,
                value,
                threshold
            ),
        })
    }

    /// Scan adjacent pairs of a chronologically ordered window
    pub fn detect_batch(&self, readings: &[SensorReading], metric: Metric) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();
        let mut previous: Option<f64> = None;

        for reading in readings {
            let Some(value) = reading.metric_value(metric, self.zero_is_missing) else {
                // A gap is not a previous value of zero; keep the last
                // present value for the next comparison
                continue;
            };

            if let Some(prev) = previous {
                if let Some(anomaly) = self.detect_one(reading, metric, prev) {
                    anomalies.push(anomaly);
                }
            }
            previous = Some(value);
        }

        anomalies
    }
}
