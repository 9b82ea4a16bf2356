//! Core data models for the anomaly engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stats::SampleStats;

/// Sensor metric tracked by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Temperature,
    Humidity,
}

impl Metric {
    /// All metrics, in the order detectors scan them
    pub const ALL: [Metric; 2] = [Metric::Temperature, Metric::Humidity];

    /// Capitalized name for human-readable messages
    pub fn capitalized(&self) -> &'static str {
        match self {
            Metric::Temperature => "Temperature",
            Metric::Humidity => "Humidity",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::Temperature => write!(f, "temperature"),
            Metric::Humidity => write!(f, "humidity"),
        }
    }
}

/// One sensor sample at a point in time
///
/// A `None` value means the sensor failed to read that metric; it is
/// excluded from statistics and rate-of-change comparisons, never treated
/// as zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorReading {
    /// Unique, ordering-stable identifier
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
}

impl SensorReading {
    pub fn new(
        id: i64,
        timestamp: DateTime<Utc>,
        temperature: Option<f64>,
        humidity: Option<f64>,
    ) -> Self {
        Self {
            id,
            timestamp,
            temperature,
            humidity,
        }
    }

    /// Value of one metric, with non-finite readings treated as absent
    pub fn value(&self, metric: Metric) -> Option<f64> {
        self.metric_value(metric, false)
    }

    /// Value of one metric under the configured missing-data policy
    ///
    /// Non-finite values are always absent. When `zero_is_missing` is set,
    /// exact zeros are also treated as sensor errors (opt-in, some sensor
    /// firmwares report failed reads as 0).
    pub fn metric_value(&self, metric: Metric, zero_is_missing: bool) -> Option<f64> {
        let raw = match metric {
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
        };
        raw.filter(|v| v.is_finite())
            .filter(|v| !(zero_is_missing && *v == 0.0))
    }
}

/// How an anomaly was detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    #[serde(rename = "zscore")]
    ZScore,
    RateOfChange,
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectionMethod::ZScore => write!(f, "zscore"),
            DetectionMethod::RateOfChange => write!(f, "rate_of_change"),
        }
    }
}

/// Coarse grading of how far a deviation exceeds its threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// One detection result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub reading_id: i64,
    pub timestamp: DateTime<Utc>,
    pub metric: Metric,
    pub value: f64,
    /// [low, high] range the detector considered normal
    pub expected_range: (f64, f64),
    /// Z-score or absolute delta, rounded to 2 decimals
    pub deviation: f64,
    pub detection_method: DetectionMethod,
    pub severity: Severity,
    pub message: String,
}

/// Anomaly counts broken down by severity, metric and method
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnomalyCounts {
    pub total: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub temperature: usize,
    pub humidity: usize,
    pub zscore: usize,
    pub rate_of_change: usize,
}

impl AnomalyCounts {
    /// Tally counts over a set of anomalies
    pub fn tally(anomalies: &[Anomaly]) -> Self {
        let mut counts = AnomalyCounts {
            total: anomalies.len(),
            ..Default::default()
        };
        for anomaly in anomalies {
            match anomaly.severity {
                Severity::High => counts.high += 1,
                Severity::Medium => counts.medium += 1,
                Severity::Low => counts.low += 1,
            }
            match anomaly.metric {
                Metric::Temperature => counts.temperature += 1,
                Metric::Humidity => counts.humidity += 1,
            }
            match anomaly.detection_method {
                DetectionMethod::ZScore => counts.zscore += 1,
                DetectionMethod::RateOfChange => counts.rate_of_change += 1,
            }
        }
        counts
    }
}

/// Summary of one analysis pass over a reading window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSummary {
    /// Number of readings in the analyzed window
    pub readings_analyzed: usize,
    /// Oldest timestamp in the window
    pub window_start: Option<DateTime<Utc>>,
    /// Newest timestamp in the window
    pub window_end: Option<DateTime<Utc>>,
    pub temperature: SampleStats,
    pub humidity: SampleStats,
    pub anomalies: AnomalyCounts,
}

impl AnalysisSummary {
    /// Build a summary from a chronologically ordered window
    pub fn build(
        readings: &[SensorReading],
        temperature: SampleStats,
        humidity: SampleStats,
        anomalies: &[Anomaly],
    ) -> Self {
        Self {
            readings_analyzed: readings.len(),
            window_start: readings.first().map(|r| r.timestamp),
            window_end: readings.last().map(|r| r.timestamp),
            temperature,
            humidity,
            anomalies: AnomalyCounts::tally(anomalies),
        }
    }
}
