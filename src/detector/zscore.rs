//! Z-score outlier detection
//!
//! Flags readings whose distance from the baseline mean, in standard
//! deviation units, exceeds a configurable threshold. An effective minimum
//! standard deviation per metric guards against false positives during
//! unnaturally stable stretches where the true std rounds to near zero.

use crate::config::EngineConfig;
use crate::models::{Anomaly, DetectionMethod, Metric, SensorReading, Severity};
use crate::stats::{round2, SampleStats};

/// Z-score above which an anomaly is graded high
const SEVERITY_HIGH: f64 = 4.0;

/// Z-score above which an anomaly is graded medium
const SEVERITY_MEDIUM: f64 = 3.5;

/// Detects readings too many standard deviations from the baseline mean
pub struct ZScoreDetector {
    /// Number of standard deviations to consider anomalous (strict `>`)
    pub threshold: f64,
    /// Minimum window samples before detection activates
    pub min_samples: usize,
    temp_std_floor: f64,
    humidity_std_floor: f64,
    zero_is_missing: bool,
}

impl ZScoreDetector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            threshold: config.zscore_threshold,
            min_samples: config.min_samples,
            temp_std_floor: config.temp_std_floor,
            humidity_std_floor: config.humidity_std_floor,
            zero_is_missing: config.zero_is_missing,
        }
    }

    fn std_floor(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Temperature => self.temp_std_floor,
            Metric::Humidity => self.humidity_std_floor,
        }
    }

    /// Check one reading's metric against a stats snapshot
    ///
    /// Returns `None` when the metric is absent, the window is too small,
    /// or the effective std is zero (truly no spread and no floor).
    pub fn detect_one(
        &self,
        reading: &SensorReading,
        metric: Metric,
        stats: &SampleStats,
    ) -> Option<Anomaly> {
        let value = reading.metric_value(metric, self.zero_is_missing)?;
        if stats.is_insufficient(self.min_samples) {
            return None;
        }

        let effective_std = stats.std.max(self.std_floor(metric));
        if effective_std <= 0.0 {
            return None;
        }

        let z = (value - stats.mean).abs() / effective_std;
        if z <= self.threshold {
            return None;
        }

        let severity = if z > SEVERITY_HIGH {
            Severity::High
        } else if z > SEVERITY_MEDIUM {
            Severity::Medium
        } else {
            Severity::Low
        };

        Some(Anomaly {
            reading_id: reading.id,
            timestamp: reading.timestamp,
            metric,
            value,
            expected_range: (
                round2(stats.mean - 2.0 * effective_std),
                round2(stats.mean + 2.0 * effective_std),
            ),
            deviation: round2(z),
            detection_method: DetectionMethod::ZScore,
            severity,
            message: format!(
                "{} of {} is {:.1} standard deviations from mean ({:.1})",
                metric.capitalized(),
                value,
                z,
                stats.mean
            ),
        })
    }

    /// Scan a chronologically ordered window against one fixed stats snapshot
    ///
    /// Stats are computed once for the whole window by the caller, not
    /// recomputed per reading.
    pub fn detect_batch(
        &self,
        readings: &[SensorReading],
        metric: Metric,
        stats: &SampleStats,
    ) -> Vec<Anomaly> {
        readings
            .iter()
            .filter_map(|reading| self.detect_one(reading, metric, stats))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn detector_without_floors() -> ZScoreDetector {
        ZScoreDetector::new(&EngineConfig::default().without_std_floors())
    }

    fn baseline(mean: f64, std: f64) -> SampleStats {
        SampleStats {
            mean,
            std,
            min: mean - std,
            max: mean + std,
            q1: mean - std,
            q3: mean + std,
            iqr: 2.0 * std,
            count: 50,
        }
    }

    fn reading(id: i64, temp: f64) -> SensorReading {
        SensorReading::new(
            id,
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            Some(temp),
            None,
        )
    }

    #[test]
    fn test_eight_sigma_is_high() {
        let detector = detector_without_floors();
        let stats = baseline(24.0, 1.0);

        let anomaly = detector
            .detect_one(&reading(1, 32.0), Metric::Temperature, &stats)
            .unwrap();

        assert_eq!(anomaly.deviation, 8.0);
        assert_eq!(anomaly.severity, Severity::High);
        assert_eq!(anomaly.detection_method, DetectionMethod::ZScore);
        assert_eq!(anomaly.expected_range, (22.0, 26.0));
        assert!(anomaly.message.contains("Temperature"));
        assert!(anomaly.message.contains("8.0 standard deviations"));
        assert!(anomaly.message.contains("24.0"));
    }

    #[test]
    fn test_below_threshold_not_flagged() {
        let detector = detector_without_floors();
        let stats = baseline(24.0, 1.0);

        // z = 2.5, below the 3.0 threshold
        assert!(detector
            .detect_one(&reading(1, 26.5), Metric::Temperature, &stats)
            .is_none());
    }

    #[test]
    fn test_threshold_boundary_is_strict() {
        let detector = detector_without_floors();
        let stats = baseline(24.0, 1.0);

        // Exactly 3.0 standard deviations: not anomalous
        assert!(detector
            .detect_one(&reading(1, 27.0), Metric::Temperature, &stats)
            .is_none());

        // Just past the threshold: flagged low
        let anomaly = detector
            .detect_one(&reading(1, 27.0001), Metric::Temperature, &stats)
            .unwrap();
        assert_eq!(anomaly.severity, Severity::Low);
    }

    #[test]
    fn test_severity_grades() {
        let detector = detector_without_floors();
        let stats = baseline(24.0, 1.0);

        let low = detector
            .detect_one(&reading(1, 27.2), Metric::Temperature, &stats)
            .unwrap();
        assert_eq!(low.severity, Severity::Low);

        let medium = detector
            .detect_one(&reading(1, 27.7), Metric::Temperature, &stats)
            .unwrap();
        assert_eq!(medium.severity, Severity::Medium);

        let high = detector
            .detect_one(&reading(1, 28.5), Metric::Temperature, &stats)
            .unwrap();
        assert_eq!(high.severity, Severity::High);
    }

    #[test]
    fn test_insufficient_samples_abstains() {
        let detector = detector_without_floors();
        let stats = SampleStats {
            count: 9,
            ..baseline(24.0, 1.0)
        };

        assert!(detector
            .detect_one(&reading(1, 40.0), Metric::Temperature, &stats)
            .is_none());
    }

    #[test]
    fn test_zero_std_without_floor_abstains() {
        let detector = detector_without_floors();
        let stats = baseline(24.0, 0.0);

        assert!(detector
            .detect_one(&reading(1, 40.0), Metric::Temperature, &stats)
            .is_none());
    }

    #[test]
    fn test_std_floor_applies_at_evaluation() {
        // Default config carries the 0.5 degree temperature floor
        let detector = ZScoreDetector::new(&EngineConfig::default());
        let stats = baseline(24.0, 0.1);

        // Raw std would give z = 10; the floor gives z = 2.0, not anomalous
        assert!(detector
            .detect_one(&reading(1, 25.0), Metric::Temperature, &stats)
            .is_none());

        // Far enough out to clear the floored threshold: z = 8.0
        let anomaly = detector
            .detect_one(&reading(1, 28.0), Metric::Temperature, &stats)
            .unwrap();
        assert_eq!(anomaly.deviation, 8.0);
        // Expected range is derived from the effective std, not the raw one
        assert_eq!(anomaly.expected_range, (23.0, 25.0));
    }

    #[test]
    fn test_absent_value_skipped() {
        let detector = detector_without_floors();
        let stats = baseline(24.0, 1.0);
        let r = SensorReading::new(
            1,
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            None,
            Some(60.0),
        );

        assert!(detector.detect_one(&r, Metric::Temperature, &stats).is_none());
    }

    #[test]
    fn test_batch_scan_uses_fixed_stats() {
        let detector = detector_without_floors();
        let stats = baseline(24.0, 1.0);
        let readings: Vec<SensorReading> = vec![
            reading(1, 24.2),
            reading(2, 32.0),
            reading(3, 23.8),
            reading(4, 16.0),
        ];

        let anomalies = detector.detect_batch(&readings, Metric::Temperature, &stats);
        assert_eq!(anomalies.len(), 2);
        assert_eq!(anomalies[0].reading_id, 2);
        assert_eq!(anomalies[1].reading_id, 4);
        assert_eq!(anomalies[1].deviation, 8.0);
    }
}
