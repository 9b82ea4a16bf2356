//! Descriptive statistics over a bounded numeric sample
//!
//! Detectors consume a [`SampleStats`] snapshot rather than the raw sample,
//! so one computation serves a whole batch scan.

use serde::{Deserialize, Serialize};

/// Round to 2 decimal places (reported deviations and expected ranges)
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Mean, population standard deviation, range and quartiles of a sample
///
/// The all-zero value (count 0) is the "insufficient data" sentinel, not a
/// degenerate distribution; callers must check `count` before trusting it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleStats {
    pub mean: f64,
    /// Population standard deviation: sqrt(mean((x - mean)^2))
    pub std: f64,
    pub min: f64,
    pub max: f64,
    /// First quartile (25th percentile)
    pub q1: f64,
    /// Third quartile (75th percentile)
    pub q3: f64,
    /// Interquartile range
    pub iqr: f64,
    pub count: usize,
}

impl SampleStats {
    /// Compute stats over a sample; the caller pre-filters absent values
    ///
    /// Empty input yields the all-zero sentinel rather than an error.
    pub fn compute(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let q1 = percentile(&sorted, 25.0);
        let q3 = percentile(&sorted, 75.0);

        Self {
            mean,
            std: variance.sqrt(),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            q1,
            q3,
            iqr: q3 - q1,
            count: values.len(),
        }
    }

    /// True when the sample is too small for stable z-score detection
    pub fn is_insufficient(&self, min_samples: usize) -> bool {
        self.count < min_samples
    }
}

/// Percentile of a sorted sample, with linear interpolation between ranks
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }

    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = rank - lo as f64;
    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}
