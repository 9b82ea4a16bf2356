//! Anomaly detectors for sensor readings
//!
//! This module provides detection for:
//! - Statistical outliers (z-score distance from the baseline mean)
//! - Sudden spikes or drops (rate of change between consecutive readings)
//!
//! Both detectors are pure functions of a stats snapshot and abstain,
//! rather than erroring, when the data is insufficient.

mod rate_of_change;
mod zscore;

pub use rate_of_change::RateOfChangeDetector;
pub use zscore::ZScoreDetector;
