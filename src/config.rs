//! Engine configuration
//!
//! Configuration problems are the only failures the engine surfaces at
//! construction time; detection calls themselves never fail on bad data.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::models::Metric;

/// Default baseline window (most recent readings per metric)
pub const DEFAULT_WINDOW_SIZE: usize = 500;

/// Minimum samples required for z-score detection
pub const DEFAULT_MIN_SAMPLES: usize = 10;

/// Default staleness interval for the baseline cache (5 minutes)
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(5 * 60);

/// Z-score threshold in standard deviations
pub const DEFAULT_ZSCORE_THRESHOLD: f64 = 3.0;

/// Max degrees of change between consecutive temperature readings
pub const DEFAULT_TEMP_RATE_THRESHOLD: f64 = 2.0;

/// Max percent of change between consecutive humidity readings
pub const DEFAULT_HUMIDITY_RATE_THRESHOLD: f64 = 5.0;

/// Effective minimum standard deviation for temperature z-scores (degrees)
pub const DEFAULT_TEMP_STD_FLOOR: f64 = 0.5;

/// Effective minimum standard deviation for humidity z-scores (percent)
pub const DEFAULT_HUMIDITY_STD_FLOOR: f64 = 2.0;

/// Invalid engine configuration, surfaced at construction time
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("window size must be greater than zero")]
    InvalidWindowSize,
    #[error("minimum sample count must be greater than zero")]
    InvalidMinSamples,
    #[error("{name} threshold must be a finite positive number, got {value}")]
    InvalidThreshold { name: &'static str, value: f64 },
    #[error("{name} std floor must be a finite non-negative number, got {value}")]
    InvalidStdFloor { name: &'static str, value: f64 },
}

/// Anomaly engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Baseline window size per metric
    pub window_size: usize,
    /// Minimum samples before z-score detection activates
    pub min_samples: usize,
    /// Cache staleness interval
    pub max_age: Duration,
    /// Z-score threshold (standard deviations)
    pub zscore_threshold: f64,
    /// Rate-of-change threshold for temperature (degrees)
    pub temp_rate_threshold: f64,
    /// Rate-of-change threshold for humidity (percent)
    pub humidity_rate_threshold: f64,
    /// Effective std floor for temperature; 0.0 disables the floor
    pub temp_std_floor: f64,
    /// Effective std floor for humidity; 0.0 disables the floor
    pub humidity_std_floor: f64,
    /// Treat exact-zero readings as failed sensor reads
    pub zero_is_missing: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            min_samples: DEFAULT_MIN_SAMPLES,
            max_age: DEFAULT_MAX_AGE,
            zscore_threshold: DEFAULT_ZSCORE_THRESHOLD,
            temp_rate_threshold: DEFAULT_TEMP_RATE_THRESHOLD,
            humidity_rate_threshold: DEFAULT_HUMIDITY_RATE_THRESHOLD,
            temp_std_floor: DEFAULT_TEMP_STD_FLOOR,
            humidity_std_floor: DEFAULT_HUMIDITY_STD_FLOOR,
            zero_is_missing: false,
        }
    }
}

impl EngineConfig {
    /// Rate-of-change threshold for one metric
    pub fn rate_threshold(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Temperature => self.temp_rate_threshold,
            Metric::Humidity => self.humidity_rate_threshold,
        }
    }

    /// Effective std floor for one metric
    pub fn std_floor(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Temperature => self.temp_std_floor,
            Metric::Humidity => self.humidity_std_floor,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::InvalidWindowSize);
        }
        if self.min_samples == 0 {
            return Err(ConfigError::InvalidMinSamples);
        }

        let thresholds = [
            ("zscore", self.zscore_threshold),
            ("temperature rate", self.temp_rate_threshold),
            ("humidity rate", self.humidity_rate_threshold),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }

        let floors = [
            ("temperature", self.temp_std_floor),
            ("humidity", self.humidity_std_floor),
        ];
        for (name, value) in floors {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidStdFloor { name, value });
            }
        }

        Ok(())
    }

    /// Disable both effective-std floors (raw baseline std only)
    pub fn without_std_floors(mut self) -> Self {
        self.temp_std_floor = 0.0;
        self.humidity_std_floor = 0.0;
        self
    }
}
