//! Anomaly detection engine for environmental sensor readings
//!
//! This crate provides the core functionality for:
//! - Rolling statistical baselines over recent readings
//! - Z-score and rate-of-change anomaly detection
//! - Orchestration, deduplication and severity grading
//! - Observability (structured logging and Prometheus metrics)
//!
//! Ingestion, storage and scheduling live in collaborators behind the
//! [`ReadingsSource`] and [`AnomalySink`] traits.

pub mod baseline;
pub mod config;
pub mod detector;
pub mod engine;
pub mod models;
pub mod observability;
pub mod stats;

pub use baseline::{BaselineCache, BaselineSnapshot, MetricBaseline, ReadingsSource};
pub use config::{ConfigError, EngineConfig};
pub use detector::{RateOfChangeDetector, ZScoreDetector};
pub use engine::{AnomalyEngine, AnomalySink, BatchAnalysis, RescanReport};
pub use models::{
    AnalysisSummary, Anomaly, AnomalyCounts, DetectionMethod, Metric, SensorReading, Severity,
};
pub use observability::EngineMetrics;
pub use stats::SampleStats;
