//! Rolling statistical baseline over recent readings
//!
//! The cache holds one immutable [`BaselineSnapshot`] behind a lock and
//! replaces it wholesale on refresh, so concurrent detection reads always
//! see a complete, consistent window and never a half-updated one.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::models::{Metric, SensorReading};
use crate::stats::SampleStats;

/// External store of historical readings
///
/// The single point of interaction with reading storage; the engine never
/// touches persistence directly.
#[async_trait]
pub trait ReadingsSource: Send + Sync {
    /// Fetch the most recent readings, newest first
    async fn fetch_recent(&self, limit: usize) -> Result<Vec<SensorReading>>;
}

/// Baseline state for one metric
#[derive(Debug, Clone, Default)]
pub struct MetricBaseline {
    /// Stats over the filtered window; all-zero when the metric had no data
    pub stats: SampleStats,
    /// Most recent present value, for rate-of-change comparison
    pub last_value: Option<f64>,
}

/// One consistent view of the baseline window
#[derive(Debug, Clone, Default)]
pub struct BaselineSnapshot {
    /// The fetched window, chronological (oldest first)
    pub window: Vec<SensorReading>,
    pub temperature: MetricBaseline,
    pub humidity: MetricBaseline,
    /// When the window was last fetched; `None` before the first refresh
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl BaselineSnapshot {
    /// Build a snapshot from a chronologically ordered window
    pub fn from_window(
        window: Vec<SensorReading>,
        now: DateTime<Utc>,
        zero_is_missing: bool,
    ) -> Self {
        let temperature = metric_baseline(&window, Metric::Temperature, zero_is_missing);
        let humidity = metric_baseline(&window, Metric::Humidity, zero_is_missing);
        Self {
            window,
            temperature,
            humidity,
            refreshed_at: Some(now),
        }
    }

    /// Baseline state for one metric
    pub fn metric(&self, metric: Metric) -> &MetricBaseline {
        match metric {
            Metric::Temperature => &self.temperature,
            Metric::Humidity => &self.humidity,
        }
    }
}

fn metric_baseline(
    window: &[SensorReading],
    metric: Metric,
    zero_is_missing: bool,
) -> MetricBaseline {
    let values: Vec<f64> = window
        .iter()
        .filter_map(|r| r.metric_value(metric, zero_is_missing))
        .collect();
    MetricBaseline {
        stats: SampleStats::compute(&values),
        last_value: values.last().copied(),
    }
}

/// Cache of the most recent reading window and its derived statistics
///
/// Shared between the live per-reading check and the periodic re-scan;
/// both paths read the same snapshot and either may trigger a refresh.
pub struct BaselineCache {
    window_size: usize,
    max_age: Duration,
    zero_is_missing: bool,
    snapshot: RwLock<Arc<BaselineSnapshot>>,
}

impl BaselineCache {
    pub fn new(window_size: usize, max_age: Duration, zero_is_missing: bool) -> Self {
        Self {
            window_size,
            max_age,
            zero_is_missing,
            snapshot: RwLock::new(Arc::new(BaselineSnapshot::default())),
        }
    }

    /// Current snapshot; cheap to clone, safe to read during a refresh
    pub async fn snapshot(&self) -> Arc<BaselineSnapshot> {
        self.snapshot.read().await.clone()
    }

    /// True if no refresh has happened or the last one is older than `max_age`
    pub async fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let snapshot = self.snapshot.read().await;
        match snapshot.refreshed_at {
            None => true,
            Some(refreshed_at) => {
                let age = (now - refreshed_at).to_std().unwrap_or_default();
                age > self.max_age
            }
        }
    }

    /// Fetch the window and swap in a freshly computed snapshot
    ///
    /// A fetch failure leaves the previous snapshot in place, stale but
    /// valid; the error is returned for the caller to report.
    pub async fn refresh(&self, source: &dyn ReadingsSource, now: DateTime<Utc>) -> Result<()> {
        let mut window = source
            .fetch_recent(self.window_size)
            .await
            .context("baseline refresh: fetching recent readings failed")?;

        // Source returns newest first; detectors scan oldest first
        window.reverse();

        let next = BaselineSnapshot::from_window(window, now, self.zero_is_missing);
        debug!(
            readings = next.window.len(),
            temperature_samples = next.temperature.stats.count,
            humidity_samples = next.humidity.stats.count,
            "Baseline refreshed"
        );

        *self.snapshot.write().await = Arc::new(next);
        Ok(())
    }

    /// Record a live reading's values as the new most-recent per metric
    ///
    /// Keeps consecutive live readings comparable for rate-of-change
    /// without refetching the whole window. Absent metrics leave the
    /// previous value in place.
    pub async fn observe(&self, reading: &SensorReading) {
        let mut guard = self.snapshot.write().await;
        let mut next = (**guard).clone();
        if let Some(value) = reading.metric_value(Metric::Temperature, self.zero_is_missing) {
            next.temperature.last_value = Some(value);
        }
        if let Some(value) = reading.metric_value(Metric::Humidity, self.zero_is_missing) {
            next.humidity.last_value = Some(value);
        }
        *guard = Arc::new(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex;

    struct FixedSource {
        readings: Vec<SensorReading>,
    }

    impl FixedSource {
        fn new(readings: Vec<SensorReading>) -> Self {
            Self { readings }
        }
    }

    #[async_trait]
    impl ReadingsSource for FixedSource {
        async fn fetch_recent(&self, limit: usize) -> Result<Vec<SensorReading>> {
            // Newest first, like the external store
            let mut newest_first = self.readings.clone();
            newest_first.reverse();
            newest_first.truncate(limit);
            Ok(newest_first)
        }
    }

    struct FailingSource {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl ReadingsSource for FailingSource {
        async fn fetch_recent(&self, _limit: usize) -> Result<Vec<SensorReading>> {
            *self.calls.lock().unwrap() += 1;
            anyhow::bail!("store unavailable")
        }
    }

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, minute, 0).unwrap()
    }

    fn readings() -> Vec<SensorReading> {
        (0..20)
            .map(|i| {
                SensorReading::new(
                    i as i64,
                    ts(i),
                    Some(24.0 + (i % 3) as f64 * 0.1),
                    Some(55.0 + (i % 4) as f64 * 0.5),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_refresh_builds_per_metric_stats() {
        let cache = BaselineCache::new(500, Duration::from_secs(300), false);
        let source = FixedSource::new(readings());

        cache.refresh(&source, ts(30)).await.unwrap();

        let snapshot = cache.snapshot().await;
        assert_eq!(snapshot.window.len(), 20);
        assert_eq!(snapshot.temperature.stats.count, 20);
        assert_eq!(snapshot.humidity.stats.count, 20);
        assert_eq!(snapshot.refreshed_at, Some(ts(30)));
        // Window is chronological after the newest-first fetch
        assert_eq!(snapshot.window.first().unwrap().id, 0);
        assert_eq!(snapshot.window.last().unwrap().id, 19);
    }

    #[tokio::test]
    async fn test_window_limit_keeps_newest() {
        let cache = BaselineCache::new(5, Duration::from_secs(300), false);
        let source = FixedSource::new(readings());

        cache.refresh(&source, ts(30)).await.unwrap();

        let snapshot = cache.snapshot().await;
        assert_eq!(snapshot.window.len(), 5);
        assert_eq!(snapshot.window.first().unwrap().id, 15);
        assert_eq!(snapshot.window.last().unwrap().id, 19);
    }

    #[tokio::test]
    async fn test_missing_metric_filtered_independently() {
        let mut rs = readings();
        // Drop humidity from half the readings; temperature window unaffected
        for r in rs.iter_mut().filter(|r| r.id % 2 == 0) {
            r.humidity = None;
        }
        let cache = BaselineCache::new(500, Duration::from_secs(300), false);
        let source = FixedSource::new(rs);

        cache.refresh(&source, ts(30)).await.unwrap();

        let snapshot = cache.snapshot().await;
        assert_eq!(snapshot.temperature.stats.count, 20);
        assert_eq!(snapshot.humidity.stats.count, 10);
    }

    #[tokio::test]
    async fn test_all_missing_metric_is_sentinel() {
        let mut rs = readings();
        for r in rs.iter_mut() {
            r.humidity = None;
        }
        let cache = BaselineCache::new(500, Duration::from_secs(300), false);
        let source = FixedSource::new(rs);

        cache.refresh(&source, ts(30)).await.unwrap();

        let snapshot = cache.snapshot().await;
        assert_eq!(snapshot.humidity.stats.count, 0);
        assert_eq!(snapshot.humidity.stats.mean, 0.0);
        assert_eq!(snapshot.humidity.last_value, None);
    }

    #[tokio::test]
    async fn test_staleness() {
        let cache = BaselineCache::new(500, Duration::from_secs(300), false);
        // Never refreshed
        assert!(cache.is_stale(ts(0)).await);

        let source = FixedSource::new(readings());
        cache.refresh(&source, ts(0)).await.unwrap();

        // Exactly at max_age is not yet stale (strictly greater)
        assert!(!cache.is_stale(ts(5)).await);
        assert!(cache.is_stale(ts(6)).await);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let cache = BaselineCache::new(500, Duration::from_secs(300), false);
        let source = FixedSource::new(readings());
        cache.refresh(&source, ts(0)).await.unwrap();

        let failing = FailingSource {
            calls: Mutex::new(0),
        };
        let result = cache.refresh(&failing, ts(10)).await;
        assert!(result.is_err());

        // Stale-but-valid: the old window and stats are still served
        let snapshot = cache.snapshot().await;
        assert_eq!(snapshot.window.len(), 20);
        assert_eq!(snapshot.refreshed_at, Some(ts(0)));
    }

    #[tokio::test]
    async fn test_observe_updates_last_values() {
        let cache = BaselineCache::new(500, Duration::from_secs(300), false);
        let source = FixedSource::new(readings());
        cache.refresh(&source, ts(0)).await.unwrap();

        let live = SensorReading::new(100, ts(21), Some(26.0), None);
        cache.observe(&live).await;

        let snapshot = cache.snapshot().await;
        assert_eq!(snapshot.temperature.last_value, Some(26.0));
        // Absent humidity leaves the previous value in place
        assert!(snapshot.humidity.last_value.is_some());
        assert_ne!(snapshot.humidity.last_value, Some(26.0));
    }

    #[tokio::test]
    async fn test_zero_policy_filters_window() {
        let mut rs = readings();
        rs[5].temperature = Some(0.0);
        let cache = BaselineCache::new(500, Duration::from_secs(300), true);
        let source = FixedSource::new(rs);

        cache.refresh(&source, ts(30)).await.unwrap();

        let snapshot = cache.snapshot().await;
        assert_eq!(snapshot.temperature.stats.count, 19);
    }
}
