//! Results store for analytics output
//!
//! Keys:
//! - forecasts by `(entity_id, metric, generated_at)`
//! - anomaly flags by `(entity_id, metric, timestamp)`, one flag per method
//! - correlations by `(entity_pair, window_start)`, all lags of the window
//!
//! Forecast batches replace what was stored under the same key. Anomaly and
//! correlation runs replace everything stored for their scope (series and
//! method, or entity pair, over the analysed range), so a re-run that finds
//! less leaves nothing stale behind.

use crate::anomaly::AnomalyFlag;
use crate::correlation::CorrelationResult;
use crate::error::Result;
use crate::forecast::ForecastResult;
use chrono::{DateTime, Utc};
use medallion::{PipelineError, SeriesKey, TimeRange};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

type SeriesInstant = (String, String, DateTime<Utc>);
type PairWindow = ((String, String), DateTime<Utc>);

pub trait ResultsStore: Send + Sync {
    /// Store forecast steps, replacing earlier batches with the same key
    fn save_forecasts(&self, results: &[ForecastResult]) -> Result<()>;
    /// Forecasts generated for a series inside `generated`, by generation time then horizon
    fn read_forecasts(&self, entity_id: &str, metric: &str, generated: &TimeRange) -> Result<Vec<ForecastResult>>;

    /// Replace the `method` flags of `key` inside `range` with `flags`
    fn save_anomalies(&self, key: &SeriesKey, method: &str, range: &TimeRange, flags: &[AnomalyFlag]) -> Result<()>;
    /// Flags of a series whose timestamp falls in `range`
    fn read_anomalies(&self, entity_id: &str, metric: &str, range: &TimeRange) -> Result<Vec<AnomalyFlag>>;

    /// Replace the windows of `entity_pair` starting inside `range` with `results`
    fn save_correlations(
        &self,
        entity_pair: (&str, &str),
        range: &TimeRange,
        results: &[CorrelationResult],
    ) -> Result<()>;
    /// Correlations of an entity pair whose window starts in `range`
    fn read_correlations(&self, entity_pair: (&str, &str), range: &TimeRange) -> Result<Vec<CorrelationResult>>;
}

/// In-memory results store
#[derive(Debug, Default)]
pub struct MemoryResultsStore {
    forecasts: RwLock<BTreeMap<SeriesInstant, Vec<ForecastResult>>>,
    anomalies: RwLock<BTreeMap<SeriesInstant, Vec<AnomalyFlag>>>,
    correlations: RwLock<BTreeMap<PairWindow, Vec<CorrelationResult>>>,
    offline: AtomicBool,
}

impl MemoryResultsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(PipelineError::store_unavailable("results", "store is offline").into());
        }
        Ok(())
    }
}

impl ResultsStore for MemoryResultsStore {
    fn save_forecasts(&self, results: &[ForecastResult]) -> Result<()> {
        self.check()?;
        let mut batches: BTreeMap<SeriesInstant, Vec<ForecastResult>> = BTreeMap::new();
        for result in results {
            batches
                .entry((result.entity_id.clone(), result.metric.clone(), result.generated_at))
                .or_default()
                .push(result.clone());
        }

        let mut guard = self.forecasts.write();
        for (key, mut batch) in batches {
            batch.sort_by_key(|r| r.horizon_timestamp);
            guard.insert(key, batch);
        }
        Ok(())
    }

    fn read_forecasts(&self, entity_id: &str, metric: &str, generated: &TimeRange) -> Result<Vec<ForecastResult>> {
        self.check()?;
        let lower = (entity_id.to_string(), metric.to_string(), generated.start);
        let upper = (entity_id.to_string(), metric.to_string(), generated.end);
        Ok(self
            .forecasts
            .read()
            .range(lower..upper)
            .flat_map(|(_, batch)| batch.iter().cloned())
            .collect())
    }

    fn save_anomalies(&self, key: &SeriesKey, method: &str, range: &TimeRange, flags: &[AnomalyFlag]) -> Result<()> {
        self.check()?;
        let mut guard = self.anomalies.write();

        let lower = (key.entity_id.clone(), key.metric.clone(), range.start);
        let upper = (key.entity_id.clone(), key.metric.clone(), range.end);
        for stored in guard.range_mut(lower..upper).map(|(_, stored)| stored) {
            stored.retain(|existing| existing.method != method);
        }
        guard.retain(|_, stored| !stored.is_empty());

        for flag in flags {
            let stored = guard
                .entry((flag.entity_id.clone(), flag.metric.clone(), flag.timestamp))
                .or_default();
            stored.retain(|existing| existing.method != flag.method);
            stored.push(flag.clone());
            stored.sort_by(|a, b| a.method.cmp(&b.method));
        }
        Ok(())
    }

    fn read_anomalies(&self, entity_id: &str, metric: &str, range: &TimeRange) -> Result<Vec<AnomalyFlag>> {
        self.check()?;
        let lower = (entity_id.to_string(), metric.to_string(), range.start);
        let upper = (entity_id.to_string(), metric.to_string(), range.end);
        Ok(self
            .anomalies
            .read()
            .range(lower..upper)
            .flat_map(|(_, flags)| flags.iter().cloned())
            .collect())
    }

    fn save_correlations(
        &self,
        entity_pair: (&str, &str),
        range: &TimeRange,
        results: &[CorrelationResult],
    ) -> Result<()> {
        self.check()?;
        let mut windows: BTreeMap<PairWindow, Vec<CorrelationResult>> = BTreeMap::new();
        for result in results {
            windows
                .entry((result.entity_pair.clone(), result.window_start))
                .or_default()
                .push(result.clone());
        }

        let pair = (entity_pair.0.to_string(), entity_pair.1.to_string());
        let mut guard = self.correlations.write();
        guard.retain(|(stored_pair, start), _| *stored_pair != pair || !range.contains(*start));
        for (key, mut window) in windows {
            window.sort_by_key(|r| r.lag);
            guard.insert(key, window);
        }
        Ok(())
    }

    fn read_correlations(&self, entity_pair: (&str, &str), range: &TimeRange) -> Result<Vec<CorrelationResult>> {
        self.check()?;
        let pair = (entity_pair.0.to_string(), entity_pair.1.to_string());
        Ok(self
            .correlations
            .read()
            .range((pair.clone(), range.start)..(pair, range.end))
            .flat_map(|(_, window)| window.iter().cloned())
            .collect())
    }
}
