//! Stage runner
//!
//! [`Lakehouse`] wires the pipeline stages and analytics to a set of stores
//! and runs them for explicit (entity, metric, range) arguments. Every stage
//! reads its input from a store and writes its output to one, so any stage can
//! be re-run on its own.
//!
//! [`Lakehouse::refresh_batch`] refreshes silver and gold for many series on
//! `worker_threads` threads. Series are independent: one failing series is
//! reported and the rest carry on.

use crate::error::{LakeError, Result};
use chrono::{DateTime, Duration, Utc};
use energy_analytics::models::sarimax::Sarimax;
use energy_analytics::{
    series_spectrogram, snow_drift, AnomalyDetector, AnomalyFlag, CorrelationEngine, CorrelationResult,
    Decomposer, Decomposition, ForecastEngine, ForecastRequest, ForecastRun, MemoryResultsStore, ResultsStore,
    SnowDriftParams, SnowDriftReport, Spectrogram, WeatherInputs,
};
use medallion::csv_source::read_raw_csv;
use medallion::{
    align_pair, BronzeAdapter, BronzeReader, BronzeWriter, GoldAggregator, GoldSummary, IngestReport,
    MemoryBronzeStore, MemoryServingStore, MemorySeriesStore, MemorySummaryStore, PipelineConfig, RawRecord,
    SeriesKey, SeriesStore, ServingSink, ServingSync, SilverOutcome, SilverTransformer, SummaryStore,
    TimeRange,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{mpsc, Arc};
use std::thread;
use tracing::{info, info_span, warn};

pub const ANOMALY_TABLE: &str = "anomaly_flags";
pub const CORRELATION_TABLE: &str = "correlations";
pub const FORECAST_TABLE: &str = "forecasts";

pub const TEMPERATURE_METRIC: &str = "temperature_2m";
pub const PRECIPITATION_METRIC: &str = "precipitation";
pub const WIND_SPEED_METRIC: &str = "wind_speed_10m";
pub const WIND_DIRECTION_METRIC: &str = "wind_direction_10m";

/// Store handles used by the stages
#[derive(Clone)]
pub struct Stores {
    pub bronze_reader: Arc<dyn BronzeReader>,
    pub bronze_writer: Arc<dyn BronzeWriter>,
    pub series: Arc<dyn SeriesStore>,
    pub summaries: Arc<dyn SummaryStore>,
    pub serving: Arc<dyn ServingSink>,
    pub results: Arc<dyn ResultsStore>,
}

impl Stores {
    /// Fresh in-memory stores; bronze reader and writer share one store
    pub fn in_memory() -> Self {
        let bronze = Arc::new(MemoryBronzeStore::new());
        Self {
            bronze_reader: bronze.clone(),
            bronze_writer: bronze,
            series: Arc::new(MemorySeriesStore::new()),
            summaries: Arc::new(MemorySummaryStore::new()),
            serving: Arc::new(MemoryServingStore::new()),
            results: Arc::new(MemoryResultsStore::new()),
        }
    }
}

/// Silver and gold output of one series in a batch refresh
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshOutcome {
    pub silver_points: usize,
    pub missing_points: usize,
    pub rejected: usize,
    pub conflicts: usize,
    pub summaries: usize,
}

pub struct Lakehouse {
    config: PipelineConfig,
    stores: Stores,
    bronze: BronzeAdapter,
    silver: SilverTransformer,
    gold: GoldAggregator,
    serving: ServingSync,
}

impl Lakehouse {
    /// Build the stages from a validated configuration
    pub fn new(config: PipelineConfig, stores: Stores) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            bronze: BronzeAdapter::new(stores.bronze_writer.clone()),
            silver: SilverTransformer::from_config(&config)?,
            gold: GoldAggregator::from_config(&config)?,
            serving: ServingSync::new(stores.serving.clone()),
            config,
            stores,
        })
    }

    pub fn in_memory(config: PipelineConfig) -> Result<Self> {
        Self::new(config, Stores::in_memory())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Append raw records to bronze
    pub fn ingest(&self, records: &[RawRecord]) -> Result<IngestReport> {
        Ok(self.bronze.ingest(records)?)
    }

    /// Append the records of a raw CSV dump to bronze
    ///
    /// Unreadable rows are reported in `rejected` next to the records that
    /// failed typing.
    pub fn ingest_csv(&self, path: impl AsRef<Path>) -> Result<IngestReport> {
        let import = read_raw_csv(path)?;
        let mut report = self.ingest(&import.records)?;
        report.rejected.splice(0..0, import.rejected);
        Ok(report)
    }

    /// Rebuild the silver series of `key` over `range`
    pub fn refresh_silver(&self, key: &SeriesKey, range: &TimeRange) -> Result<SilverOutcome> {
        Ok(self
            .silver
            .run(self.stores.bronze_reader.as_ref(), self.stores.series.as_ref(), key, range)?)
    }

    /// Recompute the gold summaries of `key` over `range` from silver
    pub fn refresh_gold(&self, key: &SeriesKey, range: &TimeRange) -> Result<Vec<GoldSummary>> {
        Ok(self
            .gold
            .run(self.stores.series.as_ref(), self.stores.summaries.as_ref(), key, range)?)
    }

    /// Flag outliers in the silver series of `key` and store the flags
    pub fn detect_anomalies(&self, key: &SeriesKey, range: &TimeRange) -> Result<Vec<AnomalyFlag>> {
        let detector = AnomalyDetector::from_config(&self.config)?;
        let series = self.stores.series.read_series(&key.entity_id, &key.metric, range)?;
        let flags = detector.detect(&series)?;
        self.stores
            .results
            .save_anomalies(key, detector.method().name(), range, &flags)?;
        Ok(flags)
    }

    /// Sliding lagged correlation of two silver series over their common range
    pub fn correlate(&self, a: &SeriesKey, b: &SeriesKey, range: &TimeRange) -> Result<Vec<CorrelationResult>> {
        let engine = CorrelationEngine::from_config(&self.config)?;
        let left = self.stores.series.read_series(&a.entity_id, &a.metric, range)?;
        let right = self.stores.series.read_series(&b.entity_id, &b.metric, range)?;
        let (left, right) = align_pair(&left, &right)?;

        let results = engine.correlate(&left, &right)?;
        self.stores
            .results
            .save_correlations((a.entity_id.as_str(), b.entity_id.as_str()), range, &results)?;
        Ok(results)
    }

    /// STL decomposition of one stored silver series
    pub fn decompose(&self, key: &SeriesKey, range: &TimeRange) -> Result<Decomposition> {
        let decomposer = Decomposer::from_config(&self.config)?;
        let series = self.stores.series.read_series(&key.entity_id, &key.metric, range)?;
        Ok(decomposer.decompose(&series)?)
    }

    pub fn spectrogram(&self, key: &SeriesKey, range: &TimeRange) -> Result<Spectrogram> {
        let series = self.stores.series.read_series(&key.entity_id, &key.metric, range)?;
        Ok(series_spectrogram(
            &series,
            self.config.spectrogram_window,
            self.config.spectrogram_overlap,
        )?)
    }

    /// Seasonal snow transport at a weather location. Reads the silver
    /// temperature, precipitation and 10 m wind series of `weather_entity`.
    pub fn snow_drift(&self, weather_entity: &str, range: &TimeRange) -> Result<SnowDriftReport> {
        let read = |metric: &str| self.stores.series.read_series(weather_entity, metric, range);
        let temperature = read(TEMPERATURE_METRIC)?;
        let precipitation = read(PRECIPITATION_METRIC)?;
        let wind_speed = read(WIND_SPEED_METRIC)?;
        let wind_direction = read(WIND_DIRECTION_METRIC)?;
        let inputs = WeatherInputs {
            temperature: &temperature,
            precipitation: &precipitation,
            wind_speed: &wind_speed,
            wind_direction: &wind_direction,
        };
        Ok(snow_drift(&inputs, &SnowDriftParams::default())?)
    }

    /// Forecast `target` over the configured horizon after the configured
    /// training window ending at `training_end`.
    pub fn forecast(
        &self,
        target: &SeriesKey,
        exogenous: &[SeriesKey],
        training_end: DateTime<Utc>,
        generated_at: DateTime<Utc>,
    ) -> Result<ForecastRun> {
        let interval = self.config.interval()?;
        let engine = ForecastEngine::from_config(Sarimax::from_config(&self.config)?, &self.config)?;
        let training = engine.training_range(training_end, interval)?;
        let horizon = Duration::seconds(interval.num_seconds() * engine.horizon() as i64);
        let with_horizon = TimeRange::new(training.start, training.end + horizon)?;

        let series = self
            .stores
            .series
            .read_series(&target.entity_id, &target.metric, &training)?;
        let regressors = exogenous
            .iter()
            .map(|key| self.stores.series.read_series(&key.entity_id, &key.metric, &with_horizon))
            .collect::<medallion::Result<Vec<_>>>()?;

        let request = ForecastRequest::new(&series, regressors.iter().collect(), training);
        let run = engine.forecast_at(&request, generated_at)?;
        self.stores.results.save_forecasts(&run.results)?;
        Ok(run)
    }

    /// Push silver points and gold summaries of `key` in `range` to serving
    pub fn publish(&self, key: &SeriesKey, range: &TimeRange) -> Result<usize> {
        let series = self.stores.series.read_series(&key.entity_id, &key.metric, range)?;
        let summaries = self
            .stores
            .summaries
            .read_summaries(&key.entity_id, &key.metric, range)?;
        Ok(self.serving.publish_series(&series)? + self.serving.publish_summaries(&summaries)?)
    }

    /// Push stored analytics output for `key` in `range` to serving
    pub fn publish_analytics(&self, key: &SeriesKey, range: &TimeRange) -> Result<usize> {
        let results = self.stores.results.as_ref();
        let flags = results.read_anomalies(&key.entity_id, &key.metric, range)?;
        let forecasts = results.read_forecasts(&key.entity_id, &key.metric, range)?;
        Ok(self.serving.publish(ANOMALY_TABLE, &flags)? + self.serving.publish(FORECAST_TABLE, &forecasts)?)
    }

    /// Push stored correlations of an entity pair to serving
    pub fn publish_correlations(&self, entity_pair: (&str, &str), range: &TimeRange) -> Result<usize> {
        let correlations = self.stores.results.read_correlations(entity_pair, range)?;
        Ok(self.serving.publish(CORRELATION_TABLE, &correlations)?)
    }

    /// Silver then gold for one series
    pub fn refresh(&self, key: &SeriesKey, range: &TimeRange) -> Result<RefreshOutcome> {
        let silver = self.refresh_silver(key, range)?;
        let summaries = self.refresh_gold(key, range)?;
        Ok(RefreshOutcome {
            silver_points: silver.series.len(),
            missing_points: silver.series.missing_count(),
            rejected: silver.rejected.len(),
            conflicts: silver.conflicts.len(),
            summaries: summaries.len(),
        })
    }

    /// Refresh many series on `worker_threads` threads.
    ///
    /// Results come back in the order of `keys`.
    pub fn refresh_batch(&self, keys: &[SeriesKey], range: &TimeRange) -> Vec<(SeriesKey, Result<RefreshOutcome>)> {
        let queue: Mutex<VecDeque<usize>> = Mutex::new((0..keys.len()).collect());
        let workers = self.config.worker_threads.clamp(1, keys.len().max(1));
        let (tx, rx) = mpsc::channel();

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);
            for worker in 0..workers {
                let tx = tx.clone();
                let queue = &queue;
                handles.push(scope.spawn(move || loop {
                    let Some(index) = queue.lock().pop_front() else {
                        break;
                    };
                    let key = &keys[index];
                    let span = info_span!("refresh", worker, series = %key);
                    let _guard = span.enter();

                    let outcome = self.refresh(key, range);
                    if let Err(e) = &outcome {
                        warn!(error = %e, "series refresh failed");
                    }
                    if tx.send((index, outcome)).is_err() {
                        break;
                    }
                }));
            }
            // a panicking worker loses only the series it was refreshing
            for (worker, handle) in handles.into_iter().enumerate() {
                if handle.join().is_err() {
                    warn!(worker, "batch worker panicked");
                }
            }
        });
        drop(tx);

        let mut outcomes: Vec<Option<Result<RefreshOutcome>>> = keys.iter().map(|_| None).collect();
        for (index, outcome) in rx {
            outcomes[index] = Some(outcome);
        }

        let failed = outcomes
            .iter()
            .filter(|o| !matches!(o, Some(Ok(_))))
            .count();
        info!(series = keys.len(), workers, failed, "batch refresh finished");

        keys.iter()
            .cloned()
            .zip(outcomes)
            .map(|(key, outcome)| {
                let outcome = outcome.unwrap_or_else(|| Err(LakeError::Worker(format!("no result for {}", key))));
                (key, outcome)
            })
            .collect()
    }
}
