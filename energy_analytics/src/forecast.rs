//! Forecast Engine
//!
//! Fits a [`ForecastModel`] on an endogenous silver series with aligned
//! exogenous regressors and forecasts a fixed horizon after the training
//! window.
//!
//! Preconditions, checked in this order before any fitting:
//! - every exogenous series has a value at each training and horizon slot,
//!   otherwise [`AnalyticsError::Coverage`]
//! - the endogenous series has no missing slot in the training window,
//!   otherwise [`AnalyticsError::MissingTrainingData`]
//!
//! A failed request produces no [`ForecastResult`] at all.

use crate::error::{AnalyticsError, Result};
use crate::models::{FitDiagnostics, ForecastModel, TrainedForecastModel};
use chrono::{DateTime, Duration, Utc};
use medallion::{PipelineConfig, ServingRecord, SilverSeries, TimeRange};
use serde::{Deserialize, Serialize};
use series_math::normal_quantile;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};
use uuid::Uuid;

/// One forecasted step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub entity_id: String,
    pub metric: String,
    pub generated_at: DateTime<Utc>,
    pub horizon_timestamp: DateTime<Utc>,
    pub point_estimate: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// Shared by every step of one fitted model
    pub model_id: String,
}

impl ServingRecord for ForecastResult {
    fn row_key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.entity_id,
            self.metric,
            self.generated_at.to_rfc3339(),
            self.horizon_timestamp.to_rfc3339()
        )
    }
}

/// A fitted model and the forecasts it produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastRun {
    pub model_id: String,
    pub model_name: String,
    pub training_window: TimeRange,
    pub results: Vec<ForecastResult>,
    pub diagnostics: FitDiagnostics,
}

/// Inputs of one forecast
#[derive(Debug, Clone)]
pub struct ForecastRequest<'a> {
    pub target: &'a SilverSeries,
    pub exogenous: Vec<&'a SilverSeries>,
    pub training_window: TimeRange,
}

impl<'a> ForecastRequest<'a> {
    pub fn new(target: &'a SilverSeries, exogenous: Vec<&'a SilverSeries>, training_window: TimeRange) -> Self {
        Self {
            target,
            exogenous,
            training_window,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ForecastEngine<M: ForecastModel> {
    model: M,
    training_window: usize,
    horizon: usize,
    confidence_level: f64,
}

impl<M: ForecastModel> ForecastEngine<M> {
    /// # Arguments
    /// * `model` - Model fitted for every request
    /// * `training_window` - Default training length in intervals, see [`Self::training_range`]
    /// * `horizon` - Steps forecast after the training window
    /// * `confidence_level` - Interval coverage, strictly between 0 and 1
    pub fn new(model: M, training_window: usize, horizon: usize, confidence_level: f64) -> Result<Self> {
        medallion::utils::validate_period(training_window, 1)
            .and(medallion::utils::validate_period(horizon, 1))
            .and(medallion::utils::validate_range(
                confidence_level,
                f64::MIN_POSITIVE,
                1.0 - f64::EPSILON,
                "confidence_level",
            ))
            .map_err(AnalyticsError::InvalidParameter)?;

        Ok(Self {
            model,
            training_window,
            horizon,
            confidence_level,
        })
    }

    pub fn from_config(model: M, config: &PipelineConfig) -> Result<Self> {
        Self::new(
            model,
            config.forecast_training_window,
            config.forecast_horizon,
            config.confidence_level,
        )
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// The configured number of intervals ending at `end`
    pub fn training_range(&self, end: DateTime<Utc>, interval: Duration) -> Result<TimeRange> {
        let length = Duration::seconds(interval.num_seconds() * self.training_window as i64);
        Ok(TimeRange::new(end - length, end)?)
    }

    /// Forecast with the current time as `generated_at`
    pub fn forecast(&self, request: &ForecastRequest<'_>) -> Result<ForecastRun> {
        self.forecast_at(request, Utc::now())
    }

    pub fn forecast_at(&self, request: &ForecastRequest<'_>, generated_at: DateTime<Utc>) -> Result<ForecastRun> {
        self.forecast_cancellable(request, generated_at, &AtomicBool::new(false))
    }

    /// Like [`Self::forecast_at`], but returns [`AnalyticsError::Cancelled`] if
    /// `cancel` is set once the inputs are checked. A fit already running is
    /// not interrupted.
    pub fn forecast_cancellable(
        &self,
        request: &ForecastRequest<'_>,
        generated_at: DateTime<Utc>,
        cancel: &AtomicBool,
    ) -> Result<ForecastRun> {
        let target = request.target;
        let interval = target.interval();
        for exog in &request.exogenous {
            if exog.interval_minutes != target.interval_minutes {
                return Err(AnalyticsError::Misaligned(format!(
                    "{} uses {}-minute intervals, {} uses {}",
                    exog.key(),
                    exog.interval_minutes,
                    target.key(),
                    target.interval_minutes
                )));
            }
        }

        let training = request.training_window.grid(interval);
        let Some(&last_training) = training.last() else {
            return Err(AnalyticsError::InsufficientData(format!(
                "training window {} to {} holds no {}-minute slot",
                request.training_window.start, request.training_window.end, target.interval_minutes
            )));
        };
        let horizon: Vec<DateTime<Utc>> = (1..=self.horizon as i64)
            .map(|h| last_training + Duration::seconds(interval.num_seconds() * h))
            .collect();
        let horizon_end = last_training + Duration::seconds(interval.num_seconds() * (self.horizon as i64 + 1));

        let mut exog_train = Vec::with_capacity(request.exogenous.len());
        let mut exog_future = Vec::with_capacity(request.exogenous.len());
        for exog in &request.exogenous {
            exog_train.push(covered(exog, &training, horizon_end)?);
            exog_future.push(covered(exog, &horizon, horizon_end)?);
        }

        let endog = complete_training_values(target, &training)?;

        if cancel.load(Ordering::Acquire) {
            info!(series = %target.key(), "forecast abandoned before fitting");
            return Err(AnalyticsError::Cancelled);
        }

        let trained = self.model.train(&endog, &exog_train).map_err(|e| {
            warn!(series = %target.key(), model = self.model.name(), error = %e, "model fit failed");
            e
        })?;
        let forecast = trained.forecast(&exog_future, self.horizon)?;
        let z = normal_quantile(self.confidence_level)?;

        let model_id = Uuid::new_v4().to_string();
        let results: Vec<ForecastResult> = horizon
            .iter()
            .zip(forecast.intervals(z))
            .zip(forecast.values.iter())
            .map(|((&ts, (lower, upper)), &point)| ForecastResult {
                entity_id: target.entity_id.clone(),
                metric: target.metric.clone(),
                generated_at,
                horizon_timestamp: ts,
                point_estimate: point,
                lower_bound: lower,
                upper_bound: upper,
                model_id: model_id.clone(),
            })
            .collect();

        info!(
            series = %target.key(),
            model = trained.name(),
            %model_id,
            training_points = endog.len(),
            horizon = results.len(),
            "forecast produced"
        );

        Ok(ForecastRun {
            model_id,
            model_name: trained.name().to_string(),
            training_window: request.training_window,
            results,
            diagnostics: trained.diagnostics().clone(),
        })
    }
}

/// Values of `series` at every timestamp, or a coverage error at the first gap
fn covered(series: &SilverSeries, timestamps: &[DateTime<Utc>], horizon_end: DateTime<Utc>) -> Result<Vec<f64>> {
    timestamps
        .iter()
        .map(|&ts| {
            series.value_at(ts).ok_or_else(|| AnalyticsError::Coverage {
                series: series.key().to_string(),
                first_uncovered: ts,
                horizon_end,
            })
        })
        .collect()
}

fn complete_training_values(series: &SilverSeries, training: &[DateTime<Utc>]) -> Result<Vec<f64>> {
    let values: Vec<Option<f64>> = training.iter().map(|&ts| series.value_at(ts)).collect();
    let missing = values.iter().filter(|v| v.is_none()).count();
    if missing > 0 {
        let first_missing = values
            .iter()
            .zip(training.iter())
            .find_map(|(v, &ts)| v.is_none().then_some(ts))
            .unwrap_or(training[0]);
        return Err(AnalyticsError::MissingTrainingData {
            entity_id: series.entity_id.clone(),
            metric: series.metric.clone(),
            missing,
            first_missing,
        });
    }
    Ok(values.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::seasonal_naive::SeasonalNaive;
    use chrono::TimeZone;
    use medallion::utils::series_from_values;
    use medallion::SeriesKey;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap()
    }

    fn series(key: SeriesKey, values: &[Option<f64>]) -> SilverSeries {
        series_from_values(&key, "kWh", start(), Duration::hours(1), values)
    }

    fn engine(horizon: usize) -> ForecastEngine<SeasonalNaive> {
        ForecastEngine::new(SeasonalNaive::new(4).unwrap(), 12, horizon, 0.9).unwrap()
    }

    #[test]
    fn test_results_share_model_id_and_follow_training_window() {
        let values: Vec<Option<f64>> = (0..16).map(|i| Some((i % 4) as f64)).collect();
        let target = series(SeriesKey::new("NO1", "energy_consumption"), &values);
        let training = engine(4).training_range(start() + Duration::hours(12), Duration::hours(1)).unwrap();

        let run = engine(4)
            .forecast_at(&ForecastRequest::new(&target, vec![], training), start())
            .unwrap();

        assert_eq!(run.results.len(), 4);
        assert!(run.results.iter().all(|r| r.model_id == run.model_id));
        assert_eq!(run.results[0].horizon_timestamp, start() + Duration::hours(12));
        assert_eq!(run.results[0].point_estimate, 0.0);
        assert!(run.results.iter().all(|r| r.lower_bound <= r.point_estimate && r.point_estimate <= r.upper_bound));
    }

    #[test]
    fn test_missing_training_point_is_reported() {
        let mut values: Vec<Option<f64>> = (0..16).map(|i| Some(i as f64)).collect();
        values[5] = None;
        values[7] = None;
        let target = series(SeriesKey::new("NO2", "energy_consumption"), &values);
        let training = TimeRange::new(start(), start() + Duration::hours(12)).unwrap();

        let err = engine(2)
            .forecast_at(&ForecastRequest::new(&target, vec![], training), start())
            .unwrap_err();
        match err {
            AnalyticsError::MissingTrainingData { missing, first_missing, .. } => {
                assert_eq!(missing, 2);
                assert_eq!(first_missing, start() + Duration::hours(5));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cancelled_request_does_not_fit() {
        let values: Vec<Option<f64>> = (0..16).map(|i| Some(i as f64)).collect();
        let target = series(SeriesKey::new("NO3", "energy_consumption"), &values);
        let training = TimeRange::new(start(), start() + Duration::hours(12)).unwrap();

        let cancel = AtomicBool::new(true);
        let err = engine(2)
            .forecast_cancellable(&ForecastRequest::new(&target, vec![], training), start(), &cancel)
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::Cancelled));
    }

    #[test]
    fn test_invalid_confidence_is_rejected() {
        assert!(ForecastEngine::new(SeasonalNaive::new(4).unwrap(), 12, 4, 1.0).is_err());
        assert!(ForecastEngine::new(SeasonalNaive::new(4).unwrap(), 12, 0, 0.9).is_err());
    }
}
