//! Seasonal-trend decomposition and spectrograms of silver series
//!
//! Both operate on gap-free silver series: interpolated points are fine,
//! `missing` points are not.

use crate::error::{AnalyticsError, Result};
use chrono::{DateTime, Duration, Utc};
use medallion::{PipelineConfig, SilverSeries};
use serde::{Deserialize, Serialize};
use series_math::spectral::spectrogram;
use series_math::{stl, StlParams};
use tracing::info;

/// Seasonal, trend and remainder of one series; the three add up to `observed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decomposition {
    pub entity_id: String,
    pub metric: String,
    pub timestamps: Vec<DateTime<Utc>>,
    pub observed: Vec<f64>,
    pub seasonal: Vec<f64>,
    pub trend: Vec<f64>,
    pub remainder: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct Decomposer {
    params: StlParams,
}

impl Decomposer {
    pub fn new(period: usize, seasonal: usize, trend: usize, robust: bool) -> Result<Self> {
        let params = StlParams::new(period, seasonal, trend);
        let params = if robust { params.robust() } else { params };
        params.validate()?;
        Ok(Self { params })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Self::new(config.stl_period, config.stl_seasonal, config.stl_trend, config.stl_robust)
    }

    pub fn params(&self) -> &StlParams {
        &self.params
    }

    pub fn decompose(&self, series: &SilverSeries) -> Result<Decomposition> {
        let observed = complete_values(series, "decomposition")?;
        let parts = stl(&observed, &self.params)?;

        info!(
            entity_id = %series.entity_id,
            metric = %series.metric,
            points = observed.len(),
            period = self.params.period,
            "series decomposed"
        );
        Ok(Decomposition {
            entity_id: series.entity_id.clone(),
            metric: series.metric.clone(),
            timestamps: series.points.iter().map(|p| p.timestamp).collect(),
            observed,
            seasonal: parts.seasonal,
            trend: parts.trend,
            remainder: parts.remainder,
        })
    }
}

/// Power spectra over time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrogram {
    pub entity_id: String,
    pub metric: String,
    pub segment_starts: Vec<DateTime<Utc>>,
    /// Bin frequencies in cycles per day
    pub frequencies: Vec<f64>,
    /// One spectrum per segment, aligned with `frequencies`
    pub power: Vec<Vec<f64>>,
}

impl Spectrogram {
    /// Frequency of the strongest non-constant bin of each segment
    pub fn dominant_frequencies(&self) -> Vec<f64> {
        self.power
            .iter()
            .filter_map(|spectrum| {
                spectrum
                    .iter()
                    .enumerate()
                    .skip(1)
                    .max_by(|a, b| a.1.total_cmp(b.1))
                    .map(|(k, _)| self.frequencies[k])
            })
            .collect()
    }
}

/// Spectrogram of `series` over segments of `window` points overlapping by
/// the fraction `overlap` (in `[0, 1)`).
pub fn series_spectrogram(series: &SilverSeries, window: usize, overlap: f64) -> Result<Spectrogram> {
    if window < 4 {
        return Err(AnalyticsError::InvalidParameter(format!(
            "Spectrogram window must be at least 4, got {}",
            window
        )));
    }
    if !(0.0..1.0).contains(&overlap) {
        return Err(AnalyticsError::InvalidParameter(format!(
            "Overlap must be in [0, 1), got {}",
            overlap
        )));
    }
    if series.interval_minutes <= 0 {
        return Err(AnalyticsError::InvalidParameter(
            "Series has no positive interval".to_string(),
        ));
    }

    let values = complete_values(series, "spectrogram")?;
    let step = ((window as f64 * (1.0 - overlap)).round() as usize).max(1);
    let segments = spectrogram(&values, window, step)?;

    let samples_per_day = 1440.0 / series.interval_minutes as f64;
    let frequencies = (0..=window / 2)
        .map(|k| k as f64 / window as f64 * samples_per_day)
        .collect();
    let interval = Duration::minutes(series.interval_minutes);

    let (segment_starts, power) = segments
        .into_iter()
        .map(|(start, spectrum)| (series.points[0].timestamp + interval * start as i32, spectrum))
        .unzip();
    Ok(Spectrogram {
        entity_id: series.entity_id.clone(),
        metric: series.metric.clone(),
        segment_starts,
        frequencies,
        power,
    })
}

fn complete_values(series: &SilverSeries, purpose: &str) -> Result<Vec<f64>> {
    let values: Vec<f64> = series.points.iter().filter_map(|p| p.value).collect();
    let missing = series.points.len() - values.len();
    if missing > 0 {
        return Err(AnalyticsError::InsufficientData(format!(
            "{} of {}/{} needs a gap-free series, {} points are missing",
            purpose, series.entity_id, series.metric, missing
        )));
    }
    Ok(values)
}
