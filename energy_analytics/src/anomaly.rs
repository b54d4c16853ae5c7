//! Anomaly Detector
//!
//! Flags statistical outliers in one silver series. Detection works on the
//! non-missing points only and never modifies the series; results are
//! separate [`AnomalyFlag`] annotations.
//!
//! Methods:
//! - **Rolling MAD**: robust z-score against the median and MAD of a trailing
//!   window. The first `window_size` observed points have no full window and
//!   are never flagged.
//! - **DCT + SPC**: low-pass DCT smoothing, then control limits at
//!   `mean ± k·std` of the smoothed curve.
//! - **Local outlier factor**: density-based scores; the top `contamination`
//!   share of points with a score above 1 are flagged.

use crate::error::{AnalyticsError, Result};
use chrono::{DateTime, Utc};
use medallion::{PipelineConfig, QualityFlag, ServingRecord, SilverSeries, TimeSeriesPoint};
use serde::{Deserialize, Serialize};
use series_math::neighbors::local_outlier_factor;
use series_math::spectral::lowpass;
use series_math::{mean, median, std_dev, TrailingWindow};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Lower bound on the scale, relative to the reference level, so flat
/// windows do not divide by zero
const RELATIVE_SCALE_FLOOR: f64 = 1e-6;
/// DCT smoothing needs at least this many points
const MIN_SPC_POINTS: usize = 10;
/// Smallest neighbourhood used by the LOF method
const MIN_LOF_NEIGHBOURS: usize = 10;

/// Detection method and its parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AnomalyMethod {
    RollingMad { window_size: usize, threshold: f64 },
    DctSpc { cutoff: f64, std_threshold: f64 },
    LocalOutlierFactor { contamination: f64 },
}

impl AnomalyMethod {
    pub fn name(&self) -> &'static str {
        match self {
            AnomalyMethod::RollingMad { .. } => "rolling_mad",
            AnomalyMethod::DctSpc { .. } => "dct_spc",
            AnomalyMethod::LocalOutlierFactor { .. } => "lof",
        }
    }

    fn validate(&self) -> Result<()> {
        let check = match *self {
            AnomalyMethod::RollingMad { window_size, threshold } => {
                medallion::utils::validate_period(window_size, 3)
                    .and(medallion::utils::validate_positive(threshold, "threshold"))
            }
            AnomalyMethod::DctSpc { cutoff, std_threshold } => {
                medallion::utils::validate_range(cutoff, f64::MIN_POSITIVE, 1.0, "cutoff")
                    .and(medallion::utils::validate_positive(std_threshold, "std_threshold"))
            }
            AnomalyMethod::LocalOutlierFactor { contamination } => {
                medallion::utils::validate_range(contamination, f64::MIN_POSITIVE, 0.5, "contamination")
            }
        };
        check.map_err(AnalyticsError::InvalidParameter)
    }
}

/// An annotation on one silver point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFlag {
    pub entity_id: String,
    pub metric: String,
    pub timestamp: DateTime<Utc>,
    /// Normalised deviation (robust z-score, SPC z-score, or LOF score)
    pub severity: f64,
    pub method: String,
    /// Local reference the point was compared against
    pub reference_value: f64,
    pub value: f64,
}

impl ServingRecord for AnomalyFlag {
    fn row_key(&self) -> String {
        format!("{}|{}|{}|{}", self.entity_id, self.metric, self.timestamp.to_rfc3339(), self.method)
    }
}

#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    method: AnomalyMethod,
}

impl AnomalyDetector {
    pub fn new(method: AnomalyMethod) -> Result<Self> {
        method.validate()?;
        Ok(Self { method })
    }

    /// Rolling MAD detector with the configured window and threshold
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Self::new(AnomalyMethod::RollingMad {
            window_size: config.anomaly_window_size,
            threshold: config.anomaly_threshold,
        })
    }

    pub fn method(&self) -> AnomalyMethod {
        self.method
    }

    /// Flags in timestamp order. An empty series yields no flags.
    pub fn detect(&self, series: &SilverSeries) -> Result<Vec<AnomalyFlag>> {
        let observed: Vec<(DateTime<Utc>, f64)> = series.observed().collect();
        if observed.is_empty() {
            return Ok(Vec::new());
        }

        let hits = match self.method {
            AnomalyMethod::RollingMad { window_size, threshold } => {
                rolling_mad(&observed, window_size, threshold)?
            }
            AnomalyMethod::DctSpc { cutoff, std_threshold } => {
                dct_spc(&observed, cutoff, std_threshold)?
            }
            AnomalyMethod::LocalOutlierFactor { contamination } => {
                lof(&observed, contamination)?
            }
        };

        let flags: Vec<AnomalyFlag> = hits
            .into_iter()
            .map(|hit| AnomalyFlag {
                entity_id: series.entity_id.clone(),
                metric: series.metric.clone(),
                timestamp: observed[hit.index].0,
                severity: hit.severity,
                method: self.method.name().to_string(),
                reference_value: hit.reference,
                value: observed[hit.index].1,
            })
            .collect();

        info!(
            entity_id = %series.entity_id,
            metric = %series.metric,
            method = self.method.name(),
            points = observed.len(),
            flagged = flags.len(),
            "anomaly detection finished"
        );
        Ok(flags)
    }
}

/// Copy of the series points with flagged timestamps marked `outlier`.
pub fn mark_outliers(series: &SilverSeries, flags: &[AnomalyFlag]) -> Vec<TimeSeriesPoint> {
    let flagged: BTreeSet<DateTime<Utc>> = flags.iter().map(|f| f.timestamp).collect();
    series
        .points
        .iter()
        .map(|p| {
            let mut point = p.clone();
            if flagged.contains(&p.timestamp) && p.value.is_some() {
                point.quality_flag = QualityFlag::Outlier;
            }
            point
        })
        .collect()
}

struct Hit {
    index: usize,
    severity: f64,
    reference: f64,
}

fn scale_floor(reference: f64) -> f64 {
    RELATIVE_SCALE_FLOOR * reference.abs().max(1.0)
}

fn rolling_mad(observed: &[(DateTime<Utc>, f64)], window_size: usize, threshold: f64) -> Result<Vec<Hit>> {
    let mut window = TrailingWindow::new(window_size)?;
    let mut hits = Vec::new();

    for (index, &(_, value)) in observed.iter().enumerate() {
        if window.is_full() {
            let (center, scale) = window.median_and_scale()?;
            let scale = scale.max(scale_floor(center));
            let severity = (value - center).abs() / scale;
            if severity > threshold {
                hits.push(Hit {
                    index,
                    severity,
                    reference: center,
                });
            }
        }
        window.push(value);
    }

    Ok(hits)
}

fn dct_spc(observed: &[(DateTime<Utc>, f64)], cutoff: f64, std_threshold: f64) -> Result<Vec<Hit>> {
    if observed.len() < MIN_SPC_POINTS {
        return Err(AnalyticsError::InsufficientData(format!(
            "DCT smoothing needs at least {} points, have {}",
            MIN_SPC_POINTS,
            observed.len()
        )));
    }

    let values: Vec<f64> = observed.iter().map(|(_, v)| *v).collect();
    let smoothed = lowpass(&values, cutoff)?;
    let center = mean(&smoothed)?;
    let sigma = std_dev(&smoothed)?.max(scale_floor(center));
    debug!(
        center,
        lower = center - std_threshold * sigma,
        upper = center + std_threshold * sigma,
        "spc control limits"
    );

    Ok(values
        .iter()
        .enumerate()
        .filter_map(|(index, &value)| {
            let severity = (value - center).abs() / sigma;
            (severity > std_threshold).then_some(Hit {
                index,
                severity,
                reference: center,
            })
        })
        .collect())
}

fn lof(observed: &[(DateTime<Utc>, f64)], contamination: f64) -> Result<Vec<Hit>> {
    let n = observed.len();
    let neighbours = MIN_LOF_NEIGHBOURS.max((n as f64 * contamination * 5.0) as usize);
    if n <= neighbours {
        return Err(AnalyticsError::InsufficientData(format!(
            "LOF with {} neighbours needs more than {} points, have {}",
            neighbours, neighbours, n
        )));
    }

    let values: Vec<f64> = observed.iter().map(|(_, v)| *v).collect();
    let scores = local_outlier_factor(&values, neighbours)?;
    let reference = median(&values)?;

    let budget = (n as f64 * contamination).ceil() as usize;
    let mut ranked: Vec<usize> = (0..n).filter(|&i| scores[i] > 1.0).collect();
    ranked.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
    ranked.truncate(budget);
    ranked.sort_unstable();

    Ok(ranked
        .into_iter()
        .map(|index| Hit {
            index,
            severity: scores[index],
            reference,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use medallion::utils::series_from_values;
    use medallion::SeriesKey;

    fn series(values: &[Option<f64>]) -> SilverSeries {
        series_from_values(
            &SeriesKey::new("NO1-weather", "temperature_2m"),
            "degC",
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Duration::hours(1),
            values,
        )
    }

    #[test]
    fn test_invalid_parameters_are_rejected() {
        assert!(AnomalyDetector::new(AnomalyMethod::RollingMad { window_size: 2, threshold: 3.0 }).is_err());
        assert!(AnomalyDetector::new(AnomalyMethod::RollingMad { window_size: 5, threshold: 0.0 }).is_err());
        assert!(AnomalyDetector::new(AnomalyMethod::DctSpc { cutoff: 0.0, std_threshold: 3.0 }).is_err());
        assert!(AnomalyDetector::new(AnomalyMethod::LocalOutlierFactor { contamination: 0.9 }).is_err());
    }

    #[test]
    fn test_first_window_is_never_flagged() {
        let mut values: Vec<Option<f64>> = vec![Some(1.0); 10];
        values[2] = Some(500.0);
        let detector =
            AnomalyDetector::new(AnomalyMethod::RollingMad { window_size: 5, threshold: 3.0 }).unwrap();

        let flags = detector.detect(&series(&values)).unwrap();
        assert!(flags.is_empty());
    }

    #[test]
    fn test_flat_window_uses_scale_floor() {
        let mut values: Vec<Option<f64>> = vec![Some(4.0); 12];
        values[8] = Some(4.5);
        let detector =
            AnomalyDetector::new(AnomalyMethod::RollingMad { window_size: 5, threshold: 3.0 }).unwrap();

        let flags = detector.detect(&series(&values)).unwrap();
        assert_eq!(flags.len(), 1);
        assert!(flags[0].severity.is_finite());
        assert_eq!(flags[0].reference_value, 4.0);
    }

    #[test]
    fn test_missing_points_are_skipped() {
        let values = vec![None; 6];
        let detector = AnomalyDetector::new(AnomalyMethod::DctSpc { cutoff: 0.05, std_threshold: 3.0 }).unwrap();
        assert!(detector.detect(&series(&values)).unwrap().is_empty());
    }

    #[test]
    fn test_mark_outliers_leaves_source_untouched() {
        let values: Vec<Option<f64>> = (0..8).map(|i| Some(i as f64)).collect();
        let s = series(&values);
        let flag = AnomalyFlag {
            entity_id: s.entity_id.clone(),
            metric: s.metric.clone(),
            timestamp: s.points[3].timestamp,
            severity: 9.0,
            method: "rolling_mad".to_string(),
            reference_value: 1.0,
            value: 3.0,
        };

        let marked = mark_outliers(&s, &[flag]);
        assert_eq!(marked[3].quality_flag, QualityFlag::Outlier);
        assert_eq!(s.points[3].quality_flag, QualityFlag::Raw);
    }
}
