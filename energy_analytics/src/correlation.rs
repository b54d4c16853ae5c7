//! Correlation Engine
//!
//! Sliding-window Pearson correlation between two aligned series across a
//! range of lags. A lag `L` pairs `a[t]` with `b[t + L]`, so a positive lag
//! means `b` follows `a`. Pairs where either side is missing are dropped;
//! a (window, lag) unit with fewer than `min_points` pairs, or with a constant
//! side, is omitted rather than reported.

use crate::error::{AnalyticsError, Result};
use chrono::{DateTime, Duration, Utc};
use medallion::{PipelineConfig, ServingRecord, SilverSeries};
use serde::{Deserialize, Serialize};
use series_math::{pearson, MathError};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// One evaluated (window, lag) combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub entity_pair: (String, String),
    pub metric_pair: (String, String),
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub lag: i64,
    pub coefficient: f64,
    /// Valid pairs the coefficient was computed over
    pub n_points: usize,
}

impl ServingRecord for CorrelationResult {
    fn row_key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.entity_pair.0,
            self.entity_pair.1,
            self.window_start.to_rfc3339(),
            self.lag
        )
    }
}

#[derive(Debug, Clone)]
pub struct CorrelationEngine {
    window: usize,
    step: usize,
    min_lag: i64,
    max_lag: i64,
    min_points: usize,
}

impl CorrelationEngine {
    /// # Arguments
    /// * `window` - Window length in intervals
    /// * `step` - Distance between window starts in intervals
    /// * `lag_range` - Inclusive `(min, max)` lag in intervals
    /// * `min_points` - Fewest valid pairs a coefficient may use (at least 3)
    pub fn new(window: usize, step: usize, lag_range: (i64, i64), min_points: usize) -> Result<Self> {
        if window < 2 {
            return Err(AnalyticsError::InvalidParameter(
                "Correlation window must be at least 2".to_string(),
            ));
        }
        if step == 0 {
            return Err(AnalyticsError::InvalidParameter(
                "Window step must be at least 1".to_string(),
            ));
        }
        if lag_range.0 > lag_range.1 {
            return Err(AnalyticsError::InvalidParameter(format!(
                "Lag range {:?} is inverted",
                lag_range
            )));
        }
        if min_points < 3 || min_points > window {
            return Err(AnalyticsError::InvalidParameter(format!(
                "min_points must be between 3 and the window length {}, got {}",
                window, min_points
            )));
        }

        Ok(Self {
            window,
            step,
            min_lag: lag_range.0,
            max_lag: lag_range.1,
            min_points,
        })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let [min_lag, max_lag] = config.correlation_lag_range;
        Self::new(
            config.correlation_window,
            config.correlation_step,
            (min_lag, max_lag),
            config.correlation_min_points,
        )
    }

    /// Results ordered by window start, then lag.
    pub fn correlate(&self, a: &SilverSeries, b: &SilverSeries) -> Result<Vec<CorrelationResult>> {
        if !a.is_aligned_with(b) {
            return Err(AnalyticsError::Misaligned(format!(
                "{} and {} differ in interval or grid",
                a.key(),
                b.key()
            )));
        }
        let n = a.len();
        if n < self.window {
            return Err(AnalyticsError::InsufficientData(format!(
                "series of {} points is shorter than the {}-point window",
                n, self.window
            )));
        }

        let interval = a.interval();
        let xs = a.values();
        let ys = b.values();
        let mut results = Vec::new();
        let mut omitted = 0usize;

        let mut start = 0;
        while start + self.window <= n {
            let window_start = a.points[start].timestamp;
            let window_end = window_start + Duration::seconds(interval.num_seconds() * self.window as i64);

            for lag in self.min_lag..=self.max_lag {
                let (left, right) = paired(&xs, &ys, start, self.window, lag);
                if left.len() < self.min_points {
                    omitted += 1;
                    continue;
                }
                match pearson(&left, &right) {
                    Ok(coefficient) => results.push(CorrelationResult {
                        entity_pair: (a.entity_id.clone(), b.entity_id.clone()),
                        metric_pair: (a.metric.clone(), b.metric.clone()),
                        window_start,
                        window_end,
                        lag,
                        coefficient,
                        n_points: left.len(),
                    }),
                    Err(MathError::CalculationError(reason)) => {
                        debug!(window_start = %window_start, lag, %reason, "correlation unit omitted");
                        omitted += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            start += self.step;
        }

        info!(
            a = %a.key(),
            b = %b.key(),
            results = results.len(),
            omitted,
            "sliding correlation finished"
        );
        Ok(results)
    }

    /// Best lag per window: largest |coefficient|, ties to the smallest |lag|,
    /// then to the earliest lag.
    pub fn best_lags(results: &[CorrelationResult]) -> Vec<CorrelationResult> {
        let mut best: BTreeMap<DateTime<Utc>, &CorrelationResult> = BTreeMap::new();
        for result in results {
            best.entry(result.window_start)
                .and_modify(|current| {
                    if outranks(result, current) {
                        *current = result;
                    }
                })
                .or_insert(result);
        }
        best.into_values().cloned().collect()
    }
}

fn outranks(candidate: &CorrelationResult, current: &CorrelationResult) -> bool {
    let by_strength = candidate.coefficient.abs().total_cmp(&current.coefficient.abs());
    by_strength
        .then(current.lag.abs().cmp(&candidate.lag.abs()))
        .then(current.lag.cmp(&candidate.lag))
        .is_gt()
}

/// Non-missing `(a[t], b[t + lag])` pairs for `t` in the window
fn paired(
    xs: &[Option<f64>],
    ys: &[Option<f64>],
    start: usize,
    window: usize,
    lag: i64,
) -> (Vec<f64>, Vec<f64>) {
    let mut left = Vec::with_capacity(window);
    let mut right = Vec::with_capacity(window);
    for t in start..start + window {
        let shifted = t as i64 + lag;
        if shifted < 0 || shifted >= ys.len() as i64 {
            continue;
        }
        if let (Some(x), Some(y)) = (xs[t], ys[shifted as usize]) {
            left.push(x);
            right.push(y);
        }
    }
    (left, right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn result(window_hour: u32, lag: i64, coefficient: f64) -> CorrelationResult {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, window_hour, 0, 0).unwrap();
        CorrelationResult {
            entity_pair: ("NO1-weather".into(), "NO1".into()),
            metric_pair: ("temperature_2m".into(), "energy_consumption".into()),
            window_start: start,
            window_end: start + Duration::hours(24),
            lag,
            coefficient,
            n_points: 24,
        }
    }

    #[test]
    fn test_best_lag_prefers_strength_then_small_lag_then_earliest() {
        let results = vec![
            result(0, -3, 0.5),
            result(0, 2, -0.9),
            result(0, -2, 0.9),
            result(1, 4, 0.7),
            result(1, -4, -0.7),
        ];

        let best = CorrelationEngine::best_lags(&results);
        assert_eq!(best.len(), 2);
        assert_eq!(best[0].lag, -2);
        assert_eq!(best[1].lag, -4);
    }

    #[test]
    fn test_paired_skips_missing_and_out_of_bounds() {
        let xs = vec![Some(1.0), Some(2.0), None, Some(4.0)];
        let ys = vec![Some(10.0), None, Some(30.0), Some(40.0)];

        let (left, right) = paired(&xs, &ys, 0, 4, 1);
        // t=0 -> y[1] missing, t=2 -> x missing, t=3 -> out of bounds
        assert_eq!(left, vec![2.0]);
        assert_eq!(right, vec![30.0]);
    }

    #[test]
    fn test_parameters_are_validated() {
        assert!(CorrelationEngine::new(1, 1, (0, 0), 3).is_err());
        assert!(CorrelationEngine::new(10, 0, (0, 0), 3).is_err());
        assert!(CorrelationEngine::new(10, 1, (2, -2), 3).is_err());
        assert!(CorrelationEngine::new(10, 1, (-2, 2), 2).is_err());
        assert!(CorrelationEngine::new(10, 1, (-2, 2), 3).is_ok());
    }
}
