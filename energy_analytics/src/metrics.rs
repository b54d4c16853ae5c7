//! Metrics for evaluating forecast performance

use crate::error::{AnalyticsError, Result};
use crate::forecast::ForecastResult;
use medallion::SilverSeries;
use serde::{Deserialize, Serialize};

/// Score a forecast batch against the actuals that arrived later.
///
/// Steps whose actual value is missing or outside `actual` are skipped.
pub fn evaluate_forecast(results: &[ForecastResult], actual: &SilverSeries) -> Result<ForecastMetrics> {
    let matched: Vec<(&ForecastResult, f64)> = results
        .iter()
        .filter_map(|r| actual.value_at(r.horizon_timestamp).map(|a| (r, a)))
        .collect();
    if matched.is_empty() {
        return Err(AnalyticsError::InsufficientData(format!(
            "none of the {} forecast steps has an actual value in {}",
            results.len(),
            actual.key()
        )));
    }

    let forecast: Vec<f64> = matched.iter().map(|(r, _)| r.point_estimate).collect();
    let observed: Vec<f64> = matched.iter().map(|(_, a)| *a).collect();
    let accuracy = forecast_accuracy(&forecast, &observed)?;

    let inside = matched
        .iter()
        .filter(|(r, a)| *a >= r.lower_bound && *a <= r.upper_bound)
        .count();

    Ok(ForecastMetrics {
        mae: accuracy.mae,
        mse: accuracy.mse,
        rmse: accuracy.rmse,
        mape: accuracy.mape,
        smape: accuracy.smape,
        coverage: inside as f64 / matched.len() as f64 * 100.0,
        n: matched.len(),
    })
}

/// Point accuracy of `forecast` against `actual`
pub fn forecast_accuracy(forecast: &[f64], actual: &[f64]) -> Result<ForecastAccuracy> {
    if forecast.len() != actual.len() || forecast.is_empty() {
        return Err(AnalyticsError::InvalidParameter(
            "Forecast and actual values must have the same non-zero length".to_string(),
        ));
    }

    let n = forecast.len() as f64;
    let errors: Vec<f64> = forecast.iter().zip(actual.iter()).map(|(&f, &a)| a - f).collect();

    let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;
    let mse = errors.iter().map(|e| e.powi(2)).sum::<f64>() / n;

    // percentage error is undefined at zero actuals, those steps are left out
    let percentages: Vec<f64> = actual
        .iter()
        .zip(errors.iter())
        .filter(|(&a, _)| a != 0.0)
        .map(|(&a, &e)| (e.abs() / a.abs()) * 100.0)
        .collect();
    let mape = if percentages.is_empty() {
        0.0
    } else {
        percentages.iter().sum::<f64>() / percentages.len() as f64
    };

    let smape = actual
        .iter()
        .zip(forecast.iter())
        .map(|(&a, &f)| {
            let scale = a.abs() + f.abs();
            if scale == 0.0 {
                0.0
            } else {
                200.0 * (a - f).abs() / scale
            }
        })
        .sum::<f64>()
        / n;

    Ok(ForecastAccuracy {
        mae,
        mse,
        rmse: mse.sqrt(),
        mape,
        smape,
    })
}

/// Forecast accuracy metrics
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastAccuracy {
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
    pub mape: f64,
    pub smape: f64,
}

/// Forecast performance metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetrics {
    /// Mean Absolute Error
    pub mae: f64,
    /// Mean Squared Error
    pub mse: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Percentage Error over steps with a non-zero actual
    pub mape: f64,
    /// Symmetric Mean Absolute Percentage Error
    pub smape: f64,
    /// Percentage of actuals inside the forecast interval
    pub coverage: f64,
    /// Steps scored
    pub n: usize,
}

impl std::fmt::Display for ForecastMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Forecast Performance Metrics ({} steps):", self.n)?;
        writeln!(f, "  MAE:      {:.4}", self.mae)?;
        writeln!(f, "  MSE:      {:.4}", self.mse)?;
        writeln!(f, "  RMSE:     {:.4}", self.rmse)?;
        writeln!(f, "  MAPE:     {:.4}%", self.mape)?;
        writeln!(f, "  SMAPE:    {:.4}%", self.smape)?;
        writeln!(f, "  Coverage: {:.2}%", self.coverage)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forecast_accuracy() {
        let accuracy = forecast_accuracy(&[10.0, 20.0, 0.0], &[12.0, 20.0, 0.0]).unwrap();
        assert!((accuracy.mae - 2.0 / 3.0).abs() < 1e-12);
        assert!((accuracy.mse - 4.0 / 3.0).abs() < 1e-12);
        // the zero actual is left out of the percentage average
        assert!((accuracy.mape - (2.0 / 12.0 * 100.0) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_mape_without_nonzero_actuals_is_zero() {
        let accuracy = forecast_accuracy(&[1.0, -1.0], &[0.0, 0.0]).unwrap();
        assert_eq!(accuracy.mape, 0.0);
        assert!(accuracy.mae > 0.0);
    }

    #[test]
    fn test_mismatched_lengths_are_rejected() {
        assert!(forecast_accuracy(&[1.0], &[1.0, 2.0]).is_err());
        assert!(forecast_accuracy(&[], &[]).is_err());
    }
}
