//! Forecasting models for silver series with exogenous regressors

use crate::error::{AnalyticsError, Result};
use serde::{Deserialize, Serialize};
use series_math::{ljung_box, mean, std_dev, LjungBox};
use std::fmt::Debug;

pub mod sarimax;
pub mod seasonal_naive;

/// Point forecasts with their standard errors, one per horizon step
#[derive(Debug, Clone, PartialEq)]
pub struct ModelForecast {
    pub values: Vec<f64>,
    pub std_errors: Vec<f64>,
}

impl ModelForecast {
    /// Symmetric `(lower, upper)` bounds at `z` standard errors
    pub fn intervals(&self, z: f64) -> Vec<(f64, f64)> {
        self.values
            .iter()
            .zip(self.std_errors.iter())
            .map(|(v, s)| (v - z * s, v + z * s))
            .collect()
    }
}

/// Residual statistics of a fitted model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitDiagnostics {
    pub residual_mean: f64,
    pub residual_std: f64,
    pub mae: f64,
    pub rmse: f64,
    /// `None` when there are too few residuals for the test
    pub ljung_box: Option<LjungBox>,
    pub aic: f64,
    /// Estimation passes used
    pub iterations: usize,
    /// Residuals the fit was scored on
    pub observations: usize,
}

impl FitDiagnostics {
    /// Summaries of in-sample residuals for a model with `parameters` estimated values
    pub fn from_residuals(residuals: &[f64], parameters: usize, iterations: usize) -> Result<Self> {
        if residuals.is_empty() {
            return Err(AnalyticsError::InsufficientData(
                "no residuals to summarise".to_string(),
            ));
        }
        let n = residuals.len() as f64;
        let sse: f64 = residuals.iter().map(|e| e * e).sum();
        let lags = (residuals.len() / 5).clamp(1, 10);

        Ok(Self {
            residual_mean: mean(residuals)?,
            residual_std: std_dev(residuals)?,
            mae: residuals.iter().map(|e| e.abs()).sum::<f64>() / n,
            rmse: (sse / n).sqrt(),
            ljung_box: ljung_box(residuals, lags).ok(),
            aic: n * (sse / n).max(f64::MIN_POSITIVE).ln() + 2.0 * parameters as f64,
            iterations,
            observations: residuals.len(),
        })
    }
}

/// Trained forecast model
pub trait TrainedForecastModel: Debug {
    /// Forecast `horizon` steps past the training data.
    ///
    /// `future_exog` holds one column per regressor, each covering at least
    /// `horizon` steps.
    fn forecast(&self, future_exog: &[Vec<f64>], horizon: usize) -> Result<ModelForecast>;

    fn diagnostics(&self) -> &FitDiagnostics;

    /// Name of the model with its fitted configuration
    fn name(&self) -> &str;
}

/// Forecast model that can be trained on a target and aligned regressors
pub trait ForecastModel: Debug + Clone {
    /// The type of trained model produced
    type Trained: TrainedForecastModel;

    /// Train on `target` with `exog` columns of the same length
    fn train(&self, target: &[f64], exog: &[Vec<f64>]) -> Result<Self::Trained>;

    /// Get the name of the model
    fn name(&self) -> &str;
}

/// Check regressors match the target length and contain only finite values
pub(crate) fn check_inputs(target: &[f64], exog: &[Vec<f64>]) -> Result<()> {
    if target.iter().any(|v| !v.is_finite()) {
        return Err(AnalyticsError::InvalidParameter(
            "target contains non-finite values".to_string(),
        ));
    }
    for (j, column) in exog.iter().enumerate() {
        if column.len() != target.len() {
            return Err(AnalyticsError::Misaligned(format!(
                "regressor {} has {} values for a target of {}",
                j,
                column.len(),
                target.len()
            )));
        }
        if column.iter().any(|v| !v.is_finite()) {
            return Err(AnalyticsError::InvalidParameter(format!(
                "regressor {} contains non-finite values",
                j
            )));
        }
    }
    Ok(())
}
