//! Seasonal naive baseline: each forecast repeats the value one season back.

use crate::error::{AnalyticsError, Result};
use crate::models::{check_inputs, FitDiagnostics, ForecastModel, ModelForecast, TrainedForecastModel};

#[derive(Debug, Clone)]
pub struct SeasonalNaive {
    period: usize,
    name: String,
}

impl SeasonalNaive {
    pub fn new(period: usize) -> Result<Self> {
        medallion::utils::validate_period(period, 1).map_err(AnalyticsError::InvalidParameter)?;
        Ok(Self {
            period,
            name: format!("SeasonalNaive({})", period),
        })
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl ForecastModel for SeasonalNaive {
    type Trained = FittedSeasonalNaive;

    /// Regressors are checked for shape and otherwise ignored.
    fn train(&self, target: &[f64], exog: &[Vec<f64>]) -> Result<FittedSeasonalNaive> {
        check_inputs(target, exog)?;
        if target.len() < 2 * self.period {
            return Err(AnalyticsError::InsufficientData(format!(
                "{} needs two full seasons ({} points), have {}",
                self.name,
                2 * self.period,
                target.len()
            )));
        }

        let residuals: Vec<f64> = (self.period..target.len())
            .map(|t| target[t] - target[t - self.period])
            .collect();
        let sigma2 = residuals.iter().map(|e| e * e).sum::<f64>() / residuals.len() as f64;

        Ok(FittedSeasonalNaive {
            name: self.name.clone(),
            last_season: target[target.len() - self.period..].to_vec(),
            sigma: sigma2.sqrt(),
            diagnostics: FitDiagnostics::from_residuals(&residuals, 0, 1)?,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone)]
pub struct FittedSeasonalNaive {
    name: String,
    last_season: Vec<f64>,
    sigma: f64,
    diagnostics: FitDiagnostics,
}

impl TrainedForecastModel for FittedSeasonalNaive {
    fn forecast(&self, _future_exog: &[Vec<f64>], horizon: usize) -> Result<ModelForecast> {
        let period = self.last_season.len();
        let values = (0..horizon).map(|h| self.last_season[h % period]).collect();
        // error grows with the number of seasons stepped over
        let std_errors = (0..horizon)
            .map(|h| self.sigma * ((h / period + 1) as f64).sqrt())
            .collect();
        Ok(ModelForecast { values, std_errors })
    }

    fn diagnostics(&self) -> &FitDiagnostics {
        &self.diagnostics
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeats_last_season() {
        let target: Vec<f64> = (0..12).map(|i| (i % 4) as f64 * 10.0 + (i / 4) as f64).collect();
        let fitted = SeasonalNaive::new(4).unwrap().train(&target, &[]).unwrap();

        let forecast = fitted.forecast(&[], 6).unwrap();
        assert_eq!(forecast.values, vec![2.0, 12.0, 22.0, 32.0, 2.0, 12.0]);
        // one step per season, so the residual is always 1
        assert!((forecast.std_errors[0] - 1.0).abs() < 1e-12);
        assert!((forecast.std_errors[4] - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_needs_two_seasons() {
        let model = SeasonalNaive::new(24).unwrap();
        assert!(matches!(
            model.train(&[1.0; 30], &[]),
            Err(AnalyticsError::InsufficientData(_))
        ));
        assert!(SeasonalNaive::new(0).is_err());
    }
}
