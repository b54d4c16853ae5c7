//! Correlation measures
//!
//! - Pearson product-moment correlation between two paired samples
//! - Sample autocorrelation of a single series
//! - Ljung-Box portmanteau test for residual whiteness

use crate::descriptive::mean;
use crate::{MathError, Result};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Pearson correlation coefficient of paired samples.
///
/// Fails with `InsufficientData` for fewer than two pairs and with
/// `CalculationError` when either side has zero variance.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Result<f64> {
    if xs.len() != ys.len() {
        return Err(MathError::InvalidInput(format!(
            "Paired samples differ in length ({} vs {})",
            xs.len(),
            ys.len()
        )));
    }
    if xs.len() < 2 {
        return Err(MathError::InsufficientData(format!(
            "Need at least 2 pairs for correlation, have {}",
            xs.len()
        )));
    }

    let x_mean = mean(xs)?;
    let y_mean = mean(ys)?;

    let mut covariance = 0.0;
    let mut x_ss = 0.0;
    let mut y_ss = 0.0;

    for (&x, &y) in xs.iter().zip(ys.iter()) {
        let dx = x - x_mean;
        let dy = y - y_mean;
        covariance += dx * dy;
        x_ss += dx * dx;
        y_ss += dy * dy;
    }

    if is_flat(x_ss, xs) || is_flat(y_ss, ys) {
        return Err(MathError::CalculationError(
            "Correlation undefined: one sample has zero variance".to_string(),
        ));
    }

    // Clamp to absorb rounding just outside [-1, 1]
    Ok((covariance / (x_ss.sqrt() * y_ss.sqrt())).clamp(-1.0, 1.0))
}

/// Whether `sum_sq` (the squared deviations of `values`) is only rounding
/// noise relative to the magnitude of the values themselves.
fn is_flat(sum_sq: f64, values: &[f64]) -> bool {
    let magnitude = values.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    let floor = 4.0 * f64::EPSILON * magnitude;
    sum_sq <= values.len() as f64 * floor * floor
}

/// Sample autocorrelation at `lag`
pub fn autocorrelation(values: &[f64], lag: usize) -> Result<f64> {
    if lag >= values.len() {
        return Err(MathError::InsufficientData(format!(
            "Lag {} requires more than {} values",
            lag,
            values.len()
        )));
    }

    let mu = mean(values)?;
    let denominator: f64 = values.iter().map(|&v| (v - mu).powi(2)).sum();
    if is_flat(denominator, values) {
        return Err(MathError::CalculationError(
            "Autocorrelation undefined for a constant series".to_string(),
        ));
    }

    let numerator: f64 = values
        .iter()
        .zip(values.iter().skip(lag))
        .map(|(&a, &b)| (a - mu) * (b - mu))
        .sum();

    Ok(numerator / denominator)
}

/// Result of a Ljung-Box test
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LjungBox {
    /// Q statistic
    pub statistic: f64,
    /// Number of autocorrelation lags included
    pub lags: usize,
    /// Probability of a statistic at least this large under white noise
    pub p_value: f64,
}

/// Ljung-Box test over the first `lags` autocorrelations.
pub fn ljung_box(residuals: &[f64], lags: usize) -> Result<LjungBox> {
    if lags == 0 {
        return Err(MathError::InvalidInput(
            "Ljung-Box needs at least one lag".to_string(),
        ));
    }
    let n = residuals.len();
    if n <= lags + 1 {
        return Err(MathError::InsufficientData(format!(
            "Ljung-Box with {} lags needs more than {} residuals",
            lags,
            lags + 1
        )));
    }

    let mut statistic = 0.0;
    for k in 1..=lags {
        let rho = autocorrelation(residuals, k)?;
        statistic += rho * rho / (n - k) as f64;
    }
    statistic *= n as f64 * (n as f64 + 2.0);

    let chi_squared = ChiSquared::new(lags as f64)
        .map_err(|e| MathError::CalculationError(format!("chi-squared: {}", e)))?;
    let p_value = 1.0 - chi_squared.cdf(statistic);

    Ok(LjungBox {
        statistic,
        lags,
        p_value,
    })
}
