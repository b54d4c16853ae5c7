//! Descriptive statistics
//!
//! Contains the moment-based helpers used across the analytics:
//! - Mean, population variance and standard deviation
//! - Two-sided normal quantiles for confidence intervals

use crate::{MathError, Result};
use statrs::distribution::{ContinuousCDF, Normal};

/// Arithmetic mean of a non-empty slice
pub fn mean(values: &[f64]) -> Result<f64> {
    if values.is_empty() {
        return Err(MathError::InsufficientData(
            "Cannot compute the mean of an empty slice".to_string(),
        ));
    }

    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population variance (divides by `n`)
pub fn variance(values: &[f64]) -> Result<f64> {
    let mu = mean(values)?;

    let sum_sq: f64 = values
        .iter()
        .map(|&v| {
            let diff = v - mu;
            diff * diff
        })
        .sum();

    Ok(sum_sq / values.len() as f64)
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> Result<f64> {
    Ok(variance(values)?.sqrt())
}

/// Two-sided standard normal quantile for a confidence level.
///
/// `normal_quantile(0.95)` is roughly 1.96: the half-width multiplier of a
/// symmetric 95% interval.
pub fn normal_quantile(confidence_level: f64) -> Result<f64> {
    if !(confidence_level > 0.0 && confidence_level < 1.0) {
        return Err(MathError::InvalidInput(format!(
            "Confidence level must be between 0 and 1 (exclusive), got {}",
            confidence_level
        )));
    }

    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| MathError::CalculationError(format!("standard normal: {}", e)))?;

    Ok(normal.inverse_cdf(0.5 + confidence_level / 2.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_variance() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];

        assert!((mean(&values).unwrap() - 5.0).abs() < 1e-12);
        assert!((variance(&values).unwrap() - 4.0).abs() < 1e-12);
        assert!((std_dev(&values).unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_slice_is_insufficient() {
        assert!(matches!(mean(&[]), Err(MathError::InsufficientData(_))));
        assert!(variance(&[]).is_err());
    }

    #[test]
    fn test_normal_quantile() {
        assert!((normal_quantile(0.95).unwrap() - 1.959964).abs() < 1e-4);
        assert!((normal_quantile(0.99).unwrap() - 2.575829).abs() < 1e-4);
        assert!(normal_quantile(1.0).is_err());
        assert!(normal_quantile(0.0).is_err());
    }
}
