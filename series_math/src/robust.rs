//! Robust location and scale estimators
//!
//! Contains:
//! - Median and median absolute deviation (MAD)
//! - A fixed-size trailing window that reports both

use crate::{MathError, Result};
use std::collections::VecDeque;

/// Scale factor that makes the MAD a consistent estimator of the standard
/// deviation for normally distributed data.
pub const MAD_NORMAL_CONSISTENCY: f64 = 1.4826;

/// Median of a non-empty slice. NaN values are rejected.
pub fn median(values: &[f64]) -> Result<f64> {
    if values.is_empty() {
        return Err(MathError::InsufficientData(
            "Cannot compute the median of an empty slice".to_string(),
        ));
    }
    if values.iter().any(|v| v.is_nan()) {
        return Err(MathError::InvalidInput(
            "Median input contains NaN".to_string(),
        ));
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Ok((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Ok(sorted[mid])
    }
}

/// Median absolute deviation around `center` (unscaled).
pub fn median_absolute_deviation(values: &[f64], center: f64) -> Result<f64> {
    let deviations: Vec<f64> = values.iter().map(|&v| (v - center).abs()).collect();
    median(&deviations)
}

/// Fixed-size trailing window over the most recent observations.
#[derive(Debug, Clone)]
pub struct TrailingWindow {
    period: usize,
    values: VecDeque<f64>,
}

impl TrailingWindow {
    /// Create a new trailing window holding at most `period` values
    pub fn new(period: usize) -> Result<Self> {
        if period == 0 {
            return Err(MathError::InvalidInput(
                "Period must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            period,
            values: VecDeque::with_capacity(period),
        })
    }

    /// Push a value, evicting the oldest one once the window is full
    pub fn push(&mut self, value: f64) {
        self.values.push_back(value);

        if self.values.len() > self.period {
            self.values.pop_front();
        }
    }

    /// Whether the window holds `period` values
    pub fn is_full(&self) -> bool {
        self.values.len() == self.period
    }

    /// Number of values currently held
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Median of the window contents
    pub fn median(&self) -> Result<f64> {
        let (front, back) = self.values.as_slices();
        if back.is_empty() {
            median(front)
        } else {
            median(&self.values.iter().copied().collect::<Vec<f64>>())
        }
    }

    /// Median and normal-consistent MAD scale of the window contents
    pub fn median_and_scale(&self) -> Result<(f64, f64)> {
        let values: Vec<f64> = self.values.iter().copied().collect();
        let center = median(&values)?;
        let mad = median_absolute_deviation(&values, center)?;

        Ok((center, mad * MAD_NORMAL_CONSISTENCY))
    }

    /// Get the window period
    pub fn period(&self) -> usize {
        self.period
    }

    /// Reset the window, clearing all values
    pub fn reset(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]).unwrap(), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]).unwrap(), 2.5);
        assert!(median(&[]).is_err());
        assert!(median(&[1.0, f64::NAN]).is_err());
    }

    #[test]
    fn test_mad_ignores_single_spike() {
        let values = [10.0, 11.0, 9.0, 10.0, 500.0];
        let center = median(&values).unwrap();
        assert_eq!(center, 10.0);

        // deviations: 0, 1, 1, 0, 490 -> median 1
        let mad = median_absolute_deviation(&values, center).unwrap();
        assert_eq!(mad, 1.0);
    }

    #[test]
    fn test_trailing_window_evicts_oldest() {
        let mut window = TrailingWindow::new(3).unwrap();
        window.push(1.0);
        window.push(2.0);
        assert!(!window.is_full());

        window.push(3.0);
        window.push(100.0);
        assert!(window.is_full());
        assert_eq!(window.len(), 3);

        // window holds 2, 3, 100
        assert_eq!(window.median().unwrap(), 3.0);

        let (center, scale) = window.median_and_scale().unwrap();
        assert_eq!(center, 3.0);
        assert!((scale - MAD_NORMAL_CONSISTENCY).abs() < 1e-12);
    }

    #[test]
    fn test_trailing_window_rejects_zero_period() {
        assert!(TrailingWindow::new(0).is_err());
    }
}
