//! Local regression smoothing and seasonal-trend decomposition
//!
//! - [`loess`]: tricube-weighted local linear fit, evaluated at any position
//! - [`moving_average`]: mean over consecutive runs of fixed length
//! - [`stl`]: STL decomposition into seasonal, trend and remainder, with
//!   optional bisquare robustness iterations

use crate::robust::median;
use crate::{MathError, Result};

/// Local linear fit of `values` at position `x` from the `span` nearest points.
///
/// `values[i]` sits at position `i`; `x` may fall outside `0..len` to
/// extrapolate. Each point's tricube weight is scaled by `weights[i]`.
/// Returns `None` when the neighbourhood carries no weight.
pub fn loess(values: &[f64], weights: &[f64], span: usize, x: f64) -> Option<f64> {
    let n = values.len();
    if n == 0 || span == 0 || weights.len() != n || !x.is_finite() {
        return None;
    }
    let q = span.min(n);

    // q consecutive points nearest to x
    let mut left = (x.round() as i64 - q as i64 / 2).clamp(0, (n - q) as i64) as usize;
    while left + q < n && x - left as f64 > (left + q) as f64 - x {
        left += 1;
    }
    while left > 0 && (left + q - 1) as f64 - x > x - (left - 1) as f64 {
        left -= 1;
    }
    let right = left + q - 1;

    let mut h = (x - left as f64).max(right as f64 - x);
    if span > n {
        h += ((span - n) / 2) as f64;
    }
    let (near, far) = (0.001 * h, 0.999 * h);

    let mut local = Vec::with_capacity(q);
    let mut total = 0.0;
    for (i, &w) in weights.iter().enumerate().take(right + 1).skip(left) {
        let r = (i as f64 - x).abs();
        let kernel = if r <= near {
            1.0
        } else if r <= far {
            (1.0 - (r / h).powi(3)).powi(3)
        } else {
            0.0
        };
        let weight = w * kernel;
        local.push((i as f64, weight));
        total += weight;
    }
    if total <= 0.0 {
        return None;
    }

    let center = local.iter().map(|(p, w)| p * w).sum::<f64>() / total;
    let spread = local.iter().map(|(p, w)| w * (p - center).powi(2)).sum::<f64>() / total;
    let sloped = spread.sqrt() > 0.001 * (n as f64 - 1.0).max(1.0);

    let fit = local
        .iter()
        .zip(&values[left..=right])
        .map(|(&(p, w), &y)| {
            let mut coefficient = w / total;
            if sloped {
                coefficient *= 1.0 + (x - center) * (p - center) / spread;
            }
            coefficient * y
        })
        .sum();
    Some(fit)
}

/// Means of every run of `len` consecutive values (`values.len() - len + 1` of them)
pub fn moving_average(values: &[f64], len: usize) -> Vec<f64> {
    if len == 0 || len > values.len() {
        return Vec::new();
    }
    let mut sum: f64 = values[..len].iter().sum();
    let mut out = Vec::with_capacity(values.len() - len + 1);
    out.push(sum / len as f64);
    for i in len..values.len() {
        sum += values[i] - values[i - len];
        out.push(sum / len as f64);
    }
    out
}

/// STL smoother spans and loop counts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StlParams {
    /// Observations per seasonal cycle
    pub period: usize,
    /// Span of the cycle-subseries smoother, odd and at least 3
    pub seasonal: usize,
    /// Span of the trend smoother, odd and larger than `period`
    pub trend: usize,
    /// Span of the low-pass smoother, odd and larger than `period`
    pub low_pass: usize,
    pub inner_iterations: usize,
    pub robust_iterations: usize,
}

impl StlParams {
    pub fn new(period: usize, seasonal: usize, trend: usize) -> Self {
        Self {
            period,
            seasonal,
            trend,
            low_pass: next_odd(period + 1),
            inner_iterations: 5,
            robust_iterations: 0,
        }
    }

    /// Downweight outliers with bisquare weights between passes
    pub fn robust(self) -> Self {
        Self {
            inner_iterations: 2,
            robust_iterations: 15,
            ..self
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.period < 2 {
            return Err(MathError::InvalidInput("STL period must be at least 2".to_string()));
        }
        if self.seasonal < 3 || self.seasonal % 2 == 0 {
            return Err(MathError::InvalidInput(format!(
                "Seasonal span must be odd and at least 3, got {}",
                self.seasonal
            )));
        }
        for (name, span) in [("Trend", self.trend), ("Low-pass", self.low_pass)] {
            if span <= self.period || span % 2 == 0 {
                return Err(MathError::InvalidInput(format!(
                    "{} span must be odd and larger than the period {}, got {}",
                    name, self.period, span
                )));
            }
        }
        if self.inner_iterations == 0 {
            return Err(MathError::InvalidInput("STL needs at least one inner iteration".to_string()));
        }
        Ok(())
    }
}

fn next_odd(value: usize) -> usize {
    if value % 2 == 0 {
        value + 1
    } else {
        value
    }
}

/// Components of an STL decomposition; `seasonal + trend + remainder` equals the input
#[derive(Debug, Clone, PartialEq)]
pub struct StlDecomposition {
    pub seasonal: Vec<f64>,
    pub trend: Vec<f64>,
    pub remainder: Vec<f64>,
    /// Final robustness weight per observation (all 1.0 without robust passes)
    pub weights: Vec<f64>,
}

/// Seasonal-trend decomposition by loess
pub fn stl(values: &[f64], params: &StlParams) -> Result<StlDecomposition> {
    params.validate()?;
    let n = values.len();
    let period = params.period;
    if n < 2 * period {
        return Err(MathError::InsufficientData(format!(
            "STL needs at least two cycles ({} values), have {}",
            2 * period,
            n
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(MathError::InvalidInput("STL input contains non-finite values".to_string()));
    }

    let mut trend = vec![0.0; n];
    let mut seasonal = vec![0.0; n];
    let mut weights = vec![1.0; n];

    for pass in 0..=params.robust_iterations {
        for _ in 0..params.inner_iterations {
            let detrended: Vec<f64> = values.iter().zip(&trend).map(|(y, t)| y - t).collect();
            let cycle = cycle_subseries(&detrended, &weights, period, params.seasonal);
            let low = low_pass(&cycle, period, params.low_pass);
            for i in 0..n {
                seasonal[i] = cycle[i + period] - low[i];
            }

            let deseasonalised: Vec<f64> = values.iter().zip(&seasonal).map(|(y, s)| y - s).collect();
            trend = smooth(&deseasonalised, &weights, params.trend);
        }

        if pass < params.robust_iterations {
            weights = bisquare_weights(values, &seasonal, &trend)?;
        }
    }

    let remainder = values
        .iter()
        .zip(seasonal.iter().zip(&trend))
        .map(|(y, (s, t))| y - s - t)
        .collect();
    Ok(StlDecomposition {
        seasonal,
        trend,
        remainder,
        weights,
    })
}

/// Smooth every phase's subseries and extend it one cycle on both ends.
/// Output length is `n + 2 * period`.
fn cycle_subseries(detrended: &[f64], weights: &[f64], period: usize, span: usize) -> Vec<f64> {
    let mut cycle = vec![0.0; detrended.len() + 2 * period];
    for phase in 0..period {
        let values: Vec<f64> = detrended.iter().skip(phase).step_by(period).copied().collect();
        let phase_weights: Vec<f64> = weights.iter().skip(phase).step_by(period).copied().collect();
        let m = values.len() as i64;
        for position in -1..=m {
            let fitted = loess_or_nearest(&values, &phase_weights, span, position as f64);
            cycle[(position + 1) as usize * period + phase] = fitted;
        }
    }
    cycle
}

/// Moving averages of length period, period and 3, then a loess pass
fn low_pass(cycle: &[f64], period: usize, span: usize) -> Vec<f64> {
    let averaged = moving_average(&moving_average(&moving_average(cycle, period), period), 3);
    let ones = vec![1.0; averaged.len()];
    smooth(&averaged, &ones, span)
}

fn smooth(values: &[f64], weights: &[f64], span: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| loess_or_nearest(values, weights, span, i as f64))
        .collect()
}

fn loess_or_nearest(values: &[f64], weights: &[f64], span: usize, x: f64) -> f64 {
    loess(values, weights, span, x).unwrap_or_else(|| {
        let nearest = x.round().clamp(0.0, (values.len().max(1) - 1) as f64) as usize;
        values.get(nearest).copied().unwrap_or(0.0)
    })
}

fn bisquare_weights(values: &[f64], seasonal: &[f64], trend: &[f64]) -> Result<Vec<f64>> {
    let residuals: Vec<f64> = values
        .iter()
        .zip(seasonal.iter().zip(trend))
        .map(|(y, (s, t))| (y - s - t).abs())
        .collect();
    let h = 6.0 * median(&residuals)?;
    if h <= 0.0 {
        return Ok(vec![1.0; values.len()]);
    }
    Ok(residuals
        .iter()
        .map(|r| {
            let u = r / h;
            if u < 1.0 {
                (1.0 - u * u).powi(2)
            } else {
                0.0
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_loess_reproduces_a_line() {
        let values: Vec<f64> = (0..20).map(|i| 2.0 + 0.5 * i as f64).collect();
        let ones = vec![1.0; values.len()];

        for x in [-1.0, 0.0, 7.0, 19.0, 20.0] {
            let fitted = loess(&values, &ones, 7, x).unwrap();
            assert!((fitted - (2.0 + 0.5 * x)).abs() < 1e-9, "x = {}", x);
        }
        assert_eq!(loess(&values, &vec![0.0; 20], 7, 3.0), None);
    }

    #[test]
    fn test_moving_average_lengths() {
        let averaged = moving_average(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_eq!(averaged, vec![2.0, 3.0, 4.0]);
        assert!(moving_average(&[1.0], 3).is_empty());
    }

    #[test]
    fn test_stl_separates_daily_cycle_from_trend() {
        let period = 24;
        let values: Vec<f64> = (0..period * 14)
            .map(|i| {
                let t = i as f64;
                50.0 + 0.05 * t + 10.0 * (2.0 * PI * t / period as f64).sin()
            })
            .collect();

        let parts = stl(&values, &StlParams::new(period, 25, 169)).unwrap();

        for i in period..values.len() - period {
            let t = i as f64;
            let expected = 10.0 * (2.0 * PI * t / period as f64).sin();
            assert!((parts.seasonal[i] - expected).abs() < 0.5, "seasonal at {}", i);
            assert!((parts.trend[i] - (50.0 + 0.05 * t)).abs() < 0.5, "trend at {}", i);
        }
        for (i, y) in values.iter().enumerate() {
            let sum = parts.seasonal[i] + parts.trend[i] + parts.remainder[i];
            assert!((sum - y).abs() < 1e-9);
        }
    }

    #[test]
    fn test_robust_stl_downweights_a_spike() {
        let period = 12;
        let mut values: Vec<f64> = (0..period * 10)
            .map(|i| 5.0 * (2.0 * PI * i as f64 / period as f64).cos() + 0.3 * (1.7 * i as f64).sin())
            .collect();
        values[60] += 100.0;

        let parts = stl(&values, &StlParams::new(period, 7, 25).robust()).unwrap();
        assert!(parts.weights[60] < 0.1);
        assert!(parts.remainder[60] > 80.0);
    }

    #[test]
    fn test_stl_rejects_bad_spans_and_short_input() {
        assert!(stl(&[1.0; 100], &StlParams::new(24, 24, 169)).is_err());
        assert!(stl(&[1.0; 100], &StlParams::new(24, 25, 23)).is_err());
        assert!(matches!(
            stl(&[1.0; 30], &StlParams::new(24, 25, 169)),
            Err(MathError::InsufficientData(_))
        ));
    }
}
