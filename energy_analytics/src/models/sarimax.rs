//! Seasonal ARX model with moving-average residual terms
//!
//! The target and every regressor are differenced with
//! `(1 - B)^d (1 - B^m)^D`. The differenced target is then regressed on its
//! own lags `{1..p} ∪ {m, 2m, .., Pm}`, the differenced regressors, and lagged
//! residuals `{1..q} ∪ {m, 2m, .., Qm}`. Seasonal and non-seasonal lags enter
//! additively. A constant is estimated only when no differencing applies.
//!
//! Estimation is iterated Hannan-Rissanen least squares: the first pass fits
//! without residual terms, later passes add the residuals of the previous pass
//! until the coefficients stop moving. With a fixed iteration budget and
//! tolerance the fit is fully deterministic.

use crate::error::{AnalyticsError, Result};
use crate::models::{check_inputs, FitDiagnostics, ForecastModel, ModelForecast, TrainedForecastModel};
use medallion::PipelineConfig;
use serde::{Deserialize, Serialize};
use series_math::least_squares;
use tracing::debug;

/// Fewest usable observations after differencing and lag burn-in
const MIN_OBSERVATIONS: usize = 10;

/// Model orders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SarimaxSpec {
    pub p: usize,
    pub d: usize,
    pub q: usize,
    pub seasonal_p: usize,
    pub seasonal_d: usize,
    pub seasonal_q: usize,
    pub period: usize,
}

impl std::fmt::Display for SarimaxSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SARIMAX({},{},{})({},{},{},{})",
            self.p, self.d, self.q, self.seasonal_p, self.seasonal_d, self.seasonal_q, self.period
        )
    }
}

impl SarimaxSpec {
    fn has_seasonal_terms(&self) -> bool {
        self.seasonal_p > 0 || self.seasonal_d > 0 || self.seasonal_q > 0
    }

    fn ar_lags(&self) -> Vec<usize> {
        lag_set(self.p, self.seasonal_p, self.period)
    }

    fn ma_lags(&self) -> Vec<usize> {
        lag_set(self.q, self.seasonal_q, self.period)
    }

    fn has_intercept(&self) -> bool {
        self.d == 0 && self.seasonal_d == 0
    }
}

fn lag_set(order: usize, seasonal_order: usize, period: usize) -> Vec<usize> {
    let mut lags: Vec<usize> = (1..=order).collect();
    lags.extend((1..=seasonal_order).map(|i| i * period));
    lags.sort_unstable();
    lags.dedup();
    lags
}

/// Coefficients of `(1 - B)^d (1 - B^m)^D`, lowest power first
fn differencing_polynomial(d: usize, seasonal_d: usize, period: usize) -> Vec<f64> {
    let mut poly = vec![1.0];
    for _ in 0..d {
        poly = multiply(&poly, &[1.0, -1.0]);
    }
    for _ in 0..seasonal_d {
        let mut seasonal = vec![0.0; period + 1];
        seasonal[0] = 1.0;
        seasonal[period] = -1.0;
        poly = multiply(&poly, &seasonal);
    }
    poly
}

fn multiply(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

/// `poly(B) x_t` for every `t` with a full history
fn apply_polynomial(poly: &[f64], series: &[f64]) -> Vec<f64> {
    let degree = poly.len() - 1;
    (degree..series.len())
        .map(|t| poly.iter().enumerate().map(|(j, c)| c * series[t - j]).sum())
        .collect()
}

/// Position of each coefficient group in the parameter vector
#[derive(Debug, Clone)]
struct Layout {
    intercept: bool,
    ar_lags: Vec<usize>,
    exog: usize,
    ma_lags: Vec<usize>,
}

impl Layout {
    fn len(&self) -> usize {
        usize::from(self.intercept) + self.ar_lags.len() + self.exog + self.ma_lags.len()
    }

    fn burn_in(&self) -> usize {
        self.ar_lags
            .iter()
            .chain(self.ma_lags.iter())
            .copied()
            .max()
            .unwrap_or(0)
    }

    /// Regressors for step `t`. Residual lags are included when `e` is given.
    fn row(&self, t: usize, w: &[f64], z: &[Vec<f64>], e: Option<&[f64]>) -> Vec<f64> {
        let mut row = Vec::with_capacity(self.len());
        if self.intercept {
            row.push(1.0);
        }
        row.extend(self.ar_lags.iter().map(|&l| w[t - l]));
        row.extend(z.iter().map(|column| column[t]));
        if let Some(e) = e {
            row.extend(self.ma_lags.iter().map(|&l| e[t - l]));
        }
        row
    }

    /// One-step prediction of `w[t]` under `coefficients`
    fn predict(&self, coefficients: &[f64], t: usize, w: &[f64], z: &[Vec<f64>], e: &[f64]) -> f64 {
        self.row(t, w, z, Some(e))
            .iter()
            .zip(coefficients.iter())
            .map(|(x, b)| x * b)
            .sum()
    }

    fn ma_coefficients<'a>(&self, coefficients: &'a [f64]) -> &'a [f64] {
        &coefficients[coefficients.len() - self.ma_lags.len()..]
    }

    fn ar_coefficients<'a>(&self, coefficients: &'a [f64]) -> &'a [f64] {
        let start = usize::from(self.intercept);
        &coefficients[start..start + self.ar_lags.len()]
    }
}

/// Seasonal ARX model with MA residual terms
#[derive(Debug, Clone)]
pub struct Sarimax {
    spec: SarimaxSpec,
    max_iterations: usize,
    tolerance: f64,
    name: String,
}

impl Sarimax {
    /// # Arguments
    /// * `order` - Non-seasonal `[p, d, q]`
    /// * `seasonal_order` - Seasonal `[P, D, Q, m]`
    /// * `max_iterations` - Estimation passes before the fit is declared non-convergent
    /// * `tolerance` - Relative coefficient change that counts as converged
    pub fn new(order: [usize; 3], seasonal_order: [usize; 4], max_iterations: usize, tolerance: f64) -> Result<Self> {
        let [p, d, q] = order;
        let [seasonal_p, seasonal_d, seasonal_q, period] = seasonal_order;
        let spec = SarimaxSpec {
            p,
            d,
            q,
            seasonal_p,
            seasonal_d,
            seasonal_q,
            period,
        };

        if spec.has_seasonal_terms() && period < 2 {
            return Err(AnalyticsError::InvalidParameter(format!(
                "{} has seasonal terms but a period below 2",
                spec
            )));
        }
        if max_iterations == 0 {
            return Err(AnalyticsError::InvalidParameter(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if !(tolerance > 0.0) {
            return Err(AnalyticsError::InvalidParameter(
                "tolerance must be positive".to_string(),
            ));
        }

        Ok(Self {
            name: spec.to_string(),
            spec,
            max_iterations,
            tolerance,
        })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Self::new(
            config.forecast_order,
            config.forecast_seasonal_order,
            config.forecast_max_iterations,
            config.forecast_tolerance,
        )
    }

    pub fn spec(&self) -> SarimaxSpec {
        self.spec
    }

    fn fit_failure(&self, iterations: usize, reason: impl Into<String>) -> AnalyticsError {
        AnalyticsError::FitConvergence {
            spec: format!(
                "{} (max_iterations={}, tolerance={})",
                self.spec, self.max_iterations, self.tolerance
            ),
            iterations,
            reason: reason.into(),
        }
    }

    /// Residuals computed forward in time so lagged residuals use the current
    /// coefficients
    fn recursive_residuals(
        &self,
        layout: &Layout,
        coefficients: &[f64],
        w: &[f64],
        z: &[Vec<f64>],
        iteration: usize,
    ) -> Result<Vec<f64>> {
        let mut e = vec![0.0; w.len()];
        for t in layout.burn_in()..w.len() {
            e[t] = w[t] - layout.predict(coefficients, t, w, z, &e);
            if !e[t].is_finite() {
                return Err(self.fit_failure(iteration, "residual recursion diverged"));
            }
        }
        Ok(e)
    }

    fn solve(&self, rows: &[Vec<f64>], y: &[f64], iteration: usize) -> Result<Vec<f64>> {
        // pure differencing models have nothing to estimate
        if rows.first().map_or(true, |r| r.is_empty()) {
            return Ok(Vec::new());
        }
        least_squares(rows, y).map_err(|e| self.fit_failure(iteration, e.to_string()))
    }
}

impl ForecastModel for Sarimax {
    type Trained = FittedSarimax;

    fn train(&self, target: &[f64], exog: &[Vec<f64>]) -> Result<FittedSarimax> {
        check_inputs(target, exog)?;

        let poly = differencing_polynomial(self.spec.d, self.spec.seasonal_d, self.spec.period);
        let degree = poly.len() - 1;
        if target.len() <= degree {
            return Err(AnalyticsError::InsufficientData(format!(
                "{} needs more than {} observations to difference, have {}",
                self.spec,
                degree,
                target.len()
            )));
        }
        let w = apply_polynomial(&poly, target);
        let z: Vec<Vec<f64>> = exog.iter().map(|c| apply_polynomial(&poly, c)).collect();

        let layout = Layout {
            intercept: self.spec.has_intercept(),
            ar_lags: self.spec.ar_lags(),
            exog: exog.len(),
            ma_lags: self.spec.ma_lags(),
        };
        let start = layout.burn_in();
        let usable = w.len().saturating_sub(start);
        if usable < MIN_OBSERVATIONS || usable <= 2 * layout.len() {
            return Err(AnalyticsError::InsufficientData(format!(
                "{} with {} parameters needs more than {} usable observations, have {}",
                self.spec,
                layout.len(),
                (2 * layout.len()).max(MIN_OBSERVATIONS - 1),
                usable
            )));
        }
        let response = &w[start..];

        // First pass: no residual terms
        let rows: Vec<Vec<f64>> = (start..w.len()).map(|t| layout.row(t, &w, &z, None)).collect();
        let mut coefficients = self.solve(&rows, response, 1)?;
        coefficients.extend(std::iter::repeat(0.0).take(layout.ma_lags.len()));
        let mut residuals = self.recursive_residuals(&layout, &coefficients, &w, &z, 1)?;
        let mut iterations = 1;

        if !layout.ma_lags.is_empty() {
            let mut converged = false;
            let mut last_change = f64::INFINITY;

            for iteration in 2..=self.max_iterations {
                let rows: Vec<Vec<f64>> = (start..w.len())
                    .map(|t| layout.row(t, &w, &z, Some(&residuals)))
                    .collect();
                let updated = self.solve(&rows, response, iteration)?;
                residuals = self.recursive_residuals(&layout, &updated, &w, &z, iteration)?;

                last_change = updated
                    .iter()
                    .zip(coefficients.iter())
                    .map(|(a, b)| (a - b).abs())
                    .fold(0.0, f64::max);
                let magnitude = updated.iter().map(|c| c.abs()).fold(0.0, f64::max);
                coefficients = updated;
                iterations = iteration;

                debug!(model = %self.spec, iteration, change = last_change, "hannan-rissanen pass");
                if last_change < self.tolerance * (1.0 + magnitude) {
                    converged = true;
                    break;
                }
            }

            if !converged {
                return Err(self.fit_failure(
                    iterations,
                    format!("coefficients still changing by {:.3e}", last_change),
                ));
            }
        }

        let in_sample = &residuals[start..];
        let dof = (in_sample.len() - layout.len()) as f64;
        let sigma2 = in_sample.iter().map(|e| e * e).sum::<f64>() / dof;
        let diagnostics = FitDiagnostics::from_residuals(in_sample, layout.len(), iterations)?;

        Ok(FittedSarimax {
            name: self.name.clone(),
            layout,
            coefficients,
            poly,
            target: target.to_vec(),
            exog: exog.to_vec(),
            w,
            residuals,
            sigma2,
            diagnostics,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Trained SARIMAX model
#[derive(Debug, Clone)]
pub struct FittedSarimax {
    name: String,
    layout: Layout,
    coefficients: Vec<f64>,
    /// Differencing polynomial
    poly: Vec<f64>,
    target: Vec<f64>,
    exog: Vec<Vec<f64>>,
    /// Differenced target
    w: Vec<f64>,
    /// Residuals aligned with `w`, zero during burn-in
    residuals: Vec<f64>,
    sigma2: f64,
    diagnostics: FitDiagnostics,
}

impl FittedSarimax {
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn residual_variance(&self) -> f64 {
        self.sigma2
    }

    /// MA(infinity) weights of the target, `psi[0] = 1`
    fn psi_weights(&self, count: usize) -> Vec<f64> {
        // phi(B) * delta(B), written as 1 + sum g_i B^i
        let mut phi = vec![0.0; self.layout.ar_lags.iter().max().map_or(1, |m| m + 1)];
        phi[0] = 1.0;
        for (lag, c) in self
            .layout
            .ar_lags
            .iter()
            .zip(self.layout.ar_coefficients(&self.coefficients))
        {
            phi[*lag] -= c;
        }
        let g = multiply(&phi, &self.poly);

        let mut theta = vec![0.0; count];
        for (lag, c) in self
            .layout
            .ma_lags
            .iter()
            .zip(self.layout.ma_coefficients(&self.coefficients))
        {
            if *lag < count {
                theta[*lag] = *c;
            }
        }

        let mut psi = vec![0.0; count];
        for j in 0..count {
            let mut value = if j == 0 { 1.0 } else { theta[j] };
            for i in 1..=j.min(g.len() - 1) {
                value -= g[i] * psi[j - i];
            }
            psi[j] = value;
        }
        psi
    }
}

impl TrainedForecastModel for FittedSarimax {
    fn forecast(&self, future_exog: &[Vec<f64>], horizon: usize) -> Result<ModelForecast> {
        if future_exog.len() != self.exog.len() {
            return Err(AnalyticsError::Misaligned(format!(
                "model was trained with {} regressors, got {}",
                self.exog.len(),
                future_exog.len()
            )));
        }
        if let Some(short) = future_exog.iter().position(|c| c.len() < horizon) {
            return Err(AnalyticsError::InsufficientData(format!(
                "regressor {} covers {} of {} horizon steps",
                short,
                future_exog[short].len(),
                horizon
            )));
        }

        let degree = self.poly.len() - 1;
        let n = self.target.len();
        let mut y = self.target.clone();
        let mut w = self.w.clone();
        let mut e = self.residuals.clone();
        let z: Vec<Vec<f64>> = self
            .exog
            .iter()
            .zip(future_exog.iter())
            .map(|(past, future)| {
                let extended: Vec<f64> = past.iter().chain(future[..horizon].iter()).copied().collect();
                apply_polynomial(&self.poly, &extended)
            })
            .collect();

        let mut values = Vec::with_capacity(horizon);
        for h in 0..horizon {
            let t_y = n + h;
            let t_w = t_y - degree;

            // future shocks have zero expectation
            w.push(0.0);
            e.push(0.0);
            let w_hat = self.layout.predict(&self.coefficients, t_w, &w, &z, &e);
            w[t_w] = w_hat;

            let carried: f64 = (1..=degree).map(|j| self.poly[j] * y[t_y - j]).sum();
            let y_hat = w_hat - carried;
            y.push(y_hat);
            values.push(y_hat);
        }

        let psi = self.psi_weights(horizon);
        let mut cumulative = 0.0;
        let std_errors = psi
            .iter()
            .map(|p| {
                cumulative += p * p;
                (self.sigma2 * cumulative).sqrt()
            })
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
    use medallion::utils::seasonal_values;

    #[test]
    fn test_differencing_polynomial() {
        assert_eq!(differencing_polynomial(1, 0, 24), vec![1.0, -1.0]);
        assert_eq!(differencing_polynomial(2, 0, 24), vec![1.0, -2.0, 1.0]);

        let seasonal = differencing_polynomial(1, 1, 4);
        assert_eq!(seasonal, vec![1.0, -1.0, 0.0, 0.0, -1.0, 1.0]);
    }

    #[test]
    fn test_lag_sets_merge_seasonal_lags() {
        assert_eq!(lag_set(2, 2, 24), vec![1, 2, 24, 48]);
        assert_eq!(lag_set(1, 1, 1), vec![1]);
        assert!(lag_set(0, 0, 24).is_empty());
    }

    #[test]
    fn test_pure_ar_recovers_coefficient() {
        let shocks = seasonal_values(400, 0.0, 0.0, 24, 1.0, 7);
        let mut y = vec![0.0; 400];
        for t in 1..400 {
            y[t] = 0.6 * y[t - 1] + shocks[t];
        }
        let model = Sarimax::new([1, 0, 0], [0, 0, 0, 0], 10, 1e-6).unwrap();
        let fitted = model.train(&y, &[]).unwrap();

        // intercept then phi
        assert!((fitted.coefficients()[1] - 0.6).abs() < 0.1);
        assert_eq!(fitted.diagnostics().iterations, 1);
    }

    #[test]
    fn test_psi_weights_of_ar1() {
        let shocks = seasonal_values(120, 0.0, 0.0, 24, 1.0, 11);
        let mut y = vec![0.0; 120];
        for t in 1..120 {
            y[t] = 0.5 * y[t - 1] + shocks[t];
        }
        let fitted = Sarimax::new([1, 0, 0], [0, 0, 0, 0], 10, 1e-6)
            .unwrap()
            .train(&y, &[])
            .unwrap();
        let phi = fitted.coefficients()[1];
        let psi = fitted.psi_weights(4);

        for (j, value) in psi.iter().enumerate() {
            assert!((value - phi.powi(j as i32)).abs() < 1e-12);
        }
    }

    #[test]
    fn test_random_walk_psi_weights_are_one() {
        let y: Vec<f64> = (0..60).map(|t| (t as f64 * 0.7).sin() * 3.0 + t as f64).collect();
        let fitted = Sarimax::new([0, 1, 0], [0, 0, 0, 0], 5, 1e-6)
            .unwrap()
            .train(&y, &[(0..60).map(|t| (t % 5) as f64).collect()])
            .unwrap();
        assert!(fitted.psi_weights(5).iter().all(|p| (p - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_rejects_seasonal_terms_without_period() {
        assert!(Sarimax::new([1, 0, 1], [1, 1, 1, 1], 10, 1e-4).is_err());
        assert!(Sarimax::new([1, 0, 1], [0, 0, 0, 0], 0, 1e-4).is_err());
    }
}
