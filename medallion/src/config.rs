//! Pipeline configuration
//!
//! Every option has a default, so an empty TOML document is a valid
//! configuration. Unknown keys are rejected to catch typos early.
//!
//! Environment variables:
//! - `ENERGY_LAKE_CONFIG` path of a TOML file read by [`PipelineConfig::load`]

use crate::error::{PipelineError, Result};
use crate::model::{AggregateKind, WindowSpec};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "ENERGY_LAKE_CONFIG";

/// Options recognised by the pipeline stages and analytics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Silver grid step, e.g. "15m", "1h", "1d"
    pub canonical_interval: String,
    /// Longest gap, in intervals, that silver fills by interpolation
    pub max_interpolation_gap: usize,
    pub aggregate_window: WindowSpec,
    pub aggregate_kinds: Vec<AggregateKind>,
    pub anomaly_window_size: usize,
    pub anomaly_threshold: f64,
    /// Correlation window length in intervals
    pub correlation_window: usize,
    /// Distance between consecutive correlation windows in intervals
    pub correlation_step: usize,
    /// Inclusive `[min, max]` lag in intervals
    pub correlation_lag_range: [i64; 2],
    pub correlation_min_points: usize,
    /// Training window length in intervals
    pub forecast_training_window: usize,
    /// Forecast horizon in intervals
    pub forecast_horizon: usize,
    pub confidence_level: f64,
    /// Non-seasonal `[p, d, q]`
    pub forecast_order: [usize; 3],
    /// Seasonal `[P, D, Q, m]`
    pub forecast_seasonal_order: [usize; 4],
    pub forecast_max_iterations: usize,
    pub forecast_tolerance: f64,
    /// STL cycle length in intervals
    pub stl_period: usize,
    /// STL seasonal smoother span, odd
    pub stl_seasonal: usize,
    /// STL trend smoother span, odd and above `stl_period`
    pub stl_trend: usize,
    pub stl_robust: bool,
    /// Spectrogram segment length in intervals
    pub spectrogram_window: usize,
    /// Fraction of a segment shared with the next one
    pub spectrogram_overlap: f64,
    pub worker_threads: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            canonical_interval: "1h".to_string(),
            max_interpolation_gap: 3,
            aggregate_window: WindowSpec::Daily,
            aggregate_kinds: AggregateKind::all().to_vec(),
            anomaly_window_size: 24,
            anomaly_threshold: 3.5,
            correlation_window: 72,
            correlation_step: 24,
            correlation_lag_range: [-24, 24],
            correlation_min_points: 10,
            forecast_training_window: 672,
            forecast_horizon: 48,
            confidence_level: 0.95,
            forecast_order: [1, 0, 1],
            forecast_seasonal_order: [1, 1, 1, 24],
            forecast_max_iterations: 100,
            forecast_tolerance: 1e-4,
            stl_period: 24,
            stl_seasonal: 25,
            stl_trend: 169,
            stl_robust: false,
            spectrogram_window: 168,
            spectrogram_overlap: 0.5,
            worker_threads: 4,
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Load from the file named by `ENERGY_LAKE_CONFIG`, or the defaults when
    /// the variable is unset.
    pub fn load() -> Result<Self> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => {
                tracing::info!(path = %path, "loading pipeline configuration");
                Self::from_file(path)
            }
            _ => {
                tracing::debug!("no configuration file set, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// The canonical interval as a duration
    pub fn interval(&self) -> Result<Duration> {
        parse_interval(&self.canonical_interval)
    }

    pub fn validate(&self) -> Result<()> {
        self.interval()?;

        if self.aggregate_kinds.is_empty() {
            return Err(invalid("aggregate_kinds", "at least one aggregate is required"));
        }
        if let WindowSpec::Hours(0) = self.aggregate_window {
            return Err(invalid("aggregate_window", "hour windows must be at least 1 hour"));
        }
        if self.anomaly_window_size < 3 {
            return Err(invalid("anomaly_window_size", "must be at least 3"));
        }
        if !(self.anomaly_threshold > 0.0) {
            return Err(invalid("anomaly_threshold", "must be positive"));
        }
        if self.correlation_window < 2 {
            return Err(invalid("correlation_window", "must be at least 2"));
        }
        if self.correlation_step == 0 {
            return Err(invalid("correlation_step", "must be at least 1"));
        }
        let [min_lag, max_lag] = self.correlation_lag_range;
        if min_lag > max_lag {
            return Err(invalid(
                "correlation_lag_range",
                &format!("lower bound {} exceeds upper bound {}", min_lag, max_lag),
            ));
        }
        if self.correlation_min_points < 3 || self.correlation_min_points > self.correlation_window {
            return Err(invalid(
                "correlation_min_points",
                "must be at least 3 and no larger than correlation_window",
            ));
        }
        if self.forecast_training_window == 0 || self.forecast_horizon == 0 {
            return Err(invalid(
                "forecast_training_window",
                "training window and horizon must be non-empty",
            ));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(invalid("confidence_level", "must be in (0, 1)"));
        }
        let [sp, sd, sq, period] = self.forecast_seasonal_order;
        if (sp > 0 || sd > 0 || sq > 0) && period < 2 {
            return Err(invalid(
                "forecast_seasonal_order",
                "seasonal terms need a period of at least 2",
            ));
        }
        if self.forecast_max_iterations == 0 {
            return Err(invalid("forecast_max_iterations", "must be at least 1"));
        }
        if !(self.forecast_tolerance > 0.0) {
            return Err(invalid("forecast_tolerance", "must be positive"));
        }
        if self.stl_period < 2 {
            return Err(invalid("stl_period", "must be at least 2"));
        }
        if self.stl_seasonal < 3 || self.stl_seasonal % 2 == 0 {
            return Err(invalid("stl_seasonal", "must be odd and at least 3"));
        }
        if self.stl_trend <= self.stl_period || self.stl_trend % 2 == 0 {
            return Err(invalid("stl_trend", "must be odd and larger than stl_period"));
        }
        if self.spectrogram_window < 4 {
            return Err(invalid("spectrogram_window", "must be at least 4"));
        }
        if !(0.0..1.0).contains(&self.spectrogram_overlap) {
            return Err(invalid("spectrogram_overlap", "must be in [0, 1)"));
        }
        if self.worker_threads == 0 {
            return Err(invalid("worker_threads", "must be at least 1"));
        }

        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> PipelineError {
    PipelineError::InvalidConfig(format!("{}: {}", field, message))
}

/// Parse "15m", "30min", "1h", "1d" into a duration.
pub fn parse_interval(text: &str) -> Result<Duration> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (amount, unit) = text.split_at(split);

    let amount: i64 = amount.parse().map_err(|_| {
        invalid("canonical_interval", &format!("'{}' has no leading amount", text))
    })?;
    if amount <= 0 {
        return Err(invalid("canonical_interval", "must be positive"));
    }

    match unit.trim() {
        "m" | "min" => Ok(Duration::minutes(amount)),
        "h" => Ok(Duration::hours(amount)),
        "d" => Ok(Duration::days(amount)),
        other => Err(invalid(
            "canonical_interval",
            &format!("unknown unit '{}' (use m, h or d)", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.interval().unwrap(), Duration::hours(1));
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("15m").unwrap(), Duration::minutes(15));
        assert_eq!(parse_interval("30min").unwrap(), Duration::minutes(30));
        assert_eq!(parse_interval("1d").unwrap(), Duration::days(1));
        assert!(parse_interval("h").is_err());
        assert!(parse_interval("0h").is_err());
        assert!(parse_interval("2w").is_err());
    }

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
    }
}
