//! Utility functions and helpers shared across stages and tests
//!
//! Contains parameter validation helpers and seeded synthetic-series
//! generators. Generators take an explicit seed so fixtures are reproducible.

use crate::model::{
    Layer, QualityFlag, RawPoint, RawRecord, RawValue, SeriesKey, SilverSeries, TimeRange,
    TimeSeriesPoint,
};
use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// Basic validation for window-length parameters
pub fn validate_period(period: usize, min_value: usize) -> Result<(), String> {
    if period < min_value {
        return Err(format!("Period must be at least {}", min_value));
    }
    Ok(())
}

/// Validate a floating-point parameter is positive
pub fn validate_positive(value: f64, name: &str) -> Result<(), String> {
    if !(value > 0.0) {
        return Err(format!("{} must be positive", name));
    }
    Ok(())
}

/// Validate a value is within a range
pub fn validate_range(value: f64, min: f64, max: f64, name: &str) -> Result<(), String> {
    if !(value >= min && value <= max) {
        return Err(format!("{} must be between {} and {}", name, min, max));
    }
    Ok(())
}

/// Generate a seasonal signal with Gaussian noise
///
/// # Arguments
/// * `len` - Number of values
/// * `base` - Level the signal oscillates around
/// * `amplitude` - Peak deviation of the seasonal component
/// * `period` - Season length in steps
/// * `noise_std` - Standard deviation of the noise (0.0 for a clean signal)
/// * `seed` - RNG seed
pub fn seasonal_values(
    len: usize,
    base: f64,
    amplitude: f64,
    period: usize,
    noise_std: f64,
    seed: u64,
) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, noise_std.max(0.0)).ok();
    let period = period.max(1) as f64;

    (0..len)
        .map(|i| {
            let phase = 2.0 * std::f64::consts::PI * i as f64 / period;
            let eps = noise.as_ref().map(|n| n.sample(&mut rng)).unwrap_or(0.0);
            base + amplitude * phase.sin() + eps
        })
        .collect()
}

/// Build a silver series directly from values on a fixed grid
///
/// `None` entries become `missing` points; everything else is `raw`.
pub fn series_from_values(
    key: &SeriesKey,
    unit: &str,
    start: DateTime<Utc>,
    interval: Duration,
    values: &[Option<f64>],
) -> SilverSeries {
    let points = values
        .iter()
        .enumerate()
        .map(|(i, value)| TimeSeriesPoint {
            entity_id: key.entity_id.clone(),
            metric: key.metric.clone(),
            timestamp: start + Duration::seconds(interval.num_seconds() * i as i64),
            value: *value,
            quality_flag: if value.is_some() {
                QualityFlag::Raw
            } else {
                QualityFlag::Missing
            },
            layer: Layer::Silver,
            revised: false,
        })
        .collect();

    let end = start + Duration::seconds(interval.num_seconds() * values.len().max(1) as i64);
    SilverSeries {
        entity_id: key.entity_id.clone(),
        metric: key.metric.clone(),
        unit: unit.to_string(),
        interval_minutes: interval.num_minutes(),
        range: TimeRange { start, end },
        points,
    }
}

/// Raw records for consecutive intervals, reported in the given UTC offset
pub fn raw_records(
    key: &SeriesKey,
    start: DateTime<Utc>,
    interval: Duration,
    values: &[f64],
    offset_hours: i32,
    source: &str,
    ingested_at: DateTime<Utc>,
) -> Vec<RawRecord> {
    let offset = FixedOffset::east_opt(offset_hours * 3600).unwrap_or(Utc.fix());

    values
        .iter()
        .enumerate()
        .map(|(i, value)| RawRecord {
            entity_id: key.entity_id.clone(),
            metric: key.metric.clone(),
            timestamp: (start + Duration::seconds(interval.num_seconds() * i as i64))
                .with_timezone(&offset)
                .to_rfc3339(),
            value: RawValue::Number(*value),
            unit: None,
            source: source.to_string(),
            ingested_at: ingested_at.to_rfc3339(),
        })
        .collect()
}

/// Typed raw points for consecutive intervals, in UTC
pub fn raw_points(
    key: &SeriesKey,
    start: DateTime<Utc>,
    interval: Duration,
    values: &[f64],
    source: &str,
    ingested_at: DateTime<Utc>,
) -> Vec<RawPoint> {
    values
        .iter()
        .enumerate()
        .map(|(i, value)| RawPoint {
            entity_id: key.entity_id.clone(),
            metric: key.metric.clone(),
            timestamp: (start + Duration::seconds(interval.num_seconds() * i as i64)).fixed_offset(),
            value: *value,
            unit: None,
            source: source.to_string(),
            ingested_at,
        })
        .collect()
}
