//! Metric registry and unit normalisation
//!
//! Every metric the lake accepts is listed here with its canonical unit and
//! the physically plausible range of canonical values. All other modules
//! should look metrics up here rather than hardcoding units.

use crate::error::ValidationReason;

// ---------------------------------------------------------------------------
// Canonical units
// ---------------------------------------------------------------------------

pub const UNIT_KWH: &str = "kWh";
pub const UNIT_DEG_C: &str = "degC";
pub const UNIT_MM: &str = "mm";
pub const UNIT_M_PER_S: &str = "m/s";
pub const UNIT_DEGREES: &str = "deg";

// ---------------------------------------------------------------------------
// Metric metadata
// ---------------------------------------------------------------------------

/// Metadata for a single metric.
#[derive(Debug)]
pub struct MetricInfo {
    /// Registry name; group suffixes ("energy_production.hydro") resolve here
    pub name: &'static str,
    pub description: &'static str,
    pub canonical_unit: &'static str,
    /// Inclusive bounds on canonical values
    pub min: f64,
    pub max: f64,
}

impl MetricInfo {
    pub fn in_range(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// All metrics the lake accepts.
///
/// Energy volumes come from the grid operator per price area and production
/// group; weather variables come from hourly reanalysis at one reference
/// location per price area.
pub static METRIC_REGISTRY: &[MetricInfo] = &[
    MetricInfo {
        name: "energy_production",
        description: "Energy produced in a price area over one interval",
        canonical_unit: UNIT_KWH,
        min: 0.0,
        max: f64::MAX,
    },
    MetricInfo {
        name: "energy_consumption",
        description: "Energy consumed in a price area over one interval",
        canonical_unit: UNIT_KWH,
        min: 0.0,
        max: f64::MAX,
    },
    MetricInfo {
        name: "temperature_2m",
        description: "Air temperature 2 m above ground",
        canonical_unit: UNIT_DEG_C,
        min: -90.0,
        max: 60.0,
    },
    MetricInfo {
        name: "precipitation",
        description: "Total precipitation over one interval",
        canonical_unit: UNIT_MM,
        min: 0.0,
        max: 500.0,
    },
    MetricInfo {
        name: "wind_speed_10m",
        description: "Mean wind speed 10 m above ground",
        canonical_unit: UNIT_M_PER_S,
        min: 0.0,
        max: 120.0,
    },
    MetricInfo {
        name: "wind_gusts_10m",
        description: "Maximum wind gust 10 m above ground",
        canonical_unit: UNIT_M_PER_S,
        min: 0.0,
        max: 120.0,
    },
    MetricInfo {
        name: "wind_direction_10m",
        description: "Wind direction 10 m above ground, degrees from north",
        canonical_unit: UNIT_DEGREES,
        min: 0.0,
        max: 360.0,
    },
];

/// Look up a metric. `energy_production.hydro` resolves to `energy_production`.
pub fn find_metric(metric: &str) -> Option<&'static MetricInfo> {
    let base = metric.split('.').next().unwrap_or(metric);
    METRIC_REGISTRY.iter().find(|m| m.name == base)
}

pub fn all_metric_names() -> Vec<&'static str> {
    METRIC_REGISTRY.iter().map(|m| m.name).collect()
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

/// Affine conversion `canonical = value * factor + offset`
struct Conversion {
    aliases: &'static [&'static str],
    canonical: &'static str,
    factor: f64,
    offset: f64,
}

static CONVERSIONS: &[Conversion] = &[
    // energy
    Conversion { aliases: &["kwh"], canonical: UNIT_KWH, factor: 1.0, offset: 0.0 },
    Conversion { aliases: &["wh"], canonical: UNIT_KWH, factor: 1e-3, offset: 0.0 },
    Conversion { aliases: &["mwh"], canonical: UNIT_KWH, factor: 1e3, offset: 0.0 },
    Conversion { aliases: &["gwh"], canonical: UNIT_KWH, factor: 1e6, offset: 0.0 },
    // temperature
    Conversion { aliases: &["degc", "°c", "c", "celsius"], canonical: UNIT_DEG_C, factor: 1.0, offset: 0.0 },
    Conversion { aliases: &["degf", "°f", "f", "fahrenheit"], canonical: UNIT_DEG_C, factor: 5.0 / 9.0, offset: -160.0 / 9.0 },
    Conversion { aliases: &["k", "kelvin"], canonical: UNIT_DEG_C, factor: 1.0, offset: -273.15 },
    // length
    Conversion { aliases: &["mm"], canonical: UNIT_MM, factor: 1.0, offset: 0.0 },
    Conversion { aliases: &["cm"], canonical: UNIT_MM, factor: 10.0, offset: 0.0 },
    Conversion { aliases: &["in", "inch"], canonical: UNIT_MM, factor: 25.4, offset: 0.0 },
    // speed
    Conversion { aliases: &["m/s", "ms-1"], canonical: UNIT_M_PER_S, factor: 1.0, offset: 0.0 },
    Conversion { aliases: &["km/h", "kmh"], canonical: UNIT_M_PER_S, factor: 1.0 / 3.6, offset: 0.0 },
    Conversion { aliases: &["kn", "knots", "kt"], canonical: UNIT_M_PER_S, factor: 0.514_444, offset: 0.0 },
    // angle
    Conversion { aliases: &["deg", "°"], canonical: UNIT_DEGREES, factor: 1.0, offset: 0.0 },
];

/// Convert `value` in `unit` to the canonical unit of `canonical`.
///
/// A missing unit means the value is already canonical.
pub fn to_canonical(
    value: f64,
    unit: Option<&str>,
    canonical: &str,
) -> std::result::Result<f64, ValidationReason> {
    let unit = match unit.map(str::trim) {
        None | Some("") => return Ok(value),
        Some(u) => u,
    };
    if unit == canonical {
        return Ok(value);
    }

    let lowered = unit.to_lowercase();
    CONVERSIONS
        .iter()
        .find(|c| c.canonical == canonical && c.aliases.contains(&lowered.as_str()))
        .map(|c| value * c.factor + c.offset)
        .ok_or_else(|| ValidationReason::UnknownUnit {
            unit: unit.to_string(),
        })
}

/// Validate a raw value for `metric` and return it in canonical units.
pub fn normalize_value(
    metric: &str,
    value: f64,
    unit: Option<&str>,
) -> std::result::Result<f64, ValidationReason> {
    let info = find_metric(metric).ok_or(ValidationReason::UnknownMetric)?;
    if !value.is_finite() {
        return Err(ValidationReason::Value {
            detail: format!("{} is not finite", value),
        });
    }

    let canonical = to_canonical(value, unit, info.canonical_unit)?;
    if !info.in_range(canonical) {
        return Err(ValidationReason::OutOfRange {
            value: canonical,
            min: info.min,
            max: info.max,
        });
    }
    Ok(canonical)
}
