//! Seasonal snow drift from hourly weather (Tabler transport model)
//!
//! Per snow season (1 July to 30 June, labelled by the starting year):
//! - snow water equivalent `SWE` is the precipitation of hours colder than
//!   the snowfall temperature limit
//! - potential wind transport `Qupot = sum(u^3.8 * dt) / 233847`
//! - snowfall-limited transport `Qspot = 0.5 * T * SWE`
//! - relocated water equivalent `Srwe = theta * SWE`
//! - `Qinf` is `0.5 * T * Srwe` when wind could move more than the snowfall
//!   allows, `Qupot` otherwise
//! - mean annual transport `Qt = Qinf * (1 - 0.14^(F / T))` in kg/m
//!
//! The wind rose splits potential transport into 16 compass sectors and
//! averages it over the seasons present.

use crate::error::{AnalyticsError, Result};
use chrono::{DateTime, Datelike, Utc};
use medallion::SilverSeries;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

const TRANSPORT_SCALE: f64 = 233_847.0;
const SECTOR_WIDTH: f64 = 22.5;

pub const SECTOR_LABELS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW", "NNW",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnowDriftParams {
    /// Maximum transport distance `T` in metres
    pub transport_distance: f64,
    /// Fetch distance `F` in metres
    pub fetch: f64,
    /// Relocation coefficient `theta`
    pub relocation: f64,
    /// Hours below this temperature (degC) count their precipitation as snow
    pub snowfall_below: f64,
}

impl Default for SnowDriftParams {
    fn default() -> Self {
        Self {
            transport_distance: 3000.0,
            fetch: 30_000.0,
            relocation: 0.5,
            snowfall_below: 1.0,
        }
    }
}

impl SnowDriftParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.transport_distance > 0.0) {
            return Err(AnalyticsError::InvalidParameter(
                "Transport distance must be positive".to_string(),
            ));
        }
        if !(self.fetch >= 0.0) {
            return Err(AnalyticsError::InvalidParameter(
                "Fetch must not be negative".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.relocation) {
            return Err(AnalyticsError::InvalidParameter(
                "Relocation coefficient must be in [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Hourly weather of one location on a shared grid
#[derive(Debug, Clone, Copy)]
pub struct WeatherInputs<'a> {
    pub temperature: &'a SilverSeries,
    pub precipitation: &'a SilverSeries,
    pub wind_speed: &'a SilverSeries,
    pub wind_direction: &'a SilverSeries,
}

/// Transport figures of one snow season
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonDrift {
    /// Year the season starts in (1 July)
    pub season: i32,
    /// Mean annual snow transport `Qt` in kg/m
    pub transport: f64,
    pub potential_transport: f64,
    pub snowfall_transport: f64,
    pub relocated_swe: f64,
    /// Snow water equivalent in mm
    pub swe: f64,
    /// Hours with a wind speed value
    pub hours: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnowDriftReport {
    pub entity_id: String,
    pub seasons: Vec<SeasonDrift>,
    /// Mean potential transport per season by sector, clockwise from north
    pub wind_rose: [f64; 16],
}

impl SnowDriftReport {
    /// Sector carrying the most transport, with its label
    pub fn prevailing_sector(&self) -> Option<(&'static str, f64)> {
        self.wind_rose
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .filter(|(_, value)| **value > 0.0)
            .map(|(i, value)| (SECTOR_LABELS[i], *value))
    }
}

/// Snow season a timestamp belongs to
pub fn snow_season(timestamp: DateTime<Utc>) -> i32 {
    if timestamp.month() >= 7 {
        timestamp.year()
    } else {
        timestamp.year() - 1
    }
}

/// Compass sector of a direction in degrees, sector 0 centred on north
pub fn sector_index(direction: f64) -> usize {
    (((direction + SECTOR_WIDTH / 2.0).rem_euclid(360.0)) / SECTOR_WIDTH) as usize % 16
}

#[derive(Default)]
struct SeasonTotals {
    swe: f64,
    potential: f64,
    hours: usize,
    sectors: [f64; 16],
}

pub fn snow_drift(inputs: &WeatherInputs<'_>, params: &SnowDriftParams) -> Result<SnowDriftReport> {
    params.validate()?;
    let wind = inputs.wind_speed;
    for other in [inputs.temperature, inputs.precipitation, inputs.wind_direction] {
        if other.interval_minutes != wind.interval_minutes || other.points.len() != wind.points.len() {
            return Err(AnalyticsError::Misaligned(format!(
                "{}/{} does not share the grid of {}/{}",
                other.entity_id, other.metric, wind.entity_id, wind.metric
            )));
        }
    }
    let dt = (wind.interval_minutes * 60) as f64;

    let mut seasons: BTreeMap<i32, SeasonTotals> = BTreeMap::new();
    for (i, point) in wind.points.iter().enumerate() {
        let totals = seasons.entry(snow_season(point.timestamp)).or_default();

        let temperature = inputs.temperature.points[i].value;
        let precipitation = inputs.precipitation.points[i].value;
        if let (Some(t), Some(p)) = (temperature, precipitation) {
            if t < params.snowfall_below {
                totals.swe += p;
            }
        }

        if let Some(speed) = point.value {
            let transport = speed.max(0.0).powf(3.8) * dt / TRANSPORT_SCALE;
            totals.potential += transport;
            totals.hours += 1;
            if let Some(direction) = inputs.wind_direction.points[i].value {
                totals.sectors[sector_index(direction)] += transport;
            }
        }
    }
    if seasons.is_empty() {
        return Err(AnalyticsError::InsufficientData(
            "No weather points to compute snow drift from".to_string(),
        ));
    }

    let t = params.transport_distance;
    let mut wind_rose = [0.0; 16];
    let reports: Vec<SeasonDrift> = seasons
        .iter()
        .map(|(season, totals)| {
            for (rose, sector) in wind_rose.iter_mut().zip(totals.sectors.iter()) {
                *rose += sector;
            }
            let snowfall_transport = 0.5 * t * totals.swe;
            let relocated_swe = params.relocation * totals.swe;
            let controlling = if totals.potential > snowfall_transport {
                0.5 * t * relocated_swe
            } else {
                totals.potential
            };
            SeasonDrift {
                season: *season,
                transport: controlling * (1.0 - 0.14_f64.powf(params.fetch / t)),
                potential_transport: totals.potential,
                snowfall_transport,
                relocated_swe,
                swe: totals.swe,
                hours: totals.hours,
            }
        })
        .collect();
    for sector in wind_rose.iter_mut() {
        *sector /= reports.len() as f64;
    }

    info!(
        entity_id = %wind.entity_id,
        seasons = reports.len(),
        "snow drift computed"
    );
    Ok(SnowDriftReport {
        entity_id: wind.entity_id.clone(),
        seasons: reports,
        wind_rose,
    })
}
