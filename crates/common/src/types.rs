//! Domain types shared across the weather and assessment crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Error;

// ── Location ──────────────────────────────────────────────────────────

/// Normalized, case-insensitive identity for a place.
///
/// Place names are trimmed, lower-cased, and internal whitespace runs
/// collapse to `_`. A `"lat,lon"` pair becomes the coordinates formatted
/// with four decimals, so nearby spellings of the same point share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationKey(String);

impl LocationKey {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidLocation("location must not be empty".into()));
        }

        if let Some(coords) = Coordinates::parse_pair(trimmed) {
            return Ok(Self::from_coordinates(coords));
        }

        let normalized = trimmed
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join("_");
        Ok(Self(normalized))
    }

    pub fn from_coordinates(coords: Coordinates) -> Self {
        Self(format!("{:.4},{:.4}", coords.lat, coords.lon))
    }

    /// Coordinates embedded in the key, for keys built from a `"lat,lon"` pair.
    pub fn coordinates(&self) -> Option<Coordinates> {
        Coordinates::parse_pair(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Latitude/longitude in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Option<Self> {
        let valid = lat.is_finite()
            && lon.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lon);
        valid.then_some(Self { lat, lon })
    }

    fn parse_pair(raw: &str) -> Option<Self> {
        let (lat, lon) = raw.split_once(',')?;
        let lat = lat.trim().parse::<f64>().ok()?;
        let lon = lon.trim().parse::<f64>().ok()?;
        Self::new(lat, lon)
    }
}

// ── Weather ───────────────────────────────────────────────────────────

/// One set of current conditions from the weather provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    #[serde(rename = "temp")]
    pub temperature_c: f64,
    #[serde(rename = "wind_speed")]
    pub wind_speed_kmh: f64,
    #[serde(rename = "rain_1h")]
    pub rainfall_mm_h: f64,
    #[serde(rename = "humidity")]
    pub humidity_pct: f64,
    #[serde(rename = "clouds")]
    pub cloud_cover_pct: f64,
    pub captured_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hourly_forecast: Option<Vec<HourlyForecast>>,
}

/// One hour of the provider's forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyForecast {
    pub time: DateTime<Utc>,
    #[serde(rename = "temp")]
    pub temperature_c: Option<f64>,
    #[serde(rename = "wind_speed")]
    pub wind_speed_kmh: Option<f64>,
    #[serde(rename = "rain")]
    pub rainfall_mm: Option<f64>,
}

/// An hourly-bucketed reading kept for persistence analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySample {
    #[serde(rename = "temp")]
    pub temperature_c: f64,
    #[serde(rename = "wind_speed")]
    pub wind_speed_kmh: f64,
    #[serde(rename = "rain_1h")]
    pub rainfall_mm_h: f64,
    #[serde(rename = "timestamp")]
    pub captured_at: DateTime<Utc>,
    pub hour_id: String,
}

impl From<&WeatherObservation> for HistorySample {
    fn from(obs: &WeatherObservation) -> Self {
        Self {
            temperature_c: obs.temperature_c,
            wind_speed_kmh: obs.wind_speed_kmh,
            rainfall_mm_h: obs.rainfall_mm_h,
            captured_at: obs.captured_at,
            hour_id: hour_id(obs.captured_at),
        }
    }
}

/// UTC hour bucket identifier, e.g. `2026101814`.
pub fn hour_id(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%d%H").to_string()
}

// ── Risk ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisasterType {
    None,
    Flood,
    HeavyRain,
    Cyclone,
    Heatwave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Classification of one observation plus its recent history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub disaster_type: DisasterType,
    pub risk_level: RiskLevel,
    #[serde(rename = "confidence_score")]
    pub confidence: f64,
    #[serde(rename = "persistence_duration_hrs")]
    pub persistence_hours: f64,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}
