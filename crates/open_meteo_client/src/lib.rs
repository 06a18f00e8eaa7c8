//! Open-Meteo API client.
//!
//! Fetches current conditions plus an hourly forecast from the Open-Meteo
//! forecast API and converts them to the shared `WeatherObservation` format.
//! A single call never retries; wrap a [`WeatherSource`] in
//! [`RetryingFetcher`] for the retry policy.

pub mod failure;
pub mod geocode;
pub mod retry;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use common::config::FetchConfig;
use common::{Coordinates, Error, HourlyForecast, WeatherObservation};
use serde::Deserialize;
use tracing::debug;

pub use failure::FetchFailure;
pub use geocode::{Geocoder, OpenMeteoGeocoder};
pub use retry::{RetryPolicy, RetryingFetcher};

const CURRENT_FIELDS: &str = "temperature_2m,relative_humidity_2m,rain,wind_speed_10m,cloud_cover";
const HOURLY_FIELDS: &str = "temperature_2m,rain,wind_speed_10m";

/// One attempt at current conditions for a point.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn current(&self, coords: Coordinates) -> Result<WeatherObservation, FetchFailure>;
}

#[async_trait]
impl<T: WeatherSource + ?Sized> WeatherSource for Arc<T> {
    async fn current(&self, coords: Coordinates) -> Result<WeatherObservation, FetchFailure> {
        (**self).current(coords).await
    }
}

/// Open-Meteo forecast client.
#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    client: reqwest::Client,
    base_url: String,
    forecast_hours: u32,
}

/// Response from `/v1/forecast`.
#[derive(Debug, Deserialize)]
pub struct ForecastResponse {
    pub current: CurrentConditions,
    #[serde(default)]
    pub hourly: Option<HourlySeries>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentConditions {
    #[serde(default)]
    pub time: Option<String>,
    pub temperature_2m: f64,
    #[serde(default)]
    pub relative_humidity_2m: Option<f64>,
    #[serde(default)]
    pub rain: Option<f64>,
    pub wind_speed_10m: f64,
    #[serde(default)]
    pub cloud_cover: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HourlySeries {
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default)]
    pub temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    pub rain: Vec<Option<f64>>,
    #[serde(default)]
    pub wind_speed_10m: Vec<Option<f64>>,
}

impl OpenMeteoClient {
    pub fn new(config: &FetchConfig) -> Result<Self, Error> {
        let client = build_http_client(config)?;

        Ok(Self {
            client,
            base_url: config.forecast_base_url.trim_end_matches('/').to_string(),
            forecast_hours: config.forecast_hours,
        })
    }

    /// Fetch the raw forecast payload for a point.
    pub async fn fetch_forecast(&self, coords: Coordinates) -> Result<ForecastResponse, FetchFailure> {
        let query = [
            ("latitude", coords.lat.to_string()),
            ("longitude", coords.lon.to_string()),
            ("current", CURRENT_FIELDS.to_string()),
            ("hourly", HOURLY_FIELDS.to_string()),
            ("forecast_hours", self.forecast_hours.to_string()),
            ("timezone", "GMT".to_string()),
        ];

        debug!(
            "Fetching Open-Meteo forecast: {} lat={} lon={}",
            self.base_url, coords.lat, coords.lon
        );

        let resp = self
            .client
            .get(&self.base_url)
            .query(&query)
            .send()
            .await
            .map_err(|e| FetchFailure::from_reqwest(&e))?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let retry_after = failure::retry_after_header(&resp);
            let body = resp.text().await.unwrap_or_default();
            debug!(
                "Open-Meteo returned {} for ({},{}): {}",
                status,
                coords.lat,
                coords.lon,
                body.chars().take(500).collect::<String>()
            );
            return Err(FetchFailure::from_status(status, retry_after.as_deref()));
        }

        resp.json::<ForecastResponse>().await.map_err(|e| {
            if e.is_timeout() {
                FetchFailure::Timeout
            } else {
                debug!("Open-Meteo JSON parse error for ({},{}): {}", coords.lat, coords.lon, e);
                FetchFailure::UpstreamError { status_code: status }
            }
        })
    }
}

#[async_trait]
impl WeatherSource for OpenMeteoClient {
    async fn current(&self, coords: Coordinates) -> Result<WeatherObservation, FetchFailure> {
        let payload = self.fetch_forecast(coords).await?;
        Ok(payload.into_observation(Utc::now()))
    }
}

impl ForecastResponse {
    /// Convert to an observation stamped with the time it was fetched.
    pub fn into_observation(self, captured_at: DateTime<Utc>) -> WeatherObservation {
        let current = self.current;
        let hourly_forecast = self.hourly.map(summarize_hours).filter(|h| !h.is_empty());

        WeatherObservation {
            temperature_c: current.temperature_2m,
            wind_speed_kmh: current.wind_speed_10m,
            rainfall_mm_h: current.rain.unwrap_or(0.0),
            humidity_pct: current.relative_humidity_2m.unwrap_or(0.0),
            cloud_cover_pct: current.cloud_cover.unwrap_or(0.0),
            captured_at,
            hourly_forecast,
        }
    }
}

pub(crate) fn build_http_client(config: &FetchConfig) -> Result<reqwest::Client, Error> {
    reqwest::Client::builder()
        .user_agent("disaster-alert/0.1 (weather risk dashboard)")
        .pool_max_idle_per_host(4)
        .timeout(config.timeout())
        .build()
        .map_err(|e| Error::Http(format!("failed to build Open-Meteo HTTP client: {e}")))
}

/// Open-Meteo hourly times come without an offset when `timezone=GMT`.
fn parse_hour(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .ok()
        .map(|naive| naive.and_utc())
}

fn summarize_hours(series: HourlySeries) -> Vec<HourlyForecast> {
    series
        .time
        .iter()
        .enumerate()
        .filter_map(|(i, raw)| {
            let time = parse_hour(raw)?;
            Some(HourlyForecast {
                time,
                temperature_c: series.temperature_2m.get(i).copied().flatten(),
                wind_speed_kmh: series.wind_speed_10m.get(i).copied().flatten(),
                rainfall_mm: series.rain.get(i).copied().flatten(),
            })
        })
        .collect()
}
