//! Service configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Response cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Upstream fetch and retry settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Risk classification thresholds.
    #[serde(default)]
    pub risk: RiskConfig,

    /// Observation history window.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Background refresh of monitored places.
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Origins allowed by CORS.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Seconds a fetched observation is served from memory.
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Retries after the first attempt for timeouts and rate limits.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Per-attempt timeout.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Upper bound on a provider-supplied retry-after wait.
    #[serde(default = "default_max_retry_after")]
    pub max_retry_after_secs: u64,

    /// Open-Meteo forecast endpoint.
    #[serde(default = "default_forecast_base_url")]
    pub forecast_base_url: String,

    /// Open-Meteo geocoding endpoint.
    #[serde(default = "default_geocoding_base_url")]
    pub geocoding_base_url: String,

    /// Hourly forecast horizon requested alongside current conditions.
    #[serde(default = "default_forecast_hours")]
    pub forecast_hours: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Rain in the current hour above which a flood is flagged (mm).
    #[serde(default = "default_flood_rain")]
    pub flood_rain_mm: f64,

    /// Rain over the trailing three samples that flags heavy rain (mm).
    #[serde(default = "default_heavy_rain")]
    pub heavy_rain_3h_mm: f64,

    /// Wind speed above which a cyclone is flagged (km/h).
    #[serde(default = "default_cyclone_wind")]
    pub cyclone_wind_kmh: f64,

    /// Temperature at which a heatwave sample counts (°C).
    #[serde(default = "default_heatwave_temp")]
    pub heatwave_temp_c: f64,

    /// Consecutive hot samples needed for a heatwave.
    #[serde(default = "default_heatwave_hours")]
    pub heatwave_min_hours: u32,

    /// Lowest confidence reported for stale data.
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f64,

    /// Hours of staleness over which confidence decays to the floor.
    #[serde(default = "default_confidence_decay")]
    pub confidence_decay_hours: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Hours of hourly samples retained per location.
    #[serde(default = "default_history_window")]
    pub window_hours: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Run the periodic refresh loop.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between refresh passes.
    #[serde(default = "default_ingest_interval")]
    pub interval_secs: u64,

    /// Seconds to wait after startup before the first pass.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,

    /// Pause between places within a pass.
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,

    /// Places refreshed on every pass.
    #[serde(default = "default_monitored_places")]
    pub monitored_places: Vec<String>,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".into()
}
fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".into(),
        "http://127.0.0.1:3000".into(),
    ]
}

fn default_cache_ttl() -> u64 {
    600
}

fn default_max_retries() -> u32 {
    2
}
fn default_timeout() -> u64 {
    30
}
fn default_max_retry_after() -> u64 {
    60
}
fn default_forecast_base_url() -> String {
    "https://api.open-meteo.com/v1/forecast".into()
}
fn default_geocoding_base_url() -> String {
    "https://geocoding-api.open-meteo.com/v1/search".into()
}
fn default_forecast_hours() -> u32 {
    48
}

fn default_flood_rain() -> f64 {
    50.0
}
fn default_heavy_rain() -> f64 {
    50.0
}
fn default_cyclone_wind() -> f64 {
    70.0
}
fn default_heatwave_temp() -> f64 {
    40.0
}
fn default_heatwave_hours() -> u32 {
    6
}
fn default_confidence_floor() -> f64 {
    0.5
}
fn default_confidence_decay() -> f64 {
    6.0
}

fn default_history_window() -> u32 {
    24
}

fn default_ingest_interval() -> u64 {
    1800
}
fn default_initial_delay() -> u64 {
    10
}
fn default_pause_ms() -> u64 {
    500
}
fn default_monitored_places() -> Vec<String> {
    [
        "Mumbai",
        "Delhi",
        "Chennai",
        "Kolkata",
        "Bangalore",
        "Hyderabad",
        "Pune",
        "Ahmedabad",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            timeout_secs: default_timeout(),
            max_retry_after_secs: default_max_retry_after(),
            forecast_base_url: default_forecast_base_url(),
            geocoding_base_url: default_geocoding_base_url(),
            forecast_hours: default_forecast_hours(),
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            flood_rain_mm: default_flood_rain(),
            heavy_rain_3h_mm: default_heavy_rain(),
            cyclone_wind_kmh: default_cyclone_wind(),
            heatwave_temp_c: default_heatwave_temp(),
            heatwave_min_hours: default_heatwave_hours(),
            confidence_floor: default_confidence_floor(),
            confidence_decay_hours: default_confidence_decay(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            window_hours: default_history_window(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            interval_secs: default_ingest_interval(),
            initial_delay_secs: default_initial_delay(),
            pause_ms: default_pause_ms(),
            monitored_places: default_monitored_places(),
        }
    }
}
