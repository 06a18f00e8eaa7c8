//! Configuration loader: merges .env, config.toml and environment variables.

use common::{AppConfig, Error};
use std::net::SocketAddr;
use std::path::Path;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

fn parse_positive_u64(raw: &str, env_name: &str) -> Result<u64, Error> {
    let parsed = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer > 0")))?;
    if parsed == 0 {
        return Err(Error::Config(format!("{env_name} must be an integer > 0")));
    }
    Ok(parsed)
}

fn parse_u32(raw: &str, env_name: &str) -> Result<u32, Error> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer >= 0")))
}

fn parse_bool(raw: &str) -> bool {
    let lowered = raw.trim().to_ascii_lowercase();
    lowered != "0" && lowered != "false" && lowered != "no" && lowered != "off"
}

/// Comma-separated list with blanks dropped.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn validate_config(config: &AppConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if config.server.bind_addr.parse::<SocketAddr>().is_err() {
        issues.push(format!(
            "server.bind_addr '{}' is not a socket address",
            config.server.bind_addr
        ));
    }

    if config.cache.ttl_secs == 0 {
        issues.push("cache.ttl_secs must be > 0".into());
    }

    if config.fetch.timeout_secs == 0 {
        issues.push("fetch.timeout_secs must be > 0".into());
    }
    if config.fetch.max_retry_after_secs == 0 {
        issues.push("fetch.max_retry_after_secs must be > 0".into());
    }
    if !config.fetch.forecast_base_url.starts_with("http") {
        issues.push("fetch.forecast_base_url must be an http(s) URL".into());
    }
    if !config.fetch.geocoding_base_url.starts_with("http") {
        issues.push("fetch.geocoding_base_url must be an http(s) URL".into());
    }

    if config.risk.flood_rain_mm <= 0.0 {
        issues.push("risk.flood_rain_mm must be > 0".into());
    }
    if config.risk.heavy_rain_3h_mm <= 0.0 {
        issues.push("risk.heavy_rain_3h_mm must be > 0".into());
    }
    if config.risk.cyclone_wind_kmh <= 0.0 {
        issues.push("risk.cyclone_wind_kmh must be > 0".into());
    }
    if config.risk.heatwave_min_hours == 0 {
        issues.push("risk.heatwave_min_hours must be > 0".into());
    }
    if !(0.0..=1.0).contains(&config.risk.confidence_floor) {
        issues.push("risk.confidence_floor must be in [0,1]".into());
    }
    if config.risk.confidence_decay_hours < 0.0 {
        issues.push("risk.confidence_decay_hours must be >= 0".into());
    }

    if config.history.window_hours == 0 {
        issues.push("history.window_hours must be > 0".into());
    }

    if config.ingest.enabled && config.ingest.interval_secs == 0 {
        issues.push("ingest.interval_secs must be > 0 when ingest is enabled".into());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Apply environment overrides read through `var`.
fn apply_env_overrides(
    config: &mut AppConfig,
    var: impl Fn(&str) -> Option<String>,
) -> Result<(), Error> {
    if let Some(addr) = var("BIND_ADDR") {
        config.server.bind_addr = addr.trim().to_string();
    }
    if let Some(raw) = var("ALLOWED_ORIGINS") {
        config.server.allowed_origins = parse_list(&raw);
    }
    if let Some(raw) = var("CACHE_TTL_SECS") {
        config.cache.ttl_secs = parse_positive_u64(&raw, "CACHE_TTL_SECS")?;
    }
    if let Some(raw) = var("MAX_RETRIES") {
        config.fetch.max_retries = parse_u32(&raw, "MAX_RETRIES")?;
    }
    if let Some(raw) = var("FETCH_TIMEOUT_SECS") {
        config.fetch.timeout_secs = parse_positive_u64(&raw, "FETCH_TIMEOUT_SECS")?;
    }
    if let Some(raw) = var("MAX_RETRY_AFTER_SECS") {
        config.fetch.max_retry_after_secs = parse_positive_u64(&raw, "MAX_RETRY_AFTER_SECS")?;
    }
    if let Some(url) = var("OPEN_METEO_FORECAST_URL") {
        config.fetch.forecast_base_url = url.trim().trim_end_matches('/').to_string();
    }
    if let Some(url) = var("OPEN_METEO_GEOCODING_URL") {
        config.fetch.geocoding_base_url = url.trim().trim_end_matches('/').to_string();
    }
    if let Some(raw) = var("INGEST_ENABLED") {
        config.ingest.enabled = parse_bool(&raw);
    }
    if let Some(raw) = var("INGEST_INTERVAL_SECS") {
        config.ingest.interval_secs = parse_positive_u64(&raw, "INGEST_INTERVAL_SECS")?;
    }
    if let Some(raw) = var("MONITORED_PLACES") {
        config.ingest.monitored_places = parse_list(&raw);
    }
    Ok(())
}

/// Load service configuration.
///
/// An explicit `path` must exist; otherwise `config.toml` in the working
/// directory is read when present.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Error> {
    // 1. Load .env file from project root or parent directories.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Start with defaults.
    let mut config = AppConfig::default();

    // 3. Read the config file.
    let config_path = match path {
        Some(p) if !p.exists() => {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
        Some(p) => Some(p),
        None => Some(Path::new(DEFAULT_CONFIG_PATH)).filter(|p| p.exists()),
    };
    if let Some(p) = config_path {
        let contents = std::fs::read_to_string(p)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", p.display(), e)))?;
        config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", p.display(), e)))?;
        tracing::info!("Loaded configuration from {}", p.display());
    }

    // 4. Override with environment variables (highest priority).
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

    validate_config(&config)?;

    Ok(config)
}
