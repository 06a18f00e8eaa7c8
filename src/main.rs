//! disaster-alert: weather retrieval and disaster-risk backend.
//!
//! Single-binary Tokio application that:
//! 1. Serves `GET /weather` with live, cached, stale or location-only data
//! 2. Classifies flood, heavy-rain, cyclone and heatwave risk
//! 3. Refreshes monitored places in the background

mod config;
mod ingest;
mod routes;
#[cfg(test)]
mod test_support;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};

use assessment::{MemoryHistoryStore, MemoryStaleStore, WeatherService};
use open_meteo_client::{OpenMeteoClient, OpenMeteoGeocoder};

use crate::ingest::Ingestor;
use crate::routes::AppState;

/// Disaster alert weather backend
#[derive(Parser)]
#[command(name = "disaster-alert", about = "Weather retrieval and disaster-risk backend")]
struct Cli {
    /// Path to a TOML config file (defaults to ./config.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the listen address, e.g. 127.0.0.1:8080.
    #[arg(long)]
    bind: Option<String>,

    /// Disable the background refresh loop.
    #[arg(long)]
    no_ingest: bool,
}

#[tokio::main]
async fn main() {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "disaster_alert=info,open_meteo_client=info,assessment=info,tower_http=info"
                    .into()
            }),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    info!("Disaster alert backend starting up...");

    // Load configuration.
    let mut cfg = match config::load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(bind) = cli.bind {
        cfg.server.bind_addr = bind;
    }
    if cli.no_ingest {
        cfg.ingest.enabled = false;
    }

    let weather_client = match OpenMeteoClient::new(&cfg.fetch) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to create weather client: {}", e);
            std::process::exit(1);
        }
    };
    let geocoder = match OpenMeteoGeocoder::new(&cfg.fetch) {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to create geocoder: {}", e);
            std::process::exit(1);
        }
    };

    let service = Arc::new(WeatherService::new(
        &cfg,
        Arc::new(weather_client),
        Arc::new(geocoder),
        Arc::new(MemoryStaleStore::new()),
        Arc::new(MemoryHistoryStore::new(cfg.history.window_hours)),
    ));

    let policy = service.retry_policy();
    info!(
        "Fetch: retries={}, timeout={:?}, rate-limit cap={:?}, worst case={:?}",
        policy.max_retries,
        policy.attempt_timeout,
        policy.max_retry_after,
        policy.worst_case_latency()
    );
    info!(
        "Risk: flood>{}mm/h, heavy_rain≥{}mm/3h, cyclone>{}km/h, heatwave≥{}°C for {}h",
        cfg.risk.flood_rain_mm,
        cfg.risk.heavy_rain_3h_mm,
        cfg.risk.cyclone_wind_kmh,
        cfg.risk.heatwave_temp_c,
        cfg.risk.heatwave_min_hours,
    );
    info!("Cache TTL: {}s", cfg.cache.ttl_secs);

    let ingest = Arc::new(Ingestor::new(service.clone(), cfg.ingest.clone()));
    if cfg.ingest.enabled {
        info!(
            "Ingest: every {}s over {:?}",
            cfg.ingest.interval_secs, cfg.ingest.monitored_places
        );
        let _schedule = Arc::clone(&ingest).spawn_schedule();
    } else {
        info!("Ingest: disabled");
    }

    let app = routes::router(AppState { service, ingest }, &cfg.server.allowed_origins);

    let listener = match TcpListener::bind(&cfg.server.bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind {}: {}", cfg.server.bind_addr, e);
            std::process::exit(1);
        }
    };
    info!("🚀 Listening on http://{}", cfg.server.bind_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    info!("Disaster alert backend stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
