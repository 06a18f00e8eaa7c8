//! Stub upstreams shared by the binary's tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use assessment::{MemoryHistoryStore, MemoryStaleStore, WeatherService};
use async_trait::async_trait;
use chrono::Utc;
use common::{AppConfig, Coordinates, WeatherObservation};
use open_meteo_client::{FetchFailure, Geocoder, WeatherSource};

pub struct StubSource {
    result: Result<(), FetchFailure>,
    calls: AtomicU32,
}

impl StubSource {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self {
            result: Ok(()),
            calls: AtomicU32::new(0),
        })
    }

    pub fn failing(failure: FetchFailure) -> Arc<Self> {
        Arc::new(Self {
            result: Err(failure),
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WeatherSource for StubSource {
    async fn current(&self, _coords: Coordinates) -> Result<WeatherObservation, FetchFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()?;
        Ok(WeatherObservation {
            temperature_c: 31.0,
            wind_speed_kmh: 11.0,
            rainfall_mm_h: 0.5,
            humidity_pct: 70.0,
            cloud_cover_pct: 40.0,
            captured_at: Utc::now(),
            hourly_forecast: None,
        })
    }
}

pub struct StubGeocoder {
    found: bool,
}

impl StubGeocoder {
    pub fn found() -> Arc<Self> {
        Arc::new(Self { found: true })
    }

    pub fn missing() -> Arc<Self> {
        Arc::new(Self { found: false })
    }
}

#[async_trait]
impl Geocoder for StubGeocoder {
    async fn resolve(&self, _name: &str) -> Result<Option<Coordinates>, FetchFailure> {
        Ok(self.found.then(|| Coordinates::new(19.07, 72.88)).flatten())
    }
}

pub fn service_with(source: Arc<StubSource>, geocoder: Arc<StubGeocoder>) -> Arc<WeatherService> {
    let config = AppConfig::default();
    Arc::new(WeatherService::new(
        &config,
        source,
        geocoder,
        Arc::new(MemoryStaleStore::new()),
        Arc::new(MemoryHistoryStore::new(config.history.window_hours)),
    ))
}
