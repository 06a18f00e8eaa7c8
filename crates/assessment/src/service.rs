//! Request orchestration: cache, coordinates, fetch, fallback, assess.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{AppConfig, Coordinates, HistorySample, LocationKey, WeatherObservation};
use open_meteo_client::{Geocoder, RetryPolicy, RetryingFetcher, WeatherSource};
use tracing::{debug, info, warn};

use crate::assembler::{DataSource, FetchOutcome, ResponseAssembler, ResponsePayload};
use crate::cache::{CachedWeather, WeatherCache};
use crate::error::ServiceError;
use crate::risk::RiskEngine;
use crate::scenario::Scenario;
use crate::store::{HistoryStore, StaleRecord, StaleStore};

pub struct WeatherService {
    cache: WeatherCache,
    fetcher: RetryingFetcher<Arc<dyn WeatherSource>>,
    geocoder: Arc<dyn Geocoder>,
    stale: Arc<dyn StaleStore>,
    history: Arc<dyn HistoryStore>,
    assembler: ResponseAssembler,
    history_hours: u32,
}

impl WeatherService {
    pub fn new(
        config: &AppConfig,
        source: Arc<dyn WeatherSource>,
        geocoder: Arc<dyn Geocoder>,
        stale: Arc<dyn StaleStore>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        let engine = RiskEngine::new(config.risk.clone(), config.cache.ttl());
        Self {
            cache: WeatherCache::new(config.cache.ttl()),
            fetcher: RetryingFetcher::new(source, RetryPolicy::from_config(&config.fetch)),
            geocoder,
            stale,
            history,
            assembler: ResponseAssembler::new(engine),
            history_hours: config.history.window_hours,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        self.fetcher.policy()
    }

    /// Entries currently held by the response cache.
    pub fn cached_locations(&self) -> usize {
        self.cache.len()
    }

    /// Weather and risk for `location`, or canned data for `simulation`.
    ///
    /// Provider failures never surface as errors here once coordinates are
    /// known; they become a degraded or partial payload instead.
    pub async fn weather(
        &self,
        location: &str,
        simulation: Option<&str>,
    ) -> Result<ResponsePayload, ServiceError> {
        let key = LocationKey::parse(location)?;

        if let Some(name) = simulation {
            let scenario: Scenario = name.parse()?;
            return Ok(self.simulate(key, scenario, Utc::now()));
        }

        if let Some(hit) = self.cache.get(&key) {
            debug!("Cache hit for {}", key);
            let now = Utc::now();
            let history = self.recent_history(&key, now).await;
            let outcome = FetchOutcome::Fresh {
                observation: hit.value.observation,
                source: DataSource::Cache,
            };
            return Ok(self.assembler.assemble(key, outcome, &history, now));
        }
        debug!("Cache miss for {}", key);

        let stale = self.stale_record(&key).await;
        let coordinates = self.resolve(location, &key, stale.as_ref()).await?;

        let outcome = match self.fetcher.fetch(coordinates).await {
            Ok(observation) => {
                self.remember(&key, &observation, coordinates).await;
                FetchOutcome::Fresh {
                    observation,
                    source: DataSource::LiveApi,
                }
            }
            Err(failure) => FetchOutcome::Failed {
                failure,
                coordinates,
                stale,
            },
        };

        let now = Utc::now();
        let history = self.recent_history(&key, now).await;
        Ok(self.assembler.assemble(key, outcome, &history, now))
    }

    /// Fetch `location` past the cache and update every store.
    pub async fn refresh(&self, location: &str) -> Result<WeatherObservation, ServiceError> {
        let key = LocationKey::parse(location)?;
        let stale = self.stale_record(&key).await;
        let coordinates = self.resolve(location, &key, stale.as_ref()).await?;

        let observation = self
            .fetcher
            .fetch(coordinates)
            .await
            .map_err(ServiceError::Upstream)?;
        self.remember(&key, &observation, coordinates).await;
        Ok(observation)
    }

    /// Places for a background pass: `monitored` first, then every key with
    /// a stale record, without duplicates.
    pub async fn refresh_targets(&self, monitored: &[String]) -> Vec<String> {
        let stored = match self.stale.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Failed to list stored locations: {}", e);
                Vec::new()
            }
        };

        let mut seen = std::collections::HashSet::new();
        let mut targets = Vec::new();
        let candidates = monitored
            .iter()
            .cloned()
            .chain(stored.into_iter().map(|k| k.as_str().to_string()));
        for name in candidates {
            let Ok(key) = LocationKey::parse(&name) else {
                continue;
            };
            if seen.insert(key) {
                targets.push(name);
            }
        }
        targets
    }

    fn simulate(&self, key: LocationKey, scenario: Scenario, now: DateTime<Utc>) -> ResponsePayload {
        info!("Simulating {} for {}", scenario, key);
        let history = scenario.history(now);
        let outcome = FetchOutcome::Fresh {
            observation: scenario.observation(now),
            source: DataSource::Simulation,
        };
        self.assembler.assemble(key, outcome, &history, now)
    }

    /// Key coordinates, then stored coordinates, then the geocoder.
    async fn resolve(
        &self,
        raw: &str,
        key: &LocationKey,
        stale: Option<&StaleRecord>,
    ) -> Result<Coordinates, ServiceError> {
        if let Some(coords) = key.coordinates() {
            return Ok(coords);
        }
        if let Some(record) = stale {
            debug!("Using stored coordinates for {}", key);
            return Ok(record.coordinates);
        }

        let name = raw.trim();
        match self.geocoder.resolve(name).await {
            Ok(Some(coords)) => Ok(coords),
            Ok(None) => {
                warn!("Geocoder found no match for '{}'", name);
                Err(ServiceError::LocationNotFound(name.to_string()))
            }
            Err(failure) => {
                warn!("Geocoding '{}' failed ({}): {}", name, failure.kind(), failure);
                Err(ServiceError::LocationUnresolved(failure))
            }
        }
    }

    async fn stale_record(&self, key: &LocationKey) -> Option<StaleRecord> {
        match self.stale.get(key).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Stale store read failed for {}: {}", key, e);
                None
            }
        }
    }

    async fn recent_history(&self, key: &LocationKey, now: DateTime<Utc>) -> Vec<HistorySample> {
        match self.history.recent(key, self.history_hours, now).await {
            Ok(samples) => samples,
            Err(e) => {
                warn!("History read failed for {}: {}", key, e);
                Vec::new()
            }
        }
    }

    async fn remember(
        &self,
        key: &LocationKey,
        observation: &WeatherObservation,
        coordinates: Coordinates,
    ) {
        self.cache.put(
            key.clone(),
            CachedWeather {
                observation: observation.clone(),
                coordinates,
            },
        );

        let record = StaleRecord {
            observation: observation.clone(),
            coordinates,
        };
        if let Err(e) = self.stale.put(key, record).await {
            warn!("Stale store write failed for {}: {}", key, e);
        }
        if let Err(e) = self.history.record(key, HistorySample::from(observation)).await {
            warn!("History write failed for {}: {}", key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryHistoryStore, MemoryStaleStore};
    use async_trait::async_trait;
    use chrono::Duration;
    use open_meteo_client::FetchFailure;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Returns the same result on every call.
    struct FixedSource {
        result: Result<WeatherObservation, FetchFailure>,
        calls: AtomicU32,
    }

    impl FixedSource {
        fn new(result: Result<WeatherObservation, FetchFailure>) -> Arc<Self> {
            Arc::new(Self {
                result,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WeatherSource for FixedSource {
        async fn current(&self, _coords: Coordinates) -> Result<WeatherObservation, FetchFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    struct FixedGeocoder {
        result: Result<Option<Coordinates>, FetchFailure>,
        calls: AtomicU32,
    }

    impl FixedGeocoder {
        fn new(result: Result<Option<Coordinates>, FetchFailure>) -> Arc<Self> {
            Arc::new(Self {
                result,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Geocoder for FixedGeocoder {
        async fn resolve(&self, _name: &str) -> Result<Option<Coordinates>, FetchFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn mumbai() -> Coordinates {
        Coordinates::new(19.07, 72.88).unwrap()
    }

    fn observation(captured_at: DateTime<Utc>, rain: f64) -> WeatherObservation {
        WeatherObservation {
            temperature_c: 30.0,
            wind_speed_kmh: 14.0,
            rainfall_mm_h: rain,
            humidity_pct: 78.0,
            cloud_cover_pct: 60.0,
            captured_at,
            hourly_forecast: None,
        }
    }

    struct Harness {
        service: WeatherService,
        source: Arc<FixedSource>,
        geocoder: Arc<FixedGeocoder>,
        stale: Arc<MemoryStaleStore>,
    }

    fn harness(
        source: Result<WeatherObservation, FetchFailure>,
        geocoder: Result<Option<Coordinates>, FetchFailure>,
    ) -> Harness {
        let source = FixedSource::new(source);
        let geocoder = FixedGeocoder::new(geocoder);
        let stale = Arc::new(MemoryStaleStore::new());
        let service = WeatherService::new(
            &AppConfig::default(),
            source.clone(),
            geocoder.clone(),
            stale.clone(),
            Arc::new(MemoryHistoryStore::new(24)),
        );
        Harness {
            service,
            source,
            geocoder,
            stale,
        }
    }

    fn to_json(payload: &ResponsePayload) -> serde_json::Value {
        serde_json::to_value(payload).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_mumbai_healthy_upstream_is_success_then_cached() {
        let h = harness(Ok(observation(Utc::now(), 2.0)), Ok(Some(mumbai())));

        let first = h.service.weather("Mumbai", None).await.unwrap();
        assert_eq!(first.status_code(), 200);
        let json = to_json(&first);
        assert_eq!(json["status"], "success");
        assert_eq!(json["source"], "live_api");
        assert_eq!(json["location"], "mumbai");
        assert_eq!(json["history_count"], 1);
        assert_eq!(json["history"][0]["rain_1h"], 2.0);
        assert_eq!(json["risk_assessment"]["disaster_type"], "NONE");

        let second = h.service.weather("  MUMBAI ", None).await.unwrap();
        assert_eq!(to_json(&second)["source"], "cache");
        assert_eq!(h.source.calls(), 1);
        assert_eq!(h.geocoder.calls(), 1);
        assert_eq!(h.service.cached_locations(), 1);

        let key = LocationKey::parse("Mumbai").unwrap();
        let record = h.stale.get(&key).await.unwrap().unwrap();
        assert_eq!(record.coordinates, mumbai());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mumbai_timeouts_with_stale_record_degrade() {
        let h = harness(Err(FetchFailure::Timeout), Ok(Some(mumbai())));
        let captured = Utc::now() - Duration::hours(2);
        h.stale
            .put(
                &LocationKey::parse("Mumbai").unwrap(),
                StaleRecord {
                    observation: observation(captured, 65.0),
                    coordinates: mumbai(),
                },
            )
            .await
            .unwrap();

        let payload = h.service.weather("Mumbai", None).await.unwrap();

        assert_eq!(payload.status_code(), 200);
        let json = to_json(&payload);
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["source"], "stale_cache");
        assert_eq!(json["warning"]["type"], "timeout");
        assert_eq!(json["data"]["rain_1h"], 65.0);
        assert_eq!(json["risk_assessment"]["disaster_type"], "FLOOD");
        assert_eq!(h.source.calls(), 3, "timeouts use every attempt");
        assert_eq!(h.geocoder.calls(), 0, "stored coordinates skip geocoding");
        assert_eq!(h.service.cached_locations(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mumbai_timeouts_without_record_are_partial() {
        let h = harness(Err(FetchFailure::Timeout), Ok(Some(mumbai())));

        let payload = h.service.weather("Mumbai", None).await.unwrap();

        assert_eq!(payload.status_code(), 503);
        let json = to_json(&payload);
        assert_eq!(json["status"], "partial");
        assert_eq!(json["location_found"], true);
        assert!(json["data"].is_null());
        assert_eq!(json["coordinates"]["lon"], 72.88);
        assert_eq!(json["error"]["error_type"], "timeout");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_hint_reaches_partial_payload() {
        let h = harness(
            Err(FetchFailure::RateLimited { retry_after_secs: 7 }),
            Ok(Some(mumbai())),
        );

        let payload = h.service.weather("Mumbai", None).await.unwrap();
        assert_eq!(payload.retry_after(), Some(7));
        assert_eq!(h.source.calls(), 3);
    }

    #[tokio::test]
    async fn test_unknown_place_is_not_found() {
        let h = harness(Ok(observation(Utc::now(), 0.0)), Ok(None));

        let err = h.service.weather("Atlantis", None).await.unwrap_err();
        assert!(matches!(err, ServiceError::LocationNotFound(ref name) if name == "Atlantis"));
        assert_eq!(err.status_code(), 503);
        assert_eq!(h.source.calls(), 0);
    }

    #[tokio::test]
    async fn test_geocoder_failure_is_unresolved() {
        let h = harness(
            Ok(observation(Utc::now(), 0.0)),
            Err(FetchFailure::NetworkError("dns error".into())),
        );

        let err = h.service.weather("Pune", None).await.unwrap_err();
        assert_eq!(err.body().error_type, "network_error");
        assert!(!err.body().location_found);
    }

    #[tokio::test]
    async fn test_coordinate_location_skips_geocoder() {
        let h = harness(Ok(observation(Utc::now(), 0.0)), Ok(None));

        let payload = h.service.weather("19.07, 72.88", None).await.unwrap();
        assert_eq!(to_json(&payload)["location"], "19.0700,72.8800");
        assert_eq!(h.geocoder.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_location_is_rejected() {
        let h = harness(Ok(observation(Utc::now(), 0.0)), Ok(Some(mumbai())));

        let err = h.service.weather("   ", None).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_simulation_never_touches_upstream() {
        let h = harness(Err(FetchFailure::Timeout), Ok(None));

        let payload = h.service.weather("Chennai", Some("flood")).await.unwrap();
        let json = to_json(&payload);
        assert_eq!(json["status"], "success");
        assert_eq!(json["source"], "simulation");
        assert_eq!(json["history_count"], 7);
        assert_eq!(json["risk_assessment"]["risk_level"], "HIGH");

        let history = json["history"].as_array().unwrap();
        assert_eq!(history.len(), 7);
        let stamps: Vec<&str> = history
            .iter()
            .map(|s| s["timestamp"].as_str().unwrap())
            .collect();
        assert!(stamps.windows(2).all(|w| w[0] > w[1]), "{stamps:?}");
        assert_eq!(h.source.calls(), 0);
        assert_eq!(h.geocoder.calls(), 0);
        assert_eq!(h.service.cached_locations(), 0);

        let err = h.service.weather("Chennai", Some("meteor")).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_refresh_bypasses_cache() {
        let h = harness(Ok(observation(Utc::now(), 0.0)), Ok(Some(mumbai())));

        h.service.weather("Mumbai", None).await.unwrap();
        h.service.refresh("Mumbai").await.unwrap();
        assert_eq!(h.source.calls(), 2);
    }

    #[tokio::test]
    async fn test_refresh_reports_upstream_failure() {
        let h = harness(
            Err(FetchFailure::UpstreamError { status_code: 500 }),
            Ok(Some(mumbai())),
        );

        let err = h.service.refresh("Mumbai").await.unwrap_err();
        assert!(matches!(err, ServiceError::Upstream(_)));
        assert_eq!(h.source.calls(), 1);
    }

    #[tokio::test]
    async fn test_refresh_targets_deduplicate_by_key() {
        let h = harness(Ok(observation(Utc::now(), 0.0)), Ok(Some(mumbai())));
        h.service.weather("Mumbai", None).await.unwrap();
        h.service.weather("New  York", None).await.unwrap();

        let monitored = vec!["Mumbai".to_string(), "Delhi".to_string(), "delhi".to_string()];
        let targets = h.service.refresh_targets(&monitored).await;
        assert_eq!(targets, vec!["Mumbai", "Delhi", "new_york"]);
    }
}
