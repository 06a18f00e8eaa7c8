//! Background refresh of monitored places.
//!
//! A pass walks the configured places plus every location with a stored
//! record and refreshes each one past the cache. Only one pass runs at a
//! time; a trigger that arrives mid-pass is dropped.
//!
//! A live fetch from `/weather` also starts a pass, at most once per
//! [`LIVE_FETCH_COOLDOWN`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assessment::WeatherService;
use common::config::IngestConfig;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassSummary {
    pub targets: usize,
    pub refreshed: usize,
    pub failed: usize,
}

/// Holds the single-pass flag for the lifetime of a pass.
struct PassGuard(Arc<AtomicBool>);

impl PassGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Minimum gap between passes started by live fetches.
pub const LIVE_FETCH_COOLDOWN: Duration = Duration::from_secs(15 * 60);

pub struct Ingestor {
    service: Arc<WeatherService>,
    config: IngestConfig,
    running: Arc<AtomicBool>,
    last_live_trigger: Mutex<Option<Instant>>,
}

impl Ingestor {
    pub fn new(service: Arc<WeatherService>, config: IngestConfig) -> Self {
        Self {
            service,
            config,
            running: Arc::new(AtomicBool::new(false)),
            last_live_trigger: Mutex::new(None),
        }
    }

    pub fn monitored_places(&self) -> &[String] {
        &self.config.monitored_places
    }

    /// Start a pass on a background task. Returns `false` when a pass is
    /// already running.
    pub fn trigger(self: &Arc<Self>) -> bool {
        let Some(guard) = PassGuard::acquire(&self.running) else {
            info!("Refresh requested while a pass is running; skipping");
            return false;
        };

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = guard;
            this.pass().await;
        });
        true
    }

    /// Start a pass after a live fetch unless one was started less than
    /// [`LIVE_FETCH_COOLDOWN`] ago. Returns `true` when a pass was spawned.
    pub fn trigger_after_live_fetch(self: &Arc<Self>) -> bool {
        if !self.config.enabled {
            return false;
        }

        let now = Instant::now();
        {
            let mut last = match self.last_live_trigger.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if last.is_some_and(|t| now.duration_since(t) <= LIVE_FETCH_COOLDOWN) {
                return false;
            }
            *last = Some(now);
        }

        info!("Live fetch succeeded; starting background refresh");
        self.trigger()
    }

    /// Run one pass inline, or `None` if another pass holds the flag.
    pub async fn run_pass(&self) -> Option<PassSummary> {
        let _guard = PassGuard::acquire(&self.running)?;
        Some(self.pass().await)
    }

    /// Periodic passes after the initial delay.
    pub fn spawn_schedule(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            sleep(Duration::from_secs(self.config.initial_delay_secs)).await;

            let period = Duration::from_secs(self.config.interval_secs);
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                if self.run_pass().await.is_none() {
                    debug!("Scheduled pass skipped; previous pass still running");
                }
            }
        })
    }

    async fn pass(&self) -> PassSummary {
        let targets = self
            .service
            .refresh_targets(&self.config.monitored_places)
            .await;
        info!("--- Starting ingest pass over {} locations ---", targets.len());

        let pause = Duration::from_millis(self.config.pause_ms);
        let mut summary = PassSummary {
            targets: targets.len(),
            ..PassSummary::default()
        };

        for (i, name) in targets.iter().enumerate() {
            match self.service.refresh(name).await {
                Ok(observation) => {
                    summary.refreshed += 1;
                    debug!(
                        "Refreshed {}: {:.1}°C, {:.1} mm/h",
                        name, observation.temperature_c, observation.rainfall_mm_h
                    );
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!("Skipping {}: {}", name, e);
                }
            }

            if i + 1 < targets.len() && !pause.is_zero() {
                sleep(pause).await;
            }
        }

        info!(
            "Ingest pass complete: {}/{} refreshed, {} failed",
            summary.refreshed, summary.targets, summary.failed
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{service_with, StubGeocoder, StubSource};
    use open_meteo_client::FetchFailure;

    fn config(places: &[&str]) -> IngestConfig {
        IngestConfig {
            monitored_places: places.iter().map(|p| p.to_string()).collect(),
            ..IngestConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pass_covers_monitored_and_stored_places_once() {
        let source = StubSource::ok();
        let service = service_with(source.clone(), StubGeocoder::found());
        service.weather("Chennai", None).await.unwrap();

        let ingestor = Ingestor::new(service, config(&["Mumbai", "Delhi", "mumbai"]));
        let summary = ingestor.run_pass().await.unwrap();

        assert_eq!(
            summary,
            PassSummary {
                targets: 3,
                refreshed: 3,
                failed: 0
            }
        );
        assert_eq!(source.calls(), 4);
        assert!(!ingestor.running.load(Ordering::Acquire));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_counted_and_skipped() {
        let source = StubSource::failing(FetchFailure::UpstreamError { status_code: 500 });
        let service = service_with(source.clone(), StubGeocoder::found());

        let ingestor = Ingestor::new(service, config(&["Mumbai", "Delhi"]));
        let summary = ingestor.run_pass().await.unwrap();

        assert_eq!(summary.failed, 2);
        assert_eq!(summary.refreshed, 0);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_only_one_pass_at_a_time() {
        let service = service_with(StubSource::ok(), StubGeocoder::found());
        let ingestor = Arc::new(Ingestor::new(service, config(&["Mumbai"])));

        let held = PassGuard::acquire(&ingestor.running).unwrap();
        assert!(ingestor.run_pass().await.is_none());
        assert!(!ingestor.trigger());

        drop(held);
        assert!(!ingestor.running.load(Ordering::Acquire));
        assert!(ingestor.run_pass().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_fetch_trigger_respects_cooldown() {
        let source = StubSource::ok();
        let service = service_with(source.clone(), StubGeocoder::found());
        let ingestor = Arc::new(Ingestor::new(service, config(&["Mumbai"])));

        assert!(ingestor.trigger_after_live_fetch());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.calls(), 1);

        tokio::time::advance(Duration::from_secs(10 * 60)).await;
        assert!(!ingestor.trigger_after_live_fetch());

        tokio::time::advance(LIVE_FETCH_COOLDOWN).await;
        assert!(ingestor.trigger_after_live_fetch());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_fetch_trigger_is_off_when_ingest_disabled() {
        let service = service_with(StubSource::ok(), StubGeocoder::found());
        let ingestor = Arc::new(Ingestor::new(
            service,
            IngestConfig {
                enabled: false,
                ..config(&["Mumbai"])
            },
        ));

        assert!(!ingestor.trigger_after_live_fetch());
    }
}
