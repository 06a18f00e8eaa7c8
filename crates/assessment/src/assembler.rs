//! Response assembly.
//!
//! Every request ends in exactly one of three shapes. The dashboard keys
//! off `status` to decide whether to keep showing a detected location, so
//! the shapes stay distinct even when nothing could be fetched.

use chrono::{DateTime, Utc};
use common::{Coordinates, HistorySample, LocationKey, RiskAssessment, WeatherObservation};
use open_meteo_client::FetchFailure;
use serde::Serialize;
use tracing::{info, warn};

use crate::risk::RiskEngine;
use crate::store::StaleRecord;

/// Where the weather in a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    LiveApi,
    Cache,
    Simulation,
    StaleCache,
    LocationOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaleWarning {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorInfo {
    pub error_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl From<&FetchFailure> for ErrorInfo {
    fn from(failure: &FetchFailure) -> Self {
        Self {
            error_type: failure.kind().to_string(),
            message: failure.to_string(),
            retry_after: failure.retry_after_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status")]
pub enum ResponsePayload {
    #[serde(rename = "success")]
    Success {
        source: DataSource,
        location: LocationKey,
        data: WeatherObservation,
        risk_assessment: RiskAssessment,
        history_count: usize,
        /// Hourly samples behind the assessment, newest first.
        history: Vec<HistorySample>,
    },
    #[serde(rename = "degraded")]
    DegradedStale {
        source: DataSource,
        location: LocationKey,
        data: WeatherObservation,
        risk_assessment: RiskAssessment,
        warning: StaleWarning,
        history: Vec<HistorySample>,
    },
    #[serde(rename = "partial")]
    PartialLocationOnly {
        source: DataSource,
        location: LocationKey,
        location_found: bool,
        coordinates: Coordinates,
        data: Option<WeatherObservation>,
        error: ErrorInfo,
    },
}

impl ResponsePayload {
    /// HTTP status advertised for the payload.
    pub fn status_code(&self) -> u16 {
        match self {
            ResponsePayload::Success { .. } | ResponsePayload::DegradedStale { .. } => 200,
            ResponsePayload::PartialLocationOnly { .. } => 503,
        }
    }

    /// Seconds the client should wait before asking again, if known.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            ResponsePayload::Success { .. } => None,
            ResponsePayload::DegradedStale { warning, .. } => warning.retry_after,
            ResponsePayload::PartialLocationOnly { error, .. } => error.retry_after,
        }
    }

    pub fn source(&self) -> DataSource {
        match self {
            ResponsePayload::Success { source, .. }
            | ResponsePayload::DegradedStale { source, .. }
            | ResponsePayload::PartialLocationOnly { source, .. } => *source,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            ResponsePayload::Success { .. } => "success",
            ResponsePayload::DegradedStale { .. } => "degraded",
            ResponsePayload::PartialLocationOnly { .. } => "partial",
        }
    }
}

/// Result of the cache/fetch stage for one request.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Fresh {
        observation: WeatherObservation,
        source: DataSource,
    },
    Failed {
        failure: FetchFailure,
        coordinates: Coordinates,
        stale: Option<StaleRecord>,
    },
}

#[derive(Debug, Clone)]
pub struct ResponseAssembler {
    engine: RiskEngine,
}

impl ResponseAssembler {
    pub fn new(engine: RiskEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &RiskEngine {
        &self.engine
    }

    pub fn assemble(
        &self,
        location: LocationKey,
        outcome: FetchOutcome,
        history: &[HistorySample],
        now: DateTime<Utc>,
    ) -> ResponsePayload {
        match outcome {
            FetchOutcome::Fresh {
                observation,
                source,
            } => {
                let risk_assessment = self.engine.assess(&observation, history, now);
                ResponsePayload::Success {
                    source,
                    location,
                    data: observation,
                    risk_assessment,
                    history_count: history.len(),
                    history: history.to_vec(),
                }
            }
            FetchOutcome::Failed {
                failure,
                stale: Some(record),
                ..
            } => {
                let observation = record.observation;
                let cached_at = observation.captured_at;
                info!(
                    "Serving stale data for {} (last verified {}) after {} failure",
                    location,
                    cached_at.to_rfc3339(),
                    failure.kind()
                );

                let risk_assessment = self.engine.assess(&observation, history, now);
                ResponsePayload::DegradedStale {
                    source: DataSource::StaleCache,
                    location,
                    data: observation,
                    risk_assessment,
                    warning: StaleWarning {
                        kind: failure.kind().to_string(),
                        message: format!(
                            "Live weather unavailable ({failure}); showing data last verified at {}",
                            cached_at.to_rfc3339()
                        ),
                        retry_after: failure.retry_after_secs(),
                        cached_at,
                    },
                    history: history.to_vec(),
                }
            }
            FetchOutcome::Failed {
                failure,
                coordinates,
                stale: None,
            } => {
                warn!(
                    "No weather for {} and no stale record ({}); returning location only",
                    location,
                    failure.kind()
                );
                ResponsePayload::PartialLocationOnly {
                    source: DataSource::LocationOnly,
                    location,
                    location_found: true,
                    coordinates,
                    data: None,
                    error: ErrorInfo::from(&failure),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use common::config::RiskConfig;
    use common::{DisasterType, RiskLevel};

    fn assembler() -> ResponseAssembler {
        ResponseAssembler::new(RiskEngine::new(
            RiskConfig::default(),
            std::time::Duration::from_secs(600),
        ))
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap()
    }

    fn observation(captured_at: DateTime<Utc>) -> WeatherObservation {
        WeatherObservation {
            temperature_c: 29.0,
            wind_speed_kmh: 12.0,
            rainfall_mm_h: 65.0,
            humidity_pct: 90.0,
            cloud_cover_pct: 100.0,
            captured_at,
            hourly_forecast: None,
        }
    }

    fn coords() -> Coordinates {
        Coordinates::new(19.07, 72.88).unwrap()
    }

    fn mumbai() -> LocationKey {
        LocationKey::parse("Mumbai").unwrap()
    }

    fn hourly(hours_ago: i64, rain: f64) -> HistorySample {
        let ts = now() - Duration::hours(hours_ago);
        HistorySample {
            temperature_c: 29.0,
            wind_speed_kmh: 12.0,
            rainfall_mm_h: rain,
            captured_at: ts,
            hour_id: common::hour_id(ts),
        }
    }

    #[test]
    fn test_fresh_outcome_is_success() {
        let payload = assembler().assemble(
            mumbai(),
            FetchOutcome::Fresh {
                observation: observation(now()),
                source: DataSource::LiveApi,
            },
            &[],
            now(),
        );

        assert_eq!(payload.status_code(), 200);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["source"], "live_api");
        assert_eq!(json["location"], "mumbai");
        assert_eq!(json["risk_assessment"]["disaster_type"], "FLOOD");
        assert_eq!(json["risk_assessment"]["confidence_score"], 1.0);
        assert_eq!(json["history"], serde_json::json!([]));
    }

    #[test]
    fn test_history_is_returned_newest_first() {
        let history = vec![hourly(0, 65.0), hourly(1, 55.0), hourly(2, 10.0)];
        let payload = assembler().assemble(
            mumbai(),
            FetchOutcome::Fresh {
                observation: observation(now()),
                source: DataSource::LiveApi,
            },
            &history,
            now(),
        );

        assert_eq!(payload.source(), DataSource::LiveApi);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["history_count"], 3);

        let samples = json["history"].as_array().unwrap();
        let hours: Vec<&str> = samples
            .iter()
            .map(|s| s["hour_id"].as_str().unwrap())
            .collect();
        assert_eq!(hours, ["2026101809", "2026101808", "2026101807"]);
        assert_eq!(samples[1]["rain_1h"], 55.0);
        assert_eq!(json["risk_assessment"]["persistence_duration_hrs"], 2.0);
    }

    #[test]
    fn test_failure_with_stale_record_degrades() {
        let captured = now() - Duration::hours(3);
        let payload = assembler().assemble(
            mumbai(),
            FetchOutcome::Failed {
                failure: FetchFailure::RateLimited { retry_after_secs: 30 },
                coordinates: coords(),
                stale: Some(StaleRecord {
                    observation: observation(captured),
                    coordinates: coords(),
                }),
            },
            &[hourly(3, 65.0), hourly(4, 20.0)],
            now(),
        );

        assert_eq!(payload.status_code(), 200);
        assert_eq!(payload.retry_after(), Some(30));
        assert_eq!(payload.source(), DataSource::StaleCache);

        let ResponsePayload::DegradedStale {
            ref risk_assessment,
            ref warning,
            ..
        } = payload
        else {
            panic!("expected degraded payload, got {}", payload.status());
        };
        assert_eq!(risk_assessment.disaster_type, DisasterType::Flood);
        assert_eq!(risk_assessment.risk_level, RiskLevel::High);
        assert!(risk_assessment.confidence < 1.0);
        assert_eq!(warning.cached_at, captured);

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["source"], "stale_cache");
        assert_eq!(json["warning"]["type"], "rate_limited");
        assert_eq!(json["warning"]["retry_after"], 30);
        assert_eq!(json["history"][0]["hour_id"], "2026101806");
        assert_eq!(json["history"][1]["hour_id"], "2026101805");
    }

    #[test]
    fn test_failure_without_stale_record_is_partial() {
        let payload = assembler().assemble(
            mumbai(),
            FetchOutcome::Failed {
                failure: FetchFailure::Timeout,
                coordinates: coords(),
                stale: None,
            },
            &[],
            now(),
        );

        assert_eq!(payload.status_code(), 503);
        assert_eq!(payload.retry_after(), None);

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["status"], "partial");
        assert_eq!(json["source"], "location_only");
        assert_eq!(json["location_found"], true);
        assert!(json["data"].is_null());
        assert_eq!(json["coordinates"]["lat"], 19.07);
        assert_eq!(json["error"]["error_type"], "timeout");
        assert!(json["error"].get("retry_after").is_none());
        assert!(json.get("history").is_none());
    }
}
