//! Risk engine: classifies an observation and its recent history.
//!
//! Rules are checked in a fixed order and the first match wins:
//!
//! 1. rain this hour above the flood threshold → `FLOOD` / `HIGH`
//! 2. rain summed over the trailing three hours (the observation's hour
//!    bucket and the two before it) at or above the heavy-rain threshold
//!    → `HEAVY_RAIN` / `MEDIUM`
//! 3. wind above the cyclone threshold → `CYCLONE` / `HIGH`
//! 4. temperature at or above the heat threshold for the minimum number
//!    of consecutive hourly samples → `HEATWAVE` / `HIGH`
//! 5. otherwise `NONE` / `LOW`
//!
//! When several conditions hold at once the earlier rule is reported even
//! if a later one looks more severe.
//!
//! Persistence is the run of consecutive hourly samples, newest first,
//! that meet the reported rule's condition. A missing hour ends the run.
//! The conditions are the rule's own threshold for flood, cyclone and
//! heat, and any measurable rain (`> 0 mm`) for heavy rain. A `NONE`
//! result still reports the current heat run, so a heatwave that is
//! building shows up before it is sustained.

use chrono::{DateTime, Utc};
use common::config::RiskConfig;
use common::{hour_id, DisasterType, HistorySample, RiskAssessment, RiskLevel, WeatherObservation};
use tracing::debug;

/// Hour buckets summed for the heavy-rain rule, the current one included.
const HEAVY_RAIN_HOURS: i64 = 3;

#[derive(Debug, Clone)]
pub struct RiskEngine {
    config: RiskConfig,
    /// Age below which an observation counts as fully fresh.
    fresh_window: chrono::Duration,
}

impl RiskEngine {
    pub fn new(config: RiskConfig, fresh_window: std::time::Duration) -> Self {
        let fresh_window =
            chrono::Duration::from_std(fresh_window).unwrap_or_else(|_| chrono::Duration::zero());
        Self {
            config,
            fresh_window,
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Classify `observation` against `history` (newest first).
    ///
    /// A history sample in the observation's own hour bucket is the same
    /// reading and is replaced by the observation.
    pub fn assess(
        &self,
        observation: &WeatherObservation,
        history: &[HistorySample],
        now: DateTime<Utc>,
    ) -> RiskAssessment {
        let window = sample_window(observation, history);
        let cfg = &self.config;

        let (disaster_type, risk_level, persistence, reason) =
            if observation.rainfall_mm_h > cfg.flood_rain_mm {
                let hours = trailing(&window, |s| s.rainfall_mm_h > cfg.flood_rain_mm);
                (
                    DisasterType::Flood,
                    RiskLevel::High,
                    hours,
                    format!(
                        "ALERT: Heavy rainfall ({:.1} mm/h) indicates immediate flash flood risk.",
                        observation.rainfall_mm_h
                    ),
                )
            } else if let Some(total) =
                heavy_rain_total(&window, observation.captured_at, cfg.heavy_rain_3h_mm)
            {
                let hours = trailing(&window, |s| s.rainfall_mm_h > 0.0);
                (
                    DisasterType::HeavyRain,
                    RiskLevel::Medium,
                    hours,
                    format!(
                        "Sustained heavy rain ({:.1} mm over 3h). Risk of flooding is increasing.",
                        total
                    ),
                )
            } else if observation.wind_speed_kmh > cfg.cyclone_wind_kmh {
                let hours = trailing(&window, |s| s.wind_speed_kmh > cfg.cyclone_wind_kmh);
                (
                    DisasterType::Cyclone,
                    RiskLevel::High,
                    hours,
                    format!(
                        "ALERT: Extreme wind speeds ({:.1} km/h) detected. Immediate danger.",
                        observation.wind_speed_kmh
                    ),
                )
            } else {
                let hot = trailing(&window, |s| s.temperature_c >= cfg.heatwave_temp_c);
                if hot >= cfg.heatwave_min_hours as usize {
                    (
                        DisasterType::Heatwave,
                        RiskLevel::High,
                        hot,
                        format!(
                            "CRITICAL: Temperature has been at or above {:.1}°C for {} continuous hours.",
                            cfg.heatwave_temp_c, hot
                        ),
                    )
                } else if hot > 0 {
                    (
                        DisasterType::None,
                        RiskLevel::Low,
                        hot,
                        format!(
                            "High temperature ({:.1}°C) for {} hours. Monitoring for persistence.",
                            observation.temperature_c, hot
                        ),
                    )
                } else {
                    (
                        DisasterType::None,
                        RiskLevel::Low,
                        0,
                        "Weather conditions are within normal safety limits.".to_string(),
                    )
                }
            };

        let confidence = self.confidence(observation.captured_at, now);

        debug!(
            "Assessed {:?}/{:?} persistence={}h confidence={:.2} over {} samples",
            disaster_type,
            risk_level,
            persistence,
            confidence,
            window.len()
        );

        RiskAssessment {
            disaster_type,
            risk_level,
            confidence,
            persistence_hours: persistence as f64,
            reason,
            timestamp: now,
        }
    }

    /// 1.0 within the fresh window, then linear decay to the floor over
    /// `confidence_decay_hours`.
    pub fn confidence(&self, captured_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let floor = self.config.confidence_floor.clamp(0.0, 1.0);
        let age = now - captured_at;
        if age <= self.fresh_window {
            return 1.0;
        }

        let decay_secs = self.config.confidence_decay_hours * 3600.0;
        if decay_secs <= 0.0 {
            return floor;
        }

        let stale_secs = (age - self.fresh_window).num_milliseconds() as f64 / 1000.0;
        let progress = (stale_secs / decay_secs).min(1.0);
        let score = 1.0 - progress * (1.0 - floor);
        (score * 100.0).round() / 100.0
    }
}

/// Newest-first readings: the observation, then strictly older buckets.
fn sample_window(observation: &WeatherObservation, history: &[HistorySample]) -> Vec<HistorySample> {
    let current = HistorySample::from(observation);
    let current_hour = hour_id(observation.captured_at);

    let mut window = Vec::with_capacity(history.len() + 1);
    window.push(current);
    window.extend(
        history
            .iter()
            .filter(|s| s.hour_id != current_hour && s.captured_at < observation.captured_at)
            .cloned(),
    );
    window
}

/// Hours since the Unix epoch, i.e. the sample's hour bucket as a number.
fn hour_index(ts: DateTime<Utc>) -> i64 {
    ts.timestamp().div_euclid(3600)
}

/// Consecutive hourly samples from the newest that satisfy `condition`.
fn trailing(window: &[HistorySample], condition: impl Fn(&HistorySample) -> bool) -> usize {
    let mut count = 0;
    let mut expected: Option<i64> = None;

    for sample in window {
        let hour = hour_index(sample.captured_at);
        if expected.is_some_and(|e| e != hour) || !condition(sample) {
            break;
        }
        count += 1;
        expected = Some(hour - 1);
    }
    count
}

fn heavy_rain_total(
    window: &[HistorySample],
    observed_at: DateTime<Utc>,
    threshold: f64,
) -> Option<f64> {
    let oldest = hour_index(observed_at) - (HEAVY_RAIN_HOURS - 1);
    let total: f64 = window
        .iter()
        .filter(|s| hour_index(s.captured_at) >= oldest)
        .map(|s| s.rainfall_mm_h)
        .sum();
    (total >= threshold).then_some(total)
}
