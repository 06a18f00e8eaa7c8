//! Canned weather for exercising the dashboard without the provider.
//!
//! A scenario supplies one observation and seven hourly samples of the same
//! reading (this hour plus six back), so persistence rules see enough
//! history to fire.

use chrono::{DateTime, Duration, Utc};
use common::{hour_id, HistorySample, WeatherObservation};
use std::fmt;
use std::str::FromStr;

use crate::error::ServiceError;

const HISTORY_SAMPLES: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    Normal,
    Flood,
    HeavyRain,
    Cyclone,
    Heatwave,
}

impl Scenario {
    pub const ALL: [Scenario; 5] = [
        Scenario::Normal,
        Scenario::Flood,
        Scenario::HeavyRain,
        Scenario::Cyclone,
        Scenario::Heatwave,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::Normal => "normal",
            Scenario::Flood => "flood",
            Scenario::HeavyRain => "heavy_rain",
            Scenario::Cyclone => "cyclone",
            Scenario::Heatwave => "heatwave",
        }
    }

    pub fn observation(&self, now: DateTime<Utc>) -> WeatherObservation {
        // (temp °C, wind km/h, rain mm/h, humidity %, clouds %)
        let (temp, wind, rain, humidity, clouds) = match self {
            Scenario::Normal => (28.0, 12.0, 0.0, 65.0, 20.0),
            Scenario::Flood => (26.0, 35.0, 75.0, 98.0, 100.0),
            Scenario::HeavyRain => (27.0, 22.0, 20.0, 95.0, 100.0),
            Scenario::Cyclone => (27.0, 120.0, 10.0, 92.0, 100.0),
            Scenario::Heatwave => (44.0, 15.0, 0.0, 18.0, 5.0),
        };

        WeatherObservation {
            temperature_c: temp,
            wind_speed_kmh: wind,
            rainfall_mm_h: rain,
            humidity_pct: humidity,
            cloud_cover_pct: clouds,
            captured_at: now,
            hourly_forecast: None,
        }
    }

    /// Hourly copies of the observation, newest first.
    pub fn history(&self, now: DateTime<Utc>) -> Vec<HistorySample> {
        let observation = self.observation(now);
        (0..HISTORY_SAMPLES)
            .map(|i| {
                let ts = now - Duration::hours(i);
                HistorySample {
                    temperature_c: observation.temperature_c,
                    wind_speed_kmh: observation.wind_speed_kmh,
                    rainfall_mm_h: observation.rainfall_mm_h,
                    captured_at: ts,
                    hour_id: hour_id(ts),
                }
            })
            .collect()
    }
}

impl FromStr for Scenario {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Scenario::ALL
            .into_iter()
            .find(|scenario| scenario.name() == wanted)
            .ok_or_else(|| ServiceError::UnknownScenario(s.to_string()))
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
