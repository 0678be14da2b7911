//! Trip summary

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Immutable record of a finished trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripSummary {
    /// km/h
    pub avg_speed_kmh: f64,
    /// Total distance
    pub distance_km: f64,
    /// L/100km
    pub avg_fuel_consumption: f64,
    /// Litres
    pub fuel_used_l: f64,
    /// Time between the first and last integrated sample
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    /// Highest RPM seen
    pub max_rpm: u32,
    /// Mean RPM over the trip
    pub avg_rpm: f64,
    /// 0-100; absent on records stored before they were scored
    #[serde(default)]
    pub efficiency_score: Option<u8>,
}

impl TripSummary {
    /// Trip duration as `HH:MM:SS`
    pub fn duration_hms(&self) -> String {
        let total = self.duration.as_secs();
        format!(
            "{:02}:{:02}:{:02}",
            total / 3600,
            (total % 3600) / 60,
            total % 60
        )
    }

    /// Score, treating an unscored trip as 0
    pub fn score(&self) -> u8 {
        self.efficiency_score.unwrap_or(0)
    }
}

/// Durations are stored as fractional seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
