//! Efficiency scoring
//!
//! Maps a [`TripSummary`] to a 0-100 score built from three sub-scores
//! (average speed, engine speed, fuel consumption) and produces templated
//! feedback text for the driver.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::trip::TripSummary;

/// Sub-score at or above which a metric gets praise instead of advice
const FEEDBACK_THRESHOLD: f64 = 85.0;

/// Mean sub-score below which the severity remark is appended
const SEVERITY_THRESHOLD: f64 = 50.0;

/// Scoring bands, floors and weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Lower edge of the ideal average speed band (km/h)
    pub optimal_speed_min: f64,
    /// Upper edge of the ideal average speed band (km/h)
    pub optimal_speed_max: f64,
    /// Speed over the band (km/h) that costs `speed_high_penalty` points
    pub speed_high_span: f64,
    /// Points lost over `speed_high_span` above the band
    pub speed_high_penalty: f64,
    /// Lowest speed sub-score
    pub speed_floor: f64,

    /// Peak RPM that still scores 100
    pub optimal_max_rpm: f64,
    /// RPM over `optimal_max_rpm` that costs `rpm_penalty` points
    pub max_rpm_span: f64,
    /// Average RPM that still scores 100
    pub optimal_avg_rpm: f64,
    /// RPM over `optimal_avg_rpm` that costs `rpm_penalty` points
    pub avg_rpm_span: f64,
    /// Points lost per span over either RPM limit
    pub rpm_penalty: f64,
    /// Lowest RPM sub-score
    pub rpm_floor: f64,
    /// Weight of the peak RPM score; the average gets the rest
    pub max_rpm_share: f64,

    /// L/100km at or below which fuel scores 100
    pub excellent_consumption: f64,
    /// L/100km at or above which fuel scores `fuel_floor`
    pub poor_consumption: f64,
    /// Lowest fuel sub-score
    pub fuel_floor: f64,

    /// Share of the speed sub-score in the total
    pub speed_weight: f64,
    /// Share of the RPM sub-score
    pub rpm_weight: f64,
    /// Share of the fuel sub-score
    pub fuel_weight: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            optimal_speed_min: 55.0,
            optimal_speed_max: 75.0,
            speed_high_span: 15.0,
            speed_high_penalty: 60.0,
            speed_floor: 40.0,
            optimal_max_rpm: 2200.0,
            max_rpm_span: 800.0,
            optimal_avg_rpm: 1500.0,
            avg_rpm_span: 600.0,
            rpm_penalty: 70.0,
            rpm_floor: 30.0,
            max_rpm_share: 0.4,
            excellent_consumption: 4.5,
            poor_consumption: 10.0,
            fuel_floor: 30.0,
            speed_weight: 0.30,
            rpm_weight: 0.35,
            fuel_weight: 0.35,
        }
    }
}

/// Individual sub-scores, each 0-100
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    /// Average speed against the ideal band
    pub speed: f64,
    /// Peak and average RPM
    pub rpm: f64,
    /// Average consumption
    pub fuel: f64,
}

impl SubScores {
    /// Unweighted mean of the three sub-scores
    pub fn mean(&self) -> f64 {
        (self.speed + self.rpm + self.fuel) / 3.0
    }
}

/// Presentation grade for an overall score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScoreGrade {
    /// Below 50
    Poor,
    /// 50-69
    Fair,
    /// 70-84
    Good,
    /// 85 and up
    Excellent,
}

impl ScoreGrade {
    /// Grade for a 0-100 score
    pub fn from_score(score: u8) -> Self {
        match score {
            85..=u8::MAX => ScoreGrade::Excellent,
            70..=84 => ScoreGrade::Good,
            50..=69 => ScoreGrade::Fair,
            _ => ScoreGrade::Poor,
        }
    }
}

impl fmt::Display for ScoreGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ScoreGrade::Excellent => "Excellent",
            ScoreGrade::Good => "Good",
            ScoreGrade::Fair => "Fair",
            ScoreGrade::Poor => "Poor",
        };
        f.write_str(text)
    }
}

/// Scores trip summaries
#[derive(Debug, Clone, Default)]
pub struct EfficiencyScorer {
    config: ScoringConfig,
}

impl EfficiencyScorer {
    /// Scorer with the given thresholds
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Thresholds in use
    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Overall score, 0-100
    pub fn score(&self, trip: &TripSummary) -> u8 {
        let cfg = &self.config;
        let sub = self.sub_scores(trip);
        let weighted =
            sub.speed * cfg.speed_weight + sub.rpm * cfg.rpm_weight + sub.fuel * cfg.fuel_weight;
        weighted.round().clamp(0.0, 100.0) as u8
    }

    /// Speed, RPM and fuel sub-scores for a trip
    pub fn sub_scores(&self, trip: &TripSummary) -> SubScores {
        SubScores {
            speed: self.speed_score(trip.avg_speed_kmh),
            rpm: self.rpm_score(trip.max_rpm, trip.avg_rpm),
            fuel: self.fuel_score(trip.avg_fuel_consumption),
        }
    }

    /// Speed sub-score for an average speed in km/h
    pub fn speed_score(&self, avg_speed: f64) -> f64 {
        let cfg = &self.config;
        if (cfg.optimal_speed_min..=cfg.optimal_speed_max).contains(&avg_speed) {
            100.0
        } else if avg_speed < cfg.optimal_speed_min {
            let ratio = avg_speed / cfg.optimal_speed_min;
            (60.0 + ratio * 40.0).max(cfg.speed_floor)
        } else {
            let over = (avg_speed - cfg.optimal_speed_max) / cfg.speed_high_span;
            (100.0 - over * cfg.speed_high_penalty).max(cfg.speed_floor)
        }
    }

    /// RPM sub-score blending peak and average RPM
    pub fn rpm_score(&self, max_rpm: u32, avg_rpm: f64) -> f64 {
        let cfg = &self.config;
        let max_score = self.rpm_band_score(f64::from(max_rpm), cfg.optimal_max_rpm, cfg.max_rpm_span);
        let avg_score = self.rpm_band_score(avg_rpm, cfg.optimal_avg_rpm, cfg.avg_rpm_span);
        max_score * cfg.max_rpm_share + avg_score * (1.0 - cfg.max_rpm_share)
    }

    fn rpm_band_score(&self, rpm: f64, optimal: f64, span: f64) -> f64 {
        if rpm <= optimal {
            100.0
        } else {
            let over = (rpm - optimal) / span;
            (100.0 - over * self.config.rpm_penalty).max(self.config.rpm_floor)
        }
    }

    /// Fuel sub-score for a consumption in L/100km
    pub fn fuel_score(&self, consumption: f64) -> f64 {
        let cfg = &self.config;
        if consumption <= cfg.excellent_consumption {
            100.0
        } else if consumption >= cfg.poor_consumption {
            cfg.fuel_floor
        } else {
            let ratio = (consumption - cfg.excellent_consumption)
                / (cfg.poor_consumption - cfg.excellent_consumption);
            100.0 - ratio * (100.0 - cfg.fuel_floor)
        }
    }

    /// Driver-facing remarks: praise first, then advice, then a severity note
    pub fn feedback(&self, trip: &TripSummary) -> String {
        let sub = self.sub_scores(trip);
        let mut remarks: Vec<&str> = Vec::new();

        if sub.speed >= FEEDBACK_THRESHOLD {
            remarks.push("Nicely done keeping your speed in the efficient range.");
        }
        if sub.rpm >= FEEDBACK_THRESHOLD {
            remarks.push("Engine speed stayed in an economical range.");
        }
        if sub.fuel >= FEEDBACK_THRESHOLD {
            remarks.push("Excellent fuel consumption!");
        }

        if sub.speed < FEEDBACK_THRESHOLD {
            if trip.avg_speed_kmh < self.config.optimal_speed_min {
                remarks.push("Aim for a steadier pace and avoid stop-and-go driving where you can.");
            } else {
                remarks.push("Easing off a little at highway speeds would save fuel.");
            }
        }
        if sub.rpm < FEEDBACK_THRESHOLD {
            remarks.push("Shift up earlier to keep engine speed down.");
        }
        if sub.fuel < FEEDBACK_THRESHOLD {
            remarks.push("Fuel consumption is high. Accelerate more smoothly and hold a constant speed.");
        }

        let mut text = remarks.join(" ");
        if sub.mean() < SEVERITY_THRESHOLD {
            text.push_str(
                "\n\nThis trip shows significant inefficiencies that cost money and increase emissions.",
            );
        }
        text.trim().to_string()
    }
}
