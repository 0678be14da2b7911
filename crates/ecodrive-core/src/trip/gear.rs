//! Gear estimation
//!
//! Infers the engaged gear from engine and road speed using the gearbox ratio
//! table, with debounce for idling and a clutch-in (declutch) detector.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

const SECONDS_PER_MINUTE: f64 = 60.0;
const MS_TO_KMH: f64 = 3.6;

/// Estimated gear
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GearLabel {
    /// Engine not running
    EngineOff,
    /// Engine running with no gear engaged
    Neutral,
    /// Engaged gear, 1-based
    Gear(u8),
}

impl fmt::Display for GearLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GearLabel::EngineOff => f.write_str("-"),
            GearLabel::Neutral => f.write_str("N"),
            GearLabel::Gear(n) => write!(f, "{n}"),
        }
    }
}

/// Drivetrain geometry and hysteresis thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GearConfig {
    /// Tyre diameter in metres
    pub wheel_diameter_m: f64,
    /// Gearbox ratios; index 0 is first gear
    pub gear_ratios: Vec<f64>,
    /// Highest gear that uses `final_drive_low`
    pub low_group_max_gear: u8,
    /// Final drive for the lower gear group
    pub final_drive_low: f64,
    /// Final drive for the upper gear group
    pub final_drive_high: f64,
    /// Idle band lower edge (rpm, inclusive)
    pub idle_rpm_min: u32,
    /// Idle band upper edge (rpm, inclusive)
    pub idle_rpm_max: u32,
    /// Below this road speed (km/h) the car counts as crawling
    pub speed_threshold_kmh: f64,
    /// Engine speed jump (rpm) that signals the clutch being pressed
    pub rpm_change_threshold: u32,
    /// Consecutive idle samples before reporting neutral
    pub neutral_debounce: u32,
}

impl Default for GearConfig {
    fn default() -> Self {
        Self {
            wheel_diameter_m: 0.6096,
            gear_ratios: vec![3.77, 1.96, 1.26, 0.87, 0.86, 0.72],
            low_group_max_gear: 4,
            final_drive_low: 3.68,
            final_drive_high: 2.92,
            idle_rpm_min: 600,
            idle_rpm_max: 1000,
            speed_threshold_kmh: 3.0,
            rpm_change_threshold: 200,
            neutral_debounce: 2,
        }
    }
}

impl GearConfig {
    /// Road speed (km/h) that `rpm` produces in `gear` (1-based)
    pub fn theoretical_speed(&self, gear: u8, rpm: u32) -> Option<f64> {
        let ratio = *self.gear_ratios.get(usize::from(gear).checked_sub(1)?)?;
        let final_drive = if gear <= self.low_group_max_gear {
            self.final_drive_low
        } else {
            self.final_drive_high
        };
        let circumference = PI * self.wheel_diameter_m;
        Some(f64::from(rpm) * circumference * MS_TO_KMH / (ratio * final_drive * SECONDS_PER_MINUTE))
    }
}

/// Stateful gear estimator
#[derive(Debug, Clone)]
pub struct GearEstimator {
    config: GearConfig,
    last_rpm: u32,
    last_speed: f64,
    neutral_counter: u32,
}

impl GearEstimator {
    /// Estimator with an empty history
    pub fn new(config: GearConfig) -> Self {
        Self {
            config,
            last_rpm: 0,
            last_speed: 0.0,
            neutral_counter: 0,
        }
    }

    /// Geometry in use
    pub fn config(&self) -> &GearConfig {
        &self.config
    }

    /// Current neutral debounce count
    pub fn neutral_counter(&self) -> u32 {
        self.neutral_counter
    }

    /// Forget all history
    pub fn reset(&mut self) {
        self.last_rpm = 0;
        self.last_speed = 0.0;
        self.neutral_counter = 0;
    }

    /// Estimate the gear for this sample
    pub fn estimate(&mut self, rpm: u32, speed_kmh: f64) -> GearLabel {
        if rpm == 0 {
            return GearLabel::EngineOff;
        }
        let label = self.classify(rpm, speed_kmh);
        self.last_rpm = rpm;
        self.last_speed = speed_kmh;
        label
    }

    fn classify(&mut self, rpm: u32, speed_kmh: f64) -> GearLabel {
        let cfg = &self.config;
        let crawling = speed_kmh < cfg.speed_threshold_kmh;
        let idling = (cfg.idle_rpm_min..=cfg.idle_rpm_max).contains(&rpm);

        if idling && crawling {
            self.neutral_counter += 1;
            if self.neutral_counter >= cfg.neutral_debounce {
                return GearLabel::Neutral;
            }
        } else {
            let rpm_delta = rpm.abs_diff(self.last_rpm);
            let speed_delta = (speed_kmh - self.last_speed).abs();
            if rpm_delta > cfg.rpm_change_threshold
                && speed_delta < cfg.speed_threshold_kmh
                && crawling
            {
                // Clutch in: engine speed moves, road speed does not
                self.neutral_counter += 1;
                return GearLabel::Neutral;
            }
            self.neutral_counter = 0;
        }

        if speed_kmh <= 0.0 {
            return GearLabel::Neutral;
        }

        self.closest_gear(rpm, speed_kmh)
    }

    /// Gear whose theoretical speed is closest; ties go to the lower gear
    fn closest_gear(&self, rpm: u32, speed_kmh: f64) -> GearLabel {
        let mut best: Option<(u8, f64)> = None;
        for gear in 1..=self.config.gear_ratios.len() as u8 {
            let Some(theoretical) = self.config.theoretical_speed(gear, rpm) else {
                continue;
            };
            let error = (theoretical - speed_kmh).abs();
            if best.map_or(true, |(_, best_error)| error < best_error) {
                best = Some((gear, error));
            }
        }
        best.map_or(GearLabel::Neutral, |(gear, _)| GearLabel::Gear(gear))
    }
}

impl Default for GearEstimator {
    fn default() -> Self {
        Self::new(GearConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_off() {
        let mut est = GearEstimator::default();
        assert_eq!(est.estimate(0, 0.0), GearLabel::EngineOff);
        assert_eq!(est.estimate(0, 40.0), GearLabel::EngineOff);
    }

    #[test]
    fn test_stationary_revving_is_neutral() {
        let mut est = GearEstimator::default();
        assert_eq!(est.estimate(2000, 0.0), GearLabel::Neutral);
    }

    #[test]
    fn test_exact_third_gear_speed() {
        let mut est = GearEstimator::default();
        let speed = est.config().theoretical_speed(3, 2000).unwrap();
        assert_eq!(est.estimate(2000, speed), GearLabel::Gear(3));
    }

    #[test]
    fn test_idle_debounce() {
        let mut est = GearEstimator::default();
        // first idle sample at crawling speed: not yet neutral, falls through
        assert_eq!(est.estimate(800, 2.0), GearLabel::Gear(1));
        assert_eq!(est.neutral_counter(), 1);
        assert_eq!(est.estimate(800, 2.0), GearLabel::Neutral);
        assert_eq!(est.neutral_counter(), 2);
    }

    #[test]
    fn test_counter_resets_when_driving() {
        let mut est = GearEstimator::default();
        est.estimate(800, 0.0);
        est.estimate(800, 0.0);
        assert_eq!(est.neutral_counter(), 2);
        est.estimate(2000, 50.0);
        assert_eq!(est.neutral_counter(), 0);
    }

    #[test]
    fn test_declutch_while_crawling() {
        let mut est = GearEstimator::default();
        assert_eq!(est.estimate(1200, 4.0), GearLabel::Gear(1));
        // rpm jumps by more than 200 while road speed stays put
        assert_eq!(est.estimate(1600, 2.0), GearLabel::Neutral);
        assert_eq!(est.neutral_counter(), 1);
    }

    #[test]
    fn test_tie_goes_to_lower_gear() {
        // gears 1 and 2 share a ratio, so their speeds tie exactly
        let config = GearConfig {
            gear_ratios: vec![2.0, 2.0, 1.0],
            ..GearConfig::default()
        };
        let speed = config.theoretical_speed(1, 3000).unwrap();
        let mut est = GearEstimator::new(config);
        assert_eq!(est.estimate(3000, speed), GearLabel::Gear(1));
    }

    #[test]
    fn test_upper_group_uses_second_final_drive() {
        let config = GearConfig::default();
        let fifth = config.theoretical_speed(5, 2000).unwrap();
        let fourth = config.theoretical_speed(4, 2000).unwrap();
        // 5th has a similar ratio to 4th but a taller final drive
        assert!(fifth > fourth * 1.2);
        assert_eq!(GearLabel::Gear(5).to_string(), "5");
        assert_eq!(GearLabel::Neutral.to_string(), "N");
        assert_eq!(GearLabel::EngineOff.to_string(), "-");
    }
}
