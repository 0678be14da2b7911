//! Fuel and distance integration
//!
//! Accumulates trip distance and fuel from irregularly spaced samples. Fuel
//! flow is estimated from mass air flow with an air-fuel ratio interpolated
//! against MAF normalized by engine speed.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::trace;

use crate::telemetry::TelemetrySample;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Samples closer together than this (seconds) are not integrated
const MIN_DT_SECONDS: f64 = 0.001;

/// Empirical fuel model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuelModel {
    /// Normalized MAF (g/s per rpm) mapped to `min_afr`
    pub min_norm_maf: f64,
    /// Normalized MAF (g/s per rpm) mapped to `max_afr`
    pub max_norm_maf: f64,
    /// AFR at or below `min_norm_maf`
    pub min_afr: f64,
    /// AFR at or above `max_norm_maf`
    pub max_afr: f64,
    /// Fuel density in g/L
    pub fuel_density_g_per_l: f64,
}

impl Default for FuelModel {
    fn default() -> Self {
        Self {
            min_norm_maf: 0.05,
            max_norm_maf: 0.80,
            min_afr: 50.0,
            max_afr: 90.0,
            fuel_density_g_per_l: 832.0,
        }
    }
}

impl FuelModel {
    /// Estimated air-fuel ratio for this operating point
    pub fn afr(&self, maf_gs: f64, rpm: u32) -> f64 {
        let normalized = if rpm > 0 { maf_gs / f64::from(rpm) } else { 0.0 };
        lerp_clamped(
            normalized,
            self.min_norm_maf,
            self.max_norm_maf,
            self.min_afr,
            self.max_afr,
        )
    }

    /// Fuel volume flow in L/s; zero with the engine off or no air flow
    pub fn fuel_flow_lps(&self, maf_gs: f64, rpm: u32) -> f64 {
        if rpm == 0 || maf_gs <= 0.0 {
            return 0.0;
        }
        let mass_flow = maf_gs / self.afr(maf_gs, rpm);
        mass_flow / self.fuel_density_g_per_l
    }
}

fn lerp_clamped(x: f64, x0: f64, x1: f64, y0: f64, y1: f64) -> f64 {
    if x1 <= x0 {
        return y0;
    }
    let bounded = x.clamp(x0, x1);
    y0 + (bounded - x0) * (y1 - y0) / (x1 - x0)
}

/// Per-sample integration result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Integration {
    /// Seconds covered by this step
    pub dt_seconds: f64,
    /// Distance covered in this step
    pub distance_delta_km: f64,
    /// Fuel used in this step, litres
    pub fuel_delta_l: f64,
    /// AFR used for this step
    pub afr: f64,
    /// L/h
    pub instant_fuel_rate_lph: f64,
    /// L/100km, infinite when no distance was covered
    pub instant_consumption: f64,
}

/// Running totals for the trip in progress
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripState {
    distance_km: f64,
    fuel_used_l: f64,
    trip_start: Option<Duration>,
    last_sample_ts: Option<Duration>,
    max_rpm: u32,
    avg_rpm: f64,
    rpm_samples: u64,
}

impl TripState {
    /// Empty totals
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear every running field
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Distance so far
    pub fn distance_km(&self) -> f64 {
        self.distance_km
    }

    /// Fuel so far, litres
    pub fn fuel_used_l(&self) -> f64 {
        self.fuel_used_l
    }

    /// Highest RPM seen
    pub fn max_rpm(&self) -> u32 {
        self.max_rpm
    }

    /// Running mean RPM
    pub fn avg_rpm(&self) -> f64 {
        self.avg_rpm
    }

    /// True once at least one sample has been seen
    pub fn has_started(&self) -> bool {
        self.trip_start.is_some()
    }

    /// Time between the first and the latest accepted sample
    pub fn elapsed(&self) -> Duration {
        match (self.trip_start, self.last_sample_ts) {
            (Some(start), Some(last)) => last.saturating_sub(start),
            _ => Duration::ZERO,
        }
    }

    /// L/100km over the trip so far
    pub fn avg_consumption(&self) -> f64 {
        if self.distance_km > 0.0 {
            self.fuel_used_l / self.distance_km * 100.0
        } else {
            0.0
        }
    }

    /// km/h over the trip so far
    pub fn avg_speed_kmh(&self) -> f64 {
        let hours = self.elapsed().as_secs_f64() / SECONDS_PER_HOUR;
        if hours > 0.0 {
            self.distance_km / hours
        } else {
            0.0
        }
    }

    /// Fold one sample into the totals.
    ///
    /// The first sample only primes the clock. Samples without engine or road
    /// speed, or arriving less than a millisecond after the previous one, are
    /// discarded. Returns `None` whenever nothing was integrated.
    pub fn integrate(&mut self, sample: &TelemetrySample, model: &FuelModel) -> Option<Integration> {
        let (Some(rpm), Some(speed_kmh)) = (sample.rpm.value(), sample.speed_kmh.value()) else {
            return None;
        };
        let speed_kmh = speed_kmh.max(0.0);
        let maf_gs = sample.maf_gs.value().unwrap_or(0.0).max(0.0);
        let now = sample.timestamp;

        let Some(last) = self.last_sample_ts else {
            self.trip_start = Some(now);
            self.last_sample_ts = Some(now);
            self.record_rpm(rpm);
            return None;
        };

        let dt = now.as_secs_f64() - last.as_secs_f64();
        if dt <= MIN_DT_SECONDS {
            trace!(dt, "skipping sample with non-positive elapsed time");
            return None;
        }

        let distance_delta_km = speed_kmh * dt / SECONDS_PER_HOUR;
        let fuel_flow_lps = model.fuel_flow_lps(maf_gs, rpm);
        let fuel_delta_l = fuel_flow_lps * dt;

        self.distance_km += distance_delta_km;
        self.fuel_used_l += fuel_delta_l;
        self.last_sample_ts = Some(now);
        self.record_rpm(rpm);

        let instant_consumption = if distance_delta_km > 0.0 {
            fuel_delta_l / distance_delta_km * 100.0
        } else {
            f64::INFINITY
        };

        Some(Integration {
            dt_seconds: dt,
            distance_delta_km,
            fuel_delta_l,
            afr: model.afr(maf_gs, rpm),
            instant_fuel_rate_lph: fuel_flow_lps * SECONDS_PER_HOUR,
            instant_consumption,
        })
    }

    fn record_rpm(&mut self, rpm: u32) {
        self.max_rpm = self.max_rpm.max(rpm);
        self.rpm_samples += 1;
        self.avg_rpm += (f64::from(rpm) - self.avg_rpm) / self.rpm_samples as f64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(secs: f64, rpm: u32, speed: f64, maf: f64) -> TelemetrySample {
        TelemetrySample::new(Duration::from_secs_f64(secs), rpm, speed, 90, maf)
    }

    #[test]
    fn test_afr_interpolation_is_clamped() {
        let model = FuelModel::default();
        // 0.8 g/s per rpm and above map to the lean limit
        assert_eq!(model.afr(1000.0, 1000), 90.0);
        // tiny normalized flow maps to the rich limit
        assert_eq!(model.afr(1.0, 1000), 50.0);
        // engine off: normalized flow is zero
        assert_eq!(model.afr(5.0, 0), 50.0);
        let mid = model.afr(0.425 * 2000.0, 2000);
        assert!((mid - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_first_sample_primes() {
        let mut trip = TripState::new();
        let model = FuelModel::default();
        assert!(trip.integrate(&sample(0.0, 2000, 50.0, 10.0), &model).is_none());
        assert!(trip.has_started());
        assert_eq!(trip.distance_km(), 0.0);
        assert_eq!(trip.max_rpm(), 2000);
    }

    #[test]
    fn test_distance_and_fuel() {
        let mut trip = TripState::new();
        let model = FuelModel::default();
        trip.integrate(&sample(0.0, 2000, 72.0, 10.0), &model);
        let step = trip.integrate(&sample(10.0, 2000, 72.0, 10.0), &model).unwrap();

        // 72 km/h for 10 s = 0.2 km
        assert!((trip.distance_km() - 0.2).abs() < 1e-12);
        let expected_flow = 10.0 / 50.0 / 832.0;
        assert!((step.fuel_delta_l - expected_flow * 10.0).abs() < 1e-12);
        assert!((step.instant_fuel_rate_lph - expected_flow * 3600.0).abs() < 1e-9);
        assert!((trip.avg_speed_kmh() - 72.0).abs() < 1e-9);
        assert!(trip.avg_consumption() > 0.0);
    }

    #[test]
    fn test_stationary_consumption_is_infinite() {
        let mut trip = TripState::new();
        let model = FuelModel::default();
        trip.integrate(&sample(0.0, 800, 0.0, 3.0), &model);
        let step = trip.integrate(&sample(1.0, 800, 0.0, 3.0), &model).unwrap();
        assert!(step.instant_consumption.is_infinite());
        assert_eq!(trip.avg_consumption(), 0.0);
        assert!(trip.fuel_used_l() > 0.0);
    }

    #[test]
    fn test_non_positive_dt_is_discarded() {
        let mut trip = TripState::new();
        let model = FuelModel::default();
        trip.integrate(&sample(5.0, 2000, 50.0, 10.0), &model);
        assert!(trip.integrate(&sample(5.0, 2000, 50.0, 10.0), &model).is_none());
        assert!(trip.integrate(&sample(4.0, 2000, 50.0, 10.0), &model).is_none());
        assert!(trip.integrate(&sample(5.0005, 2000, 50.0, 10.0), &model).is_none());
        assert_eq!(trip.distance_km(), 0.0);
        assert_eq!(trip.fuel_used_l(), 0.0);
    }

    #[test]
    fn test_engine_off_burns_nothing() {
        let model = FuelModel::default();
        assert_eq!(model.fuel_flow_lps(5.0, 0), 0.0);
        assert_eq!(model.fuel_flow_lps(0.0, 900), 0.0);
    }

    #[test]
    fn test_running_rpm_statistics() {
        let mut trip = TripState::new();
        let model = FuelModel::default();
        trip.integrate(&sample(0.0, 1000, 10.0, 2.0), &model);
        trip.integrate(&sample(1.0, 3000, 10.0, 2.0), &model);
        trip.integrate(&sample(2.0, 2000, 10.0, 2.0), &model);
        assert_eq!(trip.max_rpm(), 3000);
        assert!((trip.avg_rpm() - 2000.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut trip = TripState::new();
        let model = FuelModel::default();
        trip.integrate(&sample(0.0, 1000, 10.0, 2.0), &model);
        trip.integrate(&sample(1.0, 3000, 10.0, 2.0), &model);
        trip.reset();
        assert_eq!(trip, TripState::default());
    }
}
