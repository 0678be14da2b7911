//! Trip tracking
//!
//! Everything derived from the sample stream while a trip is in progress:
//! gear estimation, fuel and distance integration, and the summary produced
//! when the trip ends.

mod gear;
mod integrator;
mod store;
mod summary;

pub use gear::{GearConfig, GearEstimator, GearLabel};
pub use integrator::{FuelModel, Integration, TripState};
pub use store::{JsonTripStore, MemoryTripStore, StoreError, StoredTrip, TripId, TripStore};
pub use summary::TripSummary;

use tracing::{debug, info};

use crate::scoring::EfficiencyScorer;
use crate::telemetry::{Reading, TelemetrySample};

/// What one sample produced
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Gear estimate, or the fault that prevented one
    pub gear: Reading<GearLabel>,
    /// Integration step; `None` when the sample was not integrated
    pub integration: Option<Integration>,
}

/// Running state for the trip in progress
#[derive(Debug, Clone)]
pub struct TripTracker {
    gear: GearEstimator,
    state: TripState,
    fuel: FuelModel,
}

impl TripTracker {
    /// Tracker with an empty trip
    pub fn new(gear: GearConfig, fuel: FuelModel) -> Self {
        Self {
            gear: GearEstimator::new(gear),
            state: TripState::new(),
            fuel,
        }
    }

    /// Running totals
    pub fn state(&self) -> &TripState {
        &self.state
    }

    /// Fuel model in use
    pub fn fuel_model(&self) -> &FuelModel {
        &self.fuel
    }

    /// Feed one completed poll cycle
    pub fn observe(&mut self, sample: &TelemetrySample) -> Observation {
        let gear = match (sample.rpm, sample.speed_kmh) {
            (Reading::Value(rpm), Reading::Value(speed)) => {
                Reading::Value(self.gear.estimate(rpm, speed))
            }
            (Reading::Fault(fault), _) | (_, Reading::Fault(fault)) => Reading::Fault(fault),
        };
        let integration = self.state.integrate(sample, &self.fuel);
        Observation { gear, integration }
    }

    /// Snapshot the running totals into a scored summary
    pub fn finalize(&self, scorer: &EfficiencyScorer) -> TripSummary {
        let state = &self.state;
        let mut summary = TripSummary {
            avg_speed_kmh: state.avg_speed_kmh(),
            distance_km: state.distance_km(),
            avg_fuel_consumption: state.avg_consumption(),
            fuel_used_l: state.fuel_used_l(),
            duration: state.elapsed(),
            max_rpm: state.max_rpm(),
            avg_rpm: state.avg_rpm(),
            efficiency_score: None,
        };
        summary.efficiency_score = Some(scorer.score(&summary));
        info!(
            distance_km = summary.distance_km,
            fuel_used_l = summary.fuel_used_l,
            score = summary.score(),
            "trip finalized"
        );
        summary
    }

    /// Clear the integrator and the gear estimator
    pub fn reset(&mut self) {
        debug!("trip state reset");
        self.state.reset();
        self.gear.reset();
    }
}

impl Default for TripTracker {
    fn default() -> Self {
        Self::new(GearConfig::default(), FuelModel::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::FieldFault;
    use std::time::Duration;

    #[test]
    fn test_gear_fault_follows_missing_rpm() {
        let mut tracker = TripTracker::default();
        let mut sample = TelemetrySample::new(Duration::ZERO, 2000, 50.0, 90, 10.0);
        sample.rpm = Reading::Fault(FieldFault::Searching);
        let obs = tracker.observe(&sample);
        assert_eq!(obs.gear, Reading::Fault(FieldFault::Searching));
        assert!(obs.integration.is_none());
        assert!(!tracker.state().has_started());
    }

    #[test]
    fn test_finalize_empty_trip() {
        let tracker = TripTracker::default();
        let summary = tracker.finalize(&EfficiencyScorer::default());
        assert_eq!(summary.distance_km, 0.0);
        assert_eq!(summary.duration, Duration::ZERO);
        assert!(summary.efficiency_score.is_some());
    }

    #[test]
    fn test_finalize_is_pure() {
        let mut tracker = TripTracker::default();
        tracker.observe(&TelemetrySample::new(Duration::ZERO, 1800, 60.0, 90, 8.0));
        tracker.observe(&TelemetrySample::new(Duration::from_secs(2), 1800, 60.0, 90, 8.0));
        let scorer = EfficiencyScorer::default();
        assert_eq!(tracker.finalize(&scorer), tracker.finalize(&scorer));
    }
}
