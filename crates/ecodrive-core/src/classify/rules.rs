//! Threshold rules over trip averages

use tracing::debug;

use super::{
    Classification, ClassificationBasis, DriverCategory, DriverProfile, TripFeatures, MIN_TRIPS,
};
use crate::trip::TripSummary;

/// Classifies drivers with fixed thresholds on their trip averages
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleClassifier;

impl RuleClassifier {
    /// Rule classifier with the built-in thresholds
    pub fn new() -> Self {
        Self
    }

    /// Classify a trip history.
    ///
    /// Fewer than three trips yields `Balanced` with
    /// [`ClassificationBasis::InsufficientData`].
    pub fn classify(&self, trips: &[TripSummary]) -> Classification {
        let features = match TripFeatures::from_trips(trips) {
            Some(f) if trips.len() >= MIN_TRIPS => f,
            _ => {
                debug!(trips = trips.len(), "not enough trips to classify");
                return Classification {
                    category: DriverCategory::Balanced,
                    basis: ClassificationBasis::InsufficientData,
                };
            }
        };

        let category = Self::categorize(&features);
        debug!(?features, %category, "rule-based classification");
        Classification {
            category,
            basis: ClassificationBasis::RuleBased,
        }
    }

    /// Apply the rules in order; the first match wins
    pub fn categorize(f: &TripFeatures) -> DriverCategory {
        let speed = f.avg_speed_kmh;
        if f.score >= 85.0
            && f.fuel_consumption < 5.5
            && f.avg_rpm < 2000.0
            && speed > 45.0
            && speed < 80.0
        {
            DriverCategory::EcoFriendly
        } else if f.score >= 70.0
            && f.fuel_consumption < 6.5
            && f.avg_rpm < 2300.0
            && speed > 40.0
            && speed < 85.0
        {
            DriverCategory::EcoFriendly
        } else if f.score >= 55.0 && f.fuel_consumption < 8.0 && f.avg_rpm < 2600.0 {
            DriverCategory::Balanced
        } else if f.score < 55.0 || (f.fuel_consumption > 8.0 && f.max_rpm > 4500.0) || speed > 90.0
        {
            DriverCategory::Aggressive
        } else {
            DriverCategory::Moderate
        }
    }

    /// Advice for `category`, tuned to the most recent trip
    pub fn feedback(category: DriverCategory, latest: &TripSummary) -> &'static str {
        match category {
            DriverCategory::EcoFriendly => {
                "Excellent efficiency! Gentle acceleration and a sensible RPM range are getting the most out of every litre."
            }
            DriverCategory::Balanced if latest.max_rpm > 4000 => {
                "Fairly efficient driving. Avoiding high RPM peaks would improve fuel economy further."
            }
            DriverCategory::Balanced if latest.avg_fuel_consumption > 7.0 => {
                "Gentler acceleration and steadier speeds would bring fuel consumption down."
            }
            DriverCategory::Balanced => {
                "Your habits are well balanced. Small improvements in acceleration could raise efficiency."
            }
            DriverCategory::Moderate => {
                "Your driving varies a lot from trip to trip. Concentrate on steady speeds and even acceleration."
            }
            DriverCategory::Aggressive if latest.max_rpm > 4500 => {
                "Revving this high is driving up fuel consumption considerably. Shift up earlier."
            }
            DriverCategory::Aggressive => {
                "Your style leans aggressive. Smoother acceleration and braking would improve efficiency."
            }
        }
    }

    /// Classify and attach feedback for the first (most recent) trip
    pub fn profile(&self, trips: &[TripSummary]) -> DriverProfile {
        DriverProfile::new(self.classify(trips), trips.first())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn trip(speed: f64, fuel: f64, avg_rpm: f64, max_rpm: u32, score: u8) -> TripSummary {
        TripSummary {
            avg_speed_kmh: speed,
            distance_km: 10.0,
            avg_fuel_consumption: fuel,
            fuel_used_l: fuel / 10.0,
            duration: Duration::from_secs(600),
            max_rpm,
            avg_rpm,
            efficiency_score: Some(score),
        }
    }

    fn three(t: TripSummary) -> Vec<TripSummary> {
        vec![t.clone(), t.clone(), t]
    }

    #[test]
    fn test_insufficient_data() {
        let rules = RuleClassifier::new();
        let result = rules.classify(&vec![trip(60.0, 4.0, 1500.0, 2500, 95); 2]);
        assert_eq!(result.category, DriverCategory::Balanced);
        assert_eq!(result.basis, ClassificationBasis::InsufficientData);
        assert_eq!(rules.classify(&[]).basis, ClassificationBasis::InsufficientData);
    }

    #[test]
    fn test_eco_rules() {
        let rules = RuleClassifier::new();
        let strict = rules.classify(&three(trip(60.0, 5.0, 1800.0, 2500, 90)));
        assert_eq!(strict.category, DriverCategory::EcoFriendly);
        assert_eq!(strict.basis, ClassificationBasis::RuleBased);

        let relaxed = rules.classify(&three(trip(82.0, 6.0, 2200.0, 3000, 72)));
        assert_eq!(relaxed.category, DriverCategory::EcoFriendly);
    }

    #[test]
    fn test_balanced_rule() {
        let rules = RuleClassifier::new();
        let result = rules.classify(&three(trip(30.0, 7.5, 2400.0, 3500, 60)));
        assert_eq!(result.category, DriverCategory::Balanced);
    }

    #[test]
    fn test_aggressive_rules() {
        let rules = RuleClassifier::new();
        assert_eq!(
            rules.classify(&three(trip(60.0, 6.0, 2000.0, 3000, 40))).category,
            DriverCategory::Aggressive
        );
        assert_eq!(
            rules.classify(&three(trip(60.0, 9.0, 2000.0, 5000, 60))).category,
            DriverCategory::Aggressive
        );
        assert_eq!(
            rules.classify(&three(trip(95.0, 7.0, 2700.0, 3000, 60))).category,
            DriverCategory::Aggressive
        );
    }

    #[test]
    fn test_moderate_fallthrough() {
        let rules = RuleClassifier::new();
        // score ok but rpm too high for balanced, nothing aggressive
        let result = rules.classify(&three(trip(60.0, 7.0, 2800.0, 4000, 60)));
        assert_eq!(result.category, DriverCategory::Moderate);
    }

    #[test]
    fn test_feedback_branches() {
        let peaky = trip(60.0, 6.0, 2000.0, 4200, 70);
        let thirsty = trip(60.0, 7.5, 2000.0, 3500, 70);
        let calm = trip(60.0, 6.0, 2000.0, 3500, 70);
        let balanced = DriverCategory::Balanced;
        assert!(RuleClassifier::feedback(balanced, &peaky).contains("RPM peaks"));
        assert!(RuleClassifier::feedback(balanced, &thirsty).contains("fuel consumption down"));
        assert!(RuleClassifier::feedback(balanced, &calm).contains("well balanced"));

        let screaming = trip(60.0, 6.0, 2000.0, 5000, 40);
        assert!(RuleClassifier::feedback(DriverCategory::Aggressive, &screaming).contains("Shift up"));
        assert!(RuleClassifier::feedback(DriverCategory::Aggressive, &calm).contains("leans aggressive"));
    }

    #[test]
    fn test_profile_uses_latest_trip() {
        let rules = RuleClassifier::new();
        let mut trips = three(trip(30.0, 7.5, 2400.0, 3500, 60));
        trips[0].max_rpm = 4100;
        let profile = rules.profile(&trips);
        assert_eq!(profile.label, "Balanced Driver");
        assert!(profile.feedback.contains("RPM peaks"));
    }
}
