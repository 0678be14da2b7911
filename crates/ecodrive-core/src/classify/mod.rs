//! Driver classification
//!
//! Places a driver in one of four categories from their recent trip history,
//! either with fixed threshold rules or with a small feed-forward network.
//! The network path always falls back to the rules when it cannot produce a
//! trustworthy answer.

mod model;
mod rules;
mod scaler;

pub use model::{Activation, DenseLayer, DenseNetwork, DriverModel, MlClassifier};
pub use rules::RuleClassifier;
pub use scaler::StandardScaler;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;

use crate::trip::TripSummary;

/// Trips needed before a classification is attempted
pub const MIN_TRIPS: usize = 3;

/// Model input width
pub const FEATURE_COUNT: usize = 5;

/// Model output width, one score per [`DriverCategory`]
pub const CATEGORY_COUNT: usize = 4;

/// Errors from loading or running the classification model
#[derive(Error, Debug)]
pub enum ClassifierError {
    /// Model or scaler file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Model or scaler JSON did not parse
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A layer, scaler or output has the wrong width
    #[error("Shape mismatch in {what}: expected {expected}, got {got}")]
    Shape {
        /// Which part of the asset
        what: String,
        /// Required width
        expected: usize,
        /// Actual width
        got: usize,
    },

    /// A scaler feature has zero spread
    #[error("Standard deviation of feature {0} is zero")]
    ZeroStd(usize),

    /// The model output contains NaN or infinity
    #[error("Model produced a non-finite output")]
    NonFinite,

    /// No model was supplied or it failed to load
    #[error("No model loaded")]
    MissingModel,

    /// No scaler was supplied or it failed to load
    #[error("No scaler loaded")]
    MissingScaler,

    /// Empty trip history
    #[error("No trips to classify")]
    NoTrips,

    /// Argmax landed outside [`DriverCategory::ALL`]
    #[error("Model output index {0} has no category")]
    UnknownCategory(usize),
}

/// Driving style category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriverCategory {
    /// Steady, frugal driving
    EcoFriendly,
    /// Efficient with the occasional lapse
    Balanced,
    /// Room for smoother acceleration
    Moderate,
    /// Hard acceleration, high revs, heavy fuel use
    Aggressive,
}

impl DriverCategory {
    /// Categories in model output order
    pub const ALL: [DriverCategory; CATEGORY_COUNT] = [
        DriverCategory::EcoFriendly,
        DriverCategory::Balanced,
        DriverCategory::Moderate,
        DriverCategory::Aggressive,
    ];

    /// Category for a model output index
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Display name, e.g. "Balanced Driver"
    pub fn label(&self) -> &'static str {
        match self {
            DriverCategory::EcoFriendly => "Eco-Friendly Driver",
            DriverCategory::Balanced => "Balanced Driver",
            DriverCategory::Moderate => "Moderate Driver",
            DriverCategory::Aggressive => "Aggressive Driver",
        }
    }

    /// One-sentence description of the driving style
    pub fn description(&self) -> &'static str {
        match self {
            DriverCategory::EcoFriendly => {
                "You keep speeds steady, accelerate gently and plan ahead to keep fuel use low."
            }
            DriverCategory::Balanced => {
                "Your driving balances efficiency and performance well, with room for small improvements."
            }
            DriverCategory::Moderate => {
                "Your driving is acceptable but would benefit from smoother acceleration and steadier speeds."
            }
            DriverCategory::Aggressive => {
                "Your driving shows frequent hard acceleration, heavy braking and uneven speeds."
            }
        }
    }
}

impl fmt::Display for DriverCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a classification was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationBasis {
    /// Fewer than [`MIN_TRIPS`] trips; the category is a default
    InsufficientData,
    /// Threshold rules over the trip averages
    RuleBased,
    /// The loaded network
    Model,
    /// The model path was unavailable or failed
    RulesFallback,
}

/// Category plus how it was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Assigned category
    pub category: DriverCategory,
    /// Rules, model or fallback
    pub basis: ClassificationBasis,
}

/// Averages over a trip history, in model input order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TripFeatures {
    /// L/100km
    pub fuel_consumption: f64,
    /// Mean of each trip's average RPM
    pub avg_rpm: f64,
    /// Mean of each trip's peak RPM
    pub max_rpm: f64,
    /// km/h
    pub avg_speed_kmh: f64,
    /// Mean efficiency score, 0-100
    pub score: f64,
}

impl TripFeatures {
    /// `None` for an empty history
    pub fn from_trips(trips: &[TripSummary]) -> Option<Self> {
        if trips.is_empty() {
            return None;
        }
        let n = trips.len() as f64;
        let mean = |pick: fn(&TripSummary) -> f64| trips.iter().map(pick).sum::<f64>() / n;
        Some(Self {
            fuel_consumption: mean(|t| t.avg_fuel_consumption),
            avg_rpm: mean(|t| t.avg_rpm),
            max_rpm: mean(|t| f64::from(t.max_rpm)),
            avg_speed_kmh: mean(|t| t.avg_speed_kmh),
            score: mean(|t| f64::from(t.score())),
        })
    }

    /// Features as model input, in declaration order
    pub fn to_array(&self) -> [f32; FEATURE_COUNT] {
        [
            self.fuel_consumption as f32,
            self.avg_rpm as f32,
            self.max_rpm as f32,
            self.avg_speed_kmh as f32,
            self.score as f32,
        ]
    }
}

/// Presentation bundle for a classified driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverProfile {
    /// Category and basis
    pub classification: Classification,
    /// Display name of the category
    pub label: String,
    /// What the category means for the driver
    pub description: String,
    /// Advice for the most recent trip; empty without trips
    pub feedback: String,
}

impl DriverProfile {
    /// Build a profile; `latest` is the most recent trip, if any
    pub fn new(classification: Classification, latest: Option<&TripSummary>) -> Self {
        let category = classification.category;
        Self {
            classification,
            label: category.label().to_string(),
            description: category.description().to_string(),
            feedback: latest
                .map(|trip| RuleClassifier::feedback(category, trip).to_string())
                .unwrap_or_default(),
        }
    }
}
