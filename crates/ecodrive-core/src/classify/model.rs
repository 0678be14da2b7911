//! Model-based classification
//!
//! [`DriverModel`] is the seam for any inference backend. [`DenseNetwork`]
//! evaluates a small fully connected network exported as JSON:
//!
//! ```json
//! {"layers": [{"weights": [[..], ..], "biases": [..], "activation": "relu"}]}
//! ```
//!
//! `weights[i][j]` connects input `i` to output `j`, so a layer with `n`
//! inputs has `n` rows.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use super::{
    ClassifierError, Classification, ClassificationBasis, DriverCategory, DriverProfile,
    RuleClassifier, StandardScaler, TripFeatures, CATEGORY_COUNT, FEATURE_COUNT, MIN_TRIPS,
};
use crate::trip::TripSummary;

/// Anything that maps standardized trip features to per-category scores
pub trait DriverModel: Send + Sync {
    /// Scores for each category, in [`DriverCategory::ALL`] order
    fn predict(
        &self,
        features: &[f32; FEATURE_COUNT],
    ) -> Result<[f32; CATEGORY_COUNT], ClassifierError>;
}

/// Layer activation function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// `max(0, x)`
    Relu,
    /// Identity
    Linear,
    /// Normalized exponentials
    Softmax,
}

impl Activation {
    fn apply(&self, values: &mut [f32]) {
        match self {
            Activation::Linear => {}
            Activation::Relu => values.iter_mut().for_each(|v| *v = v.max(0.0)),
            Activation::Softmax => {
                let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                let mut sum = 0.0;
                for v in values.iter_mut() {
                    *v = (*v - max).exp();
                    sum += *v;
                }
                values.iter_mut().for_each(|v| *v /= sum);
            }
        }
    }
}

/// One fully connected layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    /// One row per input, one column per output
    pub weights: Vec<Vec<f32>>,
    /// One per output
    pub biases: Vec<f32>,
    /// Applied to the layer output
    pub activation: Activation,
}

impl DenseLayer {
    fn input_width(&self) -> usize {
        self.weights.len()
    }

    fn output_width(&self) -> usize {
        self.biases.len()
    }

    fn forward(&self, input: &[f32]) -> Vec<f32> {
        let mut out = self.biases.clone();
        for (x, row) in input.iter().zip(&self.weights) {
            for (acc, w) in out.iter_mut().zip(row) {
                *acc += x * w;
            }
        }
        self.activation.apply(&mut out);
        out
    }
}

/// Fully connected feed-forward network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseNetwork {
    layers: Vec<DenseLayer>,
}

impl DenseNetwork {
    /// Build a network, checking that layer widths chain from 5 inputs to 4 outputs
    pub fn new(layers: Vec<DenseLayer>) -> Result<Self, ClassifierError> {
        let network = Self { layers };
        network.validate()?;
        Ok(network)
    }

    /// Parse and validate a network exported as JSON
    pub fn from_json(json: &str) -> Result<Self, ClassifierError> {
        let network: Self = serde_json::from_str(json)?;
        network.validate()?;
        Ok(network)
    }

    /// Read a network from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ClassifierError> {
        let path = path.as_ref();
        let network = Self::from_json(&fs::read_to_string(path)?)?;
        debug!(path = %path.display(), layers = network.layers.len(), "model loaded");
        Ok(network)
    }

    fn validate(&self) -> Result<(), ClassifierError> {
        let mut width = FEATURE_COUNT;
        for (index, layer) in self.layers.iter().enumerate() {
            if layer.input_width() != width {
                return Err(ClassifierError::Shape {
                    what: format!("layer {index} inputs"),
                    expected: width,
                    got: layer.input_width(),
                });
            }
            let out = layer.output_width();
            if let Some(row) = layer.weights.iter().find(|row| row.len() != out) {
                return Err(ClassifierError::Shape {
                    what: format!("layer {index} weight row"),
                    expected: out,
                    got: row.len(),
                });
            }
            width = out;
        }
        if self.layers.is_empty() || width != CATEGORY_COUNT {
            return Err(ClassifierError::Shape {
                what: "network outputs".to_string(),
                expected: CATEGORY_COUNT,
                got: if self.layers.is_empty() { 0 } else { width },
            });
        }
        Ok(())
    }
}

impl DriverModel for DenseNetwork {
    fn predict(
        &self,
        features: &[f32; FEATURE_COUNT],
    ) -> Result<[f32; CATEGORY_COUNT], ClassifierError> {
        let mut activations = features.to_vec();
        for layer in &self.layers {
            activations = layer.forward(&activations);
        }
        let got = activations.len();
        activations.try_into().map_err(|_| ClassifierError::Shape {
            what: "network outputs".to_string(),
            expected: CATEGORY_COUNT,
            got,
        })
    }
}

/// Network classifier that degrades to [`RuleClassifier`]
pub struct MlClassifier {
    model: Option<Box<dyn DriverModel>>,
    scaler: Option<StandardScaler>,
    rules: RuleClassifier,
}

impl MlClassifier {
    /// Classifier over already loaded assets; either may be absent
    pub fn new(model: Option<Box<dyn DriverModel>>, scaler: Option<StandardScaler>) -> Self {
        Self {
            model,
            scaler,
            rules: RuleClassifier::new(),
        }
    }

    /// Load both assets; a file that fails to load is logged and left out
    pub fn load(model_path: Option<&Path>, scaler_path: Option<&Path>) -> Self {
        let model = model_path.and_then(|path| match DenseNetwork::load(path) {
            Ok(network) => Some(Box::new(network) as Box<dyn DriverModel>),
            Err(e) => {
                warn!(path = %path.display(), "could not load model: {e}");
                None
            }
        });
        let scaler = scaler_path.and_then(|path| match StandardScaler::load(path) {
            Ok(scaler) => Some(scaler),
            Err(e) => {
                warn!(path = %path.display(), "could not load scaler: {e}");
                None
            }
        });
        Self::new(model, scaler)
    }

    /// True if a model is available
    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Classify a trip history. Never fails: anything that stops the model
    /// from answering yields the rule-based category.
    pub fn classify(&self, trips: &[TripSummary]) -> Classification {
        if trips.len() < MIN_TRIPS {
            return self.rules.classify(trips);
        }
        match self.predict(trips) {
            Ok(category) => Classification {
                category,
                basis: ClassificationBasis::Model,
            },
            Err(e) => {
                warn!("falling back to rule-based classification: {e}");
                Classification {
                    category: self.rules.classify(trips).category,
                    basis: ClassificationBasis::RulesFallback,
                }
            }
        }
    }

    /// Classification with label, description and latest-trip feedback
    pub fn profile(&self, trips: &[TripSummary]) -> DriverProfile {
        DriverProfile::new(self.classify(trips), trips.first())
    }

    fn predict(&self, trips: &[TripSummary]) -> Result<DriverCategory, ClassifierError> {
        let model = self.model.as_ref().ok_or(ClassifierError::MissingModel)?;
        let scaler = self.scaler.as_ref().ok_or(ClassifierError::MissingScaler)?;
        let features = TripFeatures::from_trips(trips).ok_or(ClassifierError::NoTrips)?;

        let scaled = scaler.transform(&features.to_array())?;
        let scores = model.predict(&scaled)?;
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(ClassifierError::NonFinite);
        }

        let (index, confidence) = scores
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, s)| if s > best.1 { (i, s) } else { best });
        debug!(?scores, index, confidence, "model prediction");
        DriverCategory::from_index(index).ok_or(ClassifierError::UnknownCategory(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Single linear layer that copies input `k` to output `k` for k < 4
    fn identity_network() -> DenseNetwork {
        let mut weights = vec![vec![0.0; 4]; 5];
        for (k, row) in weights.iter_mut().take(4).enumerate() {
            row[k] = 1.0;
        }
        DenseNetwork::new(vec![DenseLayer {
            weights,
            biases: vec![0.0; 4],
            activation: Activation::Linear,
        }])
        .unwrap()
    }

    struct Fixed([f32; 4]);

    impl DriverModel for Fixed {
        fn predict(&self, _: &[f32; 5]) -> Result<[f32; 4], ClassifierError> {
            Ok(self.0)
        }
    }

    fn unit_scaler() -> StandardScaler {
        StandardScaler::new(vec![0.0; 5], vec![1.0; 5]).unwrap()
    }

    fn trips() -> Vec<TripSummary> {
        let trip = TripSummary {
            avg_speed_kmh: 60.0,
            distance_km: 10.0,
            avg_fuel_consumption: 5.0,
            fuel_used_l: 0.5,
            duration: Duration::from_secs(600),
            max_rpm: 2500,
            avg_rpm: 1800.0,
            efficiency_score: Some(90),
        };
        vec![trip.clone(), trip.clone(), trip]
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let mut values = [1.0, 2.0, 3.0, 4.0];
        Activation::Softmax.apply(&mut values);
        let sum: f32 = values.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(values[3] > values[0]);
    }

    #[test]
    fn test_relu() {
        let mut values = [-1.0, 0.5];
        Activation::Relu.apply(&mut values);
        assert_eq!(values, [0.0, 0.5]);
    }

    #[test]
    fn test_forward_pass() {
        let network = identity_network();
        assert_eq!(network.predict(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap(), [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_shape_validation() {
        let narrow = DenseLayer {
            weights: vec![vec![0.0; 3]; 5],
            biases: vec![0.0; 3],
            activation: Activation::Softmax,
        };
        assert!(matches!(
            DenseNetwork::new(vec![narrow]),
            Err(ClassifierError::Shape { expected: 4, got: 3, .. })
        ));
        assert!(DenseNetwork::new(Vec::new()).is_err());

        let ragged = DenseLayer {
            weights: vec![vec![0.0; 4], vec![0.0; 3], vec![0.0; 4], vec![0.0; 4], vec![0.0; 4]],
            biases: vec![0.0; 4],
            activation: Activation::Linear,
        };
        assert!(DenseNetwork::new(vec![ragged]).is_err());
    }

    #[test]
    fn test_argmax_maps_to_category() {
        let classifier = MlClassifier::new(Some(Box::new(Fixed([0.1, 0.2, 0.6, 0.1]))), Some(unit_scaler()));
        let result = classifier.classify(&trips());
        assert_eq!(result.category, DriverCategory::Moderate);
        assert_eq!(result.basis, ClassificationBasis::Model);
    }

    #[test]
    fn test_non_finite_output_falls_back() {
        let classifier =
            MlClassifier::new(Some(Box::new(Fixed([f32::NAN, 0.0, 0.0, 0.0]))), Some(unit_scaler()));
        let result = classifier.classify(&trips());
        assert_eq!(result.basis, ClassificationBasis::RulesFallback);
        assert_eq!(result.category, RuleClassifier::new().classify(&trips()).category);
    }

    #[test]
    fn test_missing_scaler_falls_back() {
        let classifier = MlClassifier::new(Some(Box::new(identity_network())), None);
        assert_eq!(classifier.classify(&trips()).basis, ClassificationBasis::RulesFallback);
    }

    #[test]
    fn test_prediction_errors_are_typed() {
        let no_model = MlClassifier::new(None, Some(unit_scaler()));
        assert!(matches!(no_model.predict(&trips()), Err(ClassifierError::MissingModel)));

        let no_scaler = MlClassifier::new(Some(Box::new(identity_network())), None);
        assert!(matches!(no_scaler.predict(&trips()), Err(ClassifierError::MissingScaler)));

        let ready = MlClassifier::new(Some(Box::new(identity_network())), Some(unit_scaler()));
        assert!(matches!(ready.predict(&[]), Err(ClassifierError::NoTrips)));

        let nan = MlClassifier::new(Some(Box::new(Fixed([0.0, f32::NAN, 0.0, 0.0]))), Some(unit_scaler()));
        assert!(matches!(nan.predict(&trips()), Err(ClassifierError::NonFinite)));

        let flat = StandardScaler::new(vec![0.0; 5], vec![1.0, 0.0, 1.0, 1.0, 1.0]).unwrap();
        let flat = MlClassifier::new(Some(Box::new(identity_network())), Some(flat));
        assert!(matches!(flat.predict(&trips()), Err(ClassifierError::ZeroStd(1))));
    }
}
