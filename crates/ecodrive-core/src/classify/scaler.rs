//! Feature standardization

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

use super::{ClassifierError, FEATURE_COUNT};

/// Per-feature `(x - mean) / std` scaling, loaded from the training run's
/// `{"means": [...], "stds": [...]}` export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f32>,
    stds: Vec<f32>,
}

impl StandardScaler {
    /// Scaler with one mean and one deviation per feature
    pub fn new(means: Vec<f32>, stds: Vec<f32>) -> Result<Self, ClassifierError> {
        let scaler = Self { means, stds };
        scaler.validate()?;
        Ok(scaler)
    }

    /// Parse a scaler export
    pub fn from_json(json: &str) -> Result<Self, ClassifierError> {
        let scaler: Self = serde_json::from_str(json)?;
        scaler.validate()?;
        Ok(scaler)
    }

    /// Read a scaler export from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ClassifierError> {
        let path = path.as_ref();
        let scaler = Self::from_json(&fs::read_to_string(path)?)?;
        debug!(path = %path.display(), means = ?scaler.means, stds = ?scaler.stds, "scaler loaded");
        Ok(scaler)
    }

    fn validate(&self) -> Result<(), ClassifierError> {
        for (what, values) in [("means", &self.means), ("stds", &self.stds)] {
            if values.len() != FEATURE_COUNT {
                return Err(ClassifierError::Shape {
                    what: format!("scaler {what}"),
                    expected: FEATURE_COUNT,
                    got: values.len(),
                });
            }
        }
        Ok(())
    }

    /// Standardize a feature vector; a zero deviation is an error
    pub fn transform(
        &self,
        features: &[f32; FEATURE_COUNT],
    ) -> Result<[f32; FEATURE_COUNT], ClassifierError> {
        let mut scaled = [0.0f32; FEATURE_COUNT];
        for (i, out) in scaled.iter_mut().enumerate() {
            let std = self.stds[i];
            if std == 0.0 {
                return Err(ClassifierError::ZeroStd(i));
            }
            *out = (features[i] - self.means[i]) / std;
        }
        Ok(scaled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform() {
        let scaler = StandardScaler::from_json(
            r#"{"means": [6.0, 2000.0, 4000.0, 50.0, 70.0], "stds": [2.0, 500.0, 1000.0, 10.0, 10.0]}"#,
        )
        .unwrap();
        let scaled = scaler.transform(&[8.0, 1500.0, 4000.0, 70.0, 65.0]).unwrap();
        assert_eq!(scaled, [1.0, -1.0, 0.0, 2.0, -0.5]);
    }

    #[test]
    fn test_wrong_width_is_rejected() {
        let err = StandardScaler::new(vec![0.0; 4], vec![1.0; 5]).unwrap_err();
        assert!(matches!(err, ClassifierError::Shape { expected: 5, got: 4, .. }));
    }

    #[test]
    fn test_zero_std() {
        let scaler = StandardScaler::new(vec![0.0; 5], vec![1.0, 1.0, 0.0, 1.0, 1.0]).unwrap();
        assert!(matches!(scaler.transform(&[1.0; 5]), Err(ClassifierError::ZeroStd(2))));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            StandardScaler::from_json("{\"means\": [1.0]}"),
            Err(ClassifierError::Json(_))
        ));
    }
}
