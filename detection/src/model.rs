use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use dagshield_core::{Result, ShieldError, ThreatCategory};

use crate::features::FeatureVector;

/// Standard scaler fitted alongside the models: per-feature mean and
/// standard deviation over the training corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureScaler {
    pub version: String,
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl FeatureScaler {
    /// `(x - mean) / std` per feature; a zero-variance feature scales
    /// to 0 rather than dividing by zero.
    pub fn transform(&self, features: &[f64]) -> Result<Array1<f64>> {
        if features.len() != self.means.len() {
            return Err(ShieldError::Configuration(format!(
                "scaler expects {} features, got {}",
                self.means.len(),
                features.len()
            )));
        }
        let scaled = features
            .iter()
            .zip(self.means.iter().zip(self.stds.iter()))
            .map(|(x, (mean, std))| {
                if *std > f64::EPSILON {
                    (x - mean) / std
                } else {
                    0.0
                }
            })
            .collect::<Vec<f64>>();
        Ok(Array1::from_vec(scaled))
    }
}

/// Trained outlier model consumed as a linear decision function over
/// scaled features: `w · x + b`. Positive values are inliers, negative
/// values outliers; the training pipeline calibrates outputs to lie
/// roughly in [-1, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierModel {
    pub version: String,
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl OutlierModel {
    pub fn decision_function(&self, scaled: &Array1<f64>) -> f64 {
        let weights = Array1::from_vec(self.weights.clone());
        weights.dot(scaled) + self.bias
    }
}

/// Trained multi-class threat classifier: one logit row per category in
/// `ThreatCategory::ALL` order, softmax for probabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierModel {
    pub version: String,
    pub class_weights: Vec<Vec<f64>>,
    pub class_biases: Vec<f64>,
}

impl ClassifierModel {
    pub fn predict_proba(&self, scaled: &Array1<f64>) -> Vec<f64> {
        let logits: Vec<f64> = self
            .class_weights
            .iter()
            .zip(self.class_biases.iter())
            .map(|(row, bias)| {
                let weights = Array1::from_vec(row.clone());
                weights.dot(scaled) + bias
            })
            .collect();

        // Numerically stable softmax.
        let max_logit = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = logits.iter().map(|l| (l - max_logit).exp()).collect();
        let sum: f64 = exps.iter().sum();
        exps.iter().map(|e| e / sum).collect()
    }
}

/// Paired model artifacts: scaler, outlier model, and (optionally) the
/// classifier, all sharing one version identifier. Pairing is validated
/// at load time; a mismatch never reaches analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBundle {
    pub version: String,
    /// Entity kind the bundle was trained for ("transaction").
    pub entity_kind: String,
    pub feature_count: usize,
    pub scaler: FeatureScaler,
    pub outlier: OutlierModel,
    #[serde(default)]
    pub classifier: Option<ClassifierModel>,
}

impl ModelBundle {
    /// Load a bundle from disk. A missing file is `Ok(None)` — the ML
    /// detectors degrade to `Unavailable`. A present-but-invalid bundle
    /// is a fatal `Configuration` error.
    pub fn load(path: &Path) -> Result<Option<Arc<ModelBundle>>> {
        if !path.exists() {
            warn!("⚠️  Model bundle not found at {:?} - ML detectors unavailable", path);
            return Ok(None);
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| ShieldError::Configuration(format!("cannot read {:?}: {}", path, e)))?;
        let bundle: ModelBundle = serde_json::from_str(&contents)
            .map_err(|e| ShieldError::Configuration(format!("invalid bundle {:?}: {}", path, e)))?;
        bundle.validate()?;

        info!(
            "Model bundle loaded: version={}, entity_kind={}, features={}, classifier={}",
            bundle.version,
            bundle.entity_kind,
            bundle.feature_count,
            bundle.classifier.is_some()
        );
        Ok(Some(Arc::new(bundle)))
    }

    /// Version pairing and shape checks. Applying a mismatched scaler is
    /// a configuration error, not a soft failure.
    pub fn validate(&self) -> Result<()> {
        if self.scaler.version != self.version {
            return Err(ShieldError::Configuration(format!(
                "scaler version {} does not match bundle version {}",
                self.scaler.version, self.version
            )));
        }
        if self.outlier.version != self.version {
            return Err(ShieldError::Configuration(format!(
                "outlier model version {} does not match bundle version {}",
                self.outlier.version, self.version
            )));
        }
        if let Some(classifier) = &self.classifier {
            if classifier.version != self.version {
                return Err(ShieldError::Configuration(format!(
                    "classifier version {} does not match bundle version {}",
                    classifier.version, self.version
                )));
            }
            if classifier.class_weights.len() != ThreatCategory::ALL.len()
                || classifier.class_biases.len() != ThreatCategory::ALL.len()
            {
                return Err(ShieldError::Configuration(format!(
                    "classifier must carry {} class rows",
                    ThreatCategory::ALL.len()
                )));
            }
            if classifier
                .class_weights
                .iter()
                .any(|row| row.len() != self.feature_count)
            {
                return Err(ShieldError::Configuration(
                    "classifier weight rows do not match feature count".to_string(),
                ));
            }
        }
        if self.scaler.means.len() != self.feature_count
            || self.scaler.stds.len() != self.feature_count
            || self.outlier.weights.len() != self.feature_count
        {
            return Err(ShieldError::Configuration(
                "artifact shapes do not match declared feature count".to_string(),
            ));
        }
        if self.entity_kind == "transaction" && self.feature_count != FeatureVector::feature_count()
        {
            return Err(ShieldError::Configuration(format!(
                "transaction bundle expects {} features, extractor produces {}",
                self.feature_count,
                FeatureVector::feature_count()
            )));
        }
        Ok(())
    }
}

/// Process-wide holder for the current model bundle. Refresh swaps the
/// whole bundle; in-flight analyses keep the snapshot they started with.
#[derive(Debug, Default)]
pub struct ModelStore {
    inner: RwLock<Option<Arc<ModelBundle>>>,
}

impl ModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from disk at startup. Configuration errors propagate — a
    /// broken bundle fails loudly here, never at analysis time.
    pub fn load_from(path: &Path) -> Result<Self> {
        let bundle = ModelBundle::load(path)?;
        Ok(Self {
            inner: RwLock::new(bundle),
        })
    }

    pub fn snapshot(&self) -> Option<Arc<ModelBundle>> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn swap(&self, bundle: Option<Arc<ModelBundle>>) {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = bundle;
    }
}

#[cfg(test)]
pub(crate) fn test_bundle() -> ModelBundle {
    let feature_count = FeatureVector::feature_count();
    ModelBundle {
        version: "test-v1".to_string(),
        entity_kind: "transaction".to_string(),
        feature_count,
        scaler: FeatureScaler {
            version: "test-v1".to_string(),
            means: vec![0.0; feature_count],
            stds: vec![1.0; feature_count],
        },
        outlier: OutlierModel {
            version: "test-v1".to_string(),
            weights: vec![0.0; feature_count],
            bias: 0.5,
        },
        classifier: Some(ClassifierModel {
            version: "test-v1".to_string(),
            class_weights: vec![vec![0.0; feature_count]; ThreatCategory::ALL.len()],
            class_biases: vec![0.0; ThreatCategory::ALL.len()],
        }),
    }
}
