use tracing::debug;

use dagshield_core::{DetectorSignal, Result, ThreatCategory};

use crate::features::FeatureVector;
use crate::model::ModelBundle;

/// Multi-class threat classifier wrapper.
///
/// With no trained classifier loaded this detector contributes nothing:
/// it reports `Unavailable` and fusion redistributes its weight. It
/// never guesses or synthesizes a prediction.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreatClassifier;

impl ThreatClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(
        &self,
        bundle: Option<&ModelBundle>,
        features: &FeatureVector,
    ) -> Result<DetectorSignal> {
        let Some(bundle) = bundle else {
            return Ok(DetectorSignal::unavailable("no trained classifier loaded"));
        };
        let Some(classifier) = &bundle.classifier else {
            return Ok(DetectorSignal::unavailable(
                "model bundle carries no classifier",
            ));
        };

        let scaled = bundle.scaler.transform(&features.to_array())?;
        let probabilities = classifier.predict_proba(&scaled);

        let (best_idx, best_prob) = probabilities
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(idx, p)| (idx, *p))
            .unwrap_or((0, 0.0));

        let category = ThreatCategory::ALL[best_idx];
        debug!(
            "Classifier prediction: {} (confidence {:.3})",
            category.as_str(),
            best_prob
        );

        Ok(DetectorSignal::Classified {
            category,
            confidence: best_prob,
            evidence: Vec::new(),
        })
    }
}
