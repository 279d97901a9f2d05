use tracing::debug;

use dagshield_core::{DetectorSignal, Result};

use crate::features::FeatureVector;
use crate::model::ModelBundle;

const WEI_PER_GWEI: f64 = 1e9;
const WEI_PER_ETH: f64 = 1e18;

/// Gas price at which the gas sub-score crosses zero (midpoint).
const GAS_PRICE_MIDPOINT_GWEI: f64 = 100.0;
/// Transfer value at which the value sub-score crosses zero (midpoint).
const VALUE_MIDPOINT_ETH: f64 = 100.0;

/// Anomaly detector over the trained outlier model.
///
/// The model's decision function is blended with three heuristic
/// sub-scores (gas-price, value, timing outliers), each in [-1, 1],
/// with the fixed weight vector [0.25, 0.25, 0.25, 0.25]:
///
/// `combined = (raw + gas + value + timing) / 4`
/// `score = clamp((combined + 1) / 2, 0, 1)`
///
/// The mapping is fixed so risk scores stay comparable across calls and
/// model refreshes of the same version.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnomalyDetector;

impl AnomalyDetector {
    pub fn new() -> Self {
        Self
    }

    /// Score a feature vector. `Unavailable` when no bundle is loaded;
    /// a scaler/feature shape mismatch is a configuration error and
    /// propagates (it means load-time validation was bypassed).
    pub fn score(
        &self,
        bundle: Option<&ModelBundle>,
        features: &FeatureVector,
    ) -> Result<DetectorSignal> {
        let Some(bundle) = bundle else {
            return Ok(DetectorSignal::unavailable("no trained outlier model loaded"));
        };

        let scaled = bundle.scaler.transform(&features.to_array())?;
        let raw = bundle.outlier.decision_function(&scaled);

        let gas = gas_price_outlier(features.gas_price);
        let value = value_outlier(features.value);
        let timing = timing_outlier(features.is_off_hours);

        let combined = (raw + gas + value + timing) / 4.0;
        let score = ((combined + 1.0) / 2.0).clamp(0.0, 1.0);

        debug!(
            "Anomaly sub-scores: raw={:.3} gas={:.3} value={:.3} timing={:.3} -> {:.3}",
            raw, gas, value, timing, score
        );

        Ok(DetectorSignal::score(score))
    }
}

/// Sub-score in [-1, 1): negative for ordinary gas prices, approaching
/// 1 for extreme ones. Midpoint (0) at 100 gwei.
fn gas_price_outlier(gas_price_wei: f64) -> f64 {
    let gwei = gas_price_wei / WEI_PER_GWEI;
    2.0 * (1.0 - 1.0 / (1.0 + gwei / GAS_PRICE_MIDPOINT_GWEI)) - 1.0
}

/// Sub-score in [-1, 1): midpoint (0) at 100 ETH transferred.
fn value_outlier(value_wei: f64) -> f64 {
    let eth = value_wei / WEI_PER_ETH;
    2.0 * (1.0 - 1.0 / (1.0 + eth / VALUE_MIDPOINT_ETH)) - 1.0
}

/// Off-hours activity (00:00-06:59 UTC) reads as mildly anomalous.
fn timing_outlier(is_off_hours: bool) -> f64 {
    if is_off_hours {
        0.5
    } else {
        -0.5
    }
}
