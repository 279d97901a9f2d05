use chrono::{DateTime, Timelike};
use serde::{Deserialize, Serialize};

use dagshield_core::{Result, ShieldError, Transaction};

use crate::knownbad::KnownBadSet;

/// Feature vector for transaction threat detection.
///
/// Field order is the contract between extraction and the trained
/// models: `to_array()` order and `feature_count()` must never change
/// without retraining and bumping the bundle version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Transfer value in wei.
    pub value: f64,
    pub gas: f64,
    /// Gas price in wei.
    pub gas_price: f64,
    /// Length of the call payload string.
    pub input_len: f64,
    pub from_known_bad: bool,
    pub to_known_bad: bool,
    /// Hour of day (UTC, 0-23) of the transaction timestamp.
    pub hour_of_day: f64,
    /// 00:00-06:59 UTC.
    pub is_off_hours: bool,
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self {
            value: 0.0,
            gas: 0.0,
            gas_price: 0.0,
            input_len: 0.0,
            from_known_bad: false,
            to_known_bad: false,
            hour_of_day: 0.0,
            is_off_hours: true,
        }
    }
}

impl FeatureVector {
    /// Convert to array for model inference.
    pub fn to_array(&self) -> Vec<f64> {
        vec![
            self.value,
            self.gas,
            self.gas_price,
            self.input_len,
            if self.from_known_bad { 1.0 } else { 0.0 },
            if self.to_known_bad { 1.0 } else { 0.0 },
            self.hour_of_day,
            if self.is_off_hours { 1.0 } else { 0.0 },
        ]
    }

    pub fn feature_count() -> usize {
        8
    }
}

/// Stateless transaction feature extractor. Pure function of the
/// transaction fields and the KnownBadSet snapshot: re-extracting
/// against the same snapshot reproduces the identical vector.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract features from a normalized transaction.
    ///
    /// Fails only on structurally invalid data (a timestamp outside the
    /// representable calendar range). Suspicious-looking values are a
    /// scoring concern, not an extraction concern.
    pub fn extract(&self, tx: &Transaction, known_bad: &KnownBadSet) -> Result<FeatureVector> {
        let timestamp = DateTime::from_timestamp(tx.timestamp, 0).ok_or_else(|| {
            ShieldError::Feature(format!("malformed timestamp: {}", tx.timestamp))
        })?;
        let hour = timestamp.hour();

        let from = tx.from_lower();
        let to = tx.to_lower();

        Ok(FeatureVector {
            value: tx.value,
            gas: tx.gas,
            gas_price: tx.gas_price,
            input_len: tx.input.len() as f64,
            from_known_bad: known_bad.is_loaded() && !from.is_empty() && known_bad.contains(&from),
            to_known_bad: known_bad.is_loaded() && !to.is_empty() && known_bad.contains(&to),
            hour_of_day: hour as f64,
            is_off_hours: hour <= 6,
        })
    }
}
