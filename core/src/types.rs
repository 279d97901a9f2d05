use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of threat categories. Wire labels match the detection feeds
/// and must stay stable; adding a variant is a model-version event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    Phishing,
    ScamToken,
    RugPull,
    FlashLoanAttack,
    MevAttack,
    FakeAirdrop,
    PonziScheme,
    Honeypot,
    MaliciousContract,
    SocialEngineering,
}

impl ThreatCategory {
    /// All categories in classifier output order. The classifier model's
    /// class rows are indexed by this ordering.
    pub const ALL: [ThreatCategory; 10] = [
        ThreatCategory::Phishing,
        ThreatCategory::ScamToken,
        ThreatCategory::RugPull,
        ThreatCategory::FlashLoanAttack,
        ThreatCategory::MevAttack,
        ThreatCategory::FakeAirdrop,
        ThreatCategory::PonziScheme,
        ThreatCategory::Honeypot,
        ThreatCategory::MaliciousContract,
        ThreatCategory::SocialEngineering,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatCategory::Phishing => "phishing",
            ThreatCategory::ScamToken => "scam_token",
            ThreatCategory::RugPull => "rug_pull",
            ThreatCategory::FlashLoanAttack => "flash_loan_attack",
            ThreatCategory::MevAttack => "mev_attack",
            ThreatCategory::FakeAirdrop => "fake_airdrop",
            ThreatCategory::PonziScheme => "ponzi_scheme",
            ThreatCategory::Honeypot => "honeypot",
            ThreatCategory::MaliciousContract => "malicious_contract",
            ThreatCategory::SocialEngineering => "social_engineering",
        }
    }
}

/// Detection confidence (0.0 = benign, 1.0 = certain threat).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Confidence(pub f64);

impl Confidence {
    pub fn new(value: f64) -> Self {
        Self(value.clamp(0.0, 1.0))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Risk score on the 0-100 scale. Always derived, never set directly,
    /// so `risk_score == round(confidence * 100)` holds for every result.
    pub fn risk_score(&self) -> u8 {
        (self.0 * 100.0).round() as u8
    }

    pub fn is_high_risk(&self) -> bool {
        self.0 >= 0.8
    }

    pub fn is_medium_risk(&self) -> bool {
        self.0 >= 0.5 && self.0 < 0.8
    }

    pub fn is_low_risk(&self) -> bool {
        self.0 < 0.5
    }

    /// Add risk points on the 0-100 scale, re-clamping to [0, 1].
    /// Used for the threat-intel boost and contract increments.
    pub fn boosted_by(self, points: f64) -> Self {
        Self::new(self.0 + points / 100.0)
    }
}

/// Output of a single detector. `Unavailable` is distinct from a zero
/// score: unavailable detectors are excluded from fusion entirely and
/// their weight is redistributed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DetectorSignal {
    Score {
        score: f64,
        evidence: Vec<String>,
    },
    Classified {
        category: ThreatCategory,
        confidence: f64,
        evidence: Vec<String>,
    },
    Unavailable {
        reason: String,
    },
}

impl DetectorSignal {
    pub fn score(score: f64) -> Self {
        DetectorSignal::Score {
            score: score.clamp(0.0, 1.0),
            evidence: Vec::new(),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        DetectorSignal::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, DetectorSignal::Unavailable { .. })
    }

    /// Numeric contribution to the weighted sum, if available.
    pub fn fusion_score(&self) -> Option<f64> {
        match self {
            DetectorSignal::Score { score, .. } => Some(*score),
            DetectorSignal::Classified { confidence, .. } => Some(*confidence),
            DetectorSignal::Unavailable { .. } => None,
        }
    }
}

/// Final verdict for one analyzed entity. Immutable once constructed;
/// evidence order is discovery order and is part of the API contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatDetectionResult {
    pub threat_type: ThreatCategory,
    pub confidence: f64,
    pub risk_score: u8,
    pub evidence: Vec<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
    #[serde(default)]
    pub affected_addresses: Vec<String>,
}

impl ThreatDetectionResult {
    pub fn new(threat_type: ThreatCategory, confidence: Confidence, evidence: Vec<String>) -> Self {
        debug_assert!(
            confidence.value() == 0.0 || !evidence.is_empty(),
            "non-zero confidence requires evidence"
        );
        Self {
            threat_type,
            confidence: confidence.value(),
            risk_score: confidence.risk_score(),
            evidence,
            timestamp: Utc::now(),
            transaction_hash: None,
            contract_address: None,
            affected_addresses: Vec::new(),
        }
    }

    /// Zero-confidence result for entities that could not be analyzed.
    /// The explanation is the sole evidence entry.
    pub fn degraded(threat_type: ThreatCategory, explanation: impl Into<String>) -> Self {
        Self {
            threat_type,
            confidence: 0.0,
            risk_score: 0,
            evidence: vec![explanation.into()],
            timestamp: Utc::now(),
            transaction_hash: None,
            contract_address: None,
            affected_addresses: Vec::new(),
        }
    }

    pub fn with_transaction_hash(mut self, hash: impl Into<String>) -> Self {
        self.transaction_hash = Some(hash.into());
        self
    }

    pub fn with_contract_address(mut self, address: impl Into<String>) -> Self {
        self.contract_address = Some(address.into());
        self
    }

    pub fn with_affected_addresses(mut self, addresses: Vec<String>) -> Self {
        self.affected_addresses = addresses;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_clamps() {
        assert_eq!(Confidence::new(1.5).value(), 1.0);
        assert_eq!(Confidence::new(-0.5).value(), 0.0);
    }

    #[test]
    fn risk_score_is_derived_from_confidence() {
        assert_eq!(Confidence::new(0.0).risk_score(), 0);
        assert_eq!(Confidence::new(0.554).risk_score(), 55);
        assert_eq!(Confidence::new(1.0).risk_score(), 100);
    }

    #[test]
    fn boost_caps_at_full_confidence() {
        let boosted = Confidence::new(0.7).boosted_by(50.0);
        assert_eq!(boosted.value(), 1.0);
        assert_eq!(boosted.risk_score(), 100);
    }

    #[test]
    fn risk_bands() {
        assert!(Confidence::new(0.9).is_high_risk());
        assert!(Confidence::new(0.6).is_medium_risk());
        assert!(Confidence::new(0.3).is_low_risk());
    }

    #[test]
    fn unavailable_signal_has_no_fusion_score() {
        let signal = DetectorSignal::unavailable("no model loaded");
        assert!(!signal.is_available());
        assert_eq!(signal.fusion_score(), None);
    }

    #[test]
    fn classified_signal_scores_by_confidence() {
        let signal = DetectorSignal::Classified {
            category: ThreatCategory::RugPull,
            confidence: 0.72,
            evidence: vec!["classifier".into()],
        };
        assert_eq!(signal.fusion_score(), Some(0.72));
    }

    #[test]
    fn result_invariants_hold() {
        let result = ThreatDetectionResult::new(
            ThreatCategory::Phishing,
            Confidence::new(0.83),
            vec!["phishing domain".into()],
        );
        assert_eq!(result.risk_score, 83);
        assert!(result.risk_score <= 100);
        assert!(!result.evidence.is_empty());
    }

    #[test]
    fn degraded_result_is_zero_confidence() {
        let result =
            ThreatDetectionResult::degraded(ThreatCategory::MaliciousContract, "analysis error");
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.risk_score, 0);
        assert_eq!(result.evidence.len(), 1);
    }

    #[test]
    fn category_labels_are_stable() {
        assert_eq!(ThreatCategory::ScamToken.as_str(), "scam_token");
        assert_eq!(ThreatCategory::FlashLoanAttack.as_str(), "flash_loan_attack");
        assert_eq!(ThreatCategory::ALL.len(), 10);
    }
}
