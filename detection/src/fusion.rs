use tracing::debug;

use dagshield_core::{Confidence, DetectorSignal, ThreatCategory, ThreatDetectionResult};

use crate::intel::ThreatIntel;
use crate::patterns::PatternMatches;

/// Fixed fusion weights; must sum to 1. Threat intel is deliberately
/// not in this table: it is independent high-confidence ground truth
/// and is folded in additively as a risk boost (see `fuse`).
#[derive(Debug, Clone, Copy)]
pub struct FusionWeights {
    pub anomaly: f64,
    pub patterns: f64,
    pub classifier: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            anomaly: 0.3,
            patterns: 0.4,
            classifier: 0.3,
        }
    }
}

/// Entity context carried into the final result.
#[derive(Debug, Clone, Default)]
pub struct FusionContext {
    pub transaction_hash: Option<String>,
    pub contract_address: Option<String>,
    pub affected_addresses: Vec<String>,
}

/// Deterministic multi-signal combiner.
///
/// Confidence is the weighted sum of the available detectors. An
/// `Unavailable` detector is excluded and its weight redistributed
/// proportionally over the rest (dividing by the sum of available
/// weights) — it is never treated as a score of 0, which would bias
/// every degraded analysis toward "safe".
#[derive(Debug, Clone, Copy, Default)]
pub struct FusionEngine {
    weights: FusionWeights,
}

impl FusionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(weights: FusionWeights) -> Self {
        Self { weights }
    }

    pub fn fuse(
        &self,
        ctx: FusionContext,
        anomaly: &DetectorSignal,
        patterns: &PatternMatches,
        classifier: &DetectorSignal,
        intel: Option<&ThreatIntel>,
    ) -> ThreatDetectionResult {
        let pattern_score = patterns.fusion_score();

        let mut weighted_sum = 0.0;
        let mut available_weight = 0.0;

        if let Some(score) = anomaly.fusion_score() {
            weighted_sum += self.weights.anomaly * score;
            available_weight += self.weights.anomaly;
        }
        // The pattern battery never fails; it is always available.
        weighted_sum += self.weights.patterns * pattern_score;
        available_weight += self.weights.patterns;

        if let Some(score) = classifier.fusion_score() {
            weighted_sum += self.weights.classifier * score;
            available_weight += self.weights.classifier;
        }

        let base_confidence = if available_weight > 0.0 {
            weighted_sum / available_weight
        } else {
            0.0
        };

        // Intel boost lives in the confidence domain so the
        // risk_score == round(confidence * 100) invariant survives the
        // 0-100 cap: the cap is the image of the 1.0 confidence clamp.
        let boost = intel.map(|i| i.risk_boost).unwrap_or(0.0);
        let confidence = Confidence::new(base_confidence).boosted_by(boost);

        let category = self.select_category(anomaly, patterns, classifier, intel);
        let evidence = self.assemble_evidence(anomaly, patterns, classifier, intel, confidence);

        debug!(
            "Fusion: base={:.3} boost={:.0} -> {} ({:.3})",
            base_confidence,
            boost,
            category.as_str(),
            confidence.value()
        );

        let mut result = ThreatDetectionResult::new(category, confidence, evidence)
            .with_affected_addresses(ctx.affected_addresses);
        if let Some(hash) = ctx.transaction_hash {
            result = result.with_transaction_hash(hash);
        }
        if let Some(address) = ctx.contract_address {
            result = result.with_contract_address(address);
        }
        result
    }

    /// Category precedence, highest first: known-bad hit, phishing
    /// indicators, high anomaly, classifier prediction, fallback.
    fn select_category(
        &self,
        anomaly: &DetectorSignal,
        patterns: &PatternMatches,
        classifier: &DetectorSignal,
        intel: Option<&ThreatIntel>,
    ) -> ThreatCategory {
        if patterns.known_bad_addresses > 0 {
            return intel
                .and_then(|i| most_specific_category(&i.malware_families))
                .unwrap_or(ThreatCategory::ScamToken);
        }
        if patterns.phishing_indicators > 0 {
            return ThreatCategory::Phishing;
        }
        if anomaly.fusion_score().is_some_and(|s| s > 0.8) {
            return ThreatCategory::MaliciousContract;
        }
        if let DetectorSignal::Classified { category, .. } = classifier {
            return *category;
        }
        ThreatCategory::SocialEngineering
    }

    /// Evidence order is a contract: known-bad hits, pattern matches,
    /// anomaly, classifier, intel IOCs, then degradation notes.
    fn assemble_evidence(
        &self,
        anomaly: &DetectorSignal,
        patterns: &PatternMatches,
        classifier: &DetectorSignal,
        intel: Option<&ThreatIntel>,
        confidence: Confidence,
    ) -> Vec<String> {
        let mut evidence = Vec::new();

        for hit in &patterns.known_bad_hits {
            evidence.push(format!("Known malicious address: {}", hit));
        }

        for (category, count) in patterns.by_category() {
            // Known-bad hits already have their own, more specific lines.
            if category == "known_bad_addresses" {
                continue;
            }
            if count >= 1 {
                evidence.push(format!("Pattern match: {} x{}", category, count));
            }
        }

        if let Some(score) = anomaly.fusion_score() {
            if score > 0.5 {
                evidence.push(format!("Anomaly detected (score: {:.2})", score));
            }
        }

        if let DetectorSignal::Classified {
            category,
            confidence: classifier_confidence,
            ..
        } = classifier
        {
            if *classifier_confidence > 0.5 {
                evidence.push(format!(
                    "ML classification: {} (confidence: {:.2})",
                    category.as_str(),
                    classifier_confidence
                ));
            }
        }

        if let Some(intel) = intel {
            for ioc in &intel.iocs {
                evidence.push(format!("Threat intel IOC: {}", ioc));
            }
            for source in &intel.unavailable_sources {
                evidence.push(format!("source unavailable: {}", source));
            }
        }

        evidence.extend(patterns.notes.iter().cloned());

        // A non-zero verdict always explains itself, even when no single
        // detector crossed its reporting threshold.
        if evidence.is_empty() && confidence.value() > 0.0 {
            evidence.push(format!(
                "Aggregate signal below reporting thresholds (confidence: {:.2})",
                confidence.value()
            ));
        }

        evidence
    }
}

/// Map intel malware-family names onto the closed category set; the
/// first keyword hit wins, scanning families in report order.
fn most_specific_category(families: &[String]) -> Option<ThreatCategory> {
    for family in families {
        let family = family.to_lowercase();
        let category = if family.contains("phish") {
            Some(ThreatCategory::Phishing)
        } else if family.contains("rug") {
            Some(ThreatCategory::RugPull)
        } else if family.contains("honeypot") {
            Some(ThreatCategory::Honeypot)
        } else if family.contains("ponzi") {
            Some(ThreatCategory::PonziScheme)
        } else if family.contains("airdrop") {
            Some(ThreatCategory::FakeAirdrop)
        } else if family.contains("flash") {
            Some(ThreatCategory::FlashLoanAttack)
        } else if family.contains("mev") {
            Some(ThreatCategory::MevAttack)
        } else if family.contains("scam") {
            Some(ThreatCategory::ScamToken)
        } else {
            None
        };
        if category.is_some() {
            return category;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagshield_core::DetectorSignal;

    fn no_patterns() -> PatternMatches {
        PatternMatches::default()
    }

    #[test]
    fn all_detectors_available_uses_nominal_weights() {
        let engine = FusionEngine::new();
        let patterns = PatternMatches {
            scam_signatures: 5, // fusion score 1.0
            ..Default::default()
        };
        let result = engine.fuse(
            FusionContext::default(),
            &DetectorSignal::score(1.0),
            &patterns,
            &DetectorSignal::Classified {
                category: ThreatCategory::RugPull,
                confidence: 1.0,
                evidence: vec![],
            },
            None,
        );
        // 0.3*1 + 0.4*1 + 0.3*1 = 1.0
        assert!((result.confidence - 1.0).abs() < 1e-9);
        assert_eq!(result.risk_score, 100);
    }

    #[test]
    fn unavailable_anomaly_redistributes_weight() {
        let engine = FusionEngine::new();
        let patterns = PatternMatches {
            scam_signatures: 5, // fusion score 1.0
            ..Default::default()
        };
        let result = engine.fuse(
            FusionContext::default(),
            &DetectorSignal::unavailable("no model"),
            &patterns,
            &DetectorSignal::Classified {
                category: ThreatCategory::RugPull,
                confidence: 0.0,
                evidence: vec![],
            },
            None,
        );
        // (0.4*1.0 + 0.3*0.0) / 0.7 ≈ 0.5714 — not 0.4, which would be
        // the biased-toward-safe value.
        assert!((result.confidence - 0.4 / 0.7).abs() < 1e-9);
    }

    #[test]
    fn patterns_only_gets_full_weight() {
        let engine = FusionEngine::new();
        let patterns = PatternMatches {
            contract_risk_patterns: 2, // fusion score 0.4
            ..Default::default()
        };
        let result = engine.fuse(
            FusionContext::default(),
            &DetectorSignal::unavailable("no model"),
            &patterns,
            &DetectorSignal::unavailable("no model"),
            None,
        );
        assert!((result.confidence - 0.4).abs() < 1e-9);
        assert_eq!(result.risk_score, 40);
    }

    #[test]
    fn known_bad_hit_forces_category() {
        let engine = FusionEngine::new();
        let patterns = PatternMatches {
            known_bad_addresses: 1,
            known_bad_hits: vec!["0xbad".to_string()],
            ..Default::default()
        };
        let result = engine.fuse(
            FusionContext::default(),
            &DetectorSignal::score(0.9), // would otherwise force MaliciousContract
            &patterns,
            &DetectorSignal::Classified {
                category: ThreatCategory::MevAttack,
                confidence: 0.99,
                evidence: vec![],
            },
            None,
        );
        assert_eq!(result.threat_type, ThreatCategory::ScamToken);
        assert_eq!(
            result.evidence[0],
            "Known malicious address: 0xbad".to_string()
        );
    }

    #[test]
    fn known_bad_with_intel_family_refines_category() {
        let engine = FusionEngine::new();
        let patterns = PatternMatches {
            known_bad_addresses: 1,
            known_bad_hits: vec!["0xbad".to_string()],
            ..Default::default()
        };
        let intel = ThreatIntel {
            malware_families: vec!["EthPhishKit".to_string()],
            ..Default::default()
        };
        let result = engine.fuse(
            FusionContext::default(),
            &DetectorSignal::unavailable("no model"),
            &patterns,
            &DetectorSignal::unavailable("no model"),
            Some(&intel),
        );
        assert_eq!(result.threat_type, ThreatCategory::Phishing);
    }

    #[test]
    fn phishing_indicators_beat_anomaly() {
        let engine = FusionEngine::new();
        let patterns = PatternMatches {
            phishing_indicators: 2,
            ..Default::default()
        };
        let result = engine.fuse(
            FusionContext::default(),
            &DetectorSignal::score(0.95),
            &patterns,
            &DetectorSignal::unavailable("no model"),
            None,
        );
        assert_eq!(result.threat_type, ThreatCategory::Phishing);
    }

    #[test]
    fn high_anomaly_forces_malicious_contract() {
        let engine = FusionEngine::new();
        let result = engine.fuse(
            FusionContext::default(),
            &DetectorSignal::score(0.85),
            &no_patterns(),
            &DetectorSignal::Classified {
                category: ThreatCategory::RugPull,
                confidence: 0.9,
                evidence: vec![],
            },
            None,
        );
        assert_eq!(result.threat_type, ThreatCategory::MaliciousContract);
    }

    #[test]
    fn classifier_category_when_nothing_fires() {
        let engine = FusionEngine::new();
        let result = engine.fuse(
            FusionContext::default(),
            &DetectorSignal::score(0.2),
            &no_patterns(),
            &DetectorSignal::Classified {
                category: ThreatCategory::PonziScheme,
                confidence: 0.7,
                evidence: vec![],
            },
            None,
        );
        assert_eq!(result.threat_type, ThreatCategory::PonziScheme);
    }

    #[test]
    fn fallback_category_is_social_engineering() {
        let engine = FusionEngine::new();
        let result = engine.fuse(
            FusionContext::default(),
            &DetectorSignal::unavailable("no model"),
            &no_patterns(),
            &DetectorSignal::unavailable("no model"),
            None,
        );
        assert_eq!(result.threat_type, ThreatCategory::SocialEngineering);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.risk_score, 0);
    }

    #[test]
    fn intel_boost_is_additive_and_capped() {
        let engine = FusionEngine::new();
        let patterns = PatternMatches {
            scam_signatures: 1, // fusion score 0.2
            ..Default::default()
        };
        let intel = ThreatIntel {
            risk_boost: 50.0,
            iocs: vec!["virustotal_malicious_0xbad".to_string()],
            ..Default::default()
        };
        let result = engine.fuse(
            FusionContext::default(),
            &DetectorSignal::unavailable("no model"),
            &patterns,
            &DetectorSignal::unavailable("no model"),
            Some(&intel),
        );
        // base 0.2 + 0.5 boost = 0.7
        assert!((result.confidence - 0.7).abs() < 1e-9);
        assert_eq!(result.risk_score, 70);

        let huge = ThreatIntel {
            risk_boost: 100.0,
            iocs: vec!["x".to_string()],
            ..Default::default()
        };
        let capped = engine.fuse(
            FusionContext::default(),
            &DetectorSignal::unavailable("no model"),
            &patterns,
            &DetectorSignal::unavailable("no model"),
            Some(&huge),
        );
        assert_eq!(capped.confidence, 1.0);
        assert_eq!(capped.risk_score, 100);
    }

    #[test]
    fn evidence_order_is_the_contract() {
        let engine = FusionEngine::new();
        let patterns = PatternMatches {
            known_bad_addresses: 1,
            known_bad_hits: vec!["0xbad".to_string()],
            scam_signatures: 1,
            notes: vec!["knownBad set unavailable".to_string()],
            ..Default::default()
        };
        let intel = ThreatIntel {
            risk_boost: 50.0,
            iocs: vec!["virustotal_malicious_0xbad".to_string()],
            unavailable_sources: vec!["otx".to_string()],
            ..Default::default()
        };
        let result = engine.fuse(
            FusionContext::default(),
            &DetectorSignal::score(0.9),
            &patterns,
            &DetectorSignal::Classified {
                category: ThreatCategory::ScamToken,
                confidence: 0.8,
                evidence: vec![],
            },
            Some(&intel),
        );

        let evidence = &result.evidence;
        assert_eq!(evidence[0], "Known malicious address: 0xbad");
        assert_eq!(evidence[1], "Pattern match: scam_signatures x1");
        assert!(evidence[2].starts_with("Anomaly detected"));
        assert!(evidence[3].starts_with("ML classification: scam_token"));
        assert_eq!(evidence[4], "Threat intel IOC: virustotal_malicious_0xbad");
        assert_eq!(evidence[5], "source unavailable: otx");
        assert_eq!(evidence[6], "knownBad set unavailable");
    }

    #[test]
    fn nonzero_confidence_always_has_evidence() {
        let engine = FusionEngine::new();
        // Weak anomaly only: no evidence rule fires, confidence > 0.
        let result = engine.fuse(
            FusionContext::default(),
            &DetectorSignal::score(0.3),
            &no_patterns(),
            &DetectorSignal::unavailable("no model"),
            None,
        );
        assert!(result.confidence > 0.0);
        assert!(!result.evidence.is_empty());
    }

    #[test]
    fn determinism_same_inputs_same_verdict() {
        let engine = FusionEngine::new();
        let patterns = PatternMatches {
            scam_signatures: 2,
            ..Default::default()
        };
        let run = || {
            engine.fuse(
                FusionContext::default(),
                &DetectorSignal::score(0.6),
                &patterns,
                &DetectorSignal::Classified {
                    category: ThreatCategory::RugPull,
                    confidence: 0.55,
                    evidence: vec![],
                },
                None,
            )
        };
        let a = run();
        let b = run();
        assert_eq!(a.threat_type, b.threat_type);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.evidence, b.evidence);
    }

    #[test]
    fn family_mapping_prefers_first_match() {
        let families = vec!["Generic.Trojan".to_string(), "RugPullKit".to_string()];
        assert_eq!(
            most_specific_category(&families),
            Some(ThreatCategory::RugPull)
        );
        assert_eq!(most_specific_category(&[]), None);
    }
}
