use serde::Serialize;
use std::sync::Arc;

use dagshield_core::{Contract, Result, Transaction};

use crate::knownbad::KnownBadSet;
use crate::threat_patterns::{load_threat_patterns, ThreatPatterns};

/// Number of fixed pattern categories; the fusion score divisor.
pub const PATTERN_CATEGORY_COUNT: usize = 5;

/// Match counts per fixed category, plus the structured detail the
/// fusion engine and contract analyzer need for evidence.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PatternMatches {
    pub known_bad_addresses: u32,
    pub phishing_indicators: u32,
    pub scam_signatures: u32,
    pub contract_risk_patterns: u32,
    pub honeypot_indicators: u32,

    /// Addresses that hit the KnownBadSet, for evidence lines.
    pub known_bad_hits: Vec<String>,
    /// Distinct contract-risk pattern names that matched.
    pub matched_contract_patterns: Vec<String>,
    /// Honeypot indicators that matched.
    pub matched_honeypot_indicators: Vec<String>,
    /// Degradation notes ("knownBad set unavailable").
    pub notes: Vec<String>,
}

impl PatternMatches {
    pub fn total(&self) -> u32 {
        self.known_bad_addresses
            + self.phishing_indicators
            + self.scam_signatures
            + self.contract_risk_patterns
            + self.honeypot_indicators
    }

    /// Pattern score for fusion: `sum(matches) / category count`,
    /// clamped to 1.0.
    pub fn fusion_score(&self) -> f64 {
        (self.total() as f64 / PATTERN_CATEGORY_COUNT as f64).min(1.0)
    }

    /// (category label, count) pairs in fixed category order.
    pub fn by_category(&self) -> [(&'static str, u32); PATTERN_CATEGORY_COUNT] {
        [
            ("known_bad_addresses", self.known_bad_addresses),
            ("phishing_indicators", self.phishing_indicators),
            ("scam_signatures", self.scam_signatures),
            ("contract_risk_patterns", self.contract_risk_patterns),
            ("honeypot_indicators", self.honeypot_indicators),
        ]
    }

    fn check_known_bad(&mut self, address: &str, known_bad: Option<&KnownBadSet>) {
        let Some(set) = known_bad else { return };
        if address.is_empty() {
            return;
        }
        let lower = address.to_lowercase();
        if set.contains(&lower) {
            self.known_bad_addresses += 1;
            self.known_bad_hits.push(lower);
        }
    }
}

/// Fixed battery of independent, order-insensitive checks. Zero counts
/// are the normal case; nothing here ever fails on clean input.
pub struct PatternMatcher {
    patterns: Arc<ThreatPatterns>,
}

impl PatternMatcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            patterns: Arc::new(load_threat_patterns()?),
        })
    }

    pub fn with_patterns(patterns: Arc<ThreatPatterns>) -> Self {
        Self { patterns }
    }

    pub fn patterns(&self) -> Arc<ThreatPatterns> {
        self.patterns.clone()
    }

    /// Check a transaction: known-bad membership of both addresses,
    /// scam selectors and phishing keywords in the call payload, and
    /// suspicious vanity suffixes.
    pub fn match_transaction(
        &self,
        tx: &Transaction,
        known_bad: Option<&KnownBadSet>,
    ) -> PatternMatches {
        let mut matches = PatternMatches::default();
        self.note_missing_known_bad(&mut matches, known_bad);

        matches.check_known_bad(&tx.from, known_bad);
        matches.check_known_bad(&tx.to, known_bad);

        let input = tx.input.to_lowercase();
        if input.len() > 10 {
            for selector in &self.patterns.scam_selectors {
                if input.starts_with(selector) {
                    matches.scam_signatures += 1;
                }
            }
        }
        for keyword in &self.patterns.scam_keywords {
            if input.contains(keyword) {
                matches.phishing_indicators += 1;
            }
        }

        for address in [&tx.from, &tx.to] {
            let lower = address.to_lowercase();
            if lower.len() == 42
                && self
                    .patterns
                    .suspicious_address_suffixes
                    .iter()
                    .any(|suffix| lower.ends_with(suffix))
            {
                matches.scam_signatures += 1;
            }
        }

        matches
    }

    /// Check a contract: known-bad membership of the address plus the
    /// static source batteries (risk regexes, honeypot indicators).
    pub fn match_contract(
        &self,
        contract: &Contract,
        known_bad: Option<&KnownBadSet>,
    ) -> PatternMatches {
        let mut matches = PatternMatches::default();
        self.note_missing_known_bad(&mut matches, known_bad);

        matches.check_known_bad(&contract.address, known_bad);

        if let Some(source) = &contract.source_code {
            for (name, re) in &self.patterns.contract_risk {
                if re.is_match(source) {
                    matches.contract_risk_patterns += 1;
                    matches.matched_contract_patterns.push((*name).to_string());
                }
            }

            let source_lower = source.to_lowercase();
            for indicator in &self.patterns.honeypot_indicators {
                if source_lower.contains(indicator) {
                    matches.honeypot_indicators += 1;
                    matches.matched_honeypot_indicators.push((*indicator).to_string());
                }
            }
        }

        matches
    }

    fn note_missing_known_bad(&self, matches: &mut PatternMatches, known_bad: Option<&KnownBadSet>) {
        if known_bad.is_none() {
            matches.notes.push("knownBad set unavailable".to_string());
        }
    }
}
