use std::sync::Arc;
use tracing::{debug, info, warn};

use dagshield_core::{
    Confidence, Contract, DetectorSignal, Entity, Result, ThreatCategory, ThreatDetectionResult,
    Transaction, UrlData,
};

use crate::anomaly::AnomalyDetector;
use crate::classifier::ThreatClassifier;
use crate::config::DetectionConfig;
use crate::features::FeatureExtractor;
use crate::fusion::{FusionContext, FusionEngine};
use crate::intel::{ThreatIntel, ThreatIntelClient};
use crate::knownbad::{KnownBadRefresher, KnownBadSet, KnownBadStore};
use crate::model::ModelStore;
use crate::patterns::{PatternMatcher, PatternMatches};
use crate::url_analysis::UrlAnalyzer;

/// Risk increment (0-100 points) for an unverified contract, applied
/// after fusion and re-clamped.
const UNVERIFIED_CONTRACT_BOOST: f64 = 15.0;

/// Contract risk bands used to refine a fallback verdict.
const SCAM_TOKEN_RISK: u8 = 80;
const HONEYPOT_RISK: u8 = 60;
const MALICIOUS_CONTRACT_RISK: u8 = 40;

/// Orchestrates extraction, the detector battery, and fusion for every
/// entity kind. Shared state (model bundle, KnownBadSet) is read as
/// `Arc` snapshots, so concurrent analyses never interfere and refresh
/// is a pointer swap.
pub struct DetectionEngine {
    extractor: FeatureExtractor,
    anomaly: AnomalyDetector,
    classifier: ThreatClassifier,
    matcher: PatternMatcher,
    fusion: FusionEngine,
    url: UrlAnalyzer,
    models: ModelStore,
    known_bad: KnownBadStore,
    intel: Option<ThreatIntelClient>,
    refresher: KnownBadRefresher,
}

impl DetectionEngine {
    /// Build the engine. Model-bundle problems (version or shape
    /// mismatch) fail here, at startup — never at analysis time.
    pub fn new(config: DetectionConfig) -> Result<Self> {
        info!("🚀 Initializing detection engine");

        let models = ModelStore::load_from(&config.model_path)?;
        let matcher = PatternMatcher::new()?;
        let url = UrlAnalyzer::new(matcher.patterns(), config.legitimate_domains.clone());
        let intel = ThreatIntelClient::from_config(&config.intel);
        if intel.is_none() {
            warn!("⚠️  No threat-intel sources configured - intel lookups disabled");
        }
        let refresher = KnownBadRefresher::new(config.known_bad_feeds.clone());

        Ok(Self {
            extractor: FeatureExtractor::new(),
            anomaly: AnomalyDetector::new(),
            classifier: ThreatClassifier::new(),
            matcher,
            fusion: FusionEngine::new(),
            url,
            models,
            known_bad: KnownBadStore::new(),
            intel,
            refresher,
        })
    }

    /// Replace the intel client (test seam and key rotation).
    pub fn set_intel_client(&mut self, intel: Option<ThreatIntelClient>) {
        self.intel = intel;
    }

    pub fn known_bad_store(&self) -> &KnownBadStore {
        &self.known_bad
    }

    pub fn model_store(&self) -> &ModelStore {
        &self.models
    }

    /// Pull the configured known-bad feeds and swap in a fresh snapshot.
    pub async fn refresh_known_bad(&self) -> Result<usize> {
        self.refresher.refresh_into(&self.known_bad).await
    }

    /// Analyze any entity. `Err` is reserved for configuration-level
    /// failures; entity-level problems degrade to a zero-confidence
    /// result with the explanation as sole evidence.
    pub async fn analyze(&self, entity: &Entity) -> Result<ThreatDetectionResult> {
        match entity {
            Entity::Transaction(tx) => self.analyze_transaction(tx).await,
            Entity::Contract(contract) => self.analyze_contract(contract).await,
            Entity::Url(url) => self.analyze_url(url),
        }
    }

    pub async fn analyze_transaction(&self, tx: &Transaction) -> Result<ThreatDetectionResult> {
        let known_bad = self.known_bad.snapshot();
        let models = self.models.snapshot();

        let features = match self.extractor.extract(tx, &known_bad) {
            Ok(features) => features,
            Err(e) => {
                warn!("Transaction {} not analyzable: {}", tx.hash, e);
                return Ok(ThreatDetectionResult::degraded(
                    ThreatCategory::MaliciousContract,
                    format!("Analysis error: {}", e),
                )
                .with_transaction_hash(tx.hash.clone()));
            }
        };

        let intel_addresses = [tx.from_lower(), tx.to_lower()];
        let bundle = models.as_deref();
        let kb = loaded_snapshot(&known_bad);

        // Independent detectors run concurrently; latency is bounded by
        // the slowest one, not their sum.
        let (anomaly, patterns, classifier, intel) = tokio::join!(
            async { self.anomaly.score(bundle, &features) },
            async { self.matcher.match_transaction(tx, kb) },
            async { self.classifier.classify(bundle, &features) },
            self.lookup_intel(&intel_addresses),
        );
        let anomaly = anomaly?;
        let classifier = classifier?;

        debug!(
            "Transaction {}: anomaly={:?} patterns={} classifier={:?}",
            tx.hash,
            anomaly.fusion_score(),
            patterns.total(),
            classifier.fusion_score()
        );

        let ctx = FusionContext {
            transaction_hash: Some(tx.hash.clone()),
            contract_address: None,
            affected_addresses: intel_addresses
                .iter()
                .filter(|a| !a.is_empty())
                .cloned()
                .collect(),
        };
        Ok(self
            .fusion
            .fuse(ctx, &anomaly, &patterns, &classifier, intel.as_ref()))
    }

    pub async fn analyze_contract(&self, contract: &Contract) -> Result<ThreatDetectionResult> {
        let known_bad = self.known_bad.snapshot();
        let kb = loaded_snapshot(&known_bad);
        let address = contract.address_lower();

        // No trained bundle covers contract-shaped entities; the ML
        // detectors sit out and fusion redistributes onto the pattern
        // battery (which carries the static code analysis).
        let anomaly = DetectorSignal::unavailable("no trained model for contract entities");
        let classifier = DetectorSignal::unavailable("no trained model for contract entities");

        let (patterns, intel) = tokio::join!(
            async { self.matcher.match_contract(contract, kb) },
            self.lookup_intel(std::slice::from_ref(&address)),
        );

        let ctx = FusionContext {
            transaction_hash: None,
            contract_address: Some(address),
            affected_addresses: Vec::new(),
        };
        let fused = self
            .fusion
            .fuse(ctx, &anomaly, &patterns, &classifier, intel.as_ref());

        Ok(refine_contract_result(fused, &patterns, contract))
    }

    pub fn analyze_url(&self, url: &UrlData) -> Result<ThreatDetectionResult> {
        Ok(self.url.analyze(url))
    }

    async fn lookup_intel(&self, addresses: &[String]) -> Option<ThreatIntel> {
        match &self.intel {
            Some(client) => Some(client.lookup(addresses).await),
            None => None,
        }
    }
}

/// Treat a never-refreshed KnownBadSet as unavailable so dependent
/// checks degrade with a note instead of silently reporting zero.
fn loaded_snapshot(set: &Arc<KnownBadSet>) -> Option<&KnownBadSet> {
    set.is_loaded().then_some(set.as_ref())
}

/// Contract-specific post steps: the unverified-contract increment
/// (applied in the confidence domain, re-clamped) and risk-band
/// refinement of a fallback verdict.
fn refine_contract_result(
    fused: ThreatDetectionResult,
    patterns: &PatternMatches,
    contract: &Contract,
) -> ThreatDetectionResult {
    let mut evidence = fused.evidence.clone();
    let mut boost = 0.0;

    if !patterns.matched_contract_patterns.is_empty() {
        evidence.push(format!(
            "Suspicious contract patterns: {}",
            patterns.matched_contract_patterns.join(", ")
        ));
    }
    if !patterns.matched_honeypot_indicators.is_empty() {
        evidence.push(format!(
            "Honeypot indicators: {}",
            patterns.matched_honeypot_indicators.join(", ")
        ));
    }

    match &contract.info {
        Some(info) if !info.is_verified => {
            boost += UNVERIFIED_CONTRACT_BOOST;
            evidence.push("Unverified contract".to_string());
        }
        Some(_) => {}
        None => evidence.push("contract info unavailable".to_string()),
    }

    let confidence = Confidence::new(fused.confidence).boosted_by(boost);
    let risk = confidence.risk_score();

    // Only the fallback verdict is refined; categories forced by the
    // precedence rules stand.
    let category = if fused.threat_type == ThreatCategory::SocialEngineering {
        if risk > SCAM_TOKEN_RISK {
            ThreatCategory::ScamToken
        } else if risk > HONEYPOT_RISK {
            ThreatCategory::Honeypot
        } else if risk > MALICIOUS_CONTRACT_RISK {
            ThreatCategory::MaliciousContract
        } else {
            fused.threat_type
        }
    } else {
        fused.threat_type
    };

    let mut result = ThreatDetectionResult::new(category, confidence, evidence);
    result.contract_address = fused.contract_address;
    result.affected_addresses = fused.affected_addresses;
    result
}
