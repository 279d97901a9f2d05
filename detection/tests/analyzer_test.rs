//! End-to-end analyzer scenarios from the detection playbook: phishing
//! URLs, booby-trapped contracts, known-bad overrides, and intel
//! source timeouts.

use std::time::Duration;

use async_trait::async_trait;
use dagshield_core::{
    Contract, ContractInfo, Entity, Result, ThreatCategory, Transaction, UrlData,
};
use dagshield_detection::config::DetectionConfig;
use dagshield_detection::intel::{IntelSource, SourceReport, ThreatIntelClient};
use dagshield_detection::knownbad::KnownBadSet;
use dagshield_detection::DetectionEngine;

struct HangingSource;

#[async_trait]
impl IntelSource for HangingSource {
    fn name(&self) -> &str {
        "slow-feed"
    }

    async fn check(&self, _address: &str) -> Result<SourceReport> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(SourceReport::default())
    }
}

struct FlaggingSource;

#[async_trait]
impl IntelSource for FlaggingSource {
    fn name(&self) -> &str {
        "virustotal"
    }

    async fn check(&self, _address: &str) -> Result<SourceReport> {
        Ok(SourceReport {
            malicious_count: 2,
            malware_families: vec!["ScamTokenDrainer".to_string()],
            ..Default::default()
        })
    }
}

fn engine() -> DetectionEngine {
    DetectionEngine::new(DetectionConfig::default()).expect("engine init")
}

fn sample_tx() -> Transaction {
    Transaction {
        hash: "0xfeedbeef".into(),
        from: "0x1111111111111111111111111111111111111111".into(),
        to: "0x2222222222222222222222222222222222222222".into(),
        value: 1e18,
        gas: 21_000.0,
        gas_price: 20e9,
        input: "0x".into(),
        timestamp: 1_700_000_000,
    }
}

/// URL scenario: metamask impersonation on a throwaway TLD must come
/// back phishing with confidence > 0.8 even without page content.
#[tokio::test]
async fn url_scenario_metamask_login_tk() {
    let engine = engine();
    let result = engine
        .analyze(&Entity::Url(UrlData {
            url: "https://metamask-login.tk".into(),
            content: None,
            tls_valid: None,
        }))
        .await
        .unwrap();

    assert_eq!(result.threat_type, ThreatCategory::Phishing);
    assert!(result.confidence > 0.8, "confidence {}", result.confidence);
    assert_eq!(result.risk_score, (result.confidence * 100.0).round() as u8);
}

/// Contract scenario: unverified + selfdestruct + delegatecall lands at
/// risk >= 55 in the honeypot/malicious-contract band.
#[tokio::test]
async fn contract_scenario_selfdestruct_delegatecall_unverified() {
    let engine = engine();
    engine
        .known_bad_store()
        .swap(KnownBadSet::from_entries(Vec::<String>::new()));

    let contract = Contract {
        address: "0xc0de".into(),
        source_code: Some(
            "contract Trap { \
               function bye() public { selfdestruct(payable(msg.sender)); } \
               function fwd(address t, bytes memory d) public { t.delegatecall(d); } \
             }"
            .into(),
        ),
        info: Some(ContractInfo {
            is_verified: false,
            creation_time: None,
            transaction_count: 12,
            balance: 0.5,
        }),
    };

    let result = engine.analyze_contract(&contract).await.unwrap();
    assert!(result.risk_score >= 55, "risk {}", result.risk_score);
    assert!(matches!(
        result.threat_type,
        ThreatCategory::Honeypot | ThreatCategory::MaliciousContract
    ));
    assert_eq!(result.contract_address.as_deref(), Some("0xc0de"));
}

/// Known-bad override: a recipient in the KnownBadSet forces the
/// category regardless of every other detector.
#[tokio::test]
async fn known_bad_recipient_overrides_category() {
    let engine = engine();
    engine.known_bad_store().swap(KnownBadSet::from_entries([
        "0x2222222222222222222222222222222222222222",
    ]));

    let result = engine.analyze_transaction(&sample_tx()).await.unwrap();
    assert_eq!(result.threat_type, ThreatCategory::ScamToken);
    assert!(result.confidence > 0.0);
    assert!(result.evidence[0].starts_with("Known malicious address"));
}

/// Intel family names refine the forced category.
#[tokio::test]
async fn known_bad_with_intel_family() {
    let mut engine = engine();
    engine.set_intel_client(Some(ThreatIntelClient::with_sources(
        vec![Box::new(FlaggingSource)],
        Duration::from_secs(1),
    )));
    engine.known_bad_store().swap(KnownBadSet::from_entries([
        "0x2222222222222222222222222222222222222222",
    ]));

    let result = engine.analyze_transaction(&sample_tx()).await.unwrap();
    assert_eq!(result.threat_type, ThreatCategory::ScamToken);
    // Intel hit boosted the verdict to certainty: 50 points per flagged
    // address, two addresses checked.
    assert_eq!(result.risk_score, 100);
    assert!(result
        .evidence
        .iter()
        .any(|e| e.starts_with("Threat intel IOC")));
}

/// Timeout scenario: a hanging source under a 1ms budget degrades to
/// "source unavailable" evidence without stalling the analysis.
#[tokio::test(start_paused = true)]
async fn hanging_intel_source_degrades_gracefully() {
    let mut engine = engine();
    engine.set_intel_client(Some(ThreatIntelClient::with_sources(
        vec![Box::new(HangingSource)],
        Duration::from_millis(1),
    )));

    let result = engine.analyze_transaction(&sample_tx()).await.unwrap();
    assert!(result
        .evidence
        .iter()
        .any(|e| e == "source unavailable: slow-feed"));
}

/// Two analyses over identical snapshots produce identical verdicts.
#[tokio::test]
async fn repeated_analysis_is_deterministic() {
    let engine = engine();
    engine
        .known_bad_store()
        .swap(KnownBadSet::from_entries(["0xbad"]));

    let tx = sample_tx();
    let a = engine.analyze_transaction(&tx).await.unwrap();
    let b = engine.analyze_transaction(&tx).await.unwrap();
    assert_eq!(a.threat_type, b.threat_type);
    assert_eq!(a.confidence, b.confidence);
    assert_eq!(a.risk_score, b.risk_score);
    assert_eq!(a.evidence, b.evidence);
}

/// Concurrent analyses of different entities do not interfere.
#[tokio::test]
async fn concurrent_analyses_are_isolated() {
    let engine = std::sync::Arc::new(engine());
    engine
        .known_bad_store()
        .swap(KnownBadSet::from_entries(["0xdead"]));

    let clean = sample_tx();
    let mut flagged = sample_tx();
    flagged.to = "0xDEAD".into();

    let (a, b) = tokio::join!(
        engine.analyze_transaction(&clean),
        engine.analyze_transaction(&flagged),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    assert!(a.confidence < b.confidence);
    assert_eq!(b.threat_type, ThreatCategory::ScamToken);
}
