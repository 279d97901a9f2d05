use async_trait::async_trait;
use futures_util::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use dagshield_core::{Result, ShieldError};

use crate::config::IntelConfig;

/// Per-source reputation report, the normalized shape every source
/// returns (or fails trying).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceReport {
    #[serde(default)]
    pub malicious_count: u32,
    #[serde(default)]
    pub abuse_confidence: f64,
    #[serde(default)]
    pub malware_families: Vec<String>,
}

/// Aggregated threat intelligence across all configured sources.
///
/// `risk_boost` is on the 0-100 scale: intel hits are independent
/// high-confidence ground truth and are folded additively into the
/// verdict rather than blended into the weighted sum.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ThreatIntel {
    pub malicious_count: u32,
    pub abuse_confidence: f64,
    pub malware_families: Vec<String>,
    pub iocs: Vec<String>,
    pub risk_boost: f64,
    pub unavailable_sources: Vec<String>,
}

/// Abuse-confidence percentage above which a source hit boosts risk.
const ABUSE_CONFIDENCE_THRESHOLD: f64 = 75.0;
/// Boost points for a malicious reputation hit.
const REPUTATION_HIT_BOOST: f64 = 50.0;
/// Boost points for a high-confidence abuse report.
const ABUSE_HIT_BOOST: f64 = 30.0;

/// One external reputation source. Implementations must be safe to
/// query concurrently and must not retry past their caller's timeout.
#[async_trait]
pub trait IntelSource: Send + Sync {
    fn name(&self) -> &str;
    async fn check(&self, address: &str) -> Result<SourceReport>;
}

/// VirusTotal-style URL/address reputation source.
pub struct VirusTotalSource {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl VirusTotalSource {
    pub fn new(endpoint: String, api_key: String) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            api_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct VirusTotalResponse {
    #[serde(default)]
    positives: u32,
}

#[async_trait]
impl IntelSource for VirusTotalSource {
    fn name(&self) -> &str {
        "virustotal"
    }

    async fn check(&self, address: &str) -> Result<SourceReport> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("apikey", self.api_key.as_str()), ("resource", address)])
            .send()
            .await
            .map_err(|e| ShieldError::SourceError(format!("virustotal: {}", e)))?;
        let parsed: VirusTotalResponse = response
            .json()
            .await
            .map_err(|e| ShieldError::SourceError(format!("virustotal: {}", e)))?;
        Ok(SourceReport {
            malicious_count: parsed.positives,
            ..Default::default()
        })
    }
}

/// AbuseIPDB-style abuse-confidence source.
pub struct AbuseIpdbSource {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl AbuseIpdbSource {
    pub fn new(endpoint: String, api_key: String) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            api_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AbuseIpdbResponse {
    #[serde(default)]
    data: AbuseIpdbData,
}

#[derive(Debug, Default, Deserialize)]
struct AbuseIpdbData {
    #[serde(default, rename = "abuseConfidencePercentage")]
    abuse_confidence_percentage: f64,
}

#[async_trait]
impl IntelSource for AbuseIpdbSource {
    fn name(&self) -> &str {
        "abuseipdb"
    }

    async fn check(&self, address: &str) -> Result<SourceReport> {
        let response = self
            .client
            .get(&self.endpoint)
            .header("Key", &self.api_key)
            .query(&[("ipAddress", address)])
            .send()
            .await
            .map_err(|e| ShieldError::SourceError(format!("abuseipdb: {}", e)))?;
        let parsed: AbuseIpdbResponse = response
            .json()
            .await
            .map_err(|e| ShieldError::SourceError(format!("abuseipdb: {}", e)))?;
        Ok(SourceReport {
            abuse_confidence: parsed.data.abuse_confidence_percentage,
            ..Default::default()
        })
    }
}

/// OTX-style IOC / malware-family source.
pub struct OtxSource {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl OtxSource {
    pub fn new(endpoint: String, api_key: String) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            api_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OtxResponse {
    #[serde(default)]
    pulse_info: OtxPulseInfo,
}

#[derive(Debug, Default, Deserialize)]
struct OtxPulseInfo {
    #[serde(default)]
    count: u32,
    #[serde(default)]
    related_malware: Vec<String>,
}

#[async_trait]
impl IntelSource for OtxSource {
    fn name(&self) -> &str {
        "otx"
    }

    async fn check(&self, address: &str) -> Result<SourceReport> {
        let url = format!("{}/{}/general", self.endpoint, address);
        let response = self
            .client
            .get(&url)
            .header("X-OTX-API-KEY", &self.api_key)
            .send()
            .await
            .map_err(|e| ShieldError::SourceError(format!("otx: {}", e)))?;
        let parsed: OtxResponse = response
            .json()
            .await
            .map_err(|e| ShieldError::SourceError(format!("otx: {}", e)))?;
        Ok(SourceReport {
            malicious_count: parsed.pulse_info.count,
            malware_families: parsed.pulse_info.related_malware,
            ..Default::default()
        })
    }
}

/// Queries all configured sources concurrently, each under its own
/// timeout. Total lookup latency is bounded by the slowest configured
/// timeout, never by the sum of source latencies; a source timing out
/// or erroring contributes zero and is recorded as unavailable.
pub struct ThreatIntelClient {
    sources: Vec<Box<dyn IntelSource>>,
    timeout: Duration,
}

impl ThreatIntelClient {
    /// Build from config. Sources without an API key are not configured
    /// at all (they would only ever fail).
    pub fn from_config(config: &IntelConfig) -> Option<Self> {
        let mut sources: Vec<Box<dyn IntelSource>> = Vec::new();
        if let Some(key) = &config.virustotal_api_key {
            sources.push(Box::new(VirusTotalSource::new(
                config.virustotal_endpoint.clone(),
                key.clone(),
            )));
        }
        if let Some(key) = &config.abuseipdb_api_key {
            sources.push(Box::new(AbuseIpdbSource::new(
                config.abuseipdb_endpoint.clone(),
                key.clone(),
            )));
        }
        if let Some(key) = &config.otx_api_key {
            sources.push(Box::new(OtxSource::new(
                config.otx_endpoint.clone(),
                key.clone(),
            )));
        }
        if sources.is_empty() {
            return None;
        }
        Some(Self::with_sources(
            sources,
            Duration::from_millis(config.source_timeout_ms),
        ))
    }

    pub fn with_sources(sources: Vec<Box<dyn IntelSource>>, timeout: Duration) -> Self {
        Self { sources, timeout }
    }

    pub async fn lookup(&self, addresses: &[String]) -> ThreatIntel {
        let checks = self.sources.iter().map(|source| {
            let addresses = addresses.to_vec();
            async move {
                let name = source.name().to_string();
                let result =
                    tokio::time::timeout(self.timeout, check_source(source.as_ref(), &addresses))
                        .await;
                match result {
                    Ok(outcome) => (name, outcome),
                    Err(_) => (name, Err(ShieldError::SourceTimeout(source.name().into()))),
                }
            }
        });

        let mut intel = ThreatIntel::default();
        for (name, outcome) in join_all(checks).await {
            match outcome {
                Ok(reports) => {
                    for (address, report) in reports {
                        aggregate(&mut intel, &name, &address, &report);
                    }
                }
                Err(e) => {
                    warn!("Intel source {} unavailable: {}", name, e);
                    intel.unavailable_sources.push(name);
                }
            }
        }

        intel.risk_boost = intel.risk_boost.min(100.0);
        debug!(
            "Intel lookup complete: boost={:.0}, {} families, {} sources unavailable",
            intel.risk_boost,
            intel.malware_families.len(),
            intel.unavailable_sources.len()
        );
        intel
    }
}

/// Run one source over every address. Partial results survive; a source
/// that produced nothing but errors is reported unavailable once.
async fn check_source(
    source: &dyn IntelSource,
    addresses: &[String],
) -> Result<Vec<(String, SourceReport)>> {
    let mut reports = Vec::new();
    let mut last_error = None;
    for address in addresses {
        if address.is_empty() {
            continue;
        }
        match source.check(address).await {
            Ok(report) => reports.push((address.clone(), report)),
            Err(e) => {
                warn!("Intel source {} failed for {}: {}", source.name(), address, e);
                last_error = Some(e);
            }
        }
    }
    match (reports.is_empty(), last_error) {
        (true, Some(e)) => Err(e),
        _ => Ok(reports),
    }
}

fn aggregate(intel: &mut ThreatIntel, source: &str, address: &str, report: &SourceReport) {
    intel.malicious_count += report.malicious_count;
    if report.malicious_count > 0 {
        intel.risk_boost += REPUTATION_HIT_BOOST;
        intel.iocs.push(format!("{}_malicious_{}", source, address));
    }
    if report.abuse_confidence > intel.abuse_confidence {
        intel.abuse_confidence = report.abuse_confidence;
    }
    if report.abuse_confidence > ABUSE_CONFIDENCE_THRESHOLD {
        intel.risk_boost += ABUSE_HIT_BOOST;
        intel.iocs.push(format!("{}_high_confidence_{}", source, address));
    }
    for family in &report.malware_families {
        if !intel.malware_families.contains(family) {
            intel.malware_families.push(family.clone());
        }
    }
}
