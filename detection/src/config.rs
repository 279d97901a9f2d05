use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Engine-wide configuration. Plain data with defaults; builders cover the
/// knobs that change between deployments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Path to the trained model bundle (scaler + outlier model +
    /// classifier, paired by version). Missing file means the ML
    /// detectors report `Unavailable`; a malformed or mismatched bundle
    /// is a fatal configuration error.
    pub model_path: PathBuf,

    pub intel: IntelConfig,

    /// Upper bound on one full analysis, external lookups included.
    pub analysis_deadline_ms: u64,

    /// TTL for cached verdicts in the service facade.
    pub cache_ttl_secs: u64,

    /// Per-caller request budget per sliding minute.
    pub rate_limit_per_minute: usize,

    /// Known-bad feed URLs (JSON array, JSON object keys, or newline text).
    pub known_bad_feeds: Vec<String>,

    /// Allowlist used by the URL typosquat heuristic.
    pub legitimate_domains: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntelConfig {
    pub virustotal_endpoint: String,
    pub virustotal_api_key: Option<String>,

    pub abuseipdb_endpoint: String,
    pub abuseipdb_api_key: Option<String>,

    pub otx_endpoint: String,
    pub otx_api_key: Option<String>,

    /// Per-source timeout. A source exceeding it contributes nothing to
    /// the aggregate and is recorded as unavailable.
    pub source_timeout_ms: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/threat_models.json"),
            intel: IntelConfig::default(),
            analysis_deadline_ms: 10_000,
            cache_ttl_secs: 300,
            rate_limit_per_minute: 60,
            known_bad_feeds: vec![
                "https://raw.githubusercontent.com/MyEtherWallet/ethereum-lists/master/src/addresses/addresses-darklist.json".to_string(),
                "https://raw.githubusercontent.com/CryptoScamDB/blacklist/master/addresses.txt".to_string(),
            ],
            legitimate_domains: vec![
                "metamask.io".to_string(),
                "uniswap.org".to_string(),
                "opensea.io".to_string(),
                "ethereum.org".to_string(),
            ],
        }
    }
}

impl Default for IntelConfig {
    fn default() -> Self {
        Self {
            virustotal_endpoint: "https://www.virustotal.com/vtapi/v2/url/report".to_string(),
            virustotal_api_key: None,
            abuseipdb_endpoint: "https://api.abuseipdb.com/api/v2/check".to_string(),
            abuseipdb_api_key: None,
            otx_endpoint: "https://otx.alienvault.com/api/v1/indicators".to_string(),
            otx_api_key: None,
            source_timeout_ms: 3_000,
        }
    }
}

impl DetectionConfig {
    pub fn new(model_path: PathBuf) -> Self {
        Self {
            model_path,
            ..Default::default()
        }
    }

    pub fn with_deadline_ms(mut self, deadline_ms: u64) -> Self {
        self.analysis_deadline_ms = deadline_ms;
        self
    }

    pub fn with_intel(mut self, intel: IntelConfig) -> Self {
        self.intel = intel;
        self
    }

    pub fn with_rate_limit(mut self, per_minute: usize) -> Self {
        self.rate_limit_per_minute = per_minute;
        self
    }

    pub fn with_known_bad_feeds(mut self, feeds: Vec<String>) -> Self {
        self.known_bad_feeds = feeds;
        self
    }
}

impl IntelConfig {
    pub fn with_source_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.source_timeout_ms = timeout_ms;
        self
    }

    /// True when at least one source has credentials.
    pub fn any_source_configured(&self) -> bool {
        self.virustotal_api_key.is_some()
            || self.abuseipdb_api_key.is_some()
            || self.otx_api_key.is_some()
    }
}
