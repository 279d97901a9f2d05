//! Curated threat pattern tables.
//!
//! Rule data compiled from:
//! - Community-reported phishing domain campaigns
//! - Common scam/drainer contract idioms
//! - Honeypot token indicator lists
//!
//! The tables are data, not algorithm: the matcher in `patterns.rs` and
//! the URL analyzer consume them without caring where entries came from.

use regex::Regex;

use dagshield_core::{Result, ShieldError};

/// Domain patterns that impersonate well-known Web3 properties on
/// throwaway TLDs.
const PHISHING_DOMAIN_PATTERNS: &[&str] = &[
    r".*metamask.*\.tk$",
    r".*uniswap.*\.ml$",
    r".*pancakeswap.*\.ga$",
    r".*opensea.*\.cf$",
    r".*ethereum.*\.tk$",
];

const SCAM_KEYWORDS: &[&str] = &[
    "free tokens",
    "guaranteed profit",
    "double your crypto",
    "exclusive airdrop",
    "limited time offer",
    "risk-free investment",
    "get rich quick",
    "insider trading",
    "pump and dump",
];

const URGENCY_PHRASES: &[&str] = &["limited time", "act now", "expires soon", "hurry up"];

/// ERC-20 function selectors abused by approval/transfer drainers.
const SCAM_SELECTORS: &[&str] = &["0xa9059cbb", "0x23b872dd", "0x095ea7b3"];

/// Vanity suffixes common in burner/bait addresses.
const SUSPICIOUS_ADDRESS_SUFFIXES: &[&str] = &["dead", "beef"];

/// Named regex checks over contract source.
const CONTRACT_RISK_PATTERNS: &[(&str, &str)] = &[
    ("selfdestruct", r"selfdestruct\s*\("),
    ("delegatecall", r"delegatecall\s*\("),
    (
        "owner_only_withdraw",
        r"function\s+withdraw\s*\([^)]*\)\s*external\s+onlyOwner",
    ),
    ("inline_assembly", r"assembly\s*\{"),
];

const HONEYPOT_INDICATORS: &[&str] = &[
    "transfer fee > 50%",
    "max transaction limit < 1%",
    "blacklist function present",
    "ownership not renounced",
];

const SUSPICIOUS_TLDS: &[&str] = &[".tk", ".ml", ".ga", ".cf", ".click", ".download"];

/// Compiled pattern battery shared by the pattern matcher and the URL
/// analyzer. Loaded once at engine startup; compilation failure is a
/// configuration error.
#[derive(Debug)]
pub struct ThreatPatterns {
    pub phishing_domains: Vec<Regex>,
    pub scam_keywords: Vec<&'static str>,
    pub urgency_phrases: Vec<&'static str>,
    pub scam_selectors: Vec<&'static str>,
    pub suspicious_address_suffixes: Vec<&'static str>,
    pub contract_risk: Vec<(&'static str, Regex)>,
    pub honeypot_indicators: Vec<&'static str>,
    pub suspicious_tlds: Vec<&'static str>,
}

/// Compile the threat pattern tables.
pub fn load_threat_patterns() -> Result<ThreatPatterns> {
    let phishing_domains = PHISHING_DOMAIN_PATTERNS
        .iter()
        .map(|p| compile(p))
        .collect::<Result<Vec<_>>>()?;

    let contract_risk = CONTRACT_RISK_PATTERNS
        .iter()
        .map(|(name, p)| compile(p).map(|re| (*name, re)))
        .collect::<Result<Vec<_>>>()?;

    tracing::info!(
        "📊 Threat patterns loaded: {} domain, {} contract, {} keyword rules",
        phishing_domains.len(),
        contract_risk.len(),
        SCAM_KEYWORDS.len()
    );

    Ok(ThreatPatterns {
        phishing_domains,
        scam_keywords: SCAM_KEYWORDS.to_vec(),
        urgency_phrases: URGENCY_PHRASES.to_vec(),
        scam_selectors: SCAM_SELECTORS.to_vec(),
        suspicious_address_suffixes: SUSPICIOUS_ADDRESS_SUFFIXES.to_vec(),
        contract_risk,
        honeypot_indicators: HONEYPOT_INDICATORS.to_vec(),
        suspicious_tlds: SUSPICIOUS_TLDS.to_vec(),
    })
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("(?i){}", pattern))
        .map_err(|e| ShieldError::Configuration(format!("bad pattern {:?}: {}", pattern, e)))
}
