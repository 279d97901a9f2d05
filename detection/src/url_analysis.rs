use std::sync::Arc;
use tracing::debug;

use dagshield_core::{Confidence, ThreatCategory, ThreatDetectionResult, UrlData};

use crate::threat_patterns::ThreatPatterns;

/// Score a phishing-domain regex hit contributes.
const PHISHING_DOMAIN_SCORE: f64 = 0.8;
/// Score a suspicious TLD contributes.
const SUSPICIOUS_TLD_SCORE: f64 = 0.6;
/// Score a typosquat of a legitimate domain contributes.
const TYPOSQUAT_SCORE: f64 = 0.7;

const SCAM_KEYWORD_SCORE: f64 = 0.1;
const URGENCY_PHRASE_SCORE: f64 = 0.15;

const MISSING_HTTPS_SCORE: f64 = 0.3;
const INVALID_TLS_SCORE: f64 = 0.4;

/// Verdict threshold: above it the URL is phishing, below it the
/// catch-all social-engineering bucket at reduced confidence.
const PHISHING_THRESHOLD: f64 = 0.8;

/// URL analyzer: no feature vector or ML path. Three sub-scores
/// (domain, content, transport) averaged with equal weight, with one
/// short-circuit: a domain score at the phishing-regex tier (>= 0.8)
/// yields a phishing verdict at that score even when page content was
/// never fetched.
pub struct UrlAnalyzer {
    patterns: Arc<ThreatPatterns>,
    legitimate_domains: Vec<String>,
}

impl UrlAnalyzer {
    pub fn new(patterns: Arc<ThreatPatterns>, legitimate_domains: Vec<String>) -> Self {
        Self {
            patterns,
            legitimate_domains,
        }
    }

    pub fn analyze(&self, url_data: &UrlData) -> ThreatDetectionResult {
        let url = url_data.url.to_lowercase();

        let domain_score = self.domain_score(&url);
        let content_score = self.content_score(url_data.content.as_deref());
        let security_score = self.security_score(&url, url_data.tls_valid);

        let total = (domain_score + content_score + security_score) / 3.0;

        let (category, confidence) = if domain_score >= PHISHING_THRESHOLD {
            (ThreatCategory::Phishing, Confidence::new(domain_score))
        } else if total > PHISHING_THRESHOLD {
            (ThreatCategory::Phishing, Confidence::new(total))
        } else {
            (
                ThreatCategory::SocialEngineering,
                Confidence::new(total * 0.6),
            )
        };

        debug!(
            "URL analysis: domain={:.2} content={:.2} security={:.2} -> {} ({:.2})",
            domain_score,
            content_score,
            security_score,
            category.as_str(),
            confidence.value()
        );

        ThreatDetectionResult::new(
            category,
            confidence,
            vec![
                format!("Domain analysis: {:.2}", domain_score),
                format!("Content analysis: {:.2}", content_score),
                format!("Security analysis: {:.2}", security_score),
            ],
        )
    }

    fn domain_score(&self, url: &str) -> f64 {
        let mut score = 0.0;

        if self
            .patterns
            .phishing_domains
            .iter()
            .any(|re| re.is_match(url))
        {
            score += PHISHING_DOMAIN_SCORE;
        }

        if self
            .patterns
            .suspicious_tlds
            .iter()
            .any(|tld| url.ends_with(tld))
        {
            score += SUSPICIOUS_TLD_SCORE;
        }

        for domain in &self.legitimate_domains {
            let squashed = domain.replace('.', "");
            if url.contains(&squashed) && !url.contains(domain.as_str()) {
                score += TYPOSQUAT_SCORE;
                break;
            }
        }

        score.min(1.0)
    }

    fn content_score(&self, content: Option<&str>) -> f64 {
        let Some(content) = content else { return 0.0 };
        let content = content.to_lowercase();
        let mut score = 0.0;

        for keyword in &self.patterns.scam_keywords {
            if content.contains(keyword) {
                score += SCAM_KEYWORD_SCORE;
            }
        }
        for phrase in &self.patterns.urgency_phrases {
            if content.contains(phrase) {
                score += URGENCY_PHRASE_SCORE;
            }
        }

        score.min(1.0)
    }

    fn security_score(&self, url: &str, tls_valid: Option<bool>) -> f64 {
        let mut score = 0.0;
        if !url.starts_with("https://") {
            score += MISSING_HTTPS_SCORE;
        }
        if tls_valid == Some(false) {
            score += INVALID_TLS_SCORE;
        }
        score.min(1.0)
    }
}
