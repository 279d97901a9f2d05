pub mod analyzer;
pub mod anomaly;
pub mod classifier;
pub mod config;
pub mod features;
pub mod fusion;
pub mod intel;
pub mod knownbad;
pub mod model;
pub mod patterns;
pub mod service;
pub mod threat_patterns; // Curated rule tables (data, not algorithm)
pub mod url_analysis;

pub use analyzer::DetectionEngine;
pub use anomaly::AnomalyDetector;
pub use classifier::ThreatClassifier;
pub use config::{DetectionConfig, IntelConfig};
pub use features::{FeatureExtractor, FeatureVector};
pub use fusion::{FusionContext, FusionEngine, FusionWeights};
pub use intel::{IntelSource, SourceReport, ThreatIntel, ThreatIntelClient};
pub use knownbad::{KnownBadRefresher, KnownBadSet, KnownBadStore};
pub use model::{ClassifierModel, FeatureScaler, ModelBundle, ModelStore, OutlierModel};
pub use patterns::{PatternMatcher, PatternMatches, PATTERN_CATEGORY_COUNT};
pub use service::{DetectRequest, DetectResponse, DetectionService};
pub use threat_patterns::{load_threat_patterns, ThreatPatterns};
pub use url_analysis::UrlAnalyzer;
