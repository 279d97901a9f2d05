use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use dagshield_core::{
    Contract, ContractInfo, Entity, Result, ThreatDetectionResult, Transaction, UrlData,
};

use crate::analyzer::DetectionEngine;
use crate::config::DetectionConfig;

/// Inbound detection request, tagged by entity type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DetectRequest {
    Transaction {
        data: Transaction,
    },
    Contract {
        address: String,
        #[serde(default)]
        source_code: Option<String>,
        #[serde(default)]
        info: Option<ContractInfo>,
    },
    Url {
        url: String,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        tls_valid: Option<bool>,
    },
}

impl From<DetectRequest> for Entity {
    fn from(request: DetectRequest) -> Self {
        match request {
            DetectRequest::Transaction { data } => Entity::Transaction(data),
            DetectRequest::Contract {
                address,
                source_code,
                info,
            } => Entity::Contract(Contract {
                address,
                source_code,
                info,
            }),
            DetectRequest::Url {
                url,
                content,
                tls_valid,
            } => Entity::Url(UrlData {
                url,
                content,
                tls_valid,
            }),
        }
    }
}

/// JSON-serializable verdict. Internal failures come back as a response
/// with `error` set and a zero verdict, never as a panic or a raw error
/// to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub threat_type: String,
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

impl From<ThreatDetectionResult> for DetectResponse {
    fn from(result: ThreatDetectionResult) -> Self {
        Self {
            error: None,
            threat_type: result.threat_type.as_str().to_string(),
            confidence: result.confidence,
            risk_score: result.risk_score,
            evidence: result.evidence,
            timestamp: result.timestamp,
            transaction_hash: result.transaction_hash,
            contract_address: result.contract_address,
            affected_addresses: result.affected_addresses,
        }
    }
}

impl DetectResponse {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            threat_type: "unknown".to_string(),
            confidence: 0.0,
            risk_score: 0,
            evidence: Vec::new(),
            timestamp: Utc::now(),
            transaction_hash: None,
            contract_address: None,
            affected_addresses: Vec::new(),
        }
    }
}

struct CachedVerdict {
    response: DetectResponse,
    stored_at: Instant,
}

/// Per-caller sliding-window limiter.
struct RateLimiter {
    max_per_minute: usize,
    windows: HashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    fn new(max_per_minute: usize) -> Self {
        Self {
            max_per_minute,
            windows: HashMap::new(),
        }
    }

    fn allow(&mut self, caller: &str) -> bool {
        let now = Instant::now();
        let window = self.windows.entry(caller.to_string()).or_default();
        while let Some(front) = window.front() {
            if now.duration_since(*front) > Duration::from_secs(60) {
                window.pop_front();
            } else {
                break;
            }
        }
        if window.len() >= self.max_per_minute {
            return false;
        }
        window.push_back(now);
        true
    }
}

/// The inbound detection API: dispatch, degradation, result cache, and
/// rate limiting around a `DetectionEngine`.
pub struct DetectionService {
    engine: DetectionEngine,
    deadline: Duration,
    cache_ttl: Duration,
    cache: Mutex<HashMap<String, CachedVerdict>>,
    rate: Mutex<RateLimiter>,
}

impl DetectionService {
    pub fn new(config: DetectionConfig) -> Result<Self> {
        let deadline = Duration::from_millis(config.analysis_deadline_ms);
        let cache_ttl = Duration::from_secs(config.cache_ttl_secs);
        let rate = RateLimiter::new(config.rate_limit_per_minute);
        let engine = DetectionEngine::new(config)?;
        Ok(Self {
            engine,
            deadline,
            cache_ttl,
            cache: Mutex::new(HashMap::new()),
            rate: Mutex::new(rate),
        })
    }

    pub fn from_engine(engine: DetectionEngine, config: &DetectionConfig) -> Self {
        Self {
            engine,
            deadline: Duration::from_millis(config.analysis_deadline_ms),
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
            cache: Mutex::new(HashMap::new()),
            rate: Mutex::new(RateLimiter::new(config.rate_limit_per_minute)),
        }
    }

    pub fn engine(&self) -> &DetectionEngine {
        &self.engine
    }

    pub async fn detect(&self, request: DetectRequest) -> DetectResponse {
        self.detect_for("anonymous", request).await
    }

    pub async fn detect_for(&self, caller: &str, request: DetectRequest) -> DetectResponse {
        let request_id = Uuid::new_v4();

        if !self.allow(caller) {
            warn!("Rate limit exceeded for caller {}", caller);
            return DetectResponse::error("rate limit exceeded");
        }

        let cache_key = serde_json::to_string(&request).ok();
        if let Some(cached) = cache_key.as_deref().and_then(|key| self.cached(key)) {
            debug!("request {}: cache hit", request_id);
            return cached;
        }

        let entity: Entity = request.into();
        debug!("request {}: analyzing {}", request_id, entity.kind());

        let response = match tokio::time::timeout(self.deadline, self.engine.analyze(&entity)).await
        {
            Ok(Ok(result)) => DetectResponse::from(result),
            Ok(Err(e)) => {
                warn!("request {}: analysis failed: {}", request_id, e);
                DetectResponse::error(e.to_string())
            }
            Err(_) => {
                warn!("request {}: analysis deadline exceeded", request_id);
                DetectResponse::error("analysis deadline exceeded")
            }
        };

        if response.error.is_none() {
            if let Some(key) = cache_key {
                self.store(key, response.clone());
            }
        }
        response
    }

    fn allow(&self, caller: &str) -> bool {
        self.rate
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .allow(caller)
    }

    fn cached(&self, key: &str) -> Option<DetectResponse> {
        let cache = self
            .cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        cache.get(key).and_then(|entry| {
            (entry.stored_at.elapsed() < self.cache_ttl).then(|| entry.response.clone())
        })
    }

    fn store(&self, key: String, response: DetectResponse) {
        let mut cache = self
            .cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        cache.insert(
            key,
            CachedVerdict {
                response,
                stored_at: Instant::now(),
            },
        );
    }
}
