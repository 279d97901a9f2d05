use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized transaction shape returned by the blockchain-data fetcher.
/// Missing numeric fields deserialize to 0 and missing addresses to ""
/// so extraction never sees absent fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    /// Transfer value in wei.
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub gas: f64,
    /// Gas price in wei.
    #[serde(default, rename = "gasPrice", alias = "gas_price")]
    pub gas_price: f64,
    /// Call payload as a hex string ("0x..." or empty).
    #[serde(default)]
    pub input: String,
    /// Unix timestamp (seconds).
    #[serde(default)]
    pub timestamp: i64,
}

impl Transaction {
    /// Addresses are compared case-insensitively at every boundary.
    pub fn from_lower(&self) -> String {
        self.from.to_lowercase()
    }

    pub fn to_lower(&self) -> String {
        self.to.to_lowercase()
    }
}

/// On-chain contract summary from an external collaborator. Absent info
/// must stay absent: verification and age checks are skipped, never
/// synthesized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractInfo {
    pub is_verified: bool,
    #[serde(default)]
    pub creation_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub transaction_count: u64,
    #[serde(default)]
    pub balance: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Contract {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub source_code: Option<String>,
    #[serde(default)]
    pub info: Option<ContractInfo>,
}

impl Contract {
    pub fn address_lower(&self) -> String {
        self.address.to_lowercase()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UrlData {
    pub url: String,
    #[serde(default)]
    pub content: Option<String>,
    /// TLS certificate validity reported by the transport collaborator;
    /// `None` when no check was performed.
    #[serde(default)]
    pub tls_valid: Option<bool>,
}

/// Everything the engine can analyze, dispatched by tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Entity {
    Transaction(Transaction),
    Contract(Contract),
    Url(UrlData),
}

impl Entity {
    pub fn kind(&self) -> &'static str {
        match self {
            Entity::Transaction(_) => "transaction",
            Entity::Contract(_) => "contract",
            Entity::Url(_) => "url",
        }
    }
}
