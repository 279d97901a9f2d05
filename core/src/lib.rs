pub mod entity;
pub mod error;
pub mod types;

pub use entity::{Contract, ContractInfo, Entity, Transaction, UrlData};
pub use error::{Result, ShieldError};
pub use types::{Confidence, DetectorSignal, ThreatCategory, ThreatDetectionResult};
