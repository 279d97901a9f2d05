use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShieldError {
    #[error("Feature extraction error: {0}")]
    Feature(String),

    #[error("Detector unavailable: {0}")]
    DetectorUnavailable(String),

    #[error("Intel source timed out: {0}")]
    SourceTimeout(String),

    #[error("Intel source error: {0}")]
    SourceError(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ShieldError {
    /// Soft failures degrade a single detector or intel source.
    /// Everything else aborts the operation that raised it.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            ShieldError::DetectorUnavailable(_)
                | ShieldError::SourceTimeout(_)
                | ShieldError::SourceError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ShieldError>;
