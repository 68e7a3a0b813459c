use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Upstream error: {0}")]
    Upstream(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl EngineError {
    /// Stable machine-readable code carried on terminal `error` events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation_error",
            Self::Upstream(_) => "upstream_error",
            Self::Storage(_) => "storage_error",
        }
    }
}

impl From<banter_voice::VoiceError> for EngineError {
    fn from(err: banter_voice::VoiceError) -> Self {
        Self::Upstream(err.to_string())
    }
}
