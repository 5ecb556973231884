use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfilerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection not configured: {id}")]
    UnknownConnection { id: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProfilerError {
    /// Short error code string, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            ProfilerError::Config(_) => "CONFIG_ERROR",
            ProfilerError::UnknownConnection { .. } => "UNKNOWN_CONNECTION",
            ProfilerError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ProfilerError>;
