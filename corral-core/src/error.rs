//! Error types for corral core operations

/// Result type for corral core operations
pub type Result<T> = std::result::Result<T, CorralError>;

/// Error types shared by every corral process
#[derive(Debug, thiserror::Error)]
pub enum CorralError {
    /// The launch context is contradictory; startup must abort
    #[error("Fatal configuration error: {0}")]
    FatalConfiguration(String),

    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Required bootstrap parameter is missing
    #[error("Missing bootstrap parameter: --{0}")]
    MissingParameter(&'static str),

    /// Message channel failure
    #[error("Channel error: {0}")]
    Channel(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for CorralError {
    fn from(s: String) -> Self {
        CorralError::Other(s)
    }
}

impl From<&str> for CorralError {
    fn from(s: &str) -> Self {
        CorralError::Other(s.to_string())
    }
}

impl From<anyhow::Error> for CorralError {
    fn from(err: anyhow::Error) -> Self {
        CorralError::Other(err.to_string())
    }
}
