//! Error types for supervisor operations

use thiserror::Error;

/// Result type for supervisor operations
pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Error types for supervisor
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Supervisor error: {0}")]
    Supervisor(String),

    #[error("Failed to spawn child process: {0}")]
    Spawn(String),

    /// A child's `create()` failed; carries the reported message
    #[error("Readiness failure: {0}")]
    Readiness(String),

    /// One or more pool members failed readiness; messages in arrival order
    #[error("Worker pool readiness failed: {}", .0.join("; "))]
    PoolReadiness(Vec<String>),

    #[error("Unknown hosted service: {0}")]
    UnknownService(String),

    #[error("Shutdown in progress")]
    ShutdownInProgress,

    #[error(transparent)]
    Core(#[from] corral_core::CorralError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<std::io::Error> for SupervisorError {
    fn from(err: std::io::Error) -> Self {
        SupervisorError::Core(corral_core::CorralError::Io(err))
    }
}
