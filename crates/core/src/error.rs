//! Error types for the satchel core crate.

use thiserror::Error;

/// Top-level error type for all satchel core operations.
#[derive(Debug, Error)]
pub enum SatchelError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("not authenticated: no remote configuration present")]
    NotAuthenticated,

    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("reconciliation error: {0}")]
    Reconciliation(String),

    #[error("sync error: {0}")]
    Sync(String),
}

impl From<reqwest::Error> for SatchelError {
    fn from(e: reqwest::Error) -> Self {
        SatchelError::Transport(e.to_string())
    }
}

impl SatchelError {
    /// True for failures of the network call itself (as opposed to payload or store errors).
    pub fn is_transport(&self) -> bool {
        matches!(self, SatchelError::Transport(_))
    }
}

/// A convenience Result alias that defaults to [`SatchelError`].
pub type Result<T> = std::result::Result<T, SatchelError>;
