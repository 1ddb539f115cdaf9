//! Store error types.

use ovolink_core::CoreError;
use thiserror::Error;

/// Errors that can occur in the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persisted credentials are missing or unusable.
    #[error("Invalid credentials file: {0}")]
    InvalidCredentials(String),

    /// System keychain failure.
    #[error("Keychain error: {0}")]
    Keychain(String),

    /// Statistics database failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A blocking task panicked or its lock was poisoned.
    #[error("Background task failed: {0}")]
    Task(String),
}

impl StoreError {
    /// Returns true if this is a transient error that might succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Io(_) | StoreError::Task(_))
    }
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Serialization(e) => CoreError::Serialization(e),
            StoreError::Config(msg) => CoreError::InvalidConfig(msg),
            StoreError::InvalidCredentials(msg) => CoreError::InvalidData(msg),
            other => CoreError::Storage(other.to_string()),
        }
    }
}
