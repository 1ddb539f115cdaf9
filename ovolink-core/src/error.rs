//! Core error types for `ovolink`.

use thiserror::Error;

/// Core error type for `ovolink` operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid data from an API response or a persisted file.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// An external store (statistics, credentials) failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}
