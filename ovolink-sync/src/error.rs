//! Sync error types.

use std::sync::Arc;

use ovolink_core::CoreError;
use ovolink_fetch::{ErrorKind, FetchError};
use ovolink_store::StoreError;
use thiserror::Error;

/// Errors of a poll cycle or of service setup.
///
/// Cloneable so one in-flight poll result can be handed to every waiter.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// Authentication, transport or API failure.
    #[error(transparent)]
    Fetch(Arc<FetchError>),

    /// Statistics or credential storage failure.
    #[error("Storage error: {0}")]
    Storage(Arc<CoreError>),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The poll task ended without a result.
    #[error("Poll task failed: {0}")]
    Task(String),
}

impl SyncError {
    /// Error class of the underlying fetch failure, if any.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            SyncError::Fetch(e) => Some(e.kind()),
            _ => None,
        }
    }

    /// Returns true if the user has to authenticate again.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, SyncError::Fetch(e) if e.requires_reauth())
    }

    /// Returns true if the next scheduled cycle may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Fetch(e) if e.is_transient())
    }
}

impl From<FetchError> for SyncError {
    fn from(e: FetchError) -> Self {
        SyncError::Fetch(Arc::new(e))
    }
}

impl From<CoreError> for SyncError {
    fn from(e: CoreError) -> Self {
        SyncError::Storage(Arc::new(e))
    }
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Config(msg) => SyncError::Config(msg),
            other => SyncError::Storage(Arc::new(other.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_passes_through() {
        let err = SyncError::from(FetchError::RefreshRejected);
        assert_eq!(err.kind(), Some(ErrorKind::Authentication));
        assert!(err.requires_reauth());
        assert!(!err.is_transient());

        let err = SyncError::from(FetchError::Internal("reset".into()));
        assert!(err.is_transient());

        let err = SyncError::from(StoreError::Config("bad zone".into()));
        assert!(matches!(err, SyncError::Config(_)));
        assert_eq!(err.kind(), None);
    }

    #[test]
    fn test_clone_shares_source() {
        let err = SyncError::from(FetchError::GraphQl(vec!["boom".into()]));
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
    }
}
