//! Error types for depot-sync.

use thiserror::Error;

use depot_core::{RepositoryId, StoreError};

/// A failed call to the backend content service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed for repository {repository}: {message}")]
pub struct BackendError {
    pub operation: String,
    pub repository: RepositoryId,
    pub message: String,
}

impl BackendError {
    pub fn new(
        operation: impl Into<String>,
        repository: RepositoryId,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            repository,
            message: message.into(),
        }
    }
}

/// All errors that can arise from sync, removal and version operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A precondition or usage violation. Raised before any side effect.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The backend content service reported a failure.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// An error from the local store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub(crate) fn validation(message: impl Into<String>) -> SyncError {
    SyncError::Validation(message.into())
}
