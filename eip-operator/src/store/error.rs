//! Store error types.

use thiserror::Error;

use crate::validation::ValidationErrors;

/// Errors that can occur during store operations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Object not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Object already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Version mismatch (optimistic concurrency control).
    #[error("version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u64, actual: u64 },

    /// Spec rejected by admission checks.
    #[error(transparent)]
    Invalid(#[from] ValidationErrors),
}

impl StoreError {
    pub fn is_version_mismatch(&self) -> bool {
        matches!(self, StoreError::VersionMismatch { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
