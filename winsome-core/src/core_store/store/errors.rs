/*
    errors.rs - Error types for the store subsystem

    Defines all error types that can occur in:
    - Entity lookups and registration
    - Text validation
    - Snapshot persistence
*/

use thiserror::Error;

/// Errors that can occur in the store subsystem
#[derive(Debug, Error)]
pub enum StoreError {
    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique key already taken
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Validation failed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Storage I/O error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Corrupted data detected while restoring
    #[error("Corrupted data: {0}")]
    CorruptedData(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Validation-specific errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Text outside the accepted length range
    #[error("{field} must be between {min} and {max} characters (got {actual})")]
    Length {
        field: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    },

    /// Invalid field value
    #[error("Invalid field value: {field} - {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl From<ValidationError> for StoreError {
    fn from(err: ValidationError) -> Self {
        StoreError::Validation(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Helper to convert poison errors into StoreError
pub(crate) fn handle_poison<T>(_err: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Internal("Lock poisoned: a thread panicked while holding the lock".to_string())
}
