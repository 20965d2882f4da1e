/*
    errors.rs - Error taxonomy of the domain engine

    Every variant renders to the text a client sees: domain failures travel
    over the normal response channel as plain payloads, not as a separate
    error frame.
*/

use thiserror::Error;

use crate::core_store::store::{StoreError, ValidationError};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Missing, malformed or expired session token, or bad credentials
    #[error("AuthError: {0}")]
    Authentication(String),

    /// Malformed or out-of-bound arguments
    #[error("{0}")]
    Validation(String),

    /// Unknown post or user
    #[error("{0} not found")]
    NotFound(String),

    /// Caller may not perform this operation
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Unparseable frame or I/O failure on the command channel
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// External conversion service unavailable
    #[error("Conversion service not available: {0}")]
    TransientExternal(String),

    /// Store failure (poisoned lock and the like)
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => EngineError::NotFound(what),
            StoreError::AlreadyExists(what) => EngineError::Validation(format!("{} is already taken", what)),
            StoreError::Validation(msg) => EngineError::Validation(msg),
            other => EngineError::Internal(other.to_string()),
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendered_text() {
        assert_eq!(
            EngineError::NotFound("Post 7".to_string()).to_string(),
            "Post 7 not found"
        );
        assert_eq!(
            EngineError::Authentication("invalid session".to_string()).to_string(),
            "AuthError: invalid session"
        );
    }

    #[test]
    fn test_store_error_mapping() {
        let err: EngineError = StoreError::AlreadyExists("username 'bob'".to_string()).into();
        assert!(matches!(err, EngineError::Validation(_)));

        let err: EngineError = StoreError::Internal("Lock poisoned".to_string()).into();
        assert!(matches!(err, EngineError::Internal(_)));
    }
}
