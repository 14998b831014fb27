//! Store error types

use thiserror::Error;

/// Result type for store calls
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures reported by a document store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A document with the same `_id` already exists
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Query or expression operator the store does not evaluate
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// Pipeline stage the store does not run
    #[error("Unsupported pipeline stage: {0}")]
    UnsupportedStage(String),

    /// Malformed filter, update or stage document
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Operand of the wrong type
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// Store could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::DuplicateKey(_) => "STORE_DUPLICATE_KEY",
            StoreError::UnsupportedOperator(_) => "STORE_UNSUPPORTED_OPERATOR",
            StoreError::UnsupportedStage(_) => "STORE_UNSUPPORTED_STAGE",
            StoreError::InvalidDocument(_) => "STORE_INVALID_DOCUMENT",
            StoreError::TypeMismatch(_) => "STORE_TYPE_MISMATCH",
            StoreError::Unavailable(_) => "STORE_UNAVAILABLE",
            StoreError::Internal(_) => "STORE_INTERNAL",
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        StoreError::InvalidDocument(reason.into())
    }
}
