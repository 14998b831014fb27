//! Grammar error types
//!
//! Error codes:
//! - DOCBRIDGE_UNSUPPORTED (relational construct with no document equivalent)
//! - DOCBRIDGE_INVALID_OPERATOR
//! - DOCBRIDGE_INVALID_ARGUMENT
//!
//! Every grammar error is raised before the store is contacted.

use thiserror::Error;

/// Result type for compilation
pub type GrammarResult<T> = Result<T, GrammarError>;

/// Compilation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
    /// Construct that cannot be expressed as a pipeline
    #[error("{construct} is not supported by the document grammar")]
    Unsupported { construct: &'static str },

    /// Operator outside the known vocabulary
    #[error("Invalid operator: {0}")]
    InvalidOperator(String),

    /// Value of the wrong shape for the clause or mutation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl GrammarError {
    /// Create an unsupported construct error
    pub fn unsupported(construct: &'static str) -> Self {
        GrammarError::Unsupported { construct }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        GrammarError::InvalidArgument(reason.into())
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            GrammarError::Unsupported { .. } => "DOCBRIDGE_UNSUPPORTED",
            GrammarError::InvalidOperator(_) => "DOCBRIDGE_INVALID_OPERATOR",
            GrammarError::InvalidArgument(_) => "DOCBRIDGE_INVALID_ARGUMENT",
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, GrammarError::Unsupported { .. })
    }
}
