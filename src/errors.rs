//! Crate-level error type

use thiserror::Error;

use crate::connection::{ConfigError, QueryError};
use crate::grammar::GrammarError;

/// Result type for builder terminals
pub type Result<T> = std::result::Result<T, Error>;

/// Any failure a builder terminal can report
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Rejected while compiling, before the store was contacted
    #[error("{0}")]
    Grammar(#[from] GrammarError),

    /// Failed in the store
    #[error("{0}")]
    Query(#[from] QueryError),

    #[error("{0}")]
    Config(#[from] ConfigError),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::Grammar(e) => e.code(),
            Error::Query(e) => e.code(),
            Error::Config(e) => e.code(),
        }
    }

    /// Whether the query asked for a construct the grammar rejects
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::Grammar(e) if e.is_unsupported())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_passes_through() {
        let err: Error = GrammarError::unsupported("joins").into();
        assert_eq!(err.code(), "DOCBRIDGE_UNSUPPORTED");
        assert!(err.is_unsupported());
        assert_eq!(err.to_string(), "joins is not supported by the document grammar");

        let err: Error = ConfigError::invalid("no database").into();
        assert_eq!(err.code(), "DOCBRIDGE_CONFIG_INVALID");
        assert!(!err.is_unsupported());
    }
}
