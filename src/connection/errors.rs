//! Connection error types

use thiserror::Error;

use crate::grammar::StatementKind;
use crate::store::StoreError;

/// Result type for configuration and connector calls
pub type ConfigResult<T> = Result<T, ConfigError>;

/// A statement that reached the store and failed there.
///
/// Carries the rendered statement and its intent so a caller can report
/// exactly what was sent.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} (statement: {statement})")]
pub struct QueryError {
    pub message: String,
    pub statement: String,
    pub kind: StatementKind,
    #[source]
    pub source: StoreError,
}

impl QueryError {
    pub fn new(statement: &crate::grammar::Statement, source: StoreError) -> Self {
        Self {
            message: source.to_string(),
            statement: statement.describe(),
            kind: statement.kind(),
            source,
        }
    }

    pub fn code(&self) -> &'static str {
        self.source.code()
    }
}

/// Configuration loading and connector failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Cannot read configuration {path}: {message}")]
    Io { path: String, message: String },

    #[error("Cannot parse configuration: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Cannot connect: {0}")]
    Connect(String),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Io { .. } => "DOCBRIDGE_CONFIG_IO",
            ConfigError::Parse(_) => "DOCBRIDGE_CONFIG_PARSE",
            ConfigError::Invalid(_) => "DOCBRIDGE_CONFIG_INVALID",
            ConfigError::Connect(_) => "DOCBRIDGE_CONNECT",
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        ConfigError::Invalid(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Statement;
    use std::error::Error as _;

    #[test]
    fn test_query_error_keeps_statement_and_cause() {
        let statement = Statement::DeleteMany {
            collection: "users".to_string(),
            filter: bson::doc! { "age": 20 },
        };
        let err = QueryError::new(&statement, StoreError::Unavailable("down".into()));

        assert_eq!(err.kind, StatementKind::Delete);
        assert_eq!(err.code(), "STORE_UNAVAILABLE");
        assert!(err.statement.starts_with("users.deleteMany("));
        assert!(err.to_string().contains("Store unavailable: down"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_config_error_codes() {
        assert_eq!(ConfigError::invalid("x").code(), "DOCBRIDGE_CONFIG_INVALID");
        assert_eq!(ConfigError::Parse("x".into()).code(), "DOCBRIDGE_CONFIG_PARSE");
    }
}
