//! docbridge - relational query building over an aggregation-pipeline document store
//!
//! A `QueryBuilder` collects a relational `QueryDescription`; the
//! `MongoGrammar` compiles it into a `Statement` (an aggregation pipeline
//! for reads, filter and update documents for writes); a `Connection`
//! executes the statement against a `DocumentStore` and the `Processor`
//! shapes the result.
//!
//! ```ignore
//! use std::sync::Arc;
//! use bson::doc;
//! use docbridge::{Connection, InMemoryStore};
//!
//! let connection = Connection::new("app", Arc::new(InMemoryStore::new()));
//! let users = connection.collection("users");
//! users.insert(vec![doc! { "name": "Jane", "age": 20 }])?;
//! let adults = users.clone().where_op("age", ">=", 18).count()?;
//! ```

pub mod builder;
pub mod connection;
pub mod errors;
pub mod grammar;
pub mod observability;
pub mod processor;
pub mod query;
pub mod store;

pub use builder::QueryBuilder;
pub use connection::{
    ConfigError, Connection, ConnectionConfig, Connector, LoggedQuery, QueryError, SchemaBuilder,
};
pub use errors::{Error, Result};
pub use grammar::{GrammarError, MongoGrammar, QueryGrammar, Statement, StatementKind, StatementOutput};
pub use processor::{Processor, Row};
pub use query::{QueryDescription, SortDirection, WhereClause};
pub use store::{DocumentStore, InMemoryStore, MemoryConnector, StoreError};
