//! Connection dispatch
//!
//! Executes compiled statements against store handles, with read/write
//! handle selection, dry-run capture, a query log and counters.
//!
//! Bootstrapping a store from configuration goes through `Connector`;
//! schema and index management is delegated to a `SchemaBuilder` the
//! caller attaches.

mod config;
mod connection;
mod errors;
mod query_log;

use std::sync::Arc;

use bson::Document;

pub use config::{ConnectionConfig, HostList, ReadOverride};
pub use connection::Connection;
pub use errors::{ConfigError, ConfigResult, QueryError};
pub use query_log::{LoggedQuery, QueryLog};

use crate::store::{DocumentStore, StoreResult};

/// Opens a store handle for a configuration
pub trait Connector: Send + Sync {
    fn connect(&self, config: &ConnectionConfig) -> ConfigResult<Arc<dyn DocumentStore>>;
}

/// Schema and index management, implemented outside this crate
pub trait SchemaBuilder: Send + Sync {
    fn has_collection(&self, collection: &str) -> StoreResult<bool>;

    fn create_collection(&self, collection: &str) -> StoreResult<()>;

    fn drop_collection(&self, collection: &str) -> StoreResult<()>;

    /// Create an index over `keys`, e.g. `{ "email": 1 }`
    fn create_index(&self, collection: &str, keys: Document, unique: bool) -> StoreResult<()>;
}
