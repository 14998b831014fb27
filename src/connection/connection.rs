//! Statement dispatch
//!
//! A `Connection` owns the store handles a statement may run against and
//! is the only place a statement is executed. Every execution goes through
//! `run`, which times it, logs it, counts it and wraps store failures in a
//! `QueryError`. Nothing here retries or caches.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bson::Document;
use tracing::{debug, info, warn};

use super::config::ConnectionConfig;
use super::errors::{ConfigResult, QueryError};
use super::query_log::{LoggedQuery, QueryLog};
use super::{Connector, SchemaBuilder};
use crate::builder::QueryBuilder;
use crate::grammar::{GrammarError, GrammarResult, MongoGrammar, Statement, StatementOutput};
use crate::observability::MetricsRegistry;
use crate::processor::Processor;
use crate::store::{DocumentStore, StoreResult};

const DRIVER_NAME: &str = "mongodb";

/// A named connection to one database
pub struct Connection {
    name: String,
    database: String,
    write: Arc<dyn DocumentStore>,
    read: Option<Arc<dyn DocumentStore>>,
    grammar: MongoGrammar,
    processor: Processor,
    pretending: AtomicBool,
    records_modified: AtomicBool,
    query_log: QueryLog,
    metrics: Arc<MetricsRegistry>,
    schema: Option<Arc<dyn SchemaBuilder>>,
    config: Option<ConnectionConfig>,
}

impl Connection {
    /// Connection over a single store handle used for reads and writes
    pub fn new(database: impl Into<String>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            name: DRIVER_NAME.to_string(),
            database: database.into(),
            write: store,
            read: None,
            grammar: MongoGrammar::new(),
            processor: Processor::new(),
            pretending: AtomicBool::new(false),
            records_modified: AtomicBool::new(false),
            query_log: QueryLog::new(),
            metrics: Arc::new(MetricsRegistry::new()),
            schema: None,
            config: None,
        }
    }

    /// Build from configuration, connecting the write handle and, when
    /// configured, a separate read handle
    pub fn from_config(config: ConnectionConfig, connector: &dyn Connector) -> ConfigResult<Self> {
        config.validate()?;
        let write = connector.connect(&config)?;
        let read = match config.read_config() {
            Some(read_config) => Some(connector.connect(&read_config)?),
            None => None,
        };

        info!(
            event = "CONNECTION_OPENED",
            connection = %config.name,
            database = %config.database,
            read_split = read.is_some(),
            "connection opened"
        );

        let mut connection = Self::new(config.database.clone(), write).named(config.name.clone());
        connection.read = read;
        connection.config = Some(config);
        Ok(connection)
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Use a separate handle for reads
    pub fn with_read_client(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.read = Some(store);
        self
    }

    pub fn with_schema_builder(mut self, schema: Arc<dyn SchemaBuilder>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn set_client(&mut self, store: Arc<dyn DocumentStore>) {
        self.write = store;
    }

    pub fn set_read_client(&mut self, store: Option<Arc<dyn DocumentStore>>) {
        self.read = store;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database_name(&self) -> &str {
        &self.database
    }

    pub fn driver_name(&self) -> &'static str {
        DRIVER_NAME
    }

    pub fn config(&self) -> Option<&ConnectionConfig> {
        self.config.as_ref()
    }

    pub fn grammar(&self) -> &MongoGrammar {
        &self.grammar
    }

    pub fn processor(&self) -> &Processor {
        &self.processor
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// Start a builder over a collection
    pub fn collection(&self, name: impl Into<String>) -> QueryBuilder<'_> {
        QueryBuilder::new(self).from(name)
    }

    /// Same as `collection`
    pub fn table(&self, name: impl Into<String>) -> QueryBuilder<'_> {
        self.collection(name)
    }

    /// Builder with no collection yet; set one with `from`
    pub fn query(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(self)
    }

    /// Run a read and return its documents.
    ///
    /// The handle is resolved once for the whole call.
    pub fn select(
        &self,
        statement: &Statement,
        use_read_client: bool,
    ) -> Result<Vec<Document>, QueryError> {
        if self.pretend_statement(statement) {
            return Ok(Vec::new());
        }
        let store = self.handle(use_read_client);
        let rows = self
            .run(statement, || statement.execute(store.as_ref()))?
            .into_rows();

        self.metrics.increment_selects();
        self.metrics.add_documents_returned(rows.len() as u64);
        Ok(rows)
    }

    /// Run a write and return its raw output
    pub fn statement(&self, statement: &Statement) -> Result<StatementOutput, QueryError> {
        if self.pretend_statement(statement) {
            return Ok(StatementOutput::Acknowledged(true));
        }
        let output = self.run(statement, || statement.execute(self.write.as_ref()))?;
        self.metrics.increment_writes();
        self.records_have_been_modified(true);
        Ok(output)
    }

    /// Run a write and return the number of documents it changed
    pub fn affecting_statement(&self, statement: &Statement) -> Result<u64, QueryError> {
        if self.pretend_statement(statement) {
            return Ok(0);
        }
        let count = self
            .run(statement, || statement.execute(self.write.as_ref()))?
            .count();
        self.metrics.increment_writes();
        self.metrics.add_documents_affected(count);
        self.records_have_been_modified(count > 0);
        Ok(count)
    }

    /// Run an insert
    pub fn insert(&self, statement: &Statement) -> Result<StatementOutput, QueryError> {
        self.statement(statement)
    }

    /// Run `callback` without touching the store and return every statement
    /// it would have executed.
    ///
    /// The callback receives a dry-run view of this connection: same name,
    /// handles and counters, but its own pretend flag and query log. Work
    /// issued through `self` meanwhile, from this or any other thread,
    /// still runs for real.
    pub fn pretend<F>(&self, callback: F) -> crate::Result<Vec<LoggedQuery>>
    where
        F: FnOnce(&Connection) -> crate::Result<()>,
    {
        let view = self.dry_run_view();
        callback(&view)?;
        Ok(view.query_log.take())
    }

    fn dry_run_view(&self) -> Connection {
        Connection {
            name: self.name.clone(),
            database: self.database.clone(),
            write: Arc::clone(&self.write),
            read: self.read.clone(),
            grammar: self.grammar,
            processor: self.processor,
            pretending: AtomicBool::new(true),
            records_modified: AtomicBool::new(false),
            query_log: QueryLog::enabled(),
            metrics: Arc::clone(&self.metrics),
            schema: self.schema.clone(),
            config: self.config.clone(),
        }
    }

    pub fn pretending(&self) -> bool {
        self.pretending.load(Ordering::SeqCst)
    }

    pub fn enable_query_log(&self) {
        self.query_log.enable();
    }

    pub fn disable_query_log(&self) {
        self.query_log.disable();
    }

    pub fn logging(&self) -> bool {
        self.query_log.is_enabled()
    }

    pub fn query_log(&self) -> Vec<LoggedQuery> {
        self.query_log.entries()
    }

    pub fn flush_query_log(&self) {
        self.query_log.flush();
    }

    /// Mark records modified. Once set, the flag stays set until reset.
    pub fn records_have_been_modified(&self, modified: bool) {
        if modified {
            self.records_modified.store(true, Ordering::SeqCst);
        }
    }

    pub fn has_modified_records(&self) -> bool {
        self.records_modified.load(Ordering::SeqCst)
    }

    pub fn reset_records_modified(&self) {
        self.records_modified.store(false, Ordering::SeqCst);
    }

    /// Delegated schema management
    pub fn schema_builder(&self) -> GrammarResult<Arc<dyn SchemaBuilder>> {
        self.schema
            .clone()
            .ok_or_else(|| GrammarError::unsupported("schema builder"))
    }

    /// Transactions need savepoints, which the grammar does not support
    pub fn begin_transaction(&self) -> GrammarResult<()> {
        Err(GrammarError::unsupported("transactions"))
    }

    fn handle(&self, use_read_client: bool) -> Arc<dyn DocumentStore> {
        match (&self.read, use_read_client) {
            (Some(read), true) => Arc::clone(read),
            _ => Arc::clone(&self.write),
        }
    }

    /// Log a statement instead of running it when pretending
    fn pretend_statement(&self, statement: &Statement) -> bool {
        if !self.pretending() {
            return false;
        }
        self.metrics.increment_statements_pretended();
        debug!(
            event = "QUERY_PRETENDED",
            connection = %self.name,
            kind = %statement.kind(),
            collection = statement.collection(),
            "statement captured"
        );
        self.query_log
            .record(LoggedQuery::new(statement, 0.0, true));
        true
    }

    fn run<F>(&self, statement: &Statement, execute: F) -> Result<StatementOutput, QueryError>
    where
        F: FnOnce() -> StoreResult<StatementOutput>,
    {
        let start = Instant::now();
        let result = execute();
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(output) => {
                self.metrics.increment_statements_executed();
                info!(
                    event = "QUERY_EXECUTED",
                    connection = %self.name,
                    kind = %statement.kind(),
                    collection = statement.collection(),
                    elapsed_ms,
                    "statement executed"
                );
                self.query_log
                    .record(LoggedQuery::new(statement, elapsed_ms, false));
                Ok(output)
            }
            Err(source) => {
                self.metrics.increment_statements_failed();
                warn!(
                    event = "QUERY_FAILED",
                    connection = %self.name,
                    kind = %statement.kind(),
                    collection = statement.collection(),
                    code = source.code(),
                    error = %source,
                    elapsed_ms,
                    "statement failed"
                );
                Err(QueryError::new(statement, source))
            }
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("database", &self.database)
            .field("read_split", &self.read.is_some())
            .field("pretending", &self.pretending())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{Pipeline, Stage};
    use crate::query::PipelineOptions;
    use crate::store::InMemoryStore;
    use bson::doc;

    fn seeded() -> (Arc<InMemoryStore>, Connection) {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert_many("users", vec![doc! { "name": "Jane" }, doc! { "name": "John" }])
            .unwrap();
        let connection = Connection::new("app", store.clone());
        (store, connection)
    }

    fn select_users() -> Statement {
        Statement::Aggregate {
            collection: "users".to_string(),
            pipeline: Pipeline::new(),
            options: PipelineOptions::default(),
        }
    }

    #[test]
    fn test_select_counts_rows() {
        let (_, connection) = seeded();
        let rows = connection.select(&select_users(), true).unwrap();
        assert_eq!(rows.len(), 2);

        let snapshot = connection.metrics().snapshot();
        assert_eq!(snapshot.selects, 1);
        assert_eq!(snapshot.documents_returned, 2);
        assert!(!connection.has_modified_records());
    }

    #[test]
    fn test_affecting_statement_marks_modified_only_when_changed() {
        let (_, connection) = seeded();
        let miss = Statement::DeleteMany {
            collection: "users".to_string(),
            filter: doc! { "name": "Nobody" },
        };
        assert_eq!(connection.affecting_statement(&miss).unwrap(), 0);
        assert!(!connection.has_modified_records());

        let hit = Statement::DeleteMany {
            collection: "users".to_string(),
            filter: doc! { "name": "Jane" },
        };
        assert_eq!(connection.affecting_statement(&hit).unwrap(), 1);
        assert!(connection.has_modified_records());

        connection.reset_records_modified();
        assert!(!connection.has_modified_records());
    }

    #[test]
    fn test_store_failure_becomes_query_error() {
        let (_, connection) = seeded();
        let mut pipeline = Pipeline::new();
        pipeline.push(Stage::Match(doc! { "name": { "$near": [0, 0] } }));
        let statement = Statement::Aggregate {
            collection: "users".to_string(),
            pipeline,
            options: PipelineOptions::default(),
        };

        let err = connection.select(&statement, true).unwrap_err();
        assert_eq!(err.code(), "STORE_UNSUPPORTED_OPERATOR");
        assert!(err.statement.contains("$near"));
        assert_eq!(connection.metrics().snapshot().statements_failed, 1);
    }

    #[test]
    fn test_pretend_skips_store() {
        let (store, connection) = seeded();
        let drop = Statement::Drop {
            collection: "users".to_string(),
        };

        let captured = connection
            .pretend(|conn| {
                assert!(conn.select(&select_users(), true)?.is_empty());
                assert_eq!(conn.statement(&drop)?, StatementOutput::Acknowledged(true));
                Ok(())
            })
            .unwrap();

        assert_eq!(captured.len(), 2);
        assert!(captured.iter().all(|q| q.pretended));
        assert_eq!(store.count("users").unwrap(), 2);
        assert!(!connection.pretending());
        assert!(!connection.logging());
    }

    #[test]
    fn test_query_log_records_when_enabled() {
        let (_, connection) = seeded();
        connection.select(&select_users(), true).unwrap();
        assert!(connection.query_log().is_empty());

        connection.enable_query_log();
        connection.select(&select_users(), true).unwrap();
        let log = connection.query_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].collection, "users");
        assert!(!log[0].pretended);

        connection.flush_query_log();
        assert!(connection.query_log().is_empty());
    }

    #[test]
    fn test_unsupported_surfaces() {
        let (_, connection) = seeded();
        assert!(connection.begin_transaction().unwrap_err().is_unsupported());
        assert!(connection.schema_builder().is_err());
        assert_eq!(connection.driver_name(), "mongodb");
        assert_eq!(connection.database_name(), "app");
    }
}
