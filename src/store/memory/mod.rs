//! In-process document store
//!
//! Collections are vectors of documents in insertion order behind one
//! `RwLock`. Every write validates its whole batch before touching the
//! collection, so a failed call leaves the data as it was.

mod expr;
mod matcher;
mod stages;
mod update;
mod values;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bson::oid::ObjectId;
use bson::{Bson, Document};

use super::{DocumentStore, StoreError, StoreResult, UpdateOutcome};
use crate::connection::{ConfigError, ConfigResult, ConnectionConfig, Connector};
use crate::query::PipelineOptions;

pub use matcher::matches;
pub use stages::run_pipeline;
pub use update::apply_update;

/// Thread-safe in-memory store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, HashMap<String, Vec<Document>>>> {
        self.collections
            .read()
            .map_err(|_| StoreError::Internal("collection lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, HashMap<String, Vec<Document>>>> {
        self.collections
            .write()
            .map_err(|_| StoreError::Internal("collection lock poisoned".to_string()))
    }

    /// Names of existing collections, sorted
    pub fn collection_names(&self) -> StoreResult<Vec<String>> {
        let mut names: Vec<String> = self.read()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Number of documents in a collection
    pub fn count(&self, collection: &str) -> StoreResult<usize> {
        Ok(self.read()?.get(collection).map_or(0, Vec::len))
    }

    /// Copy of a collection's documents in insertion order
    pub fn documents(&self, collection: &str) -> StoreResult<Vec<Document>> {
        Ok(self.read()?.get(collection).cloned().unwrap_or_default())
    }
}

/// Put `_id` first, generating an ObjectId when absent
fn with_id(document: Document) -> (Bson, Document) {
    if let Some(id) = document.get("_id") {
        return (id.clone(), document);
    }
    let id = Bson::ObjectId(ObjectId::new());
    let mut out = Document::new();
    out.insert("_id", id.clone());
    out.extend(document);
    (id, out)
}

impl DocumentStore for InMemoryStore {
    fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Document],
        _options: &PipelineOptions,
    ) -> StoreResult<Vec<Document>> {
        let documents = self.documents(collection)?;
        run_pipeline(documents, pipeline)
    }

    fn insert_many(&self, collection: &str, documents: Vec<Document>) -> StoreResult<Vec<Bson>> {
        let prepared: Vec<(Bson, Document)> = documents.into_iter().map(with_id).collect();

        let mut collections = self.write()?;
        let current = collections.get(collection).map(Vec::as_slice).unwrap_or_default();

        for (index, (id, _)) in prepared.iter().enumerate() {
            let taken = current
                .iter()
                .any(|d| d.get("_id").map_or(false, |other| other == id))
                || prepared[..index].iter().any(|(other, _)| other == id);
            if taken {
                return Err(StoreError::DuplicateKey(format!(
                    "{} _id {}",
                    collection, id
                )));
            }
        }

        // created only once the whole batch is known to fit
        let existing = collections.entry(collection.to_string()).or_default();
        let mut ids = Vec::with_capacity(prepared.len());
        for (id, document) in prepared {
            ids.push(id);
            existing.push(document);
        }
        Ok(ids)
    }

    fn insert_one(&self, collection: &str, document: Document) -> StoreResult<Bson> {
        self.insert_many(collection, vec![document])?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Internal("insert returned no id".to_string()))
    }

    fn update_many(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
    ) -> StoreResult<UpdateOutcome> {
        let mut collections = self.write()?;
        let documents = match collections.get_mut(collection) {
            Some(documents) => documents,
            None => return Ok(UpdateOutcome::default()),
        };

        let mut outcome = UpdateOutcome::default();
        let mut replacements = Vec::new();
        for (index, document) in documents.iter().enumerate() {
            if !matches(document, filter)? {
                continue;
            }
            outcome.matched += 1;
            if let Some(updated) = apply_update(document, update)? {
                replacements.push((index, updated));
            }
        }

        outcome.modified = replacements.len() as u64;
        for (index, updated) in replacements {
            documents[index] = updated;
        }
        Ok(outcome)
    }

    fn delete_many(&self, collection: &str, filter: &Document) -> StoreResult<u64> {
        let mut collections = self.write()?;
        let documents = match collections.get_mut(collection) {
            Some(documents) => documents,
            None => return Ok(0),
        };

        let mut keep = Vec::with_capacity(documents.len());
        for document in documents.iter() {
            keep.push(!matches(document, filter)?);
        }

        let before = documents.len();
        let mut flags = keep.into_iter();
        documents.retain(|_| flags.next().unwrap_or(true));
        Ok((before - documents.len()) as u64)
    }

    fn drop_collection(&self, collection: &str) -> StoreResult<()> {
        self.write()?.remove(collection);
        Ok(())
    }
}

/// Connector handing out shared in-memory stores.
///
/// Configurations that resolve to the same DSN and database share one
/// store, so a read connection sees the writes of its write connection.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    stores: Mutex<HashMap<String, Arc<InMemoryStore>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct stores handed out so far
    pub fn store_count(&self) -> usize {
        self.stores.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, config: &ConnectionConfig) -> ConfigResult<Arc<dyn DocumentStore>> {
        let key = format!("{}/{}", config.dsn(), config.database);
        let mut stores = self
            .stores
            .lock()
            .map_err(|_| ConfigError::Connect("connector registry poisoned".to_string()))?;
        let store = stores
            .entry(key)
            .or_insert_with(|| Arc::new(InMemoryStore::new()));
        Ok(Arc::clone(store) as Arc<dyn DocumentStore>)
    }
}
