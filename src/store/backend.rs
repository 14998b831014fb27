//! Store boundary
//!
//! The only surface the rest of the crate needs from a document store.
//! Implementations must be shareable across threads; the connection holds
//! them behind `Arc<dyn DocumentStore>`.

use bson::{Bson, Document};

use super::errors::StoreResult;
use crate::query::PipelineOptions;

/// Matched and modified counts of an update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
}

/// Operations a document store executes on behalf of compiled statements
pub trait DocumentStore: Send + Sync {
    /// Run an aggregation pipeline over a collection
    fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Document],
        options: &PipelineOptions,
    ) -> StoreResult<Vec<Document>>;

    /// Insert documents, returning their ids in input order
    fn insert_many(&self, collection: &str, documents: Vec<Document>) -> StoreResult<Vec<Bson>>;

    /// Insert one document, returning its id
    fn insert_one(&self, collection: &str, document: Document) -> StoreResult<Bson>;

    /// Apply an update to every matching document
    fn update_many(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
    ) -> StoreResult<UpdateOutcome>;

    /// Delete every matching document, returning the count
    fn delete_many(&self, collection: &str, filter: &Document) -> StoreResult<u64>;

    /// Drop a collection. Dropping a missing collection succeeds.
    fn drop_collection(&self, collection: &str) -> StoreResult<()>;
}
