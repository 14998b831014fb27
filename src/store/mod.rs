//! Document store boundary
//!
//! `DocumentStore` is the interface compiled statements execute against.
//! `memory` provides an in-process store with the same matching and
//! pipeline semantics, used for tests and embedded use.

mod backend;
mod errors;
pub mod memory;

pub use backend::{DocumentStore, UpdateOutcome};
pub use errors::{StoreError, StoreResult};
pub use memory::{InMemoryStore, MemoryConnector};
