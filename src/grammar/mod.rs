//! Predicate and pipeline compiler
//!
//! Turns a relational `QueryDescription` into one `Statement`:
//! an aggregation pipeline for reads, or filter and update documents for
//! writes. Constructs with no document-store equivalent are rejected here,
//! before the store is ever contacted.

mod errors;
mod grammar;
mod pipeline;
mod statement;
pub mod wheres;

pub use errors::{GrammarError, GrammarResult};
pub use grammar::{MongoGrammar, QueryGrammar};
pub use pipeline::{Pipeline, Stage};
pub use statement::{Statement, StatementKind, StatementOutput};
