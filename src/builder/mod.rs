//! Query builder
//!
//! Relational-style fluent surface over a `Connection`, extended with the
//! document operations a pipeline store offers: computed fields,
//! projections and array push/pull.

mod builder;

pub use builder::QueryBuilder;
