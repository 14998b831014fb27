//! Relational query model
//!
//! The description a builder fills in and the grammar compiles, plus the
//! operator vocabulary shared by both.

mod ast;
pub mod operators;

pub use ast::{
    AggregateSpec, Boolean, ComputedField, DatePart, LockMode, OrderClause, PipelineOptions,
    Projection, QueryDescription, SortDirection, WhereClause,
};
pub use operators::Operator;
