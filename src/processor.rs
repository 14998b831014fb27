//! Result shaping
//!
//! Turns raw statement output into what a builder terminal returns.

use std::ops::Deref;

use bson::{Bson, Document};

use crate::connection::{Connection, QueryError};
use crate::grammar::{Statement, StatementOutput};

/// Post-processor for statement results
#[derive(Debug, Clone, Copy, Default)]
pub struct Processor;

impl Processor {
    pub fn new() -> Self {
        Processor
    }

    /// Wrap returned documents as rows, order preserved
    pub fn process_select(&self, documents: Vec<Document>) -> Vec<Row> {
        documents.into_iter().map(Row::from).collect()
    }

    /// Run an insert and return the id the store generated.
    ///
    /// In pretend mode no id exists and `Bson::Null` is returned.
    pub fn process_insert_get_id(
        &self,
        connection: &Connection,
        statement: &Statement,
    ) -> Result<Bson, QueryError> {
        match connection.insert(statement)? {
            StatementOutput::InsertedId(id) => Ok(id),
            _ => Ok(Bson::Null),
        }
    }
}

/// One result document
#[derive(Debug, Clone, PartialEq)]
pub struct Row(Document);

impl Row {
    /// The `_id` field
    pub fn id(&self) -> Option<&Bson> {
        self.0.get("_id")
    }

    /// Integer value, widening 32-bit ints and accepting integral doubles
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            Bson::Int32(n) => Some(i64::from(*n)),
            Bson::Int64(n) => Some(*n),
            Bson::Double(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            Bson::Int32(n) => Some(f64::from(*n)),
            Bson::Int64(n) => Some(*n as f64),
            Bson::Double(f) => Some(*f),
            _ => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get_str(key).ok()
    }

    pub fn into_document(self) -> Document {
        self.0
    }

    /// Relaxed extended JSON rendering
    pub fn to_json(&self) -> serde_json::Value {
        Bson::Document(self.0.clone()).into_relaxed_extjson()
    }
}

impl From<Document> for Row {
    fn from(document: Document) -> Self {
        Row(document)
    }
}

impl From<Row> for Document {
    fn from(row: Row) -> Self {
        row.0
    }
}

impl Deref for Row {
    type Target = Document;

    fn deref(&self) -> &Document {
        &self.0
    }
}
