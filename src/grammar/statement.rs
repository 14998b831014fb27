//! Executable statements
//!
//! A `Statement` is what the grammar hands to the connection: the target
//! collection plus the documents for exactly one store call. Statements
//! own their data and are never cached; executing one twice runs the same
//! operation twice.

use std::fmt;

use bson::{Bson, Document};

use super::pipeline::Pipeline;
use crate::query::PipelineOptions;
use crate::store::{DocumentStore, StoreResult};

/// Intent of a statement, mirrors the builder call that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Select,
    Insert,
    InsertGetId,
    Update,
    Delete,
    Truncate,
}

impl StatementKind {
    pub fn name(&self) -> &'static str {
        match self {
            StatementKind::Select => "select",
            StatementKind::Insert => "insert",
            StatementKind::InsertGetId => "insert_get_id",
            StatementKind::Update => "update",
            StatementKind::Delete => "delete",
            StatementKind::Truncate => "truncate",
        }
    }

    /// Whether the statement can change stored documents
    pub fn is_write(&self) -> bool {
        !matches!(self, StatementKind::Select)
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One store operation, ready to run
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Aggregate {
        collection: String,
        pipeline: Pipeline,
        options: PipelineOptions,
    },
    InsertMany {
        collection: String,
        documents: Vec<Document>,
    },
    InsertOne {
        collection: String,
        document: Document,
    },
    UpdateMany {
        collection: String,
        filter: Document,
        update: Document,
    },
    DeleteMany {
        collection: String,
        filter: Document,
    },
    Drop {
        collection: String,
    },
}

/// Raw store output of a statement
#[derive(Debug, Clone, PartialEq)]
pub enum StatementOutput {
    Rows(Vec<Document>),
    Acknowledged(bool),
    InsertedId(Bson),
    Count(u64),
}

impl StatementOutput {
    /// Rows, empty for any non-row output
    pub fn into_rows(self) -> Vec<Document> {
        match self {
            StatementOutput::Rows(rows) => rows,
            _ => Vec::new(),
        }
    }

    /// Affected count, zero for any non-count output
    pub fn count(&self) -> u64 {
        match self {
            StatementOutput::Count(n) => *n,
            _ => 0,
        }
    }

    /// Acknowledgement; a non-empty id or any row output counts as acknowledged
    pub fn acknowledged(&self) -> bool {
        match self {
            StatementOutput::Acknowledged(ok) => *ok,
            StatementOutput::InsertedId(id) => !matches!(id, Bson::Null),
            StatementOutput::Rows(_) | StatementOutput::Count(_) => true,
        }
    }
}

impl Statement {
    pub fn kind(&self) -> StatementKind {
        match self {
            Statement::Aggregate { .. } => StatementKind::Select,
            Statement::InsertMany { .. } => StatementKind::Insert,
            Statement::InsertOne { .. } => StatementKind::InsertGetId,
            Statement::UpdateMany { .. } => StatementKind::Update,
            Statement::DeleteMany { .. } => StatementKind::Delete,
            Statement::Drop { .. } => StatementKind::Truncate,
        }
    }

    pub fn collection(&self) -> &str {
        match self {
            Statement::Aggregate { collection, .. }
            | Statement::InsertMany { collection, .. }
            | Statement::InsertOne { collection, .. }
            | Statement::UpdateMany { collection, .. }
            | Statement::DeleteMany { collection, .. }
            | Statement::Drop { collection } => collection,
        }
    }

    /// Stages of a read, `None` for writes
    pub fn pipeline(&self) -> Option<&Pipeline> {
        match self {
            Statement::Aggregate { pipeline, .. } => Some(pipeline),
            _ => None,
        }
    }

    /// Run against a store handle
    pub fn execute(&self, store: &dyn DocumentStore) -> StoreResult<StatementOutput> {
        match self {
            Statement::Aggregate {
                collection,
                pipeline,
                options,
            } => store
                .aggregate(collection, &pipeline.to_documents(), options)
                .map(StatementOutput::Rows),
            Statement::InsertMany {
                collection,
                documents,
            } => {
                store.insert_many(collection, documents.clone())?;
                Ok(StatementOutput::Acknowledged(true))
            }
            Statement::InsertOne {
                collection,
                document,
            } => store
                .insert_one(collection, document.clone())
                .map(StatementOutput::InsertedId),
            Statement::UpdateMany {
                collection,
                filter,
                update,
            } => store
                .update_many(collection, filter, update)
                .map(|outcome| StatementOutput::Count(outcome.modified)),
            Statement::DeleteMany { collection, filter } => store
                .delete_many(collection, filter)
                .map(StatementOutput::Count),
            Statement::Drop { collection } => {
                store.drop_collection(collection)?;
                Ok(StatementOutput::Acknowledged(true))
            }
        }
    }

    /// Shell-like rendering with relaxed extended JSON arguments
    pub fn describe(&self) -> String {
        let (method, args): (&str, Vec<Bson>) = match self {
            Statement::Aggregate {
                pipeline, options, ..
            } => (
                "aggregate",
                vec![
                    Bson::Array(
                        pipeline
                            .to_documents()
                            .into_iter()
                            .map(Bson::Document)
                            .collect(),
                    ),
                    Bson::Document(options.as_document().clone()),
                ],
            ),
            Statement::InsertMany { documents, .. } => (
                "insertMany",
                vec![Bson::Array(
                    documents.iter().cloned().map(Bson::Document).collect(),
                )],
            ),
            Statement::InsertOne { document, .. } => {
                ("insertOne", vec![Bson::Document(document.clone())])
            }
            Statement::UpdateMany { filter, update, .. } => (
                "updateMany",
                vec![Bson::Document(filter.clone()), Bson::Document(update.clone())],
            ),
            Statement::DeleteMany { filter, .. } => {
                ("deleteMany", vec![Bson::Document(filter.clone())])
            }
            Statement::Drop { .. } => ("drop", Vec::new()),
        };

        let rendered: Vec<String> = args
            .into_iter()
            .map(|arg| arg.into_relaxed_extjson().to_string())
            .collect();
        format!("{}.{}({})", self.collection(), method, rendered.join(", "))
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}
