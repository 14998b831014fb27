//! Document grammar
//!
//! Compiles a `QueryDescription` into a `Statement`. Compilation is pure:
//! the description is only borrowed, nothing is cached, and the same
//! description always yields the same statement.

use bson::{doc, Bson, Document};

use super::errors::{GrammarError, GrammarResult};
use super::pipeline::{Pipeline, Stage};
use super::statement::Statement;
use super::wheres;
use crate::query::{operators, AggregateSpec, LockMode, OrderClause, QueryDescription, WhereClause};

/// Compilation seam between a builder and a concrete grammar
pub trait QueryGrammar {
    /// Compile a read into an aggregation pipeline
    fn compile_select(&self, query: &QueryDescription) -> GrammarResult<Statement>;

    /// Compile a single or batch insert
    fn compile_insert(
        &self,
        query: &QueryDescription,
        documents: Vec<Document>,
    ) -> GrammarResult<Statement>;

    /// Compile an insert whose generated id is returned
    fn compile_insert_get_id(
        &self,
        query: &QueryDescription,
        document: Document,
    ) -> GrammarResult<Statement>;

    /// Compile an update over every matching document
    fn compile_update(&self, query: &QueryDescription, values: Document)
        -> GrammarResult<Statement>;

    /// Compile a delete over every matching document
    fn compile_delete(&self, query: &QueryDescription) -> GrammarResult<Statement>;

    /// Compile a collection drop
    fn compile_truncate(&self, query: &QueryDescription) -> GrammarResult<Statement>;
}

/// Grammar targeting an aggregation-pipeline document store
#[derive(Debug, Clone, Copy, Default)]
pub struct MongoGrammar;

impl MongoGrammar {
    pub fn new() -> Self {
        MongoGrammar
    }

    /// Every operator accepted in a basic clause
    pub fn operators(&self) -> Vec<&'static str> {
        operators::all()
    }

    /// Savepoints need transactional isolation, which is out of reach
    pub fn supports_savepoints(&self) -> bool {
        false
    }

    /// Compile predicates into a filter document
    pub fn compile_wheres(&self, wheres: &[WhereClause]) -> GrammarResult<Document> {
        wheres::compile_wheres(wheres)
    }

    /// Append to an array field; `unique` skips values already present
    pub fn compile_push(
        &self,
        query: &QueryDescription,
        column: &str,
        value: Bson,
        unique: bool,
    ) -> GrammarResult<Statement> {
        let filter = self.compile_filter(query)?;
        let operator = if unique { "$addToSet" } else { "$push" };
        let value = match value {
            Bson::Array(items) => Bson::Document(doc! { "$each": items }),
            other => other,
        };

        let mut target = Document::new();
        target.insert(column, value);
        let mut update = Document::new();
        update.insert(operator, target);

        Ok(Statement::UpdateMany {
            collection: query.collection.clone(),
            filter,
            update,
        })
    }

    /// Remove values from an array field
    pub fn compile_pull(
        &self,
        query: &QueryDescription,
        column: &str,
        value: Bson,
    ) -> GrammarResult<Statement> {
        let filter = self.compile_filter(query)?;
        let operator = if matches!(value, Bson::Array(_)) {
            "$pullAll"
        } else {
            "$pull"
        };

        let mut target = Document::new();
        target.insert(column, value);
        let mut update = Document::new();
        update.insert(operator, target);

        Ok(Statement::UpdateMany {
            collection: query.collection.clone(),
            filter,
            update,
        })
    }

    pub fn compile_joins(&self, _joins: &[String]) -> GrammarResult<Document> {
        Err(GrammarError::unsupported("joins"))
    }

    pub fn compile_groups(&self, _groups: &[String]) -> GrammarResult<Document> {
        Err(GrammarError::unsupported("group by"))
    }

    pub fn compile_havings(&self, _havings: &[WhereClause]) -> GrammarResult<Document> {
        Err(GrammarError::unsupported("having"))
    }

    pub fn compile_unions(&self, _unions: &[QueryDescription]) -> GrammarResult<Document> {
        Err(GrammarError::unsupported("unions"))
    }

    pub fn compile_lock(&self, _lock: LockMode) -> GrammarResult<Document> {
        Err(GrammarError::unsupported("row locks"))
    }

    pub fn compile_random(&self, _seed: Option<&str>) -> GrammarResult<Document> {
        Err(GrammarError::unsupported("random ordering"))
    }

    pub fn compile_exists(&self, _query: &QueryDescription) -> GrammarResult<Statement> {
        Err(GrammarError::unsupported("exists"))
    }

    pub fn compile_savepoint(&self, _name: &str) -> GrammarResult<Statement> {
        Err(GrammarError::unsupported("savepoints"))
    }

    /// There is no SQL text for a pipeline
    pub fn to_sql(&self, _query: &QueryDescription) -> GrammarResult<String> {
        Err(GrammarError::unsupported("SQL rendering"))
    }

    /// Reject relational constructs before any stage is built
    fn reject_relational(&self, query: &QueryDescription) -> GrammarResult<()> {
        if !query.joins.is_empty() {
            self.compile_joins(&query.joins)?;
        }
        if !query.groups.is_empty() {
            self.compile_groups(&query.groups)?;
        }
        if !query.havings.is_empty() {
            self.compile_havings(&query.havings)?;
        }
        if !query.unions.is_empty() {
            self.compile_unions(&query.unions)?;
        }
        if let Some(lock) = query.lock {
            self.compile_lock(lock)?;
        }
        Ok(())
    }

    fn compile_filter(&self, query: &QueryDescription) -> GrammarResult<Document> {
        self.reject_relational(query)?;
        self.compile_wheres(&query.wheres)
    }

    fn compile_add_fields(&self, query: &QueryDescription) -> Document {
        let mut fields = Document::new();
        for computed in &query.add_fields {
            fields.insert(computed.column.clone(), computed.expression.clone());
        }
        fields
    }

    /// `*` disables projection, `name as alias` renames
    fn compile_columns(&self, columns: &[String]) -> Document {
        let mut projection = Document::new();
        if columns.iter().any(|c| c.trim() == "*") {
            return projection;
        }
        for column in columns {
            match split_alias(column) {
                Some((name, alias)) => {
                    projection.insert(alias, format!("${}", name));
                }
                None => {
                    projection.insert(column.trim(), 1);
                }
            }
        }
        projection
    }

    /// Accumulator for the `$group` stage.
    ///
    /// `count` of a named column only counts documents where that column is
    /// not null, so the not-null predicate is conjoined onto `filter`.
    fn compile_aggregate(
        &self,
        aggregate: &AggregateSpec,
        filter: Document,
    ) -> GrammarResult<(Bson, Document)> {
        let function = aggregate.function.trim().to_ascii_lowercase();
        let column = aggregate.column();

        if function == "count" {
            let filter = match column {
                Some(column) => wheres::conjoin(vec![filter, wheres::not_null(column)]),
                None => filter,
            };
            return Ok((Bson::Document(doc! { "$sum": 1 }), filter));
        }

        let column = column.ok_or_else(|| {
            GrammarError::invalid_argument(format!("aggregate {} needs a column", function))
        })?;
        let mut accumulator = Document::new();
        accumulator.insert(format!("${}", function), format!("${}", column));
        Ok((Bson::Document(accumulator), filter))
    }

    fn compile_orders(&self, orders: &[OrderClause]) -> GrammarResult<Document> {
        let mut sort = Document::new();
        for order in orders {
            match order {
                OrderClause::Column { column, direction } => {
                    let key = if column == "natural" {
                        "$natural"
                    } else {
                        column.as_str()
                    };
                    sort.insert(key, direction.value());
                }
                OrderClause::Random { seed } => {
                    self.compile_random(seed.as_deref())?;
                }
            }
        }
        Ok(sort)
    }

    fn compile_projections(&self, query: &QueryDescription) -> Document {
        let mut projection = Document::new();
        for p in &query.projections {
            projection.insert(p.column.clone(), p.projection.clone());
        }
        projection
    }
}

impl QueryGrammar for MongoGrammar {
    fn compile_select(&self, query: &QueryDescription) -> GrammarResult<Statement> {
        self.reject_relational(query)?;
        let mut pipeline = Pipeline::new();

        // 1. Computed fields
        let add_fields = self.compile_add_fields(query);
        if !add_fields.is_empty() {
            pipeline.push(Stage::AddFields(add_fields));
        }

        // 2. Column projection
        let columns = self.compile_columns(&query.columns);
        if !columns.is_empty() {
            pipeline.push(Stage::Project(columns));
        }

        // 3. Filter, with the aggregate's own predicate folded in
        let filter = self.compile_wheres(&query.wheres)?;
        let (accumulator, filter) = match &query.aggregate {
            Some(aggregate) => {
                let (accumulator, filter) = self.compile_aggregate(aggregate, filter)?;
                (Some(accumulator), filter)
            }
            None => (None, filter),
        };
        if !filter.is_empty() {
            pipeline.push(Stage::Match(filter));
        }

        // 4. Aggregate
        if let Some(accumulator) = accumulator {
            pipeline.push(Stage::Group(doc! {
                "_id": Bson::Null,
                "aggregate": accumulator,
            }));
        }

        // 5. Explicit projections
        let projections = self.compile_projections(query);
        if !projections.is_empty() {
            pipeline.push(Stage::Project(projections));
        }

        // 6. Ordering
        let sort = self.compile_orders(&query.orders)?;
        if !sort.is_empty() {
            pipeline.push(Stage::Sort(sort));
        }

        // 7. Paging
        if let Some(offset) = query.offset.filter(|n| *n > 0) {
            pipeline.push(Stage::Skip(offset));
        }
        if let Some(limit) = query.limit.filter(|n| *n > 0) {
            pipeline.push(Stage::Limit(limit));
        }

        Ok(Statement::Aggregate {
            collection: query.collection.clone(),
            pipeline,
            options: query.pipeline_options(),
        })
    }

    fn compile_insert(
        &self,
        query: &QueryDescription,
        documents: Vec<Document>,
    ) -> GrammarResult<Statement> {
        if documents.is_empty() {
            return Err(GrammarError::invalid_argument("insert needs at least one document"));
        }
        Ok(Statement::InsertMany {
            collection: query.collection.clone(),
            documents,
        })
    }

    fn compile_insert_get_id(
        &self,
        query: &QueryDescription,
        document: Document,
    ) -> GrammarResult<Statement> {
        Ok(Statement::InsertOne {
            collection: query.collection.clone(),
            document,
        })
    }

    fn compile_update(
        &self,
        query: &QueryDescription,
        values: Document,
    ) -> GrammarResult<Statement> {
        let filter = self.compile_filter(query)?;
        let update = update_document(values)?;
        Ok(Statement::UpdateMany {
            collection: query.collection.clone(),
            filter,
            update,
        })
    }

    fn compile_delete(&self, query: &QueryDescription) -> GrammarResult<Statement> {
        let filter = self.compile_filter(query)?;
        Ok(Statement::DeleteMany {
            collection: query.collection.clone(),
            filter,
        })
    }

    fn compile_truncate(&self, query: &QueryDescription) -> GrammarResult<Statement> {
        Ok(Statement::Drop {
            collection: query.collection.clone(),
        })
    }
}

/// Split `name as alias`, matching `as` in any case
fn split_alias(column: &str) -> Option<(&str, &str)> {
    let at = column
        .as_bytes()
        .windows(4)
        .position(|w| w.eq_ignore_ascii_case(b" as "))?;
    let name = column[..at].trim();
    let alias = column[at + 4..].trim();
    if name.is_empty() || alias.is_empty() {
        return None;
    }
    Some((name, alias))
}

/// Plain field maps are wrapped in `$set`; operator maps pass through
fn update_document(values: Document) -> GrammarResult<Document> {
    if values.is_empty() {
        return Err(GrammarError::invalid_argument("update needs at least one field"));
    }
    let operators = values.keys().filter(|k| k.starts_with('$')).count();
    if operators == values.len() {
        Ok(values)
    } else if operators == 0 {
        Ok(doc! { "$set": values })
    } else {
        Err(GrammarError::invalid_argument(
            "update mixes operators and plain fields",
        ))
    }
}
