//! Fluent query builder
//!
//! Modifiers consume and return the builder; terminals borrow it, compile
//! a fresh statement from a copy of the description and run it through the
//! connection. A builder can therefore be reused for several terminals.
//!
//! Relational constructs with no document equivalent (joins, grouping,
//! unions, locks, sub-queries) are recorded like any other clause and
//! rejected by the grammar when a terminal compiles the query.

use bson::{doc, Bson, Document};

use crate::connection::Connection;
use crate::errors::Result;
use crate::grammar::{GrammarError, QueryGrammar};
use crate::processor::Row;
use crate::query::{
    AggregateSpec, Boolean, ComputedField, DatePart, LockMode, OrderClause, PipelineOptions,
    Projection, QueryDescription, SortDirection, WhereClause,
};

/// Builder over one collection of a connection
#[derive(Debug, Clone)]
pub struct QueryBuilder<'c> {
    connection: &'c Connection,
    query: QueryDescription,
    use_write: bool,
}

impl<'c> QueryBuilder<'c> {
    pub fn new(connection: &'c Connection) -> Self {
        Self {
            connection,
            query: QueryDescription::default(),
            use_write: false,
        }
    }

    /// The description collected so far
    pub fn description(&self) -> &QueryDescription {
        &self.query
    }

    pub fn connection(&self) -> &'c Connection {
        self.connection
    }

    // ==================
    // Source and columns
    // ==================

    pub fn from(mut self, collection: impl Into<String>) -> Self {
        self.query.collection = collection.into();
        self
    }

    /// Replace the selected columns. `name as alias` renames.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn add_select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query
            .columns
            .extend(columns.into_iter().map(Into::into));
        self
    }

    /// Send reads to the write handle
    pub fn use_write_client(mut self) -> Self {
        self.use_write = true;
        self
    }

    // ==================
    // Basic predicates
    // ==================

    fn push_where(mut self, clause: WhereClause) -> Self {
        self.query.wheres.push(clause);
        self
    }

    fn basic(
        self,
        column: impl Into<String>,
        operator: &str,
        value: Bson,
        boolean: Boolean,
    ) -> Self {
        self.push_where(WhereClause::Basic {
            column: column.into(),
            operator: operator.to_string(),
            value,
            boolean,
        })
    }

    /// Compare a column with any known operator
    pub fn where_op(self, column: impl Into<String>, operator: &str, value: impl Into<Bson>) -> Self {
        self.basic(column, operator, value.into(), Boolean::And)
    }

    pub fn where_eq(self, column: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.basic(column, "=", value.into(), Boolean::And)
    }

    pub fn or_where_op(
        self,
        column: impl Into<String>,
        operator: &str,
        value: impl Into<Bson>,
    ) -> Self {
        self.basic(column, operator, value.into(), Boolean::Or)
    }

    pub fn or_where_eq(self, column: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.basic(column, "=", value.into(), Boolean::Or)
    }

    /// Case-insensitive `%` pattern
    pub fn where_like(self, column: impl Into<String>, pattern: &str) -> Self {
        self.basic(column, "like", Bson::String(pattern.to_string()), Boolean::And)
    }

    pub fn where_not_like(self, column: impl Into<String>, pattern: &str) -> Self {
        self.basic(column, "not like", Bson::String(pattern.to_string()), Boolean::And)
    }

    /// A `bson::Regex` or a delimited `/pattern/flags` string
    pub fn where_regex(self, column: impl Into<String>, pattern: impl Into<Bson>) -> Self {
        self.basic(column, "regex", pattern.into(), Boolean::And)
    }

    pub fn where_not_regex(self, column: impl Into<String>, pattern: impl Into<Bson>) -> Self {
        self.basic(column, "not regex", pattern.into(), Boolean::And)
    }

    // ==================
    // Membership, null and range
    // ==================

    fn bson_values<I, V>(values: I) -> Vec<Bson>
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        values.into_iter().map(Into::into).collect()
    }

    pub fn where_in<I, V>(self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        self.push_where(WhereClause::In {
            column: column.into(),
            values: Self::bson_values(values),
            boolean: Boolean::And,
        })
    }

    pub fn or_where_in<I, V>(self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        self.push_where(WhereClause::In {
            column: column.into(),
            values: Self::bson_values(values),
            boolean: Boolean::Or,
        })
    }

    pub fn where_not_in<I, V>(self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        self.push_where(WhereClause::NotIn {
            column: column.into(),
            values: Self::bson_values(values),
            boolean: Boolean::And,
        })
    }

    /// Null or missing
    pub fn where_null(self, column: impl Into<String>) -> Self {
        self.push_where(WhereClause::Null {
            column: column.into(),
            boolean: Boolean::And,
        })
    }

    pub fn or_where_null(self, column: impl Into<String>) -> Self {
        self.push_where(WhereClause::Null {
            column: column.into(),
            boolean: Boolean::Or,
        })
    }

    /// Present and not null
    pub fn where_not_null(self, column: impl Into<String>) -> Self {
        self.push_where(WhereClause::NotNull {
            column: column.into(),
            boolean: Boolean::And,
        })
    }

    pub fn or_where_not_null(self, column: impl Into<String>) -> Self {
        self.push_where(WhereClause::NotNull {
            column: column.into(),
            boolean: Boolean::Or,
        })
    }

    fn between<V: Into<Bson>>(
        self,
        column: impl Into<String>,
        bounds: [V; 2],
        not: bool,
        boolean: Boolean,
    ) -> Self {
        let [low, high] = bounds;
        self.push_where(WhereClause::Between {
            column: column.into(),
            low: low.into(),
            high: high.into(),
            not,
            boolean,
        })
    }

    /// Inclusive `[low, high]` range
    pub fn where_between<V: Into<Bson>>(self, column: impl Into<String>, bounds: [V; 2]) -> Self {
        self.between(column, bounds, false, Boolean::And)
    }

    pub fn or_where_between<V: Into<Bson>>(
        self,
        column: impl Into<String>,
        bounds: [V; 2],
    ) -> Self {
        self.between(column, bounds, false, Boolean::Or)
    }

    /// Strictly below `low` or strictly above `high`
    pub fn where_not_between<V: Into<Bson>>(
        self,
        column: impl Into<String>,
        bounds: [V; 2],
    ) -> Self {
        self.between(column, bounds, true, Boolean::And)
    }

    // ==================
    // Date parts
    // ==================

    fn date(
        self,
        part: DatePart,
        column: impl Into<String>,
        operator: &str,
        value: impl Into<Bson>,
    ) -> Self {
        self.push_where(WhereClause::Date {
            column: column.into(),
            part,
            operator: operator.to_string(),
            value: value.into(),
            boolean: Boolean::And,
        })
    }

    /// Calendar date, compared as `YYYY-MM-DD`
    pub fn where_date(self, column: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.date(DatePart::Date, column, "=", value)
    }

    pub fn where_date_op(
        self,
        column: impl Into<String>,
        operator: &str,
        value: impl Into<Bson>,
    ) -> Self {
        self.date(DatePart::Date, column, operator, value)
    }

    /// Day of month
    pub fn where_day(self, column: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.date(DatePart::Day, column, "=", value)
    }

    pub fn where_day_op(
        self,
        column: impl Into<String>,
        operator: &str,
        value: impl Into<Bson>,
    ) -> Self {
        self.date(DatePart::Day, column, operator, value)
    }

    pub fn where_month(self, column: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.date(DatePart::Month, column, "=", value)
    }

    pub fn where_month_op(
        self,
        column: impl Into<String>,
        operator: &str,
        value: impl Into<Bson>,
    ) -> Self {
        self.date(DatePart::Month, column, operator, value)
    }

    pub fn where_year(self, column: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.date(DatePart::Year, column, "=", value)
    }

    pub fn where_year_op(
        self,
        column: impl Into<String>,
        operator: &str,
        value: impl Into<Bson>,
    ) -> Self {
        self.date(DatePart::Year, column, operator, value)
    }

    /// Time of day, compared as `HH:MM:SS`
    pub fn where_time(self, column: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.date(DatePart::Time, column, "=", value)
    }

    pub fn where_time_op(
        self,
        column: impl Into<String>,
        operator: &str,
        value: impl Into<Bson>,
    ) -> Self {
        self.date(DatePart::Time, column, operator, value)
    }

    /// Native filter document, used verbatim
    pub fn where_raw(self, expression: Document) -> Self {
        self.push_where(WhereClause::Raw {
            expression,
            boolean: Boolean::And,
        })
    }

    pub fn or_where_raw(self, expression: Document) -> Self {
        self.push_where(WhereClause::Raw {
            expression,
            boolean: Boolean::Or,
        })
    }

    // ==================
    // Ordering, paging and pipeline extras
    // ==================

    /// Order by a column; `natural` orders by storage order
    pub fn order_by(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.query.orders.push(OrderClause::Column {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn order_by_desc(self, column: impl Into<String>) -> Self {
        self.order_by(column, SortDirection::Desc)
    }

    /// Maximum number of rows; 0 means no limit
    pub fn limit(mut self, limit: u64) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn take(self, limit: u64) -> Self {
        self.limit(limit)
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.query.offset = Some(offset);
        self
    }

    pub fn skip(self, offset: u64) -> Self {
        self.offset(offset)
    }

    /// One page of `per_page` rows, pages counted from 1
    pub fn for_page(self, page: u64, per_page: u64) -> Self {
        self.offset(page.saturating_sub(1).saturating_mul(per_page))
            .limit(per_page)
    }

    /// Computed field evaluated before filtering
    pub fn add_field(mut self, column: impl Into<String>, expression: impl Into<Bson>) -> Self {
        self.query.add_fields.push(ComputedField {
            column: column.into(),
            expression: expression.into(),
        });
        self
    }

    /// Output projection applied after filtering
    pub fn project(mut self, column: impl Into<String>, projection: impl Into<Bson>) -> Self {
        self.query.projections.push(Projection {
            column: column.into(),
            projection: projection.into(),
        });
        self
    }

    /// Replace the default pipeline options
    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.query.options = Some(options);
        self
    }

    // ==================
    // Relational constructs the grammar rejects
    // ==================

    pub fn join(mut self, collection: impl Into<String>) -> Self {
        self.query.joins.push(collection.into());
        self
    }

    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.query.groups.push(column.into());
        self
    }

    pub fn having(mut self, column: impl Into<String>, operator: &str, value: impl Into<Bson>) -> Self {
        self.query.havings.push(WhereClause::Basic {
            column: column.into(),
            operator: operator.to_string(),
            value: value.into(),
            boolean: Boolean::And,
        });
        self
    }

    pub fn union(mut self, query: QueryDescription) -> Self {
        self.query.unions.push(query);
        self
    }

    pub fn lock_for_update(mut self) -> Self {
        self.query.lock = Some(LockMode::ForUpdate);
        self
    }

    pub fn shared_lock(mut self) -> Self {
        self.query.lock = Some(LockMode::Shared);
        self
    }

    pub fn in_random_order(mut self, seed: Option<&str>) -> Self {
        self.query.orders.push(OrderClause::Random {
            seed: seed.map(str::to_string),
        });
        self
    }

    pub fn where_column(
        self,
        first: impl Into<String>,
        operator: &str,
        second: impl Into<String>,
    ) -> Self {
        self.push_where(WhereClause::Column {
            first: first.into(),
            operator: operator.to_string(),
            second: second.into(),
            boolean: Boolean::And,
        })
    }

    /// Parenthesised group of predicates built by `nested`
    pub fn where_nested<F>(self, nested: F) -> Self
    where
        F: FnOnce(QueryBuilder<'c>) -> QueryBuilder<'c>,
    {
        let inner = nested(QueryBuilder::new(self.connection).from(self.query.collection.clone()));
        self.push_where(WhereClause::Nested {
            wheres: inner.query.wheres,
            boolean: Boolean::And,
        })
    }

    pub fn where_exists(self, query: QueryDescription) -> Self {
        self.push_where(WhereClause::Exists {
            query: Box::new(query),
            not: false,
            boolean: Boolean::And,
        })
    }

    pub fn where_in_sub(self, column: impl Into<String>, query: QueryDescription) -> Self {
        self.push_where(WhereClause::InSub {
            column: column.into(),
            query: Box::new(query),
            boolean: Boolean::And,
        })
    }

    // ==================
    // Reads
    // ==================

    fn read(&self, query: &QueryDescription) -> Result<Vec<Row>> {
        let grammar = self.connection.grammar();
        let statement = grammar.compile_select(query)?;
        let documents = self.connection.select(&statement, !self.use_write)?;
        Ok(self.connection.processor().process_select(documents))
    }

    /// Every matching row
    pub fn get(&self) -> Result<Vec<Row>> {
        self.read(&self.query)
    }

    pub fn first(&self) -> Result<Option<Row>> {
        let mut query = self.query.clone();
        query.limit = Some(1);
        Ok(self.read(&query)?.into_iter().next())
    }

    /// Row with the given `_id`. A null id matches nothing and issues no query.
    pub fn find(&self, id: impl Into<Bson>) -> Result<Option<Row>> {
        let id = id.into();
        if id == Bson::Null {
            return Ok(None);
        }
        self.clone().where_eq("_id", id).first()
    }

    /// One column of the first row.
    ///
    /// Rows are read whole and the column taken afterwards, so filters and
    /// sorts on other columns still see those columns.
    pub fn value(&self, column: &str) -> Result<Option<Bson>> {
        let row = self.first()?;
        Ok(row.and_then(|row| row.get(column).cloned()))
    }

    /// One column of every row, `Null` where it is missing
    pub fn pluck(&self, column: &str) -> Result<Vec<Bson>> {
        let rows = self.get()?;
        Ok(rows
            .into_iter()
            .map(|row| row.get(column).cloned().unwrap_or(Bson::Null))
            .collect())
    }

    /// `exists` has no pipeline form
    pub fn exists(&self) -> Result<bool> {
        self.connection.grammar().compile_exists(&self.query)?;
        Ok(false)
    }

    /// Result of an aggregate over the matching rows, `Null` when nothing matched
    pub fn aggregate(&self, function: &str, columns: &[&str]) -> Result<Bson> {
        let mut query = self.query.clone();
        query.columns.clear();
        query.aggregate = Some(AggregateSpec::new(
            function,
            columns.iter().map(|c| c.to_string()).collect(),
        ));
        let row = self.read(&query)?.into_iter().next();
        Ok(row
            .and_then(|row| row.get("aggregate").cloned())
            .unwrap_or(Bson::Null))
    }

    pub fn count(&self) -> Result<u64> {
        self.counted(&[])
    }

    /// Rows where `column` is present and not null
    pub fn count_column(&self, column: &str) -> Result<u64> {
        self.counted(&[column])
    }

    fn counted(&self, columns: &[&str]) -> Result<u64> {
        let total = match self.aggregate("count", columns)? {
            Bson::Int32(n) => n as i64,
            Bson::Int64(n) => n,
            Bson::Double(f) => f as i64,
            _ => 0,
        };
        Ok(u64::try_from(total).unwrap_or(0))
    }

    /// Sum of a column, 0 when nothing matched
    pub fn sum(&self, column: &str) -> Result<Bson> {
        match self.aggregate("sum", &[column])? {
            Bson::Null => Ok(Bson::Int32(0)),
            total => Ok(total),
        }
    }

    pub fn avg(&self, column: &str) -> Result<Bson> {
        self.aggregate("avg", &[column])
    }

    pub fn min(&self, column: &str) -> Result<Bson> {
        self.aggregate("min", &[column])
    }

    pub fn max(&self, column: &str) -> Result<Bson> {
        self.aggregate("max", &[column])
    }

    /// Compiled stages, for inspection
    pub fn to_pipeline(&self) -> Result<Vec<Document>> {
        let statement = self.connection.grammar().compile_select(&self.query)?;
        Ok(statement
            .pipeline()
            .map(|pipeline| pipeline.to_documents())
            .unwrap_or_default())
    }

    /// Always fails; a pipeline has no SQL text
    pub fn to_sql(&self) -> Result<String> {
        Ok(self.connection.grammar().to_sql(&self.query)?)
    }

    // ==================
    // Writes
    // ==================

    /// Insert documents. An empty batch succeeds without a store call.
    pub fn insert(&self, documents: Vec<Document>) -> Result<bool> {
        if documents.is_empty() {
            return Ok(true);
        }
        let statement = self
            .connection
            .grammar()
            .compile_insert(&self.query, documents)?;
        Ok(self.connection.insert(&statement)?.acknowledged())
    }

    pub fn insert_one(&self, document: Document) -> Result<bool> {
        self.insert(vec![document])
    }

    /// Insert one document and return its generated id
    pub fn insert_get_id(&self, document: Document) -> Result<Bson> {
        let statement = self
            .connection
            .grammar()
            .compile_insert_get_id(&self.query, document)?;
        Ok(self
            .connection
            .processor()
            .process_insert_get_id(self.connection, &statement)?)
    }

    /// Update every matching document, returning the modified count.
    ///
    /// Plain fields are set; a document of update operators is applied as is.
    pub fn update(&self, values: Document) -> Result<u64> {
        let statement = self
            .connection
            .grammar()
            .compile_update(&self.query, values)?;
        Ok(self.connection.affecting_statement(&statement)?)
    }

    /// Add `amount` to a numeric column, setting `extra` fields alongside
    pub fn increment(&self, column: &str, amount: impl Into<Bson>, extra: Document) -> Result<u64> {
        let amount = amount.into();
        if !matches!(amount, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)) {
            return Err(GrammarError::invalid_argument(format!(
                "non-numeric value passed to increment of '{}'",
                column
            ))
            .into());
        }

        let mut inc = Document::new();
        inc.insert(column, amount);
        let mut update = doc! { "$inc": inc };
        if !extra.is_empty() {
            update.insert("$set", extra);
        }
        self.update(update)
    }

    pub fn decrement(&self, column: &str, amount: impl Into<Bson>, extra: Document) -> Result<u64> {
        let negated = match amount.into() {
            Bson::Int32(n) => n
                .checked_neg()
                .map(Bson::Int32)
                .unwrap_or(Bson::Int64(-(n as i64))),
            Bson::Int64(n) => match n.checked_neg() {
                Some(n) => Bson::Int64(n),
                None => Bson::Double(-(n as f64)),
            },
            Bson::Double(f) => Bson::Double(-f),
            other => other,
        };
        self.increment(column, negated, extra)
    }

    /// Delete matching documents, narrowed to one `_id` when given
    pub fn delete(&self, id: Option<Bson>) -> Result<u64> {
        let builder = match id {
            Some(id) if id != Bson::Null => self.clone().where_eq("_id", id),
            _ => self.clone(),
        };
        let statement = self
            .connection
            .grammar()
            .compile_delete(&builder.query)?;
        Ok(self.connection.affecting_statement(&statement)?)
    }

    /// Drop the collection, ignoring every predicate
    pub fn truncate(&self) -> Result<()> {
        let statement = self.connection.grammar().compile_truncate(&self.query)?;
        self.connection.statement(&statement)?;
        Ok(())
    }

    /// Append to an array; `unique` skips values already present.
    /// An array value appends each element.
    pub fn push(&self, column: &str, value: impl Into<Bson>, unique: bool) -> Result<u64> {
        let statement = self
            .connection
            .grammar()
            .compile_push(&self.query, column, value.into(), unique)?;
        Ok(self.connection.affecting_statement(&statement)?)
    }

    /// Remove a value, or each element of an array value
    pub fn pull(&self, column: &str, value: impl Into<Bson>) -> Result<u64> {
        let statement = self
            .connection
            .grammar()
            .compile_pull(&self.query, column, value.into())?;
        Ok(self.connection.affecting_statement(&statement)?)
    }
}
