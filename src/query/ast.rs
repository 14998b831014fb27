//! Query description types
//!
//! A `QueryDescription` is what a builder accumulates before compilation.
//! The grammar only ever borrows it, so a description is never changed
//! by compiling or executing it.

use bson::{doc, Bson, Document};

/// Connective joining a clause to the clauses before it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Boolean {
    #[default]
    And,
    Or,
}

/// Date component a date predicate compares against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePart {
    /// Day of month, 1-31
    Day,
    /// Month, 1-12
    Month,
    /// Four digit year
    Year,
    /// Calendar date rendered as `YYYY-MM-DD`
    Date,
    /// Wall-clock time rendered as `HH:MM:SS`
    Time,
}

impl DatePart {
    pub fn name(&self) -> &'static str {
        match self {
            DatePart::Day => "day",
            DatePart::Month => "month",
            DatePart::Year => "year",
            DatePart::Date => "date",
            DatePart::Time => "time",
        }
    }
}

/// A single predicate clause.
///
/// The first group of variants compiles to a filter fragment. The second
/// group (column comparison, nested groups, sub-queries) is carried so the
/// grammar can reject it explicitly instead of dropping it.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereClause {
    Basic {
        column: String,
        operator: String,
        value: Bson,
        boolean: Boolean,
    },
    In {
        column: String,
        values: Vec<Bson>,
        boolean: Boolean,
    },
    NotIn {
        column: String,
        values: Vec<Bson>,
        boolean: Boolean,
    },
    Null {
        column: String,
        boolean: Boolean,
    },
    NotNull {
        column: String,
        boolean: Boolean,
    },
    /// Inclusive range. `not` flips it into the two open tails.
    Between {
        column: String,
        low: Bson,
        high: Bson,
        not: bool,
        boolean: Boolean,
    },
    Date {
        column: String,
        part: DatePart,
        operator: String,
        value: Bson,
        boolean: Boolean,
    },
    /// Native filter fragment, passed through untouched
    Raw {
        expression: Document,
        boolean: Boolean,
    },
    Column {
        first: String,
        operator: String,
        second: String,
        boolean: Boolean,
    },
    Nested {
        wheres: Vec<WhereClause>,
        boolean: Boolean,
    },
    InSub {
        column: String,
        query: Box<QueryDescription>,
        boolean: Boolean,
    },
    NotInSub {
        column: String,
        query: Box<QueryDescription>,
        boolean: Boolean,
    },
    Exists {
        query: Box<QueryDescription>,
        not: bool,
        boolean: Boolean,
    },
    Sub {
        column: String,
        operator: String,
        query: Box<QueryDescription>,
        boolean: Boolean,
    },
}

impl WhereClause {
    /// Connective of this clause
    pub fn boolean(&self) -> Boolean {
        match self {
            WhereClause::Basic { boolean, .. }
            | WhereClause::In { boolean, .. }
            | WhereClause::NotIn { boolean, .. }
            | WhereClause::Null { boolean, .. }
            | WhereClause::NotNull { boolean, .. }
            | WhereClause::Between { boolean, .. }
            | WhereClause::Date { boolean, .. }
            | WhereClause::Raw { boolean, .. }
            | WhereClause::Column { boolean, .. }
            | WhereClause::Nested { boolean, .. }
            | WhereClause::InSub { boolean, .. }
            | WhereClause::NotInSub { boolean, .. }
            | WhereClause::Exists { boolean, .. }
            | WhereClause::Sub { boolean, .. } => *boolean,
        }
    }

    /// Short name of the clause kind, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            WhereClause::Basic { .. } => "basic",
            WhereClause::In { .. } => "in",
            WhereClause::NotIn { .. } => "not in",
            WhereClause::Null { .. } => "null",
            WhereClause::NotNull { .. } => "not null",
            WhereClause::Between { .. } => "between",
            WhereClause::Date { .. } => "date",
            WhereClause::Raw { .. } => "raw",
            WhereClause::Column { .. } => "column",
            WhereClause::Nested { .. } => "nested",
            WhereClause::InSub { .. } => "in sub-query",
            WhereClause::NotInSub { .. } => "not in sub-query",
            WhereClause::Exists { .. } => "exists",
            WhereClause::Sub { .. } => "sub-query",
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Parse `asc` / `desc` in any case
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }

    /// Sort key value used by the `$sort` stage
    pub fn value(&self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

/// Ordering clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderClause {
    Column {
        column: String,
        direction: SortDirection,
    },
    /// Random ordering, never compiled
    Random { seed: Option<String> },
}

/// Aggregate function applied over the matched documents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateSpec {
    pub function: String,
    pub columns: Vec<String>,
}

impl AggregateSpec {
    pub fn new(function: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            function: function.into(),
            columns,
        }
    }

    /// First named column, `*` counts as none
    pub fn column(&self) -> Option<&str> {
        self.columns
            .iter()
            .map(|c| c.as_str())
            .find(|c| !c.is_empty() && *c != "*")
    }
}

/// Computed field added before any filtering
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedField {
    pub column: String,
    pub expression: Bson,
}

/// Output projection applied after filtering and grouping
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub column: String,
    pub projection: Bson,
}

/// Row lock a relational caller may ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    ForUpdate,
    Shared,
}

/// Options handed to the store alongside an aggregation pipeline.
///
/// Defaults to decoding arrays as ordered lists. Caller supplied options
/// replace the defaults wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions(Document);

impl PipelineOptions {
    pub fn new(options: Document) -> Self {
        Self(options)
    }

    pub fn as_document(&self) -> &Document {
        &self.0
    }

    pub fn into_document(self) -> Document {
        self.0
    }

    pub fn allow_disk_use(&self) -> bool {
        self.0.get_bool("allowDiskUse").unwrap_or(false)
    }

    pub fn batch_size(&self) -> Option<i64> {
        match self.0.get("batchSize") {
            Some(Bson::Int32(n)) => Some(i64::from(*n)),
            Some(Bson::Int64(n)) => Some(*n),
            _ => None,
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self(doc! { "typeMap": { "array": "array" } })
    }
}

/// Everything a builder has collected for one query
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryDescription {
    pub collection: String,
    /// Selected columns, empty means `*`
    pub columns: Vec<String>,
    pub wheres: Vec<WhereClause>,
    pub orders: Vec<OrderClause>,
    pub projections: Vec<Projection>,
    pub add_fields: Vec<ComputedField>,
    pub aggregate: Option<AggregateSpec>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub options: Option<PipelineOptions>,
    pub joins: Vec<String>,
    pub groups: Vec<String>,
    pub havings: Vec<WhereClause>,
    pub unions: Vec<QueryDescription>,
    pub lock: Option<LockMode>,
}

impl QueryDescription {
    /// Create an empty description over a collection
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Self::default()
        }
    }

    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_where(mut self, clause: WhereClause) -> Self {
        self.wheres.push(clause);
        self
    }

    pub fn with_order(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.orders.push(OrderClause::Column {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn with_aggregate(mut self, aggregate: AggregateSpec) -> Self {
        self.aggregate = Some(aggregate);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Options the pipeline runs with
    pub fn pipeline_options(&self) -> PipelineOptions {
        self.options.clone().unwrap_or_default()
    }
}
