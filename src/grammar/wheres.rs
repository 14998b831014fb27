//! Predicate compilation
//!
//! Each clause compiles to a filter fragment. Fragments of one AND-run are
//! merged into a single document; a clause joined with `Or` starts a new
//! run and the runs are combined under `$or`, so AND binds tighter than OR.

use bson::{doc, Bson, Document, Regex};

use super::errors::{GrammarError, GrammarResult};
use crate::query::{operators, Boolean, DatePart, Operator, WhereClause};

/// Compile an ordered clause list into one filter document
pub fn compile_wheres(wheres: &[WhereClause]) -> GrammarResult<Document> {
    let mut groups: Vec<Vec<Document>> = Vec::new();

    for (index, clause) in wheres.iter().enumerate() {
        if index == 0 || clause.boolean() == Boolean::Or {
            groups.push(Vec::new());
        }
        let fragment = compile_clause(clause)?;
        if let Some(group) = groups.last_mut() {
            group.push(fragment);
        }
    }

    let mut merged: Vec<Document> = groups.into_iter().map(conjoin).collect();
    match merged.len() {
        0 => Ok(Document::new()),
        1 => Ok(merged.remove(0)),
        _ => Ok(doc! {
            "$or": merged.into_iter().map(Bson::Document).collect::<Vec<_>>()
        }),
    }
}

/// AND-combine fragments.
///
/// Fragments with disjoint keys merge into one document. If any key repeats
/// the fragments are kept whole under `$and` so no condition is lost.
pub fn conjoin(fragments: Vec<Document>) -> Document {
    let fragments: Vec<Document> = fragments.into_iter().filter(|f| !f.is_empty()).collect();

    let mut merged = Document::new();
    for fragment in &fragments {
        if fragment.keys().any(|key| merged.contains_key(key)) {
            return doc! {
                "$and": fragments.into_iter().map(Bson::Document).collect::<Vec<_>>()
            };
        }
        for (key, value) in fragment {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Compile one clause into a filter fragment
pub fn compile_clause(clause: &WhereClause) -> GrammarResult<Document> {
    match clause {
        WhereClause::Basic {
            column,
            operator,
            value,
            ..
        } => compile_basic(column, operator, value),
        WhereClause::In { column, values, .. } => Ok(field(
            column,
            Bson::Document(doc! { "$in": values.clone() }),
        )),
        WhereClause::NotIn { column, values, .. } => Ok(field(
            column,
            Bson::Document(doc! { "$nin": values.clone() }),
        )),
        WhereClause::Null { column, .. } => Ok(field(column, Bson::Null)),
        WhereClause::NotNull { column, .. } => Ok(not_null(column)),
        WhereClause::Between {
            column,
            low,
            high,
            not,
            ..
        } => Ok(compile_between(column, low, high, *not)),
        WhereClause::Date {
            column,
            part,
            operator,
            value,
            ..
        } => compile_date(column, *part, operator, value),
        WhereClause::Raw { expression, .. } => Ok(expression.clone()),
        WhereClause::Column { .. } => Err(GrammarError::unsupported("column comparison")),
        WhereClause::Nested { .. } => Err(GrammarError::unsupported("nested where groups")),
        WhereClause::InSub { .. } | WhereClause::NotInSub { .. } => {
            Err(GrammarError::unsupported("sub-query membership"))
        }
        WhereClause::Exists { .. } => Err(GrammarError::unsupported("exists sub-queries")),
        WhereClause::Sub { .. } => Err(GrammarError::unsupported("sub-query comparison")),
    }
}

/// `{ column: { $ne: null } }`
pub fn not_null(column: &str) -> Document {
    field(column, Bson::Document(doc! { "$ne": Bson::Null }))
}

fn field(column: &str, condition: Bson) -> Document {
    let mut fragment = Document::new();
    fragment.insert(column, condition);
    fragment
}

fn operator_document(name: &str, value: Bson) -> Bson {
    let mut condition = Document::new();
    condition.insert(format!("${}", name), value);
    Bson::Document(condition)
}

fn compile_basic(column: &str, operator: &str, value: &Bson) -> GrammarResult<Document> {
    let parsed =
        Operator::parse(operator).ok_or_else(|| GrammarError::InvalidOperator(operator.to_string()))?;

    let condition = match parsed {
        Operator::Equals => value.clone(),
        Operator::Like { negated } => {
            let pattern = value.as_str().ok_or_else(|| {
                GrammarError::invalid_argument(format!("like on '{}' needs a string pattern", column))
            })?;
            negate(Bson::RegularExpression(like_to_regex(pattern)), negated)
        }
        Operator::Regex { negated } => {
            negate(Bson::RegularExpression(to_regex(column, value)?), negated)
        }
        Operator::Native(name) => operator_document(name, value.clone()),
    };

    Ok(field(column, condition))
}

fn negate(regex: Bson, negated: bool) -> Bson {
    if negated {
        operator_document("not", regex)
    } else {
        regex
    }
}

/// Translate a SQL `like` pattern into a case-insensitive regex.
///
/// Literal segments are escaped, unescaped `%` becomes `.*`, and `\%`
/// stays a literal percent sign. The regex is anchored at each end that
/// does not carry a wildcard.
pub fn like_to_regex(pattern: &str) -> Regex {
    let mut segments: Vec<String> = vec![String::new()];
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&'%') {
            chars.next();
            push_char(&mut segments, '%');
        } else if c == '%' {
            segments.push(String::new());
        } else {
            push_char(&mut segments, c);
        }
    }

    let open_start = segments.len() > 1 && segments[0].is_empty();
    let open_end = segments.len() > 1 && segments.last().map_or(false, |s| s.is_empty());

    let body = segments
        .iter()
        .map(|segment| regex::escape(segment))
        .collect::<Vec<_>>()
        .join(".*");

    let mut compiled = String::with_capacity(body.len() + 2);
    if !open_start {
        compiled.push('^');
    }
    compiled.push_str(&body);
    if !open_end {
        compiled.push('$');
    }

    Regex {
        pattern: compiled,
        options: "i".to_string(),
    }
}

fn push_char(segments: &mut [String], c: char) {
    if let Some(last) = segments.last_mut() {
        last.push(c);
    }
}

/// Accept a native regex or a delimited `/pattern/flags` string.
///
/// The first character is the delimiter and the pattern runs to its last
/// occurrence, so the pattern itself may contain the delimiter.
fn to_regex(column: &str, value: &Bson) -> GrammarResult<Regex> {
    match value {
        Bson::RegularExpression(regex) => Ok(regex.clone()),
        Bson::String(raw) => parse_delimited(raw).ok_or_else(|| {
            GrammarError::invalid_argument(format!(
                "regex on '{}' needs a delimited pattern, got '{}'",
                column, raw
            ))
        }),
        other => Err(GrammarError::invalid_argument(format!(
            "regex on '{}' needs a string or regex, got {:?}",
            column,
            other.element_type()
        ))),
    }
}

pub(crate) fn parse_delimited(raw: &str) -> Option<Regex> {
    let delimiter = raw.chars().next()?;
    let start = delimiter.len_utf8();
    let end = raw.rfind(delimiter)?;
    if end < start {
        return None;
    }

    let mut flags: Vec<char> = raw[end + delimiter.len_utf8()..].chars().collect();
    flags.sort_unstable();
    flags.dedup();

    Some(Regex {
        pattern: raw[start..end].to_string(),
        options: flags.into_iter().collect(),
    })
}

fn compile_between(column: &str, low: &Bson, high: &Bson, not: bool) -> Document {
    if not {
        doc! {
            "$or": [
                Bson::Document(field(column, operator_document("lt", low.clone()))),
                Bson::Document(field(column, operator_document("gt", high.clone()))),
            ]
        }
    } else {
        field(
            column,
            Bson::Document(doc! { "$gte": low.clone(), "$lte": high.clone() }),
        )
    }
}

fn compile_date(
    column: &str,
    part: DatePart,
    operator: &str,
    value: &Bson,
) -> GrammarResult<Document> {
    let comparison = operators::comparison(operator)
        .ok_or_else(|| GrammarError::InvalidOperator(operator.to_string()))?;
    let path = format!("${}", column);

    let (extract, literal) = match part {
        DatePart::Day => (doc! { "$dayOfMonth": path.as_str() }, coerce_int(column, value)?),
        DatePart::Month => (doc! { "$month": path.as_str() }, coerce_int(column, value)?),
        DatePart::Year => (doc! { "$year": path.as_str() }, coerce_int(column, value)?),
        DatePart::Date => (
            doc! { "$dateToString": { "format": "%Y-%m-%d", "date": path.as_str() } },
            value.clone(),
        ),
        DatePart::Time => (
            doc! { "$dateToString": { "format": "%H:%M:%S", "date": path.as_str() } },
            value.clone(),
        ),
    };

    let mut expression = Document::new();
    expression.insert(
        format!("${}", comparison),
        Bson::Array(vec![Bson::Document(extract), literal]),
    );
    Ok(doc! { "$expr": expression })
}

/// Integer literal for day, month and year comparisons
fn coerce_int(column: &str, value: &Bson) -> GrammarResult<Bson> {
    let n = match value {
        Bson::Int32(n) => i64::from(*n),
        Bson::Int64(n) => *n,
        Bson::Double(f) if f.fract() == 0.0 && f.is_finite() => *f as i64,
        Bson::String(s) => s.trim().parse::<i64>().map_err(|_| {
            GrammarError::invalid_argument(format!(
                "date part on '{}' needs an integer, got '{}'",
                column, s
            ))
        })?,
        other => {
            return Err(GrammarError::invalid_argument(format!(
                "date part on '{}' needs an integer, got {:?}",
                column,
                other.element_type()
            )))
        }
    };
    Ok(i32::try_from(n).map_or(Bson::Int64(n), Bson::Int32))
}
