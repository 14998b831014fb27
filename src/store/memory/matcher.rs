//! Filter document evaluation
//!
//! Implements the query-operator subset the grammar emits plus the common
//! operators callers pass through `where_op` and `where_raw`. Anything else
//! is reported as unsupported rather than silently treated as a miss.

use bson::{Bson, Document, Regex};

use super::expr;
use super::values::{as_i64, compare_same_type, is_numeric, resolve, truthy, values_equal};
use crate::store::{StoreError, StoreResult};

/// Whether a document satisfies a filter. An empty filter matches everything.
pub fn matches(document: &Document, filter: &Document) -> StoreResult<bool> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for sub in sub_filters(key, condition)? {
                    if !matches(document, sub)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => any_match(document, sub_filters(key, condition)?)?,
            "$nor" => !any_match(document, sub_filters(key, condition)?)?,
            "$expr" => truthy(&expr::evaluate(condition, document)?),
            op if op.starts_with('$') => {
                return Err(StoreError::UnsupportedOperator(op.to_string()))
            }
            path => matches_condition(resolve(document, path).as_ref(), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn any_match(document: &Document, filters: Vec<&Document>) -> StoreResult<bool> {
    for sub in filters {
        if matches(document, sub)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn sub_filters<'a>(key: &str, condition: &'a Bson) -> StoreResult<Vec<&'a Document>> {
    let items = match condition {
        Bson::Array(items) if !items.is_empty() => items,
        _ => {
            return Err(StoreError::invalid(format!(
                "{} needs a non-empty array of filters",
                key
            )))
        }
    };
    items
        .iter()
        .map(|item| match item {
            Bson::Document(doc) => Ok(doc),
            _ => Err(StoreError::invalid(format!("{} entries must be documents", key))),
        })
        .collect()
}

/// Condition on a single field value, `None` when the field is absent
fn matches_condition(value: Option<&Bson>, condition: &Bson) -> StoreResult<bool> {
    match condition {
        Bson::Document(ops) if is_operator_document(ops) => matches_operators(value, ops),
        Bson::RegularExpression(regex) => regex_matches(value, regex),
        other => Ok(equals(value, other)),
    }
}

fn is_operator_document(doc: &Document) -> bool {
    doc.keys().next().map_or(false, |k| k.starts_with('$'))
}

/// Equality with array-contains semantics; `null` also matches absent fields
pub(crate) fn equals(value: Option<&Bson>, target: &Bson) -> bool {
    match (value, target) {
        (None, Bson::Null) | (Some(Bson::Null), Bson::Null) => true,
        (None, _) => false,
        (Some(whole @ Bson::Array(items)), _) => {
            values_equal(whole, target) || items.iter().any(|item| values_equal(item, target))
        }
        (Some(v), _) => values_equal(v, target),
    }
}

fn matches_operators(value: Option<&Bson>, ops: &Document) -> StoreResult<bool> {
    for (op, argument) in ops {
        let ok = match op.as_str() {
            "$eq" => equals(value, argument),
            "$ne" => !equals(value, argument),
            "$gt" | "$gte" | "$lt" | "$lte" => compare_op(op, value, argument),
            "$in" => in_list(value, op, argument)?,
            "$nin" => !in_list(value, op, argument)?,
            "$exists" => truthy(argument) == value.is_some(),
            "$type" => type_matches(value, argument)?,
            "$mod" => mod_matches(value, argument)?,
            "$regex" => {
                let regex = regex_argument(argument, ops.get_str("$options").ok())?;
                regex_matches(value, &regex)?
            }
            "$options" => {
                if !ops.contains_key("$regex") {
                    return Err(StoreError::invalid("$options without $regex"));
                }
                true
            }
            "$not" => match argument {
                Bson::RegularExpression(regex) => !regex_matches(value, regex)?,
                Bson::Document(inner) if is_operator_document(inner) => {
                    !matches_operators(value, inner)?
                }
                _ => return Err(StoreError::invalid("$not needs a regex or operator document")),
            },
            "$all" => all_matches(value, argument)?,
            "$size" => size_matches(value, argument)?,
            "$elemMatch" => elem_match(value, argument)?,
            other => return Err(StoreError::UnsupportedOperator(other.to_string())),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn compare_op(op: &str, value: Option<&Bson>, bound: &Bson) -> bool {
    let check = |candidate: &Bson| -> bool {
        match compare_same_type(candidate, bound) {
            Some(ordering) => match op {
                "$gt" => ordering.is_gt(),
                "$gte" => ordering.is_ge(),
                "$lt" => ordering.is_lt(),
                _ => ordering.is_le(),
            },
            None => false,
        }
    };

    match value {
        None => matches!(bound, Bson::Null) && matches!(op, "$gte" | "$lte"),
        Some(Bson::Array(items)) if !matches!(bound, Bson::Array(_)) => items.iter().any(check),
        Some(v) => check(v),
    }
}

fn in_list(value: Option<&Bson>, op: &str, argument: &Bson) -> StoreResult<bool> {
    let candidates = match argument {
        Bson::Array(items) => items,
        _ => return Err(StoreError::invalid(format!("{} needs an array", op))),
    };
    for candidate in candidates {
        let hit = match candidate {
            Bson::RegularExpression(regex) => regex_matches(value, regex)?,
            other => equals(value, other),
        };
        if hit {
            return Ok(true);
        }
    }
    Ok(false)
}

fn all_matches(value: Option<&Bson>, argument: &Bson) -> StoreResult<bool> {
    let required = match argument {
        Bson::Array(items) => items,
        _ => return Err(StoreError::invalid("$all needs an array")),
    };
    if required.is_empty() {
        return Ok(false);
    }
    Ok(required.iter().all(|r| equals(value, r)))
}

fn size_matches(value: Option<&Bson>, argument: &Bson) -> StoreResult<bool> {
    let expected = as_i64(argument)
        .ok_or_else(|| StoreError::TypeMismatch("$size needs a number".to_string()))?;
    Ok(match value {
        Some(Bson::Array(items)) => items.len() as i64 == expected,
        _ => false,
    })
}

fn elem_match(value: Option<&Bson>, argument: &Bson) -> StoreResult<bool> {
    let condition = match argument {
        Bson::Document(doc) => doc,
        _ => return Err(StoreError::invalid("$elemMatch needs a document")),
    };
    let items = match value {
        Some(Bson::Array(items)) => items,
        _ => return Ok(false),
    };

    let operator_form = is_operator_document(condition)
        && !condition
            .keys()
            .any(|k| matches!(k.as_str(), "$and" | "$or" | "$nor" | "$expr"));

    for item in items {
        let hit = if operator_form {
            matches_operators(Some(item), condition)?
        } else {
            match item {
                Bson::Document(embedded) => matches(embedded, condition)?,
                _ => false,
            }
        };
        if hit {
            return Ok(true);
        }
    }
    Ok(false)
}

fn mod_matches(value: Option<&Bson>, argument: &Bson) -> StoreResult<bool> {
    let (divisor, remainder) = match argument {
        Bson::Array(parts) if parts.len() == 2 => (
            as_i64(&parts[0])
                .ok_or_else(|| StoreError::TypeMismatch("$mod divisor".to_string()))?,
            as_i64(&parts[1])
                .ok_or_else(|| StoreError::TypeMismatch("$mod remainder".to_string()))?,
        ),
        _ => return Err(StoreError::invalid("$mod needs [divisor, remainder]")),
    };
    if divisor == 0 {
        return Err(StoreError::invalid("$mod divisor cannot be zero"));
    }

    let check = |v: &Bson| is_numeric(v) && as_i64(v).map_or(false, |n| n % divisor == remainder);
    Ok(match value {
        Some(Bson::Array(items)) => items.iter().any(check),
        Some(v) => check(v),
        None => false,
    })
}

fn type_matches(value: Option<&Bson>, argument: &Bson) -> StoreResult<bool> {
    let wanted: Vec<&Bson> = match argument {
        Bson::Array(items) => items.iter().collect(),
        single => vec![single],
    };
    let value = match value {
        Some(v) => v,
        None => return Ok(false),
    };

    for spec in wanted {
        let hit = match value {
            Bson::Array(items) => {
                is_type(value, spec)? || items.iter().any(|i| is_type(i, spec).unwrap_or(false))
            }
            v => is_type(v, spec)?,
        };
        if hit {
            return Ok(true);
        }
    }
    Ok(false)
}

fn is_type(value: &Bson, spec: &Bson) -> StoreResult<bool> {
    if let Bson::String(alias) = spec {
        if alias == "number" {
            return Ok(is_numeric(value));
        }
        return Ok(type_alias(value) == Some(alias.as_str()));
    }
    let code = as_i64(spec)
        .ok_or_else(|| StoreError::invalid("$type needs a type code or alias"))?;
    Ok(type_code(value) == Some(code))
}

fn type_code(value: &Bson) -> Option<i64> {
    Some(match value {
        Bson::Double(_) => 1,
        Bson::String(_) => 2,
        Bson::Document(_) => 3,
        Bson::Array(_) => 4,
        Bson::Binary(_) => 5,
        Bson::Undefined => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Null => 10,
        Bson::RegularExpression(_) => 11,
        Bson::JavaScriptCode(_) => 13,
        Bson::Symbol(_) => 14,
        Bson::Int32(_) => 16,
        Bson::Timestamp(_) => 17,
        Bson::Int64(_) => 18,
        Bson::Decimal128(_) => 19,
        Bson::MinKey => -1,
        Bson::MaxKey => 127,
        _ => return None,
    })
}

fn type_alias(value: &Bson) -> Option<&'static str> {
    Some(match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Document(_) => "object",
        Bson::Array(_) => "array",
        Bson::Binary(_) => "binData",
        Bson::Undefined => "undefined",
        Bson::ObjectId(_) => "objectId",
        Bson::Boolean(_) => "bool",
        Bson::DateTime(_) => "date",
        Bson::Null => "null",
        Bson::RegularExpression(_) => "regex",
        Bson::JavaScriptCode(_) => "javascript",
        Bson::Symbol(_) => "symbol",
        Bson::Int32(_) => "int",
        Bson::Timestamp(_) => "timestamp",
        Bson::Int64(_) => "long",
        Bson::Decimal128(_) => "decimal",
        Bson::MinKey => "minKey",
        Bson::MaxKey => "maxKey",
        _ => return None,
    })
}

fn regex_argument(argument: &Bson, options: Option<&str>) -> StoreResult<Regex> {
    match argument {
        Bson::RegularExpression(regex) => Ok(match options {
            Some(options) => Regex {
                pattern: regex.pattern.clone(),
                options: options.to_string(),
            },
            None => regex.clone(),
        }),
        Bson::String(pattern) => Ok(Regex {
            pattern: pattern.clone(),
            options: options.unwrap_or_default().to_string(),
        }),
        _ => Err(StoreError::invalid("$regex needs a string or regex")),
    }
}

/// Compile a store regex; only the `i`, `m`, `s` and `x` flags carry over
pub(crate) fn compile_regex(regex: &Regex) -> StoreResult<regex::Regex> {
    let flags: String = regex
        .options
        .chars()
        .filter(|c| matches!(c, 'i' | 'm' | 's' | 'x'))
        .collect();
    let source = if flags.is_empty() {
        regex.pattern.clone()
    } else {
        format!("(?{}){}", flags, regex.pattern)
    };
    regex::Regex::new(&source)
        .map_err(|e| StoreError::invalid(format!("bad regex /{}/: {}", regex.pattern, e)))
}

fn regex_matches(value: Option<&Bson>, regex: &Regex) -> StoreResult<bool> {
    let compiled = compile_regex(regex)?;
    Ok(match value {
        Some(Bson::String(s)) => compiled.is_match(s),
        Some(Bson::Array(items)) => items.iter().any(|item| match item {
            Bson::String(s) => compiled.is_match(s),
            _ => false,
        }),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn people() -> Vec<Document> {
        vec![
            doc! { "name": "John Doe", "age": 30, "tags": ["a", "b", "c"] },
            doc! { "name": "Jane Doe", "age": 20, "tags": ["b"] },
            doc! { "name": "Robert Roe", "age": Bson::Null },
            doc! { "name": "Mark Moe" },
        ]
    }

    fn count(filter: Document) -> usize {
        people()
            .iter()
            .filter(|d| matches(d, &filter).unwrap())
            .count()
    }

    #[test]
    fn test_empty_filter_matches_all() {
        assert_eq!(count(doc! {}), 4);
    }

    #[test]
    fn test_equality_and_array_contains() {
        assert_eq!(count(doc! { "age": 20 }), 1);
        assert_eq!(count(doc! { "age": 20_i64 }), 1);
        assert_eq!(count(doc! { "tags": "b" }), 2);
        assert_eq!(count(doc! { "tags": ["b"] }), 1);
    }

    #[test]
    fn test_null_matches_absent() {
        assert_eq!(count(doc! { "age": Bson::Null }), 2);
        assert_eq!(count(doc! { "age": { "$ne": Bson::Null } }), 2);
        assert_eq!(count(doc! { "foo": Bson::Null }), 4);
        assert_eq!(count(doc! { "foo": { "$ne": Bson::Null } }), 0);
    }

    #[test]
    fn test_comparisons_stay_in_type_bracket() {
        assert_eq!(count(doc! { "age": { "$gte": 20, "$lte": 25 } }), 1);
        assert_eq!(count(doc! { "age": { "$gt": "1" } }), 0);
        assert_eq!(count(doc! { "age": { "$lt": 100 } }), 2);
    }

    #[test]
    fn test_logical_operators() {
        assert_eq!(
            count(doc! { "$or": [ { "age": 20 }, { "age": 30 } ] }),
            2
        );
        assert_eq!(
            count(doc! { "$and": [ { "age": { "$gt": 10 } }, { "age": { "$lt": 25 } } ] }),
            1
        );
        assert_eq!(count(doc! { "$nor": [ { "age": 20 } ] }), 3);
        assert!(matches(&doc! {}, &doc! { "$or": [] }).is_err());
    }

    #[test]
    fn test_in_nin_and_exists() {
        assert_eq!(count(doc! { "age": { "$in": [20, 30] } }), 2);
        assert_eq!(count(doc! { "age": { "$in": [] } }), 0);
        assert_eq!(count(doc! { "age": { "$nin": [20, 30] } }), 2);
        assert_eq!(count(doc! { "age": { "$nin": [] } }), 4);
        assert_eq!(count(doc! { "age": { "$exists": true } }), 3);
        assert_eq!(count(doc! { "age": { "$exists": false } }), 1);
    }

    #[test]
    fn test_array_operators() {
        assert_eq!(count(doc! { "tags": { "$size": 3 } }), 1);
        assert_eq!(count(doc! { "tags": { "$all": ["a", "b"] } }), 1);
        assert_eq!(count(doc! { "tags": { "$elemMatch": { "$eq": "c" } } }), 1);
    }

    #[test]
    fn test_type_and_mod() {
        assert_eq!(count(doc! { "name": { "$type": 2 } }), 4);
        assert_eq!(count(doc! { "age": { "$type": "number" } }), 2);
        assert_eq!(count(doc! { "age": { "$type": 10 } }), 1);
        assert_eq!(count(doc! { "age": { "$mod": [15, 0] } }), 1);
        assert_eq!(count(doc! { "age": { "$mod": [10, 0] } }), 2);
    }

    #[test]
    fn test_regex_forms() {
        let doe = Bson::RegularExpression(Regex {
            pattern: "doe$".into(),
            options: "i".into(),
        });
        assert_eq!(count(doc! { "name": doe.clone() }), 2);
        assert_eq!(count(doc! { "name": { "$not": doe } }), 2);
        assert_eq!(
            count(doc! { "name": { "$regex": "^j", "$options": "i" } }),
            2
        );
        assert_eq!(count(doc! { "name": { "$regex": "^j" } }), 0);
    }

    #[test]
    fn test_unknown_operator_is_an_error() {
        let err = matches(&doc! { "a": 1 }, &doc! { "a": { "$near": [0, 0] } }).unwrap_err();
        assert_eq!(err, StoreError::UnsupportedOperator("$near".into()));
    }

    #[test]
    fn test_expr_filter() {
        let filter = doc! { "$expr": { "$gt": ["$age", 25] } };
        assert_eq!(count(filter), 1);
    }
}
