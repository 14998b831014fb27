//! Update operator application

use bson::{Bson, Document};

use super::matcher::{equals, matches};
use super::values::{as_f64, as_i64, int_to_bson, is_numeric, resolve, set_path, unset_path, values_equal};
use crate::store::{StoreError, StoreResult};

/// Apply an operator update to a copy of `document`.
///
/// Returns `None` when the update leaves the document unchanged.
pub fn apply_update(document: &Document, update: &Document) -> StoreResult<Option<Document>> {
    if update.is_empty() {
        return Err(StoreError::invalid("update document is empty"));
    }
    let mut out = document.clone();

    for (op, fields) in update {
        let fields = match fields {
            Bson::Document(fields) => fields,
            _ => return Err(StoreError::invalid(format!("{} needs a document", op))),
        };
        for (path, argument) in fields {
            if path == "_id" || path.starts_with("_id.") {
                return Err(StoreError::invalid("the _id field is immutable"));
            }
            match op.as_str() {
                "$set" => set_path(&mut out, path, argument.clone())?,
                "$unset" => {
                    unset_path(&mut out, path);
                }
                "$inc" => increment(&mut out, path, argument)?,
                "$push" => push(&mut out, path, argument, false)?,
                "$addToSet" => push(&mut out, path, argument, true)?,
                "$pull" => pull(&mut out, path, argument)?,
                "$pullAll" => pull_all(&mut out, path, argument)?,
                other if other.starts_with('$') => {
                    return Err(StoreError::UnsupportedOperator(other.to_string()))
                }
                _ => {
                    return Err(StoreError::invalid(
                        "update documents may only contain operators",
                    ))
                }
            }
        }
    }

    if out == *document {
        Ok(None)
    } else {
        Ok(Some(out))
    }
}

fn increment(document: &mut Document, path: &str, amount: &Bson) -> StoreResult<()> {
    if !is_numeric(amount) {
        return Err(StoreError::TypeMismatch(format!(
            "$inc on '{}' needs a numeric amount",
            path
        )));
    }
    let next = match resolve(document, path) {
        None | Some(Bson::Null) => amount.clone(),
        Some(current) if is_numeric(&current) => {
            let doubles = matches!(current, Bson::Double(_)) || matches!(amount, Bson::Double(_));
            match (as_i64(&current), as_i64(amount)) {
                (Some(a), Some(b)) if !doubles => match a.checked_add(b) {
                    Some(sum) => int_to_bson(sum),
                    None => Bson::Double(a as f64 + b as f64),
                },
                _ => Bson::Double(as_f64(&current).unwrap_or(0.0) + as_f64(amount).unwrap_or(0.0)),
            }
        }
        Some(_) => {
            return Err(StoreError::TypeMismatch(format!(
                "cannot $inc non-numeric field '{}'",
                path
            )))
        }
    };
    set_path(document, path, next)
}

fn current_array(document: &Document, path: &str) -> StoreResult<Vec<Bson>> {
    match resolve(document, path) {
        None | Some(Bson::Null) => Ok(Vec::new()),
        Some(Bson::Array(items)) => Ok(items),
        Some(_) => Err(StoreError::TypeMismatch(format!(
            "field '{}' is not an array",
            path
        ))),
    }
}

/// `$push` / `$addToSet`, with `{ $each: [...] }` for several values
fn push(document: &mut Document, path: &str, argument: &Bson, unique: bool) -> StoreResult<()> {
    let values = match argument {
        Bson::Document(spec) if spec.contains_key("$each") => match spec.get("$each") {
            Some(Bson::Array(items)) => items.clone(),
            _ => return Err(StoreError::invalid("$each needs an array")),
        },
        single => vec![single.clone()],
    };

    let mut items = current_array(document, path)?;
    for value in values {
        if unique && items.iter().any(|existing| values_equal(existing, &value)) {
            continue;
        }
        items.push(value);
    }
    set_path(document, path, Bson::Array(items))
}

/// `$pull` removes values equal to the argument, or matching it when the
/// argument is a condition document
fn pull(document: &mut Document, path: &str, argument: &Bson) -> StoreResult<()> {
    if resolve(document, path).is_none() {
        return Ok(());
    }
    let items = current_array(document, path)?;
    let mut kept = Vec::with_capacity(items.len());
    for item in items {
        let remove = match argument {
            Bson::Document(condition) => {
                let is_operator = condition.keys().next().map_or(false, |k| k.starts_with('$'));
                match &item {
                    _ if is_operator => {
                        let mut wrapped = Document::new();
                        wrapped.insert("v", condition.clone());
                        let mut probe = Document::new();
                        probe.insert("v", item.clone());
                        matches(&probe, &wrapped)?
                    }
                    Bson::Document(embedded) => matches(embedded, condition)?,
                    _ => false,
                }
            }
            other => equals(Some(&item), other),
        };
        if !remove {
            kept.push(item);
        }
    }
    set_path(document, path, Bson::Array(kept))
}

fn pull_all(document: &mut Document, path: &str, argument: &Bson) -> StoreResult<()> {
    let values = match argument {
        Bson::Array(values) => values,
        _ => return Err(StoreError::invalid("$pullAll needs an array")),
    };
    if resolve(document, path).is_none() {
        return Ok(());
    }
    let items = current_array(document, path)?;
    let kept: Vec<Bson> = items
        .into_iter()
        .filter(|item| !values.iter().any(|v| values_equal(item, v)))
        .collect();
    set_path(document, path, Bson::Array(kept))
}
