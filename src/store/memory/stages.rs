//! Pipeline stage execution

use std::cmp::Ordering;

use bson::{Bson, Document};

use super::expr::evaluate;
use super::matcher::matches;
use super::values::{as_f64, as_i64, compare, int_to_bson, is_numeric, resolve, set_path, values_equal};
use crate::store::{StoreError, StoreResult};

/// Run every stage in order over a working set of documents
pub fn run_pipeline(documents: Vec<Document>, pipeline: &[Document]) -> StoreResult<Vec<Document>> {
    let mut working = documents;
    for stage in pipeline {
        let (name, spec) = split_stage(stage)?;
        working = match name {
            "$match" => match_stage(working, as_document(name, spec)?)?,
            "$project" => project_stage(working, as_document(name, spec)?)?,
            "$addFields" | "$set" => add_fields_stage(working, as_document(name, spec)?)?,
            "$group" => group_stage(working, as_document(name, spec)?)?,
            "$sort" => sort_stage(working, as_document(name, spec)?)?,
            "$skip" => {
                let n = non_negative(name, spec)?;
                working.into_iter().skip(n).collect()
            }
            "$limit" => {
                let n = non_negative(name, spec)?;
                if n == 0 {
                    return Err(StoreError::invalid("$limit must be positive"));
                }
                working.truncate(n);
                working
            }
            "$count" => count_stage(working, spec)?,
            other => return Err(StoreError::UnsupportedStage(other.to_string())),
        };
    }
    Ok(working)
}

fn split_stage(stage: &Document) -> StoreResult<(&str, &Bson)> {
    let mut iter = stage.iter();
    match (iter.next(), iter.next()) {
        (Some((name, spec)), None) => Ok((name.as_str(), spec)),
        _ => Err(StoreError::invalid(
            "a pipeline stage must have exactly one field",
        )),
    }
}

fn as_document<'a>(name: &str, spec: &'a Bson) -> StoreResult<&'a Document> {
    match spec {
        Bson::Document(doc) => Ok(doc),
        _ => Err(StoreError::invalid(format!("{} needs a document", name))),
    }
}

fn non_negative(name: &str, spec: &Bson) -> StoreResult<usize> {
    as_i64(spec)
        .filter(|n| *n >= 0)
        .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
        .ok_or_else(|| StoreError::invalid(format!("{} needs a non-negative integer", name)))
}

fn match_stage(documents: Vec<Document>, filter: &Document) -> StoreResult<Vec<Document>> {
    let mut kept = Vec::with_capacity(documents.len());
    for document in documents {
        if matches(&document, filter)? {
            kept.push(document);
        }
    }
    Ok(kept)
}

enum FieldSpec<'a> {
    Include,
    Exclude,
    Computed(&'a Bson),
}

fn field_spec(value: &Bson) -> FieldSpec<'_> {
    match value {
        Bson::Boolean(b) => flag(*b),
        v if is_numeric(v) => flag(as_f64(v).map_or(true, |n| n != 0.0)),
        other => FieldSpec::Computed(other),
    }
}

fn flag(on: bool) -> FieldSpec<'static> {
    if on {
        FieldSpec::Include
    } else {
        FieldSpec::Exclude
    }
}

fn project_stage(documents: Vec<Document>, spec: &Document) -> StoreResult<Vec<Document>> {
    let mut include_id = true;
    let mut fields = Vec::new();
    let (mut including, mut excluding) = (false, false);

    for (key, value) in spec {
        let field = field_spec(value);
        if key == "_id" {
            match field {
                FieldSpec::Exclude => include_id = false,
                FieldSpec::Include => {}
                FieldSpec::Computed(_) => fields.push((key.as_str(), field)),
            }
            continue;
        }
        match field {
            FieldSpec::Exclude => excluding = true,
            _ => including = true,
        }
        fields.push((key.as_str(), field));
    }

    if including && excluding {
        return Err(StoreError::invalid(
            "$project cannot mix inclusion and exclusion",
        ));
    }

    documents
        .into_iter()
        .map(|document| {
            if excluding || (!including && fields.is_empty()) {
                let mut out = document;
                for (key, _) in &fields {
                    super::values::unset_path(&mut out, key);
                }
                if !include_id {
                    out.remove("_id");
                }
                return Ok(out);
            }

            let mut out = Document::new();
            if include_id {
                if let Some(id) = document.get("_id") {
                    out.insert("_id", id.clone());
                }
            }
            for (key, field) in &fields {
                match field {
                    FieldSpec::Include => {
                        if let Some(value) = resolve(&document, key) {
                            set_path(&mut out, key, value)?;
                        }
                    }
                    FieldSpec::Computed(expression) => {
                        set_path(&mut out, key, evaluate(expression, &document)?)?;
                    }
                    FieldSpec::Exclude => {}
                }
            }
            Ok(out)
        })
        .collect()
}

fn add_fields_stage(documents: Vec<Document>, spec: &Document) -> StoreResult<Vec<Document>> {
    documents
        .into_iter()
        .map(|document| {
            let mut out = document.clone();
            for (key, expression) in spec {
                set_path(&mut out, key, evaluate(expression, &document)?)?;
            }
            Ok(out)
        })
        .collect()
}

fn group_stage(documents: Vec<Document>, spec: &Document) -> StoreResult<Vec<Document>> {
    let key_expression = spec
        .get("_id")
        .ok_or_else(|| StoreError::invalid("$group needs an _id"))?;

    let mut groups: Vec<(Bson, Vec<Document>)> = Vec::new();
    for document in documents {
        let key = evaluate(key_expression, &document)?;
        match groups.iter_mut().find(|(k, _)| values_equal(k, &key)) {
            Some((_, members)) => members.push(document),
            None => groups.push((key, vec![document])),
        }
    }

    let mut out = Vec::with_capacity(groups.len());
    for (key, members) in groups {
        let mut row = Document::new();
        row.insert("_id", key);
        for (field, accumulator) in spec {
            if field == "_id" {
                continue;
            }
            let (op, argument) = match accumulator {
                Bson::Document(acc) if acc.len() == 1 => {
                    let mut iter = acc.iter();
                    match iter.next() {
                        Some((op, argument)) => (op.as_str(), argument),
                        None => continue,
                    }
                }
                _ => {
                    return Err(StoreError::invalid(format!(
                        "$group field '{}' needs one accumulator",
                        field
                    )))
                }
            };
            row.insert(field.clone(), accumulate(op, argument, &members)?);
        }
        out.push(row);
    }
    Ok(out)
}

fn accumulate(op: &str, argument: &Bson, members: &[Document]) -> StoreResult<Bson> {
    if op == "$count" {
        return Ok(int_to_bson(members.len() as i64));
    }
    let values = members
        .iter()
        .map(|m| evaluate(argument, m))
        .collect::<StoreResult<Vec<_>>>()?;

    match op {
        "$sum" => Ok(sum(&values)),
        "$avg" => {
            let numbers: Vec<f64> = values.iter().filter_map(as_f64).collect();
            if numbers.is_empty() {
                Ok(Bson::Null)
            } else {
                Ok(Bson::Double(numbers.iter().sum::<f64>() / numbers.len() as f64))
            }
        }
        "$min" | "$max" => {
            let wanted = if op == "$max" {
                Ordering::Greater
            } else {
                Ordering::Less
            };
            Ok(values
                .into_iter()
                .filter(|v| !matches!(v, Bson::Null | Bson::Undefined))
                .fold(None::<Bson>, |best, v| match best {
                    Some(b) if compare(&v, &b) != wanted => Some(b),
                    _ => Some(v),
                })
                .unwrap_or(Bson::Null))
        }
        "$first" => Ok(values.into_iter().next().unwrap_or(Bson::Null)),
        "$last" => Ok(values.into_iter().last().unwrap_or(Bson::Null)),
        "$push" => Ok(Bson::Array(values)),
        "$addToSet" => {
            let mut set: Vec<Bson> = Vec::new();
            for value in values {
                if !set.iter().any(|s| values_equal(s, &value)) {
                    set.push(value);
                }
            }
            Ok(Bson::Array(set))
        }
        other => Err(StoreError::UnsupportedOperator(other.to_string())),
    }
}

/// `$sum` ignores non-numeric values and widens only when needed
fn sum(values: &[Bson]) -> Bson {
    let numbers: Vec<&Bson> = values.iter().filter(|v| is_numeric(v)).collect();
    let any_double = numbers.iter().any(|v| matches!(v, Bson::Double(_)));
    if !any_double {
        let total = numbers
            .iter()
            .try_fold(0_i64, |acc, v| as_i64(v).and_then(|n| acc.checked_add(n)));
        if let Some(total) = total {
            return int_to_bson(total);
        }
    }
    Bson::Double(numbers.iter().filter_map(|v| as_f64(v)).sum())
}

fn sort_stage(mut documents: Vec<Document>, spec: &Document) -> StoreResult<Vec<Document>> {
    let mut keys = Vec::with_capacity(spec.len());
    for (field, direction) in spec {
        let descending = match as_i64(direction) {
            Some(1) => false,
            Some(-1) => true,
            _ => {
                return Err(StoreError::invalid(format!(
                    "$sort direction for '{}' must be 1 or -1",
                    field
                )))
            }
        };
        keys.push((field.as_str(), descending));
    }

    if let [("$natural", descending)] = keys.as_slice() {
        if *descending {
            documents.reverse();
        }
        return Ok(documents);
    }

    documents.sort_by(|a, b| {
        for (field, descending) in keys.iter().filter(|(f, _)| *f != "$natural") {
            let left = resolve(a, field).unwrap_or(Bson::Null);
            let right = resolve(b, field).unwrap_or(Bson::Null);
            let ordering = compare(&left, &right);
            let ordering = if *descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    Ok(documents)
}

fn count_stage(documents: Vec<Document>, spec: &Bson) -> StoreResult<Vec<Document>> {
    let field = match spec {
        Bson::String(name) if !name.is_empty() && !name.starts_with('$') => name,
        _ => return Err(StoreError::invalid("$count needs a field name")),
    };
    if documents.is_empty() {
        return Ok(Vec::new());
    }
    let mut row = Document::new();
    row.insert(field.clone(), int_to_bson(documents.len() as i64));
    Ok(vec![row])
}
