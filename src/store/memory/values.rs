//! Value helpers shared by matching, expressions and sorting

use std::cmp::Ordering;

use bson::{Bson, Document};

use crate::store::{StoreError, StoreResult};

/// Resolve a dotted path.
///
/// Numeric segments index into arrays. A named segment applied to an array
/// collects that field from every embedded document, like the server does.
pub fn resolve(document: &Document, path: &str) -> Option<Bson> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = document.get(first)?.clone();

    for segment in segments {
        current = step(&current, segment)?;
    }
    Some(current)
}

fn step(value: &Bson, segment: &str) -> Option<Bson> {
    match value {
        Bson::Document(doc) => doc.get(segment).cloned(),
        Bson::Array(items) => match segment.parse::<usize>() {
            Ok(index) => items.get(index).cloned(),
            Err(_) => {
                let collected: Vec<Bson> = items
                    .iter()
                    .filter_map(|item| match item {
                        Bson::Document(doc) => doc.get(segment).cloned(),
                        _ => None,
                    })
                    .collect();
                if collected.is_empty() {
                    None
                } else {
                    Some(Bson::Array(collected))
                }
            }
        },
        _ => None,
    }
}

/// Numeric view of a value
pub fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

/// Integer view of a value; doubles are truncated
pub fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        Bson::Double(f) if f.is_finite() => Some(f.trunc() as i64),
        _ => None,
    }
}

pub fn is_numeric(value: &Bson) -> bool {
    matches!(
        value,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_)
    )
}

/// Narrowest integer representation
pub fn int_to_bson(n: i64) -> Bson {
    i32::try_from(n).map_or(Bson::Int64(n), Bson::Int32)
}

/// Truthiness as used by `$expr`, `$cond` and the logical operators
pub fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Null | Bson::Undefined => false,
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(f) => *f != 0.0,
        _ => true,
    }
}

/// Equality with numeric values compared across widths
pub fn values_equal(a: &Bson, b: &Bson) -> bool {
    if is_numeric(a) && is_numeric(b) {
        return match (as_f64(a), as_f64(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        };
    }
    match (a, b) {
        (Bson::Array(x), Bson::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        (Bson::Document(x), Bson::Document(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y.iter())
                    .all(|((kx, vx), (ky, vy))| kx == ky && values_equal(vx, vy))
        }
        _ => a == b,
    }
}

/// Canonical type rank used when comparing values of different types.
///
/// null < numbers < strings < documents < arrays < binary < object ids
/// < booleans < dates < timestamps < regexes
fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::MaxKey => 13,
        _ => 12,
    }
}

/// Total order over values, used for sorting and `$expr` comparisons
pub fn compare(a: &Bson, b: &Bson) -> Ordering {
    let (ra, rb) = (type_rank(a), type_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    compare_same_type(a, b).unwrap_or(Ordering::Equal)
}

/// Order within one type bracket; `None` across brackets.
///
/// Query comparison operators only match within a bracket, so
/// `{ age: { $gt: "10" } }` never matches a numeric age.
pub fn compare_same_type(a: &Bson, b: &Bson) -> Option<Ordering> {
    if type_rank(a) != type_rank(b) {
        return None;
    }
    match (a, b) {
        _ if is_numeric(a) && is_numeric(b) => as_f64(a)?.partial_cmp(&as_f64(b)?),
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::Timestamp(x), Bson::Timestamp(y)) => {
            Some((x.time, x.increment).cmp(&(y.time, y.increment)))
        }
        (Bson::Array(x), Bson::Array(y)) => Some(compare_sequences(x.iter(), y.iter())),
        (Bson::Document(x), Bson::Document(y)) => Some(compare_sequences(x.iter(), y.iter())),
        _ => Some(Ordering::Equal),
    }
}

trait Comparable {
    fn compare_to(&self, other: &Self) -> Ordering;
}

impl Comparable for &Bson {
    fn compare_to(&self, other: &Self) -> Ordering {
        compare(self, other)
    }
}

impl Comparable for (&String, &Bson) {
    fn compare_to(&self, other: &Self) -> Ordering {
        self.0.cmp(other.0).then_with(|| compare(self.1, other.1))
    }
}

fn compare_sequences<T: Comparable>(
    mut left: impl Iterator<Item = T>,
    mut right: impl Iterator<Item = T>,
) -> Ordering {
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => match l.compare_to(&r) {
                Ordering::Equal => continue,
                other => return other,
            },
        }
    }
}

/// Set a dotted path, creating embedded documents along the way
pub fn set_path(document: &mut Document, path: &str, value: Bson) -> StoreResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !document.contains_key(head) {
                document.insert(head, Document::new());
            }
            match document.get_mut(head) {
                Some(Bson::Document(embedded)) => set_path(embedded, rest, value),
                _ => Err(StoreError::invalid(format!(
                    "cannot create field '{}' inside non-document '{}'",
                    rest, head
                ))),
            }
        }
    }
}

/// Remove a dotted path. Returns whether anything was removed.
pub fn unset_path(document: &mut Document, path: &str) -> bool {
    match path.split_once('.') {
        None => document.remove(path).is_some(),
        Some((head, rest)) => match document.get_mut(head) {
            Some(Bson::Document(embedded)) => unset_path(embedded, rest),
            _ => false,
        },
    }
}

/// Short type name for error messages
pub fn type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Document(_) => "object",
        Bson::Array(_) => "array",
        Bson::Binary(_) => "binData",
        Bson::ObjectId(_) => "objectId",
        Bson::Boolean(_) => "bool",
        Bson::DateTime(_) => "date",
        Bson::Null => "null",
        Bson::RegularExpression(_) => "regex",
        Bson::Int32(_) => "int",
        Bson::Int64(_) => "long",
        Bson::Decimal128(_) => "decimal",
        Bson::Timestamp(_) => "timestamp",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_resolve_dotted_paths() {
        let doc = doc! {
            "address": { "city": "Ghent" },
            "tags": ["a", "b"],
            "items": [ { "sku": 1 }, { "sku": 2 }, { "other": 3 } ],
        };
        assert_eq!(resolve(&doc, "address.city"), Some(Bson::String("Ghent".into())));
        assert_eq!(resolve(&doc, "tags.1"), Some(Bson::String("b".into())));
        assert_eq!(
            resolve(&doc, "items.sku"),
            Some(Bson::Array(vec![Bson::Int32(1), Bson::Int32(2)]))
        );
        assert_eq!(resolve(&doc, "address.zip"), None);
        assert_eq!(resolve(&doc, "missing"), None);
    }

    #[test]
    fn test_numeric_equality_across_widths() {
        assert!(values_equal(&Bson::Int32(5), &Bson::Int64(5)));
        assert!(values_equal(&Bson::Int32(5), &Bson::Double(5.0)));
        assert!(!values_equal(&Bson::Int32(5), &Bson::String("5".into())));
        assert!(values_equal(
            &Bson::Array(vec![Bson::Int32(1)]),
            &Bson::Array(vec![Bson::Int64(1)])
        ));
    }

    #[test]
    fn test_cross_type_order() {
        assert_eq!(compare(&Bson::Null, &Bson::Int32(0)), Ordering::Less);
        assert_eq!(
            compare(&Bson::Int32(100), &Bson::String("1".into())),
            Ordering::Less
        );
        assert_eq!(
            compare(&Bson::Double(2.5), &Bson::Int64(2)),
            Ordering::Greater
        );
        assert_eq!(compare_same_type(&Bson::Int32(1), &Bson::String("a".into())), None);
    }

    #[test]
    fn test_int_narrowing() {
        assert_eq!(int_to_bson(7), Bson::Int32(7));
        assert_eq!(int_to_bson(i64::from(i32::MAX) + 1), Bson::Int64(2_147_483_648));
    }

    #[test]
    fn test_set_and_unset_paths() {
        let mut doc = doc! { "name": "Jane" };
        set_path(&mut doc, "address.city", Bson::String("Ghent".into())).unwrap();
        assert_eq!(doc, doc! { "name": "Jane", "address": { "city": "Ghent" } });

        assert!(set_path(&mut doc, "name.first", Bson::Null).is_err());
        assert!(unset_path(&mut doc, "address.city"));
        assert!(!unset_path(&mut doc, "address.city"));
        assert_eq!(doc, doc! { "name": "Jane", "address": {} });
    }

    #[test]
    fn test_truthy() {
        assert!(!truthy(&Bson::Null));
        assert!(!truthy(&Bson::Int32(0)));
        assert!(truthy(&Bson::String(String::new())));
        assert!(truthy(&Bson::Boolean(true)));
    }
}
