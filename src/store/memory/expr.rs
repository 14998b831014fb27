//! Aggregation expression evaluation
//!
//! Used by `$expr` filters, `$addFields` and computed `$project` fields.
//! Field paths (`"$age"`) resolve against the current document and a
//! missing field evaluates to null.

use std::cmp::Ordering;

use bson::{Bson, DateTime, Document};
use chrono::{Datelike, Timelike, Utc};

use super::values::{as_f64, as_i64, compare, int_to_bson, is_numeric, resolve, truthy, type_name};
use crate::store::{StoreError, StoreResult};

/// Evaluate an expression against a document
pub fn evaluate(expression: &Bson, root: &Document) -> StoreResult<Bson> {
    match expression {
        Bson::String(s) if s == "$$ROOT" || s == "$$CURRENT" => Ok(Bson::Document(root.clone())),
        Bson::String(s) if s.starts_with("$$") => {
            Err(StoreError::UnsupportedOperator(s.to_string()))
        }
        Bson::String(s) if s.starts_with('$') => {
            Ok(resolve(root, &s[1..]).unwrap_or(Bson::Null))
        }
        Bson::Array(items) => items
            .iter()
            .map(|item| evaluate(item, root))
            .collect::<StoreResult<Vec<_>>>()
            .map(Bson::Array),
        Bson::Document(doc) => match single_operator(doc) {
            Some((op, argument)) => apply(op, argument, root),
            None => {
                let mut object = Document::new();
                for (key, value) in doc {
                    object.insert(key.clone(), evaluate(value, root)?);
                }
                Ok(Bson::Document(object))
            }
        },
        literal => Ok(literal.clone()),
    }
}

fn single_operator(doc: &Document) -> Option<(&str, &Bson)> {
    let mut iter = doc.iter();
    let (key, value) = iter.next()?;
    if key.starts_with('$') && iter.next().is_none() {
        Some((key.as_str(), value))
    } else {
        None
    }
}

/// Evaluate operator arguments; a non-array argument is a single operand
fn operands(argument: &Bson, root: &Document) -> StoreResult<Vec<Bson>> {
    match argument {
        Bson::Array(items) => items.iter().map(|item| evaluate(item, root)).collect(),
        single => Ok(vec![evaluate(single, root)?]),
    }
}

fn exactly<const N: usize>(op: &str, args: Vec<Bson>) -> StoreResult<[Bson; N]> {
    let len = args.len();
    args.try_into().map_err(|_| {
        StoreError::invalid(format!("{} takes {} arguments, got {}", op, N, len))
    })
}

fn apply(op: &str, argument: &Bson, root: &Document) -> StoreResult<Bson> {
    match op {
        "$literal" => Ok(argument.clone()),
        "$add" => add(operands(argument, root)?),
        "$subtract" => {
            let [a, b] = exactly::<2>(op, operands(argument, root)?)?;
            subtract(a, b)
        }
        "$multiply" => multiply(operands(argument, root)?),
        "$divide" => {
            let [a, b] = exactly::<2>(op, operands(argument, root)?)?;
            divide(a, b)
        }
        "$mod" => {
            let [a, b] = exactly::<2>(op, operands(argument, root)?)?;
            modulo(a, b)
        }
        "$max" | "$min" => extreme(op, operands(argument, root)?),
        "$eq" | "$ne" | "$gt" | "$gte" | "$lt" | "$lte" | "$cmp" => {
            let [a, b] = exactly::<2>(op, operands(argument, root)?)?;
            Ok(comparison(op, &a, &b))
        }
        "$and" => Ok(Bson::Boolean(
            operands(argument, root)?.iter().all(truthy),
        )),
        "$or" => Ok(Bson::Boolean(
            operands(argument, root)?.iter().any(truthy),
        )),
        "$not" => {
            let [a] = exactly::<1>(op, operands(argument, root)?)?;
            Ok(Bson::Boolean(!truthy(&a)))
        }
        "$concat" => concat(operands(argument, root)?),
        "$toLower" | "$toUpper" => {
            let [a] = exactly::<1>(op, operands(argument, root)?)?;
            change_case(op, a)
        }
        "$ifNull" => {
            let args = operands(argument, root)?;
            let fallback = args.last().cloned().unwrap_or(Bson::Null);
            Ok(args
                .into_iter()
                .find(|v| !matches!(v, Bson::Null | Bson::Undefined))
                .unwrap_or(fallback))
        }
        "$size" => {
            let [a] = exactly::<1>(op, operands(argument, root)?)?;
            match a {
                Bson::Array(items) => Ok(int_to_bson(items.len() as i64)),
                other => Err(StoreError::TypeMismatch(format!(
                    "$size needs an array, got {}",
                    type_name(&other)
                ))),
            }
        }
        "$cond" => conditional(argument, root),
        "$year" | "$month" | "$dayOfMonth" | "$dayOfWeek" | "$dayOfYear" | "$hour"
        | "$minute" | "$second" | "$millisecond" => date_part(op, argument, root),
        "$dateToString" => date_to_string(argument, root),
        other => Err(StoreError::UnsupportedOperator(other.to_string())),
    }
}

fn numeric_result(values: &[Bson], total_int: Option<i64>, total_float: f64) -> Bson {
    let any_double = values.iter().any(|v| matches!(v, Bson::Double(_)));
    match total_int {
        Some(n) if !any_double => int_to_bson(n),
        _ => Bson::Double(total_float),
    }
}

fn require_number(op: &str, value: &Bson) -> StoreResult<()> {
    if is_numeric(value) {
        Ok(())
    } else {
        Err(StoreError::TypeMismatch(format!(
            "{} only supports numeric types, got {}",
            op,
            type_name(value)
        )))
    }
}

fn add(args: Vec<Bson>) -> StoreResult<Bson> {
    if args.iter().any(|v| matches!(v, Bson::Null | Bson::Undefined)) {
        return Ok(Bson::Null);
    }
    let mut date: Option<i64> = None;
    let mut numbers = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Bson::DateTime(dt) if date.is_none() => date = Some(dt.timestamp_millis()),
            Bson::DateTime(_) => {
                return Err(StoreError::TypeMismatch("$add allows only one date".into()))
            }
            other => {
                require_number("$add", &other)?;
                numbers.push(other);
            }
        }
    }

    let int_sum = numbers
        .iter()
        .try_fold(0_i64, |acc, v| as_i64(v).and_then(|n| acc.checked_add(n)));
    let float_sum: f64 = numbers.iter().filter_map(as_f64).sum();

    match date {
        Some(ms) => Ok(Bson::DateTime(DateTime::from_millis(ms + float_sum as i64))),
        None => Ok(numeric_result(&numbers, int_sum, float_sum)),
    }
}

fn subtract(a: Bson, b: Bson) -> StoreResult<Bson> {
    match (&a, &b) {
        (Bson::Null, _) | (_, Bson::Null) => Ok(Bson::Null),
        (Bson::DateTime(x), Bson::DateTime(y)) => {
            Ok(Bson::Int64(x.timestamp_millis() - y.timestamp_millis()))
        }
        (Bson::DateTime(x), n) if is_numeric(n) => Ok(Bson::DateTime(DateTime::from_millis(
            x.timestamp_millis() - as_f64(n).unwrap_or(0.0) as i64,
        ))),
        _ => {
            require_number("$subtract", &a)?;
            require_number("$subtract", &b)?;
            let int = match (as_i64(&a), as_i64(&b)) {
                (Some(x), Some(y)) => x.checked_sub(y),
                _ => None,
            };
            let float = as_f64(&a).unwrap_or(0.0) - as_f64(&b).unwrap_or(0.0);
            Ok(numeric_result(&[a.clone(), b.clone()], int, float))
        }
    }
}

fn multiply(args: Vec<Bson>) -> StoreResult<Bson> {
    if args.iter().any(|v| matches!(v, Bson::Null | Bson::Undefined)) {
        return Ok(Bson::Null);
    }
    for arg in &args {
        require_number("$multiply", arg)?;
    }
    let int = args
        .iter()
        .try_fold(1_i64, |acc, v| as_i64(v).and_then(|n| acc.checked_mul(n)));
    let float: f64 = args.iter().filter_map(as_f64).product();
    Ok(numeric_result(&args, int, float))
}

fn divide(a: Bson, b: Bson) -> StoreResult<Bson> {
    if matches!(a, Bson::Null) || matches!(b, Bson::Null) {
        return Ok(Bson::Null);
    }
    require_number("$divide", &a)?;
    require_number("$divide", &b)?;
    let divisor = as_f64(&b).unwrap_or(0.0);
    if divisor == 0.0 {
        return Err(StoreError::invalid("can't $divide by zero"));
    }
    Ok(Bson::Double(as_f64(&a).unwrap_or(0.0) / divisor))
}

fn modulo(a: Bson, b: Bson) -> StoreResult<Bson> {
    if matches!(a, Bson::Null) || matches!(b, Bson::Null) {
        return Ok(Bson::Null);
    }
    require_number("$mod", &a)?;
    require_number("$mod", &b)?;
    match (as_i64(&a), as_i64(&b)) {
        (_, Some(0)) => Err(StoreError::invalid("can't $mod by zero")),
        (Some(x), Some(y)) if !matches!(a, Bson::Double(_)) && !matches!(b, Bson::Double(_)) => {
            Ok(int_to_bson(x % y))
        }
        _ => Ok(Bson::Double(
            as_f64(&a).unwrap_or(0.0) % as_f64(&b).unwrap_or(1.0),
        )),
    }
}

/// `$max` / `$min`; a single array operand is expanded, nulls are ignored
fn extreme(op: &str, args: Vec<Bson>) -> StoreResult<Bson> {
    let values: Vec<Bson> = match args.as_slice() {
        [Bson::Array(items)] => items.clone(),
        _ => args,
    };
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

fn comparison(op: &str, a: &Bson, b: &Bson) -> Bson {
    let ordering = compare(a, b);
    match op {
        "$cmp" => Bson::Int32(match ordering {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        }),
        "$eq" => Bson::Boolean(ordering.is_eq()),
        "$ne" => Bson::Boolean(ordering.is_ne()),
        "$gt" => Bson::Boolean(ordering.is_gt()),
        "$gte" => Bson::Boolean(ordering.is_ge()),
        "$lt" => Bson::Boolean(ordering.is_lt()),
        _ => Bson::Boolean(ordering.is_le()),
    }
}

fn concat(args: Vec<Bson>) -> StoreResult<Bson> {
    let mut out = String::new();
    for arg in args {
        match arg {
            Bson::Null | Bson::Undefined => return Ok(Bson::Null),
            Bson::String(s) => out.push_str(&s),
            other => {
                return Err(StoreError::TypeMismatch(format!(
                    "$concat only supports strings, got {}",
                    type_name(&other)
                )))
            }
        }
    }
    Ok(Bson::String(out))
}

fn change_case(op: &str, value: Bson) -> StoreResult<Bson> {
    let text = match value {
        Bson::Null | Bson::Undefined => String::new(),
        Bson::String(s) => s,
        other if is_numeric(&other) => other.to_string(),
        other => {
            return Err(StoreError::TypeMismatch(format!(
                "{} needs a string, got {}",
                op,
                type_name(&other)
            )))
        }
    };
    Ok(Bson::String(if op == "$toLower" {
        text.to_lowercase()
    } else {
        text.to_uppercase()
    }))
}

fn conditional(argument: &Bson, root: &Document) -> StoreResult<Bson> {
    let (condition, then, otherwise) = match argument {
        Bson::Array(parts) if parts.len() == 3 => (&parts[0], &parts[1], &parts[2]),
        Bson::Document(doc) => match (doc.get("if"), doc.get("then"), doc.get("else")) {
            (Some(c), Some(t), Some(e)) => (c, t, e),
            _ => return Err(StoreError::invalid("$cond needs if, then and else")),
        },
        _ => return Err(StoreError::invalid("$cond needs three arguments")),
    };
    if truthy(&evaluate(condition, root)?) {
        evaluate(then, root)
    } else {
        evaluate(otherwise, root)
    }
}

fn date_operand(
    op: &str,
    argument: &Bson,
    root: &Document,
) -> StoreResult<Option<chrono::DateTime<Utc>>> {
    let target = match argument {
        Bson::Document(doc) => doc.get("date").unwrap_or(argument),
        Bson::Array(items) if items.len() == 1 => &items[0],
        other => other,
    };
    match evaluate(target, root)? {
        Bson::Null | Bson::Undefined => Ok(None),
        Bson::DateTime(dt) => Ok(Some(dt.to_chrono())),
        Bson::ObjectId(oid) => Ok(Some(oid.timestamp().to_chrono())),
        other => Err(StoreError::TypeMismatch(format!(
            "{} needs a date, got {}",
            op,
            type_name(&other)
        ))),
    }
}

fn date_part(op: &str, argument: &Bson, root: &Document) -> StoreResult<Bson> {
    let dt = match date_operand(op, argument, root)? {
        Some(dt) => dt,
        None => return Ok(Bson::Null),
    };
    let value = match op {
        "$year" => dt.year() as i64,
        "$month" => i64::from(dt.month()),
        "$dayOfMonth" => i64::from(dt.day()),
        "$dayOfWeek" => i64::from(dt.weekday().number_from_sunday()),
        "$dayOfYear" => i64::from(dt.ordinal()),
        "$hour" => i64::from(dt.hour()),
        "$minute" => i64::from(dt.minute()),
        "$second" => i64::from(dt.second()),
        _ => i64::from(dt.timestamp_subsec_millis()),
    };
    Ok(int_to_bson(value))
}

fn date_to_string(argument: &Bson, root: &Document) -> StoreResult<Bson> {
    let spec = match argument {
        Bson::Document(doc) => doc,
        _ => return Err(StoreError::invalid("$dateToString needs a document")),
    };
    let format = match spec.get("format") {
        Some(Bson::String(f)) => f.as_str(),
        None => "%Y-%m-%dT%H:%M:%S.%LZ",
        Some(_) => return Err(StoreError::invalid("$dateToString format must be a string")),
    };
    let date = spec
        .get("date")
        .ok_or_else(|| StoreError::invalid("$dateToString needs a date"))?;

    match date_operand("$dateToString", date, root)? {
        Some(dt) => Ok(Bson::String(format_date(format, &dt)?)),
        None => Ok(spec.get("onNull").cloned().unwrap_or(Bson::Null)),
    }
}

/// Render the subset of format specifiers the store documents
fn format_date(format: &str, dt: &chrono::DateTime<Utc>) -> StoreResult<String> {
    let mut out = String::with_capacity(format.len() + 8);
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('Y') => out.push_str(&format!("{:04}", dt.year())),
            Some('m') => out.push_str(&format!("{:02}", dt.month())),
            Some('d') => out.push_str(&format!("{:02}", dt.day())),
            Some('H') => out.push_str(&format!("{:02}", dt.hour())),
            Some('M') => out.push_str(&format!("{:02}", dt.minute())),
            Some('S') => out.push_str(&format!("{:02}", dt.second())),
            Some('L') => out.push_str(&format!("{:03}", dt.timestamp_subsec_millis())),
            Some('j') => out.push_str(&format!("{:03}", dt.ordinal())),
            Some('u') => out.push_str(&dt.weekday().number_from_monday().to_string()),
            Some('%') => out.push('%'),
            other => {
                return Err(StoreError::invalid(format!(
                    "unsupported date format specifier %{}",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use chrono::TimeZone;

    fn sample() -> Document {
        let birthday = Utc.with_ymd_and_hms(1980, 3, 1, 11, 0, 0).unwrap();
        doc! {
            "foo": 1,
            "bar": 5,
            "price": 2.5,
            "name": "Jane",
            "tags": ["a", "b"],
            "birthday": DateTime::from_chrono(birthday),
        }
    }

    fn eval(expression: Bson) -> Bson {
        evaluate(&expression, &sample()).unwrap()
    }

    #[test]
    fn test_field_paths() {
        assert_eq!(eval(Bson::String("$foo".into())), Bson::Int32(1));
        assert_eq!(eval(Bson::String("$missing".into())), Bson::Null);
        assert_eq!(eval(Bson::Int32(7)), Bson::Int32(7));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval(Bson::Document(doc! { "$add": ["$foo", "$bar"] })), Bson::Int32(6));
        assert_eq!(eval(Bson::Document(doc! { "$add": ["$foo", "$price"] })), Bson::Double(3.5));
        assert_eq!(eval(Bson::Document(doc! { "$subtract": ["$bar", "$foo"] })), Bson::Int32(4));
        assert_eq!(eval(Bson::Document(doc! { "$multiply": ["$bar", 2] })), Bson::Int32(10));
        assert_eq!(eval(Bson::Document(doc! { "$divide": ["$bar", 2] })), Bson::Double(2.5));
        assert_eq!(eval(Bson::Document(doc! { "$mod": ["$bar", 2] })), Bson::Int32(1));
        assert_eq!(eval(Bson::Document(doc! { "$add": ["$foo", "$missing"] })), Bson::Null);
        assert!(evaluate(&Bson::Document(doc! { "$add": ["$foo", "$name"] }), &sample()).is_err());
    }

    #[test]
    fn test_max_and_min() {
        assert_eq!(eval(Bson::Document(doc! { "$max": ["$foo", "$bar"] })), Bson::Int32(5));
        assert_eq!(eval(Bson::Document(doc! { "$min": ["$foo", "$bar", "$missing"] })), Bson::Int32(1));
        assert_eq!(eval(Bson::Document(doc! { "$max": [[3, 9, 4]] })), Bson::Int32(9));
    }

    #[test]
    fn test_comparisons_and_logic() {
        assert_eq!(eval(Bson::Document(doc! { "$gt": ["$bar", "$foo"] })), Bson::Boolean(true));
        assert_eq!(eval(Bson::Document(doc! { "$cmp": ["$foo", "$bar"] })), Bson::Int32(-1));
        assert_eq!(
            eval(Bson::Document(doc! { "$and": [true, { "$eq": ["$name", "Jane"] }] })),
            Bson::Boolean(true)
        );
        assert_eq!(eval(Bson::Document(doc! { "$not": [false] })), Bson::Boolean(true));
    }

    #[test]
    fn test_strings_and_conditionals() {
        assert_eq!(
            eval(Bson::Document(doc! { "$concat": ["$name", "-", { "$toUpper": "$name" }] })),
            Bson::String("Jane-JANE".into())
        );
        assert_eq!(
            eval(Bson::Document(doc! { "$ifNull": ["$missing", "fallback"] })),
            Bson::String("fallback".into())
        );
        assert_eq!(
            eval(Bson::Document(doc! { "$cond": { "if": { "$gt": ["$foo", 0] }, "then": "pos", "else": "neg" } })),
            Bson::String("pos".into())
        );
        assert_eq!(eval(Bson::Document(doc! { "$size": "$tags" })), Bson::Int32(2));
        assert_eq!(
            eval(Bson::Document(doc! { "$literal": "$foo" })),
            Bson::String("$foo".into())
        );
    }

    #[test]
    fn test_date_parts() {
        assert_eq!(eval(Bson::Document(doc! { "$year": "$birthday" })), Bson::Int32(1980));
        assert_eq!(eval(Bson::Document(doc! { "$month": "$birthday" })), Bson::Int32(3));
        assert_eq!(eval(Bson::Document(doc! { "$dayOfMonth": "$birthday" })), Bson::Int32(1));
        assert_eq!(eval(Bson::Document(doc! { "$hour": { "date": "$birthday" } })), Bson::Int32(11));
        assert_eq!(eval(Bson::Document(doc! { "$year": "$missing" })), Bson::Null);
    }

    #[test]
    fn test_date_to_string() {
        assert_eq!(
            eval(Bson::Document(doc! { "$dateToString": { "format": "%Y-%m-%d", "date": "$birthday" } })),
            Bson::String("1980-03-01".into())
        );
        assert_eq!(
            eval(Bson::Document(doc! { "$dateToString": { "format": "%H:%M:%S", "date": "$birthday" } })),
            Bson::String("11:00:00".into())
        );
        assert!(evaluate(
            &Bson::Document(doc! { "$dateToString": { "format": "%Q", "date": "$birthday" } }),
            &sample()
        )
        .is_err());
    }

    #[test]
    fn test_embedded_object_expression() {
        assert_eq!(
            eval(Bson::Document(doc! { "total": { "$add": ["$foo", 1] }, "label": "x" })),
            Bson::Document(doc! { "total": 2, "label": "x" })
        );
    }
}
