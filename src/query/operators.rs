//! Operator vocabulary
//!
//! Relational spellings (`=`, `<>`, `like`, ...) and the native query
//! operators of the document store. Input is matched case-insensitively
//! with any leading `$` removed; native operators are re-emitted in their
//! canonical camelCase spelling.

/// Relational operators accepted by the builder
pub const RELATIONAL_OPERATORS: &[&str] = &[
    "=", "<", ">", "<=", ">=", "<>", "!=", "like", "not like", "regexp", "not regexp", "regex",
    "not regex",
];

/// Native operators, canonical spelling without the `$` prefix
pub const NATIVE_OPERATORS: &[&str] = &[
    "eq",
    "gt",
    "gte",
    "in",
    "lt",
    "lte",
    "ne",
    "nin",
    "exists",
    "type",
    "expr",
    "mod",
    "regex",
    "text",
    "where",
    "geoIntersects",
    "geoWithin",
    "near",
    "nearSphere",
    "box",
    "center",
    "centerSphere",
    "geometry",
    "maxDistance",
    "minDistance",
    "polygon",
    "uniqueDocs",
    "all",
    "elemMatch",
    "size",
    "bitsAllClear",
    "bitsAllSet",
    "bitsAnyClear",
    "bitsAnySet",
    "slice",
];

/// A parsed predicate operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `=`, compiled to a bare value
    Equals,
    /// SQL `like`, optionally negated
    Like { negated: bool },
    /// Regular expression match, optionally negated
    Regex { negated: bool },
    /// Native operator, canonical name without `$`
    Native(&'static str),
}

impl Operator {
    /// Parse a caller supplied operator. Returns `None` for anything outside
    /// the vocabulary.
    pub fn parse(raw: &str) -> Option<Operator> {
        let normalized = normalize(raw);
        match normalized.as_str() {
            "=" => Some(Operator::Equals),
            "like" => Some(Operator::Like { negated: false }),
            "not like" => Some(Operator::Like { negated: true }),
            "regex" | "regexp" => Some(Operator::Regex { negated: false }),
            "not regex" | "not regexp" => Some(Operator::Regex { negated: true }),
            other => convert(other).or_else(|| canonical(other)).map(Operator::Native),
        }
    }
}

/// Strip a leading `$`, lowercase, and collapse inner whitespace
pub fn normalize(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('$')
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Relational comparison symbol to its native name
pub fn convert(operator: &str) -> Option<&'static str> {
    match operator {
        "!=" | "<>" => Some("ne"),
        "<" => Some("lt"),
        "<=" => Some("lte"),
        ">" => Some("gt"),
        ">=" => Some("gte"),
        _ => None,
    }
}

/// Canonical spelling of a native operator, matched case-insensitively
pub fn canonical(operator: &str) -> Option<&'static str> {
    let operator = operator.trim_start_matches('$');
    NATIVE_OPERATORS
        .iter()
        .copied()
        .find(|known| known.eq_ignore_ascii_case(operator))
}

/// Comparison operator for expression predicates (date parts).
///
/// `=` maps to `eq`, the relational symbols go through the conversion
/// table, and the six native comparison names are accepted as-is.
pub fn comparison(raw: &str) -> Option<&'static str> {
    let normalized = normalize(raw);
    if normalized == "=" {
        return Some("eq");
    }
    convert(&normalized).or_else(|| match canonical(&normalized) {
        Some(name @ ("eq" | "ne" | "gt" | "gte" | "lt" | "lte")) => Some(name),
        _ => None,
    })
}

/// Every operator a caller may pass, relational first
pub fn all() -> Vec<&'static str> {
    RELATIONAL_OPERATORS
        .iter()
        .chain(NATIVE_OPERATORS.iter())
        .copied()
        .collect()
}
