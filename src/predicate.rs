//! Predicate trees compiled from filter queries.
//!
//! A [`Predicate`] is the compiled form of a query: a tree of logical
//! operators over field conditions, structurally comparable so that the
//! compiler can be tested for determinism. Predicates are evaluated
//! directly against stored documents; the store uses a coarse key-range
//! prefilter and runs the full predicate on each candidate.

use crate::document::{Document, Value};

use std::cmp::Ordering;

use regex::Regex;

//-----------------------------------------------------------------------------

/// Comparison operator of a field condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// A compiled filter condition.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// Matches every document.
    True,
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    /// Field comparison. Array fields match if any element satisfies the
    /// comparison; `Ne` matches when no element is equal, including when
    /// the field is absent.
    Cmp { path: String, op: CmpOp, value: Value },
    /// Field value is one of the listed values.
    In { path: String, values: Vec<Value> },
    /// Field value is none of the listed values, or the field is absent.
    NotIn { path: String, values: Vec<Value> },
    /// All listed values appear among the field's values.
    All { path: String, values: Vec<Value> },
    /// A string field matches the pattern. The pattern is kept in source
    /// form; the compiler validates it before building the predicate.
    Regex { path: String, pattern: String },
    /// The field is present (or absent).
    Exists { path: String, exists: bool },
    /// Some element of an array field satisfies the inner predicate.
    ElemMatch { path: String, inner: Box<Predicate> },
    /// The field is an empty array.
    ArrayEmpty { path: String },
}

impl Predicate {
    /// Conjunction that collapses trivial cases.
    pub fn and(mut parts: Vec<Predicate>) -> Predicate {
        parts.retain(|p| !matches!(p, Predicate::True));
        match parts.len() {
            0 => Predicate::True,
            1 => parts.pop().unwrap_or(Predicate::True),
            _ => Predicate::And(parts),
        }
    }

    /// Disjunction that collapses the single-element case.
    pub fn or(mut parts: Vec<Predicate>) -> Predicate {
        match parts.len() {
            1 => parts.pop().unwrap_or(Predicate::True),
            _ => Predicate::Or(parts),
        }
    }

    pub fn eq(path: &str, value: impl Into<Value>) -> Predicate {
        Predicate::Cmp { path: path.to_string(), op: CmpOp::Eq, value: value.into() }
    }

    pub fn cmp(path: &str, op: CmpOp, value: impl Into<Value>) -> Predicate {
        Predicate::Cmp { path: path.to_string(), op, value: value.into() }
    }

    pub fn is_in(path: &str, values: Vec<Value>) -> Predicate {
        Predicate::In { path: path.to_string(), values }
    }

    pub fn elem_match(path: &str, inner: Predicate) -> Predicate {
        Predicate::ElemMatch { path: path.to_string(), inner: Box::new(inner) }
    }

    /// Evaluates the predicate against a document.
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Predicate::True => true,
            Predicate::And(parts) => parts.iter().all(|p| p.matches(document)),
            Predicate::Or(parts) => parts.iter().any(|p| p.matches(document)),
            Predicate::Not(inner) => !inner.matches(document),
            Predicate::Cmp { path, op, value } => {
                let found = collect_values(document, path);
                match op {
                    CmpOp::Eq => found.iter().any(|v| values_equal(v, value)),
                    CmpOp::Ne => !found.iter().any(|v| values_equal(v, value)),
                    CmpOp::Gt => found.iter().any(|v| ordering_is(v, value, Ordering::Greater, false)),
                    CmpOp::Gte => found.iter().any(|v| ordering_is(v, value, Ordering::Greater, true)),
                    CmpOp::Lt => found.iter().any(|v| ordering_is(v, value, Ordering::Less, false)),
                    CmpOp::Lte => found.iter().any(|v| ordering_is(v, value, Ordering::Less, true)),
                }
            }
            Predicate::In { path, values } => {
                let found = collect_values(document, path);
                found.iter().any(|v| values.iter().any(|allowed| values_equal(v, allowed)))
            }
            Predicate::NotIn { path, values } => {
                let found = collect_values(document, path);
                !found.iter().any(|v| values.iter().any(|excluded| values_equal(v, excluded)))
            }
            Predicate::All { path, values } => {
                let found = collect_values(document, path);
                values.iter().all(|required| found.iter().any(|v| values_equal(v, required)))
            }
            Predicate::Regex { path, pattern } => {
                let regex = match Regex::new(pattern) {
                    Ok(regex) => regex,
                    Err(_) => return false,
                };
                collect_values(document, path).iter()
                    .filter_map(|v| v.as_str())
                    .any(|s| regex.is_match(s))
            }
            Predicate::Exists { path, exists } => {
                !collect_values(document, path).is_empty() == *exists
            }
            Predicate::ElemMatch { path, inner } => {
                collect_arrays(document, path).iter().any(|array| {
                    array.iter().any(|element| match element {
                        Value::Document(doc) => inner.matches(doc),
                        _ => false,
                    })
                })
            }
            Predicate::ArrayEmpty { path } => {
                match document.get_path(path) {
                    Some(Value::Array(values)) => values.is_empty(),
                    _ => false,
                }
            }
        }
    }
}

//-----------------------------------------------------------------------------

fn values_equal(left: &Value, right: &Value) -> bool {
    if let Some(ordering) = left.compare(right) {
        return ordering == Ordering::Equal;
    }
    left == right
}

fn ordering_is(left: &Value, right: &Value, wanted: Ordering, or_equal: bool) -> bool {
    match left.compare(right) {
        Some(ordering) => ordering == wanted || (or_equal && ordering == Ordering::Equal),
        None => false,
    }
}

/// Collects the leaf values at a path, descending into arrays along the way.
fn collect_values<'a>(document: &'a Document, path: &str) -> Vec<&'a Value> {
    let mut result = Vec::new();
    let segments: Vec<&str> = path.split('.').collect();
    descend(document, &segments, &mut result);
    result
}

fn descend<'a>(document: &'a Document, segments: &[&str], result: &mut Vec<&'a Value>) {
    let Some(value) = document.get(segments[0]) else { return };
    if segments.len() == 1 {
        match value {
            // A leaf array contributes its elements.
            Value::Array(elements) => result.extend(elements.iter()),
            other => result.push(other),
        }
        return;
    }
    match value {
        Value::Document(doc) => descend(doc, &segments[1..], result),
        Value::Array(elements) => {
            for element in elements {
                if let Value::Document(doc) = element {
                    descend(doc, &segments[1..], result);
                }
            }
        }
        _ => {}
    }
}

/// Collects the arrays at a path, for element matching.
fn collect_arrays<'a>(document: &'a Document, path: &str) -> Vec<&'a [Value]> {
    let mut leaves = Vec::new();
    let segments: Vec<&str> = path.split('.').collect();
    descend_to_node(document, &segments, &mut leaves);
    leaves.into_iter()
        .filter_map(|v| v.as_array())
        .collect()
}

fn descend_to_node<'a>(document: &'a Document, segments: &[&str], result: &mut Vec<&'a Value>) {
    let Some(value) = document.get(segments[0]) else { return };
    if segments.len() == 1 {
        result.push(value);
        return;
    }
    match value {
        Value::Document(doc) => descend_to_node(doc, &segments[1..], result),
        Value::Array(elements) => {
            for element in elements {
                if let Value::Document(doc) = element {
                    descend_to_node(doc, &segments[1..], result);
                }
            }
        }
        _ => {}
    }
}

//-----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn study(sid: i64, filter: &str) -> Value {
        let mut attrs = Document::new();
        attrs.set("FILTER", filter);
        let mut file = Document::new();
        file.set("fid", 10).set("attrs", attrs);
        let mut study = Document::new();
        study.set("sid", sid).set("files", vec![Value::from(file)]);
        Value::from(study)
    }

    fn example() -> Document {
        let mut doc = Document::new();
        doc.set("chr", "22")
            .set("start", 16050075)
            .set("type", "SNV")
            .set("studies", vec![study(1, "PASS"), study(2, "LowQual")]);
        doc
    }

    #[test]
    fn comparisons() {
        let doc = example();
        assert!(Predicate::eq("chr", "22").matches(&doc));
        assert!(!Predicate::eq("chr", "21").matches(&doc));
        assert!(Predicate::cmp("start", CmpOp::Gt, 16050000i64).matches(&doc));
        assert!(!Predicate::cmp("start", CmpOp::Lt, 16050000i64).matches(&doc));
        // Integer fields compare against doubles.
        assert!(Predicate::cmp("start", CmpOp::Gte, 16050075.0).matches(&doc));
    }

    #[test]
    fn ne_matches_missing_fields() {
        let doc = example();
        assert!(Predicate::cmp("missing", CmpOp::Ne, "anything").matches(&doc));
        assert!(!Predicate::cmp("chr", CmpOp::Ne, "22").matches(&doc));
    }

    #[test]
    fn array_traversal() {
        let doc = example();
        // Arrays along the path are searched element by element.
        assert!(Predicate::eq("studies.sid", 1i64).matches(&doc));
        assert!(Predicate::eq("studies.sid", 2i64).matches(&doc));
        assert!(!Predicate::eq("studies.sid", 3i64).matches(&doc));
        assert!(Predicate::eq("studies.files.attrs.FILTER", "PASS").matches(&doc));
    }

    #[test]
    fn elem_match_binds_within_one_element() {
        let doc = example();
        // sid 1 has PASS, sid 2 has LowQual; the pairing must hold inside one element.
        let matching = Predicate::elem_match("studies", Predicate::and(vec![
            Predicate::eq("sid", 1i64),
            Predicate::eq("files.attrs.FILTER", "PASS"),
        ]));
        assert!(matching.matches(&doc));

        let crossed = Predicate::elem_match("studies", Predicate::and(vec![
            Predicate::eq("sid", 1i64),
            Predicate::eq("files.attrs.FILTER", "LowQual"),
        ]));
        assert!(!crossed.matches(&doc), "Conditions from different elements must not combine");
    }

    #[test]
    fn in_and_not_in() {
        let doc = example();
        assert!(Predicate::is_in("type", vec![Value::from("SNV"), Value::from("MNV")]).matches(&doc));
        let not_in = Predicate::NotIn {
            path: String::from("type"),
            values: vec![Value::from("INDEL")],
        };
        assert!(not_in.matches(&doc));
        let not_in_missing = Predicate::NotIn {
            path: String::from("missing"),
            values: vec![Value::from("x")],
        };
        assert!(not_in_missing.matches(&doc), "NotIn should match when the field is absent");
    }

    #[test]
    fn exists_and_empty_array() {
        let doc = example();
        assert!(Predicate::Exists { path: String::from("type"), exists: true }.matches(&doc));
        assert!(Predicate::Exists { path: String::from("annot"), exists: false }.matches(&doc));
        assert!(!Predicate::ArrayEmpty { path: String::from("studies") }.matches(&doc));

        let mut empty = Document::new();
        empty.set("studies", Vec::<Value>::new());
        assert!(Predicate::ArrayEmpty { path: String::from("studies") }.matches(&empty));
    }

    #[test]
    fn regex_matching() {
        let doc = example();
        let regex = Predicate::Regex {
            path: String::from("studies.files.attrs.FILTER"),
            pattern: String::from("^Low"),
        };
        assert!(regex.matches(&doc));
    }

    #[test]
    fn trivial_collapse() {
        assert_eq!(Predicate::and(vec![]), Predicate::True);
        assert_eq!(Predicate::and(vec![Predicate::True, Predicate::eq("a", 1i64)]),
            Predicate::eq("a", 1i64));
        assert_eq!(Predicate::or(vec![Predicate::eq("a", 1i64)]), Predicate::eq("a", 1i64));
    }
}

//-----------------------------------------------------------------------------
