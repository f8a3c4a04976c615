//! In-process evaluation of `Filter` parts over decoded documents.
//!
//! # Invariants
//! - An empty `where` matches everything; an empty `select` keeps every
//!   field; an empty `sort` keeps input order.
//! - Sorting is stable, so ties keep storage-natural order.
//! - Cross-type order: missing/null < number < string < map < array < bool.
//! - `select` entries are dotted paths, like `where` and `sort` fields.

use crate::driver::{CollectionRef, DriverError, DriverResult};
use crate::model::document::{lookup_path, Document};
use crate::model::filter::{Filter, SortField, SortOrder};
use serde_json::{Number, Value};
use std::cmp::Ordering;

/// Parsed `select` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    All,
    Include(Vec<String>),
    Exclude(Vec<String>),
}

impl Projection {
    /// Parses a `select` list; mixing `name` and `-name` forms is rejected.
    pub fn parse(select: &[String]) -> DriverResult<Self> {
        if select.is_empty() {
            return Ok(Self::All);
        }

        let excluded: Vec<String> = select
            .iter()
            .filter_map(|field| field.strip_prefix('-').map(str::to_string))
            .collect();
        if excluded.is_empty() {
            return Ok(Self::Include(select.to_vec()));
        }
        if excluded.len() == select.len() {
            return Ok(Self::Exclude(excluded));
        }

        Err(DriverError::InvalidQuery(format!(
            "select cannot mix included and excluded fields: [{}]",
            select.join(", ")
        )))
    }

    /// Applies the projection. Inclusions always keep `primary_key`.
    pub fn apply(&self, document: Document, primary_key: &str) -> Document {
        match self {
            Self::All => document,
            Self::Include(paths) => {
                let mut paths: Vec<&str> = paths.iter().map(String::as_str).collect();
                paths.push(primary_key);
                keep_paths(document, &paths)
            }
            Self::Exclude(paths) => {
                let paths: Vec<&str> = paths.iter().map(String::as_str).collect();
                drop_paths(document, &paths)
            }
        }
    }
}

/// Keeps the fields named by `paths`; nested maps keep only their listed
/// leaves and disappear when none of them exist.
fn keep_paths(document: Document, paths: &[&str]) -> Document {
    document
        .into_iter()
        .filter_map(|(field, value)| {
            if paths.contains(&field.as_str()) {
                return Some((field, value));
            }
            let nested = nested_paths(paths, &field);
            match value {
                Value::Object(inner) if !nested.is_empty() => {
                    let kept = keep_paths(inner, &nested);
                    (!kept.is_empty()).then(|| (field, Value::Object(kept)))
                }
                _ => None,
            }
        })
        .collect()
}

/// Removes the fields named by `paths`, descending into nested maps.
fn drop_paths(document: Document, paths: &[&str]) -> Document {
    document
        .into_iter()
        .filter_map(|(field, value)| {
            if paths.contains(&field.as_str()) {
                return None;
            }
            let nested = nested_paths(paths, &field);
            match value {
                Value::Object(inner) if !nested.is_empty() => {
                    Some((field, Value::Object(drop_paths(inner, &nested))))
                }
                value => Some((field, value)),
            }
        })
        .collect()
}

/// Remainders of the `paths` that continue below `field`.
fn nested_paths<'p>(paths: &[&'p str], field: &str) -> Vec<&'p str> {
    paths
        .iter()
        .filter_map(|path| path.strip_prefix(field)?.strip_prefix('.'))
        .collect()
}

/// Runs a whole `find` over documents given in storage-natural order.
pub fn evaluate<I>(
    target: CollectionRef<'_>,
    documents: I,
    filter: &Filter,
) -> DriverResult<Vec<Document>>
where
    I: IntoIterator<Item = Document>,
{
    let projection = Projection::parse(&filter.select)?;
    let mut matched: Vec<Document> = documents
        .into_iter()
        .filter(|document| matches(document, &filter.conditions))
        .collect();
    sort_documents(&mut matched, &filter.sort);

    Ok(matched
        .into_iter()
        .map(|document| projection.apply(document, target.primary_key))
        .collect())
}

/// Whether `document` satisfies every equality condition.
pub fn matches(document: &Document, conditions: &Document) -> bool {
    conditions.iter().all(|(path, expected)| {
        match lookup_path(document, path) {
            None => expected.is_null(),
            Some(actual) => field_matches(actual, expected),
        }
    })
}

fn field_matches(actual: &Value, expected: &Value) -> bool {
    if values_equal(actual, expected) {
        return true;
    }
    match actual {
        // Array fields also match any single element.
        Value::Array(items) => items.iter().any(|item| values_equal(item, expected)),
        _ => false,
    }
}

/// Structural equality with numeric comparison across integer/float forms.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => compare_numbers(a, b) == Ordering::Equal,
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| values_equal(x, y)))
        }
        _ => left == right,
    }
}

pub fn sort_documents(documents: &mut [Document], sort: &[SortField]) {
    if sort.is_empty() {
        return;
    }
    documents.sort_by(|a, b| {
        sort.iter()
            .map(|key| {
                let ordering =
                    compare_values(lookup_path(a, &key.field), lookup_path(b, &key.field));
                match key.order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            })
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

/// Total order over optional JSON values used by `sort`.
pub fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    let left_rank = type_rank(left);
    let right_rank = type_rank(right);
    if left_rank != right_rank {
        return left_rank.cmp(&right_rank);
    }

    match (left, right) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => compare_numbers(a, b),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(Value::Array(a)), Some(Value::Array(b))) => a
            .iter()
            .zip(b)
            .map(|(x, y)| compare_values(Some(x), Some(y)))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        (Some(Value::Object(a)), Some(Value::Object(b))) => a
            .iter()
            .zip(b)
            .map(|((key_a, x), (key_b, y))| {
                key_a
                    .cmp(key_b)
                    .then_with(|| compare_values(Some(x), Some(y)))
            })
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        _ => Ordering::Equal,
    }
}

/// Integers compare exactly; floats only when either side is one.
fn compare_numbers(left: &Number, right: &Number) -> Ordering {
    match (integer(left), integer(right)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => {
            let a = left.as_f64().unwrap_or(f64::NAN);
            let b = right.as_f64().unwrap_or(f64::NAN);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
    }
}

fn integer(number: &Number) -> Option<i128> {
    number
        .as_i64()
        .map(i128::from)
        .or_else(|| number.as_u64().map(i128::from))
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}
