//! Read-side query shape: conditions, projection and ordering.
//!
//! # Invariants
//! - An empty `where` matches every record.
//! - An empty `select` returns every field.
//! - An empty `sort` keeps storage-natural (insertion) order.

use crate::model::document::{Document, DocumentId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    #[serde(default)]
    pub order: SortOrder,
}

/// Predicate, projection and ordering bundle.
///
/// Serialized with the keys `where`, `select` and `sort`; every key is
/// optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Field path to expected value; all entries must match.
    #[serde(default, rename = "where")]
    pub conditions: Document,
    /// Inclusions (`name`) or exclusions (`-name`), never mixed.
    #[serde(default)]
    pub select: Vec<String>,
    #[serde(default)]
    pub sort: Vec<SortField>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Matches the single record whose key field equals `id`.
    pub fn by_key(primary_key: &str, id: &DocumentId) -> Self {
        Self::new().where_eq(primary_key, id.to_value())
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.insert(field.into(), value.into());
        self
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push(SortField {
            field: field.into(),
            order,
        });
        self
    }

    pub fn is_match_all(&self) -> bool {
        self.conditions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{Filter, SortOrder};
    use serde_json::json;

    #[test]
    fn deserializes_with_all_parts_optional() {
        let empty: Filter = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty, Filter::default());
        assert!(empty.is_match_all());

        let full: Filter = serde_json::from_value(json!({
            "where": {"name": "Customer 1"},
            "select": ["name"],
            "sort": [{"field": "name", "order": "desc"}, {"field": "age"}]
        }))
        .unwrap();
        assert_eq!(full.conditions["name"], json!("Customer 1"));
        assert_eq!(full.select, vec!["name".to_string()]);
        assert_eq!(full.sort[0].order, SortOrder::Desc);
        assert_eq!(full.sort[1].order, SortOrder::Asc);
    }

    #[test]
    fn builder_accumulates_parts() {
        let filter = Filter::new()
            .where_eq("name", "X")
            .select(["name", "age"])
            .sort_by("age", SortOrder::Desc);
        assert!(!filter.is_match_all());
        assert_eq!(filter.select.len(), 2);
        assert_eq!(filter.sort.len(), 1);
    }
}
