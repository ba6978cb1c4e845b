//! Per-table change sets exchanged on pull and push.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Created, updated, and deleted records for one table.
///
/// Created and updated entries are raw JSON records carrying an `id` field;
/// deleted entries are bare ids. Record contents are never inspected by the
/// engine beyond the id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableChanges {
    #[serde(default)]
    pub created: Vec<Value>,
    #[serde(default)]
    pub updated: Vec<Value>,
    #[serde(default)]
    pub deleted: Vec<String>,
}

impl TableChanges {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }
}

/// Changes keyed by table name: `{ <table>: { created, updated, deleted } }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeSet(BTreeMap<String, TableChanges>);

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no table carries any change.
    pub fn is_empty(&self) -> bool {
        self.0.values().all(TableChanges::is_empty)
    }

    /// Total number of created, updated, and deleted entries across tables.
    pub fn record_count(&self) -> usize {
        self.0.values().map(TableChanges::len).sum()
    }

    pub fn table(&self, name: &str) -> Option<&TableChanges> {
        self.0.get(name)
    }

    /// Get the changes for a table, inserting an empty entry if absent.
    pub fn table_mut(&mut self, name: &str) -> &mut TableChanges {
        self.0.entry(name.to_string()).or_default()
    }

    pub fn tables(&self) -> impl Iterator<Item = (&str, &TableChanges)> {
        self.0.iter().map(|(name, changes)| (name.as_str(), changes))
    }
}

/// Extract the `id` of a raw record.
///
/// String ids are returned as-is; numeric ids are rendered in decimal.
pub fn record_id(record: &Value) -> Option<String> {
    match record.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
