//! Row structure for Cinder.
//!
//! A row is an ordered mapping from column name to value. Rows are compared
//! structurally: two rows are equal when they hold the same columns with
//! equal values, regardless of where they are stored.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A row in a table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Row {
    fields: BTreeMap<String, Value>,
}

impl Row {
    /// Creates an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter, handy for literals in callers and tests.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(column.into(), value.into());
        self
    }

    /// Returns the value stored under `column`.
    #[inline]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }

    /// Returns the value stored under `column`, treating a missing column as Null.
    pub fn get_or_null(&self, column: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.fields.get(column).unwrap_or(&NULL)
    }

    /// Sets a field, returning the previous value.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(column.into(), value.into())
    }

    /// Removes a field.
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.fields.remove(column)
    }

    /// Returns true if the row has a field named `column`.
    #[inline]
    pub fn contains(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    /// Returns the number of fields.
    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the row has no fields.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates fields in column-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the column names.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    /// Overwrites every field present in `updates`, leaving the rest untouched.
    pub fn merge(&mut self, updates: &Row) {
        for (column, value) in updates.iter() {
            self.fields.insert(column.into(), value.clone());
        }
    }

    /// Returns a copy of this row with `updates` merged in.
    pub fn merged(&self, updates: &Row) -> Row {
        let mut row = self.clone();
        row.merge(updates);
        row
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}
