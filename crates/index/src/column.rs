//! Per-column secondary index.
//!
//! Maps a normalized column value to the bucket of rows holding it. Rows are
//! stored by value, and removal matches rows structurally.

use crate::btree::{BTree, TreeSnapshot};
use crate::key::IndexKey;
use cinder_core::{Result, Row, Value};
use serde::{Deserialize, Serialize};

/// Serializable form of a column index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub column: String,
    pub tree: TreeSnapshot<IndexKey, Vec<Row>>,
}

/// An index over one column of a table.
#[derive(Clone, Debug)]
pub struct ColumnIndex {
    column: String,
    tree: BTree<IndexKey, Vec<Row>>,
}

impl ColumnIndex {
    /// Creates an empty index on `column` with a tree of the given degree.
    pub fn new(column: impl Into<String>, degree: usize) -> Result<Self> {
        Ok(Self {
            column: column.into(),
            tree: BTree::new(degree)?,
        })
    }

    /// Returns the indexed column name.
    #[inline]
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Adds `row` to the bucket for `key`. Null keys are ignored.
    pub fn add_to_index(&mut self, key: &Value, row: Row) {
        let key = match IndexKey::from_value(key) {
            Some(key) => key,
            None => return,
        };

        match self.tree.search_mut(&key) {
            Some(bucket) => {
                bucket.push(row);
                tracing::trace!(
                    column = %self.column,
                    key = %key,
                    rows = bucket.len(),
                    "appended to index bucket"
                );
            }
            None => {
                tracing::trace!(column = %self.column, key = %key, "new index key");
                self.tree.insert(key, vec![row]);
            }
        }
    }

    /// Removes every row in the bucket for `key` equal to `row`, dropping the
    /// key once its bucket is empty. Returns the number of rows removed.
    pub fn remove_from_index(&mut self, key: &Value, row: &Row) -> usize {
        let key = match IndexKey::from_value(key) {
            Some(key) => key,
            None => return 0,
        };
        let bucket = match self.tree.search_mut(&key) {
            Some(bucket) => bucket,
            None => return 0,
        };

        let before = bucket.len();
        bucket.retain(|r| r != row);
        let removed = before - bucket.len();

        if self.tree.remove_if_empty(&key, |b| b.is_empty()).is_some() {
            tracing::trace!(column = %self.column, key = %key, "index key emptied");
        }
        removed
    }

    /// Returns the bucket for `key`.
    pub fn lookup(&self, key: &Value) -> Option<&[Row]> {
        let key = IndexKey::from_value(key)?;
        self.tree.search(&key).map(|rows| rows.as_slice())
    }

    /// Returns a copy of the bucket for `key`, empty when absent.
    pub fn lookup_rows(&self, key: &Value) -> Vec<Row> {
        self.lookup(key).map(<[Row]>::to_vec).unwrap_or_default()
    }

    #[inline]
    pub fn contains_key(&self, key: &Value) -> bool {
        self.lookup(key).is_some()
    }

    /// Number of distinct keys.
    #[inline]
    pub fn key_count(&self) -> usize {
        self.tree.len()
    }

    /// Number of indexed rows across all buckets.
    pub fn row_count(&self) -> usize {
        self.tree.iter().map(|(_, rows)| rows.len()).sum()
    }

    /// Indexed keys in ascending order.
    pub fn keys(&self) -> Vec<&IndexKey> {
        self.tree.keys()
    }

    pub fn clear(&mut self) {
        self.tree.clear();
    }

    /// Captures the index for persistence.
    pub fn prepare_for_save(&self) -> IndexSnapshot {
        IndexSnapshot {
            column: self.column.clone(),
            tree: self.tree.to_snapshot(),
        }
    }

    /// Rebuilds an index from a saved snapshot.
    pub fn restore_after_load(snapshot: IndexSnapshot) -> Result<Self> {
        let tree = BTree::from_snapshot(snapshot.tree)?;
        Ok(Self {
            column: snapshot.column,
            tree,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(id: i64, name: &str) -> Row {
        Row::new().with("id", id).with("name", name)
    }

    #[test]
    fn test_bucket_shared_by_normalized_keys() {
        let mut index = ColumnIndex::new("name", 3).unwrap();
        let a = student(1, "Ali");
        let b = student(2, "ali ");
        index.add_to_index(&Value::from("Ali"), a.clone());
        index.add_to_index(&Value::from("ali "), b.clone());

        assert_eq!(index.key_count(), 1);
        assert_eq!(index.lookup_rows(&Value::from("ALI")), vec![a, b.clone()]);

        assert_eq!(index.remove_from_index(&Value::from("Ali"), &student(1, "Ali")), 1);
        assert_eq!(index.lookup_rows(&Value::from("ali")), vec![b.clone()]);

        assert_eq!(index.remove_from_index(&Value::from("ali"), &b), 1);
        assert!(!index.contains_key(&Value::from("ali")));
        assert_eq!(index.key_count(), 0);
    }

    #[test]
    fn test_remove_only_matching_rows() {
        let mut index = ColumnIndex::new("dept", 3).unwrap();
        let a = Row::new().with("id", 1).with("dept", 10);
        let b = Row::new().with("id", 2).with("dept", 10);
        index.add_to_index(&Value::from(10), a.clone());
        index.add_to_index(&Value::from(10), b.clone());

        let stranger = Row::new().with("id", 3).with("dept", 10);
        assert_eq!(index.remove_from_index(&Value::from(10), &stranger), 0);
        assert_eq!(index.row_count(), 2);

        assert_eq!(index.remove_from_index(&Value::from(10), &a), 1);
        assert_eq!(index.lookup(&Value::from(10)), Some(&[b][..]));
    }

    #[test]
    fn test_duplicate_rows_removed_together() {
        let mut index = ColumnIndex::new("id", 3).unwrap();
        let row = student(1, "Mia");
        index.add_to_index(&Value::from(1), row.clone());
        index.add_to_index(&Value::from(1), row.clone());
        assert_eq!(index.remove_from_index(&Value::from(1), &row), 2);
        assert!(index.lookup(&Value::from(1)).is_none());
    }

    #[test]
    fn test_null_keys_ignored() {
        let mut index = ColumnIndex::new("email", 3).unwrap();
        index.add_to_index(&Value::Null, student(1, "x"));
        assert_eq!(index.key_count(), 0);
        assert!(index.lookup_rows(&Value::Null).is_empty());
        assert_eq!(index.remove_from_index(&Value::Null, &student(1, "x")), 0);
    }

    #[test]
    fn test_missing_key() {
        let index = ColumnIndex::new("id", 3).unwrap();
        assert!(index.lookup(&Value::from(5)).is_none());
        assert!(index.lookup_rows(&Value::from(5)).is_empty());
    }

    #[test]
    fn test_save_and_restore() {
        let mut index = ColumnIndex::new("id", 2).unwrap();
        for id in 0..40 {
            index.add_to_index(&Value::from(id), student(id, "s"));
        }
        index.remove_from_index(&Value::from(12), &student(12, "s"));

        let snapshot = index.prepare_for_save();
        let json = serde_json::to_string(&snapshot).unwrap();
        let decoded: IndexSnapshot = serde_json::from_str(&json).unwrap();
        let restored = ColumnIndex::restore_after_load(decoded).unwrap();

        assert_eq!(restored.column(), "id");
        assert_eq!(restored.key_count(), 39);
        assert_eq!(restored.lookup_rows(&Value::from(30)), vec![student(30, "s")]);
        assert!(restored.lookup(&Value::from(12)).is_none());
    }
}
