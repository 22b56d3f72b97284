//! Row storage for a single table.
//!
//! Rows live in a positional store; a row's position is its slot. Every
//! mutation keeps the table's column indexes in step with the store.

use cinder_core::schema::TableSchema;
use cinder_core::{Error, Result, Row, Value};
use cinder_index::{ColumnIndex, IndexKey, IndexSnapshot};
use std::collections::BTreeMap;

/// A table: schema, rows and column indexes.
#[derive(Clone, Debug)]
pub struct Table {
    schema: TableSchema,
    rows: Vec<Row>,
    /// Column name -> index.
    indexes: BTreeMap<String, ColumnIndex>,
    /// Degree of newly created index trees.
    index_degree: usize,
}

impl Table {
    /// Creates an empty table with an index on every primary-key or unique
    /// column.
    pub fn new(schema: TableSchema, index_degree: usize) -> Result<Self> {
        let mut table = Self {
            schema,
            rows: Vec::new(),
            indexes: BTreeMap::new(),
            index_degree,
        };
        let auto: Vec<String> = table
            .schema
            .columns()
            .iter()
            .filter(|c| c.is_auto_indexed())
            .map(|c| c.name().to_string())
            .collect();
        for column in auto {
            table.create_index(&column)?;
        }
        Ok(table)
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.schema.name()
    }

    #[inline]
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Returns the rows in slot order.
    #[inline]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the row at `slot`.
    #[inline]
    pub fn row(&self, slot: usize) -> Option<&Row> {
        self.rows.get(slot)
    }

    /// Returns the primary-key column name.
    #[inline]
    pub fn primary_key_column(&self) -> &str {
        self.schema.primary_key_name()
    }

    /// Returns the primary-key value of a row, Null when absent.
    pub fn primary_key_of<'a>(&self, row: &'a Row) -> &'a Value {
        row.get_or_null(self.schema.primary_key_name())
    }

    /// Finds the slot of the row whose primary key equals `key`.
    pub fn find_slot_by_pk(&self, key: &Value) -> Option<usize> {
        if key.is_null() {
            return None;
        }
        let pk = self.schema.primary_key_name();
        // The index normalizes keys, so it can only rule rows out.
        if let Some(index) = self.indexes.get(pk) {
            if !index.contains_key(key) {
                return None;
            }
        }
        self.rows.iter().position(|row| row.get(pk) == Some(key))
    }

    /// Returns the row whose primary key equals `key`.
    pub fn get_by_pk(&self, key: &Value) -> Option<&Row> {
        self.find_slot_by_pk(key).map(|slot| &self.rows[slot])
    }

    /// Returns the slot of the first row holding exactly `value` in `column`.
    pub fn find_slot(&self, column: &str, value: &Value) -> Option<usize> {
        self.rows.iter().position(|row| row.get(column) == Some(value))
    }

    /// Returns true if some row holds exactly `value` in `column`,
    /// ignoring `skip_slot`.
    pub fn contains_value(&self, column: &str, value: &Value, skip_slot: Option<usize>) -> bool {
        self.rows
            .iter()
            .enumerate()
            .any(|(slot, row)| Some(slot) != skip_slot && row.get(column) == Some(value))
    }

    /// Returns the rows holding exactly `value` in `column`, with their slots.
    pub fn rows_matching(&self, column: &str, value: &Value) -> Vec<(usize, &Row)> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.get(column) == Some(value))
            .collect()
    }

    /// Creates (or rebuilds) an index on `column` from the current rows.
    pub fn create_index(&mut self, column: &str) -> Result<()> {
        if !self.schema.has_column(column) {
            return Err(Error::column_not_found(self.name(), column));
        }
        let mut index = ColumnIndex::new(column, self.index_degree)?;
        for row in &self.rows {
            index.add_to_index(row.get_or_null(column), row.clone());
        }
        tracing::debug!(table = self.name(), column, keys = index.key_count(), "index created");
        self.indexes.insert(column.to_string(), index);
        Ok(())
    }

    /// Returns the index on `column`.
    #[inline]
    pub fn index(&self, column: &str) -> Option<&ColumnIndex> {
        self.indexes.get(column)
    }

    /// Returns the rows whose `column` value matches `key` under index
    /// normalization. Uses the index when there is one.
    pub fn lookup(&self, column: &str, key: &Value) -> Result<Vec<Row>> {
        if let Some(index) = self.indexes.get(column) {
            return Ok(index.lookup_rows(key));
        }
        if !self.schema.has_column(column) {
            return Err(Error::column_not_found(self.name(), column));
        }
        let wanted = match IndexKey::from_value(key) {
            Some(wanted) => wanted,
            None => return Ok(Vec::new()),
        };
        Ok(self
            .rows
            .iter()
            .filter(|row| IndexKey::from_value(row.get_or_null(column)).as_ref() == Some(&wanted))
            .cloned()
            .collect())
    }

    /// Appends a row and indexes it. Returns its slot.
    pub fn append_row(&mut self, row: Row) -> usize {
        self.index_insert(&row);
        self.rows.push(row);
        self.rows.len() - 1
    }

    /// Inserts a row at `slot` (clamped to the table length) and indexes it.
    /// Returns the slot used.
    pub fn insert_row_at(&mut self, slot: usize, row: Row) -> usize {
        let slot = slot.min(self.rows.len());
        self.index_insert(&row);
        self.rows.insert(slot, row);
        slot
    }

    /// Removes the row at `slot` and its index entries.
    pub fn remove_row_at(&mut self, slot: usize) -> Option<Row> {
        if slot >= self.rows.len() {
            return None;
        }
        let row = self.rows.remove(slot);
        self.index_delete(&row);
        Some(row)
    }

    /// Removes the row whose primary key equals `key`.
    pub fn remove_by_pk(&mut self, key: &Value) -> Option<(usize, Row)> {
        let slot = self.find_slot_by_pk(key)?;
        self.remove_row_at(slot).map(|row| (slot, row))
    }

    /// Replaces the row at `slot`, refreshing the indexes. Returns the old row.
    pub fn apply_update(&mut self, slot: usize, new_row: Row) -> Option<Row> {
        let old = self.rows.get(slot)?.clone();
        self.index_update(&old, &new_row);
        self.rows[slot] = new_row;
        Some(old)
    }

    /// Adds a row to every index.
    pub fn index_insert(&mut self, row: &Row) {
        for (column, index) in self.indexes.iter_mut() {
            index.add_to_index(row.get_or_null(column), row.clone());
        }
    }

    /// Moves index entries from `old` to `new`. Entries are refreshed even
    /// when the key is unchanged since buckets hold row copies.
    pub fn index_update(&mut self, old: &Row, new: &Row) {
        for (column, index) in self.indexes.iter_mut() {
            index.remove_from_index(old.get_or_null(column), old);
            index.add_to_index(new.get_or_null(column), new.clone());
        }
    }

    /// Removes a row from every index.
    pub fn index_delete(&mut self, row: &Row) {
        for (column, index) in self.indexes.iter_mut() {
            index.remove_from_index(row.get_or_null(column), row);
        }
    }

    /// Captures every index for persistence.
    pub fn prepare_for_save(&self) -> Vec<IndexSnapshot> {
        self.indexes.values().map(ColumnIndex::prepare_for_save).collect()
    }

    /// Replaces the indexes with restored snapshots.
    pub fn restore_indexes(&mut self, snapshots: Vec<IndexSnapshot>) -> Result<()> {
        let mut indexes = BTreeMap::new();
        for snapshot in snapshots {
            if !self.schema.has_column(&snapshot.column) {
                return Err(Error::column_not_found(self.name(), snapshot.column));
            }
            let index = ColumnIndex::restore_after_load(snapshot)?;
            indexes.insert(index.column().to_string(), index);
        }
        self.indexes = indexes;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_core::schema::{Column, TableBuilder};
    use cinder_core::DataType;

    fn students() -> Table {
        let schema = TableBuilder::new("Students")
            .column(Column::new("id", DataType::Int64).primary_key())
            .column(Column::new("name", DataType::String))
            .column(Column::new("email", DataType::String).unique())
            .build()
            .unwrap();
        Table::new(schema, 3).unwrap()
    }

    fn student(id: i64, name: &str) -> Row {
        Row::new()
            .with("id", id)
            .with("name", name)
            .with("email", format!("{}@uni.edu", id))
    }

    #[test]
    fn test_auto_indexes() {
        let table = students();
        assert!(table.index("id").is_some());
        assert!(table.index("email").is_some());
        assert!(table.index("name").is_none());
    }

    #[test]
    fn test_append_and_find() {
        let mut table = students();
        assert_eq!(table.append_row(student(1, "Ali")), 0);
        assert_eq!(table.append_row(student(2, "Mia")), 1);

        assert_eq!(table.find_slot_by_pk(&Value::Int64(2)), Some(1));
        assert_eq!(table.find_slot_by_pk(&Value::Int64(3)), None);
        assert_eq!(table.find_slot_by_pk(&Value::Null), None);
        assert_eq!(table.get_by_pk(&Value::Int64(1)), Some(&student(1, "Ali")));
        assert_eq!(
            table.index("id").unwrap().lookup_rows(&Value::Int64(2)),
            vec![student(2, "Mia")]
        );
    }

    #[test]
    fn test_remove_keeps_indexes_in_step() {
        let mut table = students();
        table.append_row(student(1, "Ali"));
        table.append_row(student(2, "Mia"));

        assert_eq!(table.remove_by_pk(&Value::Int64(1)), Some((0, student(1, "Ali"))));
        assert_eq!(table.len(), 1);
        assert!(!table.index("id").unwrap().contains_key(&Value::Int64(1)));
        assert_eq!(table.find_slot_by_pk(&Value::Int64(2)), Some(0));
        assert_eq!(table.remove_by_pk(&Value::Int64(1)), None);
    }

    #[test]
    fn test_insert_row_at_clamps() {
        let mut table = students();
        table.append_row(student(1, "Ali"));
        assert_eq!(table.insert_row_at(10, student(2, "Mia")), 1);
        assert_eq!(table.insert_row_at(0, student(3, "Zoe")), 0);
        let ids: Vec<&Value> = table.rows().iter().map(|r| table.primary_key_of(r)).collect();
        assert_eq!(ids, vec![&Value::Int64(3), &Value::Int64(1), &Value::Int64(2)]);
    }

    #[test]
    fn test_apply_update_refreshes_index() {
        let mut table = students();
        table.append_row(student(1, "Ali"));
        let updated = student(1, "Ali").merged(&Row::new().with("email", "ali@uni.edu"));

        let old = table.apply_update(0, updated.clone()).unwrap();
        assert_eq!(old, student(1, "Ali"));

        let email = table.index("email").unwrap();
        assert!(!email.contains_key(&Value::from("1@uni.edu")));
        assert_eq!(email.lookup_rows(&Value::from("ALI@uni.edu")), vec![updated.clone()]);
        // Unchanged key still points at the new copy.
        assert_eq!(table.index("id").unwrap().lookup_rows(&Value::Int64(1)), vec![updated]);
        assert!(table.apply_update(5, student(9, "x")).is_none());
    }

    #[test]
    fn test_lookup_with_and_without_index() {
        let mut table = students();
        table.append_row(student(1, "Ali"));
        table.append_row(student(2, "ali "));
        table.append_row(student(3, "Mia"));

        assert_eq!(table.lookup("name", &Value::from("ALI")).unwrap().len(), 2);
        table.create_index("name").unwrap();
        assert_eq!(table.lookup("name", &Value::from("ALI")).unwrap().len(), 2);
        assert!(table.lookup("missing", &Value::from("x")).is_err());
    }

    #[test]
    fn test_contains_value_skips_slot() {
        let mut table = students();
        table.append_row(student(1, "Ali"));
        table.append_row(student(2, "Mia"));
        assert_eq!(table.find_slot("name", &Value::from("Mia")), Some(1));
        assert_eq!(table.find_slot("name", &Value::from("mia")), None);
        assert!(table.contains_value("name", &Value::from("Ali"), None));
        assert!(!table.contains_value("name", &Value::from("Ali"), Some(0)));
        assert!(!table.contains_value("name", &Value::from("ali"), None));
    }

    #[test]
    fn test_save_and_restore_indexes() {
        let mut table = students();
        for id in 0..20 {
            table.append_row(student(id, "s"));
        }
        let saved = table.prepare_for_save();
        assert_eq!(saved.len(), 2);

        let json = serde_json::to_string(&saved).unwrap();
        let decoded: Vec<IndexSnapshot> = serde_json::from_str(&json).unwrap();

        let mut restored = Table::new(table.schema().clone(), 3).unwrap();
        for row in table.rows() {
            restored.rows.push(row.clone());
        }
        restored.restore_indexes(decoded).unwrap();
        assert_eq!(
            restored.lookup("id", &Value::Int64(7)).unwrap(),
            vec![student(7, "s")]
        );
    }
}
