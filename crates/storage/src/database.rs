//! Table catalog and row-level operations.
//!
//! The catalog hands out shared table handles. Guards on a table are held
//! only for short sections and never while waiting for a row lock, and at
//! most one table is write-locked at a time.

use crate::constraint::ConstraintChecker;
use crate::journal::OperationKind;
use crate::table::Table;
use crate::transaction::{TransactionId, TransactionManager};
use cinder_core::schema::{Column, TableSchema};
use cinder_core::{EngineConfig, Error, Result, Row, Value};
use hashbrown::HashSet;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared handle to a table.
pub type TableHandle = Arc<RwLock<Table>>;

/// A named collection of tables.
pub struct Database {
    name: String,
    config: EngineConfig,
    tables: RwLock<BTreeMap<String, TableHandle>>,
}

impl Database {
    /// Creates an empty database with the default configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: EngineConfig::default(),
            tables: RwLock::new(BTreeMap::new()),
        }
    }

    /// Creates an empty database with a validated configuration.
    pub fn with_config(name: impl Into<String>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            config,
            tables: RwLock::new(BTreeMap::new()),
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the handle for `name`.
    pub fn table(&self, name: &str) -> Result<TableHandle> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::table_not_found(name))
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.read().contains_key(name)
    }

    /// Returns the table names in ascending order.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }

    fn handles(&self) -> Vec<(String, TableHandle)> {
        self.tables
            .read()
            .iter()
            .map(|(name, handle)| (name.clone(), Arc::clone(handle)))
            .collect()
    }

    /// Creates a table. Primary-key and unique columns are indexed.
    ///
    /// Every foreign key must target an existing column of an existing
    /// table, or of the table itself.
    pub fn create_table(&self, name: &str, columns: Vec<Column>) -> Result<()> {
        let schema = TableSchema::new(name, columns)?;

        let mut tables = self.tables.write();
        if tables.contains_key(name) {
            return Err(Error::table_exists(name));
        }
        for column in schema.foreign_key_columns() {
            if let Some(reference) = column.foreign_key() {
                let target_has_column = if reference.table == name {
                    schema.has_column(&reference.column)
                } else {
                    match tables.get(&reference.table) {
                        Some(parent) => parent.read().schema().has_column(&reference.column),
                        None => return Err(Error::table_not_found(reference.table.as_str())),
                    }
                };
                if !target_has_column {
                    return Err(Error::column_not_found(
                        reference.table.as_str(),
                        reference.column.as_str(),
                    ));
                }
            }
        }

        let table = Table::new(schema, self.config.get_index_degree())?;
        tables.insert(name.to_string(), Arc::new(RwLock::new(table)));
        tracing::info!(db = %self.name, table = name, "table created");
        Ok(())
    }

    /// Creates a table inside `tx`; rolling back `tx` drops it again.
    pub fn create_table_tx(
        &self,
        tx: TransactionId,
        name: &str,
        columns: Vec<Column>,
        tm: &TransactionManager,
    ) -> Result<()> {
        if !tm.is_active(tx) {
            return Err(Error::transaction_not_active(tx));
        }
        self.create_table(name, columns)?;
        if let Err(err) = tm.log_operation(tx, OperationKind::Create, name, vec![], vec![], self) {
            self.remove_table(name);
            return Err(err);
        }
        Ok(())
    }

    /// Drops a table that no other table references.
    pub fn drop_table(&self, name: &str) -> Result<()> {
        let mut tables = self.tables.write();
        if !tables.contains_key(name) {
            return Err(Error::table_not_found(name));
        }
        for (other, handle) in tables.iter().filter(|(other, _)| other.as_str() != name) {
            let referenced = handle
                .read()
                .schema()
                .foreign_key_columns()
                .any(|c| c.foreign_key().map_or(false, |r| r.table == name));
            if referenced {
                return Err(Error::invalid_schema(format!(
                    "table {} is referenced by {}",
                    name, other
                )));
            }
        }
        tables.remove(name);
        tracing::info!(db = %self.name, table = name, "table dropped");
        Ok(())
    }

    /// Removes a table without reference checks.
    pub(crate) fn remove_table(&self, name: &str) -> Option<TableHandle> {
        self.tables.write().remove(name)
    }

    /// Returns a copy of every stored row of `table`.
    pub fn select_rows(&self, table: &str) -> Result<Vec<Row>> {
        Ok(self.table(table)?.read().rows().to_vec())
    }

    /// Returns the rows of `table` whose `column` matches `key` under index
    /// normalization.
    pub fn lookup(&self, table: &str, column: &str, key: &Value) -> Result<Vec<Row>> {
        self.table(table)?.read().lookup(column, key)
    }

    /// Read-locks every row `row` references for `tx` and checks the foreign
    /// keys that point at other tables. Self references are checked by the
    /// caller under the table's write guard.
    fn check_parent_keys<'a>(
        &self,
        schema: &TableSchema,
        row: &Row,
        columns: impl Iterator<Item = &'a Column>,
        tm: &TransactionManager,
        tx: TransactionId,
    ) -> Result<()> {
        for column in columns {
            let reference = match column.foreign_key() {
                Some(reference) => reference,
                None => continue,
            };
            let value = row.get_or_null(column.name());
            if value.is_null() {
                continue;
            }
            let self_reference = reference.table == schema.name();
            if self_reference && row.get(&reference.column) == Some(value) {
                continue;
            }
            let parent = self.table(&reference.table)?;
            tm.lock_referenced_row(tx, &reference.table, &parent, &reference.column, value)?;
            if !self_reference {
                ConstraintChecker::check_foreign_key(schema, column, value, &parent.read())?;
            }
        }
        Ok(())
    }

    /// Checks self-referencing foreign keys against `table`. A row may
    /// reference its own key.
    fn check_self_keys<'a>(
        table: &Table,
        row: &Row,
        columns: impl Iterator<Item = &'a Column>,
    ) -> Result<()> {
        for column in columns {
            let reference = match column.foreign_key() {
                Some(reference) if reference.table == table.name() => reference,
                _ => continue,
            };
            let value = row.get_or_null(column.name());
            if row.get(&reference.column) == Some(value) {
                continue;
            }
            ConstraintChecker::check_foreign_key(table.schema(), column, value, table)?;
        }
        Ok(())
    }

    /// Validates `row` and stores it in `table`, returning its slot.
    fn validate_and_append(
        &self,
        table: &str,
        row: Row,
        tm: &TransactionManager,
        tx: TransactionId,
    ) -> Result<(usize, Row)> {
        let handle = self.table(table)?;
        let schema = handle.read().schema().clone();
        let row = ConstraintChecker::prepare_insert(&schema, row)?;
        self.check_parent_keys(&schema, &row, schema.columns().iter(), tm, tx)?;

        let mut t = handle.write();
        Self::check_self_keys(&t, &row, schema.columns().iter())?;
        ConstraintChecker::check_unique(&t, &row, None)?;
        let slot = t.append_row(row.clone());
        Ok((slot, row))
    }

    /// Runs `work` in an internal transaction that commits at once, or rolls
    /// back when `work` fails.
    fn immediately<T>(
        &self,
        tm: &TransactionManager,
        work: impl FnOnce(TransactionId) -> Result<T>,
    ) -> Result<T> {
        let tx = tm.begin_transaction();
        match work(tx) {
            Ok(value) => {
                tm.commit_transaction(tx, self)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tm.rollback_transaction(tx, self) {
                    tracing::warn!(tx, error = %rollback, "internal rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Inserts a row and commits it at once.
    pub fn insert_row(&self, table: &str, row: Row, tm: &TransactionManager) -> Result<()> {
        self.immediately(tm, |tx| self.insert_row_tx(tx, table, row, tm))
    }

    /// Inserts a row inside `tx`. The row is stored and indexed at once,
    /// hidden from other transactions until commit, and removed on rollback.
    pub fn insert_row_tx(
        &self,
        tx: TransactionId,
        table: &str,
        row: Row,
        tm: &TransactionManager,
    ) -> Result<()> {
        if !tm.is_active(tx) {
            return Err(Error::transaction_not_active(tx));
        }
        let (slot, row) = self.validate_and_append(table, row, tm, tx)?;
        tm.register_inserted_row(tx, table, row.clone())?;
        tracing::debug!(tx, table, slot, "row inserted");
        tm.log_operation(tx, OperationKind::Insert, table, vec![], vec![row], self)
    }

    /// Validates `updates` against the row with primary key `pk` and
    /// returns the current and updated rows.
    fn validate_update(
        &self,
        table: &str,
        pk: &Value,
        updates: &Row,
        tm: &TransactionManager,
        tx: TransactionId,
    ) -> Result<(Row, Row)> {
        let handle = self.table(table)?;
        let (schema, slot, current) = {
            let t = handle.read();
            let slot = t
                .find_slot_by_pk(pk)
                .ok_or_else(|| Error::row_not_found(table, t.primary_key_column(), pk.clone()))?;
            (t.schema().clone(), slot, t.rows()[slot].clone())
        };

        let mut changed = Vec::new();
        for (name, value) in updates.iter() {
            let column = schema
                .get_column(name)
                .ok_or_else(|| Error::column_not_found(table, name))?;
            ConstraintChecker::check_value(&schema, column, value)?;
            changed.push(column);
        }

        let updated = current.merged(updates);
        self.check_parent_keys(&schema, &updated, changed.iter().copied(), tm, tx)?;

        let pk_column = schema.primary_key_name();
        if updated.get_or_null(pk_column) != pk {
            for (name, child) in self.handles() {
                if name == table {
                    continue;
                }
                ConstraintChecker::check_not_referenced(table, pk_column, pk, &child.read())?;
            }
        }

        let t = handle.read();
        Self::check_self_keys(&t, &updated, changed.iter().copied())?;
        if updated.get_or_null(pk_column) != pk {
            ConstraintChecker::check_not_referenced(table, pk_column, pk, &t)?;
        }
        let slot = t.find_slot_by_pk(pk).unwrap_or(slot);
        ConstraintChecker::check_unique(&t, &updated, Some(slot))?;
        Ok((current, updated))
    }

    /// Updates the row with primary key `pk` and commits the change at once.
    ///
    /// Changing a primary key that another row still references is refused.
    pub fn update_row(
        &self,
        table: &str,
        pk: &Value,
        updates: Row,
        tm: &TransactionManager,
    ) -> Result<()> {
        self.immediately(tm, |tx| self.update_row_tx(tx, table, pk, updates, tm))
    }

    /// Updates the row with primary key `pk` inside `tx`. The change is
    /// applied when `tx` commits.
    pub fn update_row_tx(
        &self,
        tx: TransactionId,
        table: &str,
        pk: &Value,
        updates: Row,
        tm: &TransactionManager,
    ) -> Result<()> {
        if !tm.is_active(tx) {
            return Err(Error::transaction_not_active(tx));
        }
        let (current, updated) = self.validate_update(table, pk, &updates, tm, tx)?;
        tm.log_operation(tx, OperationKind::Update, table, vec![current], vec![updated], self)?;
        tracing::debug!(tx, table, pk = %pk, "row update logged");
        Ok(())
    }

    /// Deletes the row with primary key `pk` and every row that depends on it
    /// through foreign keys. Returns the number of rows deleted.
    ///
    /// Inside a transaction the rows are locked, logged and marked deleted;
    /// they are removed when the transaction commits. Without one, the same
    /// work runs in an internal transaction that commits immediately.
    pub fn delete_row(
        &self,
        table: &str,
        pk: &Value,
        tm: &TransactionManager,
        tx: Option<TransactionId>,
    ) -> Result<usize> {
        match tx {
            Some(tx) => self.delete_cascade(table, pk, tm, tx),
            None => self.immediately(tm, |tx| self.delete_cascade(table, pk, tm, tx)),
        }
    }

    fn delete_cascade(
        &self,
        table: &str,
        pk: &Value,
        tm: &TransactionManager,
        tx: TransactionId,
    ) -> Result<usize> {
        if !tm.is_active(tx) {
            return Err(Error::transaction_not_active(tx));
        }
        {
            let handle = self.table(table)?;
            let t = handle.read();
            if t.find_slot_by_pk(pk).is_none() {
                return Err(Error::row_not_found(table, t.primary_key_column(), pk.clone()));
            }
        }

        let mut deleted = 0;
        loop {
            // A child committed while this round waited for locks is found by
            // the next one; once the parents are claimed no new child passes
            // the foreign-key check.
            let mut affected = self.collect_cascade(table, pk, tm, tx)?;
            if affected.is_empty() {
                break;
            }
            affected.sort_by(|a, b| (a.0.as_str(), a.1).cmp(&(b.0.as_str(), b.1)));

            for (name, slot, _) in &affected {
                tm.lock_row(tx, name, *slot)?;
            }
            for (name, _, row) in &affected {
                tm.log_operation(tx, OperationKind::Delete, name, vec![row.clone()], vec![], self)?;
            }
            deleted += affected.len();
        }
        tracing::debug!(tx, table, pk = %pk, rows = deleted, "delete logged");
        Ok(deleted)
    }

    /// Discovers the row with primary key `pk` and every row reachable from
    /// it through foreign-key back references. Rows `tx` already marked
    /// deleted are traversed but not returned.
    fn collect_cascade(
        &self,
        table: &str,
        pk: &Value,
        tm: &TransactionManager,
        tx: TransactionId,
    ) -> Result<Vec<(String, usize, Row)>> {
        let handles = self.handles();
        let mut affected = Vec::new();
        let mut visited: HashSet<(String, Value)> = HashSet::new();
        let mut stack = vec![(table.to_string(), pk.clone())];

        while let Some((name, key)) = stack.pop() {
            if !visited.insert((name.clone(), key.clone())) {
                continue;
            }
            let handle = self.table(&name)?;
            let (slot, row, claimed) = {
                let t = handle.read();
                match t.find_slot_by_pk(&key) {
                    Some(slot) => {
                        let claimed = tm.concurrency().deleted_by(&name, slot) == Some(tx);
                        (slot, t.rows()[slot].clone(), claimed)
                    }
                    None => continue,
                }
            };

            for (child_name, child) in &handles {
                let child = child.read();
                let child_pk = child.primary_key_column();
                for column in child.schema().foreign_key_columns() {
                    let reference = match column.foreign_key() {
                        Some(reference) if reference.table == name => reference,
                        _ => continue,
                    };
                    let value = row.get_or_null(&reference.column);
                    if value.is_null() {
                        continue;
                    }
                    for (_, child_row) in child.rows_matching(column.name(), value) {
                        tracing::debug!(
                            tx,
                            parent = name.as_str(),
                            child = child_name.as_str(),
                            column = column.name(),
                            "cascading delete"
                        );
                        stack.push((child_name.clone(), child_row.get_or_null(child_pk).clone()));
                    }
                }
            }
            if !claimed {
                affected.push((name, slot, row));
            }
        }
        Ok(affected)
    }
}
