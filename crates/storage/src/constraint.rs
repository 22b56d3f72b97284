//! Constraint checking for Cinder tables.
//!
//! Checks that only need the schema and a value live here; checks that need
//! other tables take the parent table explicitly so callers control which
//! table guards are held.

use crate::table::Table;
use cinder_core::schema::{Column, TableSchema};
use cinder_core::{ConstraintKind, Error, Result, Row, Value};

/// Constraint checker for validating rows against a schema.
pub struct ConstraintChecker;

impl ConstraintChecker {
    /// Builds the row to store for an insert: rejects unknown columns, fills
    /// defaults, stores Null for the remaining missing columns and checks
    /// every value.
    pub fn prepare_insert(schema: &TableSchema, row: Row) -> Result<Row> {
        if let Some(unknown) = row.columns().find(|c| !schema.has_column(c)) {
            return Err(Error::column_not_found(schema.name(), unknown));
        }

        let mut prepared = row;
        for column in schema.columns() {
            if !prepared.contains(column.name()) {
                let value = column
                    .get_constraint()
                    .get_default_value()
                    .cloned()
                    .unwrap_or(Value::Null);
                prepared.set(column.name(), value);
            }
            Self::check_value(schema, column, prepared.get_or_null(column.name()))?;
        }
        Ok(prepared)
    }

    /// Checks type, maximum length and not-null for one column value.
    pub fn check_value(schema: &TableSchema, column: &Column, value: &Value) -> Result<()> {
        if !column.data_type().accepts(value) {
            return Err(Error::constraint(
                ConstraintKind::TypeMismatch,
                schema.name(),
                column.name(),
                value.clone(),
                format!("expected {}", column.data_type()),
            ));
        }

        if let (Some(max), Value::String(s)) = (column.get_max_length(), value) {
            let length = s.chars().count();
            if length > max {
                return Err(Error::constraint(
                    ConstraintKind::MaxLength,
                    schema.name(),
                    column.name(),
                    value.clone(),
                    format!("length {} exceeds {}", length, max),
                ));
            }
        }

        if column.is_not_null() && value.is_null_or_empty() {
            return Err(Error::constraint(
                ConstraintKind::NotNull,
                schema.name(),
                column.name(),
                value.clone(),
                "value is required",
            ));
        }
        Ok(())
    }

    /// Checks that no row of `table` other than `skip_slot` already holds
    /// the row's value in a unique or primary-key column.
    pub fn check_unique(table: &Table, row: &Row, skip_slot: Option<usize>) -> Result<()> {
        for column in table.schema().columns().iter().filter(|c| c.requires_unique()) {
            let value = row.get_or_null(column.name());
            if value.is_null() {
                continue;
            }
            if table.contains_value(column.name(), value, skip_slot) {
                let kind = if column.is_primary_key() {
                    ConstraintKind::PrimaryKey
                } else {
                    ConstraintKind::Unique
                };
                return Err(Error::constraint(
                    kind,
                    table.name(),
                    column.name(),
                    value.clone(),
                    "value already exists",
                ));
            }
        }
        Ok(())
    }

    /// Checks that `value` exists in the column `column` references on
    /// `parent`. Null values reference nothing and always pass.
    pub fn check_foreign_key(
        schema: &TableSchema,
        column: &Column,
        value: &Value,
        parent: &Table,
    ) -> Result<()> {
        let reference = match column.foreign_key() {
            Some(reference) => reference,
            None => return Ok(()),
        };
        if value.is_null() || parent.contains_value(&reference.column, value, None) {
            return Ok(());
        }
        Err(Error::constraint(
            ConstraintKind::ForeignKey,
            schema.name(),
            column.name(),
            value.clone(),
            format!("not found in {}({})", reference.table, reference.column),
        ))
    }

    /// Checks that no row of `child` references `value` through a foreign
    /// key on `parent_table.parent_column`.
    pub fn check_not_referenced(
        parent_table: &str,
        parent_column: &str,
        value: &Value,
        child: &Table,
    ) -> Result<()> {
        for column in child.schema().foreign_key_columns() {
            let references_parent = column
                .foreign_key()
                .map_or(false, |r| r.table == parent_table && r.column == parent_column);
            if references_parent && child.contains_value(column.name(), value, None) {
                return Err(Error::constraint(
                    ConstraintKind::PrimaryKey,
                    parent_table,
                    parent_column,
                    value.clone(),
                    format!("still referenced by {}.{}", child.name(), column.name()),
                ));
            }
        }
        Ok(())
    }
}
