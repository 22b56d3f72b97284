//! Column definition for Cinder table schemas.

use super::constraint::{ColumnConstraint, ConstraintFlags, ForeignKeyRef};
use crate::types::DataType;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// A column definition in a table schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Column {
    name: String,
    data_type: DataType,
    /// Maximum length in characters, strings only.
    max_length: Option<usize>,
    constraint: ColumnConstraint,
}

impl Column {
    /// Creates a new unconstrained column.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            max_length: None,
            constraint: ColumnConstraint::new(),
        }
    }

    /// Sets the maximum string length.
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Replaces the column's constraints.
    pub fn constraint(mut self, constraint: ColumnConstraint) -> Self {
        self.constraint = constraint;
        self
    }

    /// Shorthand for a primary-key constraint.
    pub fn primary_key(mut self) -> Self {
        self.constraint = self.constraint.primary_key();
        self
    }

    /// Shorthand for a NOT NULL constraint.
    pub fn not_null(mut self) -> Self {
        self.constraint = self.constraint.not_null();
        self
    }

    /// Shorthand for a UNIQUE constraint.
    pub fn unique(mut self) -> Self {
        self.constraint = self.constraint.unique();
        self
    }

    /// Shorthand for a foreign key to `table.column`.
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.constraint = self.constraint.references(table, column);
        self
    }

    /// Shorthand for a default value.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.constraint = self.constraint.default_value(value);
        self
    }

    /// Returns the column name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the data type.
    #[inline]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Returns the maximum string length.
    #[inline]
    pub fn get_max_length(&self) -> Option<usize> {
        self.max_length
    }

    /// Returns the column's constraints.
    #[inline]
    pub fn get_constraint(&self) -> &ColumnConstraint {
        &self.constraint
    }

    #[inline]
    pub fn is_primary_key(&self) -> bool {
        self.constraint.has(ConstraintFlags::PRIMARY_KEY)
    }

    #[inline]
    pub fn is_unique(&self) -> bool {
        self.constraint.has(ConstraintFlags::UNIQUE)
    }

    /// Primary-key columns are implicitly NOT NULL.
    #[inline]
    pub fn is_not_null(&self) -> bool {
        self.constraint.has(ConstraintFlags::NOT_NULL) || self.is_primary_key()
    }

    /// Returns true when values must be unique (UNIQUE or PRIMARY KEY).
    #[inline]
    pub fn requires_unique(&self) -> bool {
        self.is_unique() || self.is_primary_key()
    }

    /// Returns true when the column gets an index at table creation.
    #[inline]
    pub fn is_auto_indexed(&self) -> bool {
        self.requires_unique()
    }

    /// Returns the foreign key target.
    #[inline]
    pub fn foreign_key(&self) -> Option<&ForeignKeyRef> {
        self.constraint.get_reference()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_new() {
        let col = Column::new("id", DataType::Int64);
        assert_eq!(col.name(), "id");
        assert_eq!(col.data_type(), DataType::Int64);
        assert!(!col.is_not_null());
        assert!(!col.is_unique());
        assert!(col.foreign_key().is_none());
    }

    #[test]
    fn test_primary_key_implies_not_null_and_unique() {
        let col = Column::new("id", DataType::Int64).primary_key();
        assert!(col.is_primary_key());
        assert!(col.is_not_null());
        assert!(col.requires_unique());
        assert!(col.is_auto_indexed());
    }

    #[test]
    fn test_column_builder() {
        let col = Column::new("name", DataType::String)
            .max_length(20)
            .unique()
            .default_value("unknown");

        assert_eq!(col.get_max_length(), Some(20));
        assert!(col.is_unique());
        assert_eq!(
            col.get_constraint().get_default_value(),
            Some(&Value::String("unknown".into()))
        );
    }
}
