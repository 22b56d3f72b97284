//! Table definition for Cinder schemas.

use super::column::Column;
use crate::error::{Error, Result};
use crate::types::DataType;
use serde::{Deserialize, Serialize};

/// A table definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    name: String,
    columns: Vec<Column>,
    /// Position of the primary-key column in `columns`.
    primary_key: usize,
}

impl TableSchema {
    /// Validates and creates a table definition.
    ///
    /// Exactly one column must be the primary key; names must follow the
    /// identifier rules and be unique.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Result<Self> {
        let name = name.into();
        check_naming_rules(&name)?;
        if columns.is_empty() {
            return Err(Error::invalid_schema(format!(
                "table {} must declare at least one column",
                name
            )));
        }

        for (i, col) in columns.iter().enumerate() {
            check_naming_rules(col.name())?;
            if columns[..i].iter().any(|c| c.name() == col.name()) {
                return Err(Error::invalid_schema(format!(
                    "column already exists: {}.{}",
                    name,
                    col.name()
                )));
            }
            if col.get_max_length().is_some() && col.data_type() != DataType::String {
                return Err(Error::invalid_schema(format!(
                    "max length is only valid on STRING columns: {}.{}",
                    name,
                    col.name()
                )));
            }
            if let Some(default) = col.get_constraint().get_default_value() {
                if !col.data_type().accepts(default) {
                    return Err(Error::invalid_schema(format!(
                        "default {} does not match type {} of {}.{}",
                        default,
                        col.data_type(),
                        name,
                        col.name()
                    )));
                }
            }
        }

        let mut pk_columns = columns.iter().enumerate().filter(|(_, c)| c.is_primary_key());
        let primary_key = match (pk_columns.next(), pk_columns.next()) {
            (Some((i, _)), None) => i,
            (None, _) => {
                return Err(Error::invalid_schema(format!(
                    "table {} has no primary key",
                    name
                )))
            }
            (Some(_), Some(_)) => {
                return Err(Error::invalid_schema(format!(
                    "table {} declares more than one primary key",
                    name
                )))
            }
        };

        Ok(Self {
            name,
            columns,
            primary_key,
        })
    }

    /// Returns the table name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the columns in declaration order.
    #[inline]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Gets a column by name.
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// Returns true if the table has a column named `name`.
    pub fn has_column(&self, name: &str) -> bool {
        self.get_column(name).is_some()
    }

    /// Returns the primary-key column.
    #[inline]
    pub fn primary_key(&self) -> &Column {
        &self.columns[self.primary_key]
    }

    /// Returns the primary-key column name.
    #[inline]
    pub fn primary_key_name(&self) -> &str {
        self.columns[self.primary_key].name()
    }

    /// Returns the columns declaring a foreign key.
    pub fn foreign_key_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.foreign_key().is_some())
    }
}

/// Builder for table definitions.
pub struct TableBuilder {
    name: String,
    columns: Vec<Column>,
}

impl TableBuilder {
    /// Creates a new table builder.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Adds a column.
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Adds a plain column of the given type.
    pub fn add_column(self, name: impl Into<String>, data_type: DataType) -> Self {
        self.column(Column::new(name, data_type))
    }

    /// Validates and builds the table definition.
    pub fn build(self) -> Result<TableSchema> {
        TableSchema::new(self.name, self.columns)
    }
}

/// Validates a name follows identifier rules.
fn check_naming_rules(name: &str) -> Result<()> {
    let first = match name.chars().next() {
        Some(c) => c,
        None => return Err(Error::invalid_schema("name cannot be empty")),
    };
    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(Error::invalid_schema(format!(
            "name must start with letter or underscore: {}",
            name
        )));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::invalid_schema(format!(
            "name contains invalid characters: {}",
            name
        )));
    }
    Ok(())
}
