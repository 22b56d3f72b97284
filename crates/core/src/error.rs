//! Error types for Cinder.

use crate::value::Value;
use core::fmt;
use std::time::Duration;

/// Result type alias for Cinder operations.
pub type Result<T> = core::result::Result<T, Error>;

/// The constraint a row mutation violated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    /// A NOT NULL (or primary-key) column was missing or empty.
    NotNull,
    /// A UNIQUE column already holds the value.
    Unique,
    /// A PRIMARY KEY column already holds the value, or is still referenced.
    PrimaryKey,
    /// A referenced parent row does not exist.
    ForeignKey,
    /// The value does not match the declared column type.
    TypeMismatch,
    /// A string exceeds the declared maximum length.
    MaxLength,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstraintKind::NotNull => "not-null",
            ConstraintKind::Unique => "unique",
            ConstraintKind::PrimaryKey => "primary key",
            ConstraintKind::ForeignKey => "foreign key",
            ConstraintKind::TypeMismatch => "type",
            ConstraintKind::MaxLength => "max length",
        };
        f.write_str(name)
    }
}

/// Error types for Cinder operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A row mutation violated a column constraint.
    #[error("{kind} constraint violated on {table}.{column} (value {value}): {message}")]
    ConstraintViolation {
        kind: ConstraintKind,
        table: String,
        column: String,
        value: Value,
        message: String,
    },
    /// A primary-key lookup found nothing.
    #[error("no row in {table} with {column} = {key}")]
    RowNotFound {
        table: String,
        column: String,
        key: Value,
    },
    /// The row has been claimed by another active transaction.
    #[error("row {key} in {table} is deleted by transaction {owner}")]
    Conflict { table: String, key: Value, owner: u64 },
    /// A bounded write-lock wait expired.
    #[error("timed out after {waited:?} waiting for write lock on {table}[{slot}]")]
    LockTimeout {
        table: String,
        slot: usize,
        waited: Duration,
    },
    /// Table not found.
    #[error("table not found: {name}")]
    TableNotFound { name: String },
    /// Table already exists.
    #[error("table already exists: {name}")]
    TableExists { name: String },
    /// Column not found.
    #[error("column {column} not found in table {table}")]
    ColumnNotFound { table: String, column: String },
    /// Invalid schema definition.
    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },
    /// The transaction is unknown or already finished.
    #[error("transaction {id} is not active")]
    TransactionNotActive { id: u64 },
    /// A persisted index snapshot is malformed.
    #[error("invalid index snapshot: {message}")]
    InvalidSnapshot { message: String },
    /// Engine configuration is out of range.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl Error {
    /// Creates a constraint violation error.
    pub fn constraint(
        kind: ConstraintKind,
        table: impl Into<String>,
        column: impl Into<String>,
        value: Value,
        message: impl Into<String>,
    ) -> Self {
        Error::ConstraintViolation {
            kind,
            table: table.into(),
            column: column.into(),
            value,
            message: message.into(),
        }
    }

    /// Creates a row not found error.
    pub fn row_not_found(table: impl Into<String>, column: impl Into<String>, key: Value) -> Self {
        Error::RowNotFound {
            table: table.into(),
            column: column.into(),
            key,
        }
    }

    /// Creates a conflict error.
    pub fn conflict(table: impl Into<String>, key: Value, owner: u64) -> Self {
        Error::Conflict {
            table: table.into(),
            key,
            owner,
        }
    }

    /// Creates a lock timeout error.
    pub fn lock_timeout(table: impl Into<String>, slot: usize, waited: Duration) -> Self {
        Error::LockTimeout {
            table: table.into(),
            slot,
            waited,
        }
    }

    /// Creates a table not found error.
    pub fn table_not_found(name: impl Into<String>) -> Self {
        Error::TableNotFound { name: name.into() }
    }

    /// Creates a table exists error.
    pub fn table_exists(name: impl Into<String>) -> Self {
        Error::TableExists { name: name.into() }
    }

    /// Creates a column not found error.
    pub fn column_not_found(table: impl Into<String>, column: impl Into<String>) -> Self {
        Error::ColumnNotFound {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Error::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates a transaction not active error.
    pub fn transaction_not_active(id: u64) -> Self {
        Error::TransactionNotActive { id }
    }

    /// Creates an invalid snapshot error.
    pub fn invalid_snapshot(message: impl Into<String>) -> Self {
        Error::InvalidSnapshot {
            message: message.into(),
        }
    }

    /// Creates an invalid config error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns true for constraint violations of any kind.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Error::ConstraintViolation { .. })
    }

    /// Returns the violated constraint, if this is a constraint violation.
    pub fn constraint_kind(&self) -> Option<ConstraintKind> {
        match self {
            Error::ConstraintViolation { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
