//! Operation log entries recorded by transactions.
//!
//! Each entry keeps before and after images keyed by the row slot they
//! occupied when the entry was logged. Replay identifies rows by primary key,
//! so slots only serve as positioning hints.

use cinder_core::schema::TableSchema;
use cinder_core::{Row, Value};

/// Kind of a logged operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// A table was created.
    Create,
    /// Rows were inserted.
    Insert,
    /// Rows were updated.
    Update,
    /// Rows were deleted.
    Delete,
}

impl OperationKind {
    /// Returns true for row operations that take write locks on their
    /// before-images.
    #[inline]
    pub fn locks_before_images(&self) -> bool {
        matches!(self, OperationKind::Update | OperationKind::Delete)
    }
}

/// A single logged operation.
#[derive(Clone, Debug, PartialEq)]
pub struct OperationLog {
    kind: OperationKind,
    table: String,
    /// Rows as they were before the operation, with their slot.
    before: Vec<(usize, Row)>,
    /// Rows as they are after the operation, with their slot.
    after: Vec<(usize, Row)>,
    /// Schema of a created table, for rollback.
    created: Option<TableSchema>,
}

impl OperationLog {
    /// Creates a row-level entry.
    pub fn new(
        kind: OperationKind,
        table: impl Into<String>,
        before: Vec<(usize, Row)>,
        after: Vec<(usize, Row)>,
    ) -> Self {
        Self {
            kind,
            table: table.into(),
            before,
            after,
            created: None,
        }
    }

    /// Creates a table-creation entry.
    pub fn create(schema: TableSchema) -> Self {
        Self {
            kind: OperationKind::Create,
            table: schema.name().to_string(),
            before: Vec::new(),
            after: Vec::new(),
            created: Some(schema),
        }
    }

    #[inline]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    #[inline]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[inline]
    pub fn before(&self) -> &[(usize, Row)] {
        &self.before
    }

    #[inline]
    pub fn after(&self) -> &[(usize, Row)] {
        &self.after
    }

    /// Returns the schema of the table this entry created.
    #[inline]
    pub fn created_schema(&self) -> Option<&TableSchema> {
        self.created.as_ref()
    }

    /// Returns true if any image in this entry carries `pk_column = key`.
    pub fn touches_key(&self, pk_column: &str, key: &Value) -> bool {
        self.before
            .iter()
            .chain(self.after.iter())
            .any(|(_, row)| row.get(pk_column) == Some(key))
    }
}
