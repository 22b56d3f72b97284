//! Column constraint definitions.

use crate::value::Value;
use core::ops::{BitOr, BitOrAssign};
use serde::{Deserialize, Serialize};

/// A set of constraint flags attached to a column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConstraintFlags(u8);

impl ConstraintFlags {
    /// No constraint.
    pub const NONE: Self = Self(0);
    /// Value must be present and non-empty.
    pub const NOT_NULL: Self = Self(1);
    /// Value must be unique within the table.
    pub const UNIQUE: Self = Self(1 << 1);
    /// Column identifies the row.
    pub const PRIMARY_KEY: Self = Self(1 << 2);
    /// Value must exist in the referenced table.
    pub const FOREIGN_KEY: Self = Self(1 << 3);
    /// Column carries a check expression.
    pub const CHECK: Self = Self(1 << 4);

    /// Returns true if every flag in `other` is set.
    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if no flag is set.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ConstraintFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ConstraintFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Foreign key target.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    /// Referenced (parent) table.
    pub table: String,
    /// Referenced (parent) column.
    pub column: String,
}

/// Constraints attached to a single column.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnConstraint {
    flags: ConstraintFlags,
    default_value: Option<Value>,
    check_expression: Option<String>,
    reference: Option<ForeignKeyRef>,
}

impl ColumnConstraint {
    /// Creates an empty constraint set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.flags |= ConstraintFlags::NOT_NULL;
        self
    }

    /// Marks the column UNIQUE.
    pub fn unique(mut self) -> Self {
        self.flags |= ConstraintFlags::UNIQUE;
        self
    }

    /// Marks the column as the primary key.
    pub fn primary_key(mut self) -> Self {
        self.flags |= ConstraintFlags::PRIMARY_KEY;
        self
    }

    /// Adds a foreign key to `table.column`.
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.flags |= ConstraintFlags::FOREIGN_KEY;
        self.reference = Some(ForeignKeyRef {
            table: table.into(),
            column: column.into(),
        });
        self
    }

    /// Attaches a check expression. It is stored for the command layer and
    /// is not evaluated by the storage engine.
    pub fn check(mut self, expression: impl Into<String>) -> Self {
        self.flags |= ConstraintFlags::CHECK;
        self.check_expression = Some(expression.into());
        self
    }

    /// Sets the value used when an insert omits the column.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Returns true if every flag in `flag` is set.
    #[inline]
    pub fn has(&self, flag: ConstraintFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Returns the raw flags.
    #[inline]
    pub fn flags(&self) -> ConstraintFlags {
        self.flags
    }

    /// Returns the default value.
    pub fn get_default_value(&self) -> Option<&Value> {
        self.default_value.as_ref()
    }

    /// Returns the check expression.
    pub fn get_check_expression(&self) -> Option<&str> {
        self.check_expression.as_deref()
    }

    /// Returns the foreign key target.
    pub fn get_reference(&self) -> Option<&ForeignKeyRef> {
        self.reference.as_ref()
    }
}
