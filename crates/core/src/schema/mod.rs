//! Schema module for Cinder.
//!
//! This module contains table, column and constraint definitions.

mod column;
mod constraint;
mod table;

pub use column::Column;
pub use constraint::{ColumnConstraint, ConstraintFlags, ForeignKeyRef};
pub use table::{TableBuilder, TableSchema};
