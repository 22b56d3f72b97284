//! Cinder Core - Core types and schema definitions for the Cinder storage engine.
//!
//! This crate provides the foundational types shared by every layer:
//!
//! - `DataType`: Column types (Boolean, Int64, String)
//! - `Value`: Tagged cell values
//! - `Row`: An ordered column-name → value mapping
//! - `schema`: Table, column and constraint definitions
//! - `EngineConfig`: Engine tunables
//! - `Error`: Error types for storage operations
//!
//! # Example
//!
//! ```rust
//! use cinder_core::{DataType, Row, Value};
//! use cinder_core::schema::{Column, TableBuilder};
//!
//! let table = TableBuilder::new("users")
//!     .column(Column::new("id", DataType::Int64).primary_key())
//!     .column(Column::new("name", DataType::String).not_null())
//!     .build()
//!     .unwrap();
//!
//! let row = Row::new().with("id", 1).with("name", "Alice");
//!
//! assert_eq!(table.primary_key_name(), "id");
//! assert_eq!(row.get("name"), Some(&Value::String("Alice".into())));
//! ```

pub mod config;
mod error;
mod row;
pub mod schema;
mod types;
mod value;

pub use config::EngineConfig;
pub use error::{ConstraintKind, Error, Result};
pub use row::Row;
pub use types::DataType;
pub use value::Value;
