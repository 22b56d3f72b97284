//! Cinder Storage - Transactional table storage for the Cinder engine.
//!
//! This crate provides the storage layer including:
//!
//! - `Table`: Positional row store with column index maintenance
//! - `Database`: Table catalog, constraint-checked inserts and updates,
//!   cascading deletes
//! - `ConcurrencyControl`: Row-slot locks and deleted markers
//! - `TransactionManager`: Operation logs, visibility, commit and rollback
//! - `ConstraintChecker`: Constraint validation
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use cinder_core::schema::Column;
//! use cinder_core::{DataType, EngineConfig, Row, Value};
//! use cinder_storage::{ConcurrencyControl, Database, TransactionManager};
//!
//! let db = Database::new("school");
//! db.create_table(
//!     "Students",
//!     vec![
//!         Column::new("id", DataType::Int64).primary_key(),
//!         Column::new("name", DataType::String),
//!     ],
//! )
//! .unwrap();
//!
//! let tm = TransactionManager::new(Arc::new(ConcurrencyControl::new()), EngineConfig::default());
//! let tx = tm.begin_transaction();
//! db.insert_row_tx(tx, "Students", Row::new().with("id", 1).with("name", "Ali"), &tm)
//!     .unwrap();
//!
//! // Invisible to other transactions until commit.
//! let other = tm.begin_transaction();
//! assert!(tm.get_visible_rows(other, "Students", &db).unwrap().is_empty());
//!
//! tm.commit_transaction(tx, &db).unwrap();
//! assert_eq!(tm.get_visible_rows(other, "Students", &db).unwrap().len(), 1);
//! assert_eq!(db.lookup("Students", "name", &Value::from("ALI")).unwrap().len(), 1);
//! ```

pub mod constraint;
pub mod database;
pub mod journal;
pub mod lock;
pub mod table;
pub mod transaction;

pub use constraint::ConstraintChecker;
pub use database::{Database, TableHandle};
pub use journal::{OperationKind, OperationLog};
pub use lock::{ConcurrencyControl, LockType};
pub use table::Table;
pub use transaction::{TransactionId, TransactionManager};
