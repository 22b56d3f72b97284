//! Cinder Index - Ordered index structures for the Cinder storage engine.
//!
//! This crate provides:
//!
//! - `BTree`: an arena-backed B-tree with proactive splitting and lazy removal
//! - `IndexKey`: the normalized key type for column indexes
//! - `ColumnIndex`: a per-column index mapping keys to row buckets
//!
//! # Example
//!
//! ```rust
//! use cinder_core::{Row, Value};
//! use cinder_index::{BTree, ColumnIndex};
//!
//! let mut tree: BTree<i32, &str> = BTree::new(3).unwrap();
//! tree.insert(10, "ten");
//! tree.insert(5, "five");
//! assert_eq!(tree.search(&10), Some(&"ten"));
//!
//! let mut index = ColumnIndex::new("name", 3).unwrap();
//! let row = Row::new().with("id", 1).with("name", "Ali");
//! index.add_to_index(&Value::from("Ali"), row.clone());
//! assert_eq!(index.lookup_rows(&Value::from(" ali")), vec![row]);
//! ```

pub mod btree;
mod column;
mod key;

pub use btree::{BTree, NodeSnapshot, TreeSnapshot};
pub use column::{ColumnIndex, IndexSnapshot};
pub use key::IndexKey;
