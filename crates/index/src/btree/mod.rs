//! B-tree ordered map for Cinder indexes.
//!
//! A classic B-tree (values live beside their keys in every node) stored in
//! an arena, with proactive splitting on insert and lazy removal.

mod iter;
mod node;
mod snapshot;
mod tree;

pub use iter::Iter;
pub use node::NodeId;
pub use snapshot::{NodeSnapshot, TreeSnapshot};
pub use tree::BTree;
