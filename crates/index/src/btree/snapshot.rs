//! Serializable B-tree form.
//!
//! The arena is flattened into a nested node structure so that a saved tree
//! does not depend on arena slot numbering. Tombstones survive the round
//! trip as `None` values.

use super::node::{Node, NodeId};
use super::tree::BTree;
use cinder_core::config::MIN_INDEX_DEGREE;
use cinder_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// A saved node with its subtree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot<K, V> {
    pub keys: Vec<K>,
    pub values: Vec<Option<V>>,
    pub is_leaf: bool,
    pub children: Vec<NodeSnapshot<K, V>>,
}

/// A saved tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreeSnapshot<K, V> {
    pub degree: usize,
    pub root: Option<NodeSnapshot<K, V>>,
}

impl<K: Ord + Clone, V: Clone> BTree<K, V> {
    /// Captures the full tree structure.
    pub fn to_snapshot(&self) -> TreeSnapshot<K, V> {
        TreeSnapshot {
            degree: self.degree(),
            root: self.root.map(|root| self.snapshot_node(root)),
        }
    }

    fn snapshot_node(&self, id: NodeId) -> NodeSnapshot<K, V> {
        let node = &self.arena[id];
        NodeSnapshot {
            keys: node.keys.clone(),
            values: node.values.clone(),
            is_leaf: node.is_leaf,
            children: node
                .children
                .iter()
                .map(|&child| self.snapshot_node(child))
                .collect(),
        }
    }

    /// Rebuilds a tree from a snapshot, rejecting any structure that breaks
    /// the B-tree invariants.
    pub fn from_snapshot(snapshot: TreeSnapshot<K, V>) -> Result<Self> {
        if snapshot.degree < MIN_INDEX_DEGREE {
            return Err(Error::invalid_snapshot(format!(
                "degree {} below minimum {}",
                snapshot.degree, MIN_INDEX_DEGREE
            )));
        }
        if snapshot.degree.checked_mul(2).is_none() {
            return Err(Error::invalid_snapshot(format!(
                "degree {} too large",
                snapshot.degree
            )));
        }

        let mut arena = Vec::new();
        let root = snapshot.root.map(|root| flatten(root, &mut arena));
        let tree = BTree::from_parts(arena, root, snapshot.degree);
        tree.validate()?;
        Ok(tree)
    }
}

/// Moves a snapshot subtree into the arena, returning the subtree root.
fn flatten<K: Ord, V>(snapshot: NodeSnapshot<K, V>, arena: &mut Vec<Node<K, V>>) -> NodeId {
    let id = arena.len();
    let mut node = Node {
        keys: snapshot.keys,
        values: snapshot.values,
        children: Vec::new(),
        is_leaf: snapshot.is_leaf,
        live: 0,
    };
    node.recount();
    arena.push(node);

    let children: Vec<NodeId> = snapshot
        .children
        .into_iter()
        .map(|child| flatten(child, arena))
        .collect();
    arena[id].children = children;
    id
}
