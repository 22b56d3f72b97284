//! Property-based tests for cinder-index using proptest.

use cinder_core::{Row, Value};
use cinder_index::{BTree, ColumnIndex};
use proptest::prelude::*;
use std::collections::BTreeMap;

proptest! {
    /// Every inserted key is found with its latest value; others are absent.
    #[test]
    fn btree_search_matches_model(
        degree in 2usize..6,
        keys in prop::collection::vec(-500i64..500, 0..400),
        lookups in prop::collection::vec(-600i64..600, 0..50),
    ) {
        let mut tree = BTree::new(degree).unwrap();
        let mut model = BTreeMap::new();
        for (i, &key) in keys.iter().enumerate() {
            prop_assert_eq!(tree.insert(key, i), model.insert(key, i));
        }
        for key in keys.iter().chain(lookups.iter()) {
            prop_assert_eq!(tree.search(key), model.get(key));
        }
        prop_assert_eq!(tree.len(), model.len());
    }

    /// In-order traversal yields strictly ascending keys.
    #[test]
    fn btree_in_order_ascending(
        degree in 2usize..6,
        keys in prop::collection::vec(any::<i32>(), 0..400),
    ) {
        let mut tree = BTree::new(degree).unwrap();
        for &key in &keys {
            tree.insert(key, ());
        }
        let in_order: Vec<i32> = tree.keys().into_iter().copied().collect();
        prop_assert!(in_order.windows(2).all(|w| w[0] < w[1]));

        let mut expected = keys.clone();
        expected.sort_unstable();
        expected.dedup();
        prop_assert_eq!(in_order, expected);
    }

    /// Trees built by insertion keep every non-root node within t-1..=2t-1
    /// keys and all leaves at the same depth.
    #[test]
    fn btree_node_sizes_bounded(
        degree in 2usize..6,
        keys in prop::collection::vec(0u32..10_000, 0..600),
    ) {
        let mut tree = BTree::new(degree).unwrap();
        for &key in &keys {
            tree.insert(key, key);
        }
        prop_assert!(tree.validate().is_ok());
        prop_assert!(tree.is_balanced());
    }

    /// Lazy removal keeps the tree searchable and ordered.
    #[test]
    fn btree_remove_matches_model(
        degree in 2usize..5,
        keys in prop::collection::vec(0i64..300, 0..300),
        removals in prop::collection::vec(0i64..300, 0..150),
    ) {
        let mut tree = BTree::new(degree).unwrap();
        let mut model = BTreeMap::new();
        for &key in &keys {
            tree.insert(key, key * 2);
            model.insert(key, key * 2);
        }
        for key in &removals {
            prop_assert_eq!(tree.remove(key), model.remove(key));
        }
        prop_assert!(tree.validate().is_ok());
        for key in 0..300 {
            prop_assert_eq!(tree.search(&key), model.get(&key));
        }
        let in_order: Vec<i64> = tree.keys().into_iter().copied().collect();
        let expected: Vec<i64> = model.keys().copied().collect();
        prop_assert_eq!(in_order, expected);
    }

    /// Strings differing only by case and surrounding spaces share a bucket.
    #[test]
    fn column_index_normalizes_strings(name in "[a-zA-Z]{1,8}", pad in 0usize..3) {
        let mut index = ColumnIndex::new("name", 3).unwrap();
        let padded = format!("{}{}", " ".repeat(pad), name.to_uppercase());
        let first = Row::new().with("id", 1).with("name", name.as_str());
        let second = Row::new().with("id", 2).with("name", padded.as_str());

        index.add_to_index(&Value::from(name.as_str()), first.clone());
        index.add_to_index(&Value::from(padded.as_str()), second.clone());

        prop_assert_eq!(index.key_count(), 1);
        prop_assert_eq!(index.lookup_rows(&Value::from(name.to_lowercase())), vec![first, second]);
    }
}
