//! Property-based invariant tests for the in-memory tree.
//!
//! 1. Moves never break parent/child links or create cycles.
//! 2. Class edits agree with a set model, and `matches` agrees with `has_class`.
//! 3. Rejected writes leave the tree unchanged.

use std::collections::BTreeSet;

use proptest::prelude::*;
use turntabs_tree::mem::{MemTree, NodeId};
use turntabs_tree::{HostTree, Selector};

const POOL: usize = 8;

// ── Helpers ─────────────────────────────────────────────────────────────

/// `POOL` sibling `div`s directly under the body.
fn pool() -> (MemTree, Vec<NodeId>) {
    let mut tree = MemTree::new();
    let body = tree.body();
    let nodes = (0..POOL).map(|_| tree.element(body, "div", &[])).collect();
    (tree, nodes)
}

#[derive(Debug, Clone)]
enum Move {
    Append { parent: usize, child: usize },
    Before { parent: usize, child: usize, reference: usize },
    Clear { node: usize },
}

fn moves() -> impl Strategy<Value = Vec<Move>> {
    let index = 0..POOL;
    let one = prop_oneof![
        (index.clone(), index.clone()).prop_map(|(parent, child)| Move::Append { parent, child }),
        (index.clone(), index.clone(), index.clone()).prop_map(|(parent, child, reference)| {
            Move::Before {
                parent,
                child,
                reference,
            }
        }),
        index.prop_map(|node| Move::Clear { node }),
    ];
    prop::collection::vec(one, 0..40)
}

fn snapshot(tree: &MemTree, nodes: &[NodeId]) -> Vec<(Option<NodeId>, Vec<NodeId>)> {
    nodes
        .iter()
        .map(|n| (tree.parent(n), tree.children(n)))
        .collect()
}

fn assert_links(tree: &MemTree, nodes: &[NodeId]) {
    let mut seen = BTreeSet::new();
    for node in nodes.iter().copied().chain([tree.body()]) {
        for child in tree.children(&node) {
            assert!(seen.insert(child), "{child:?} listed under two parents");
            assert_eq!(tree.parent(&child), Some(node));
            assert!(!tree.contains(&child, &node));
        }
    }
    for node in nodes {
        if let Some(parent) = tree.parent(node) {
            assert!(tree.children(&parent).contains(node));
        }
    }
}

// ── Properties ──────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn moves_keep_links_consistent(ops in moves()) {
        let (mut tree, nodes) = pool();
        for op in ops {
            let before = snapshot(&tree, &nodes);
            let result = match op {
                Move::Append { parent, child } => tree.append_child(&nodes[parent], &nodes[child]),
                Move::Before { parent, child, reference } => {
                    tree.insert_before(&nodes[parent], &nodes[child], Some(&nodes[reference]))
                }
                Move::Clear { node } => tree.clear_children(&nodes[node]),
            };
            if result.is_err() {
                prop_assert_eq!(snapshot(&tree, &nodes), before);
            }
            assert_links(&tree, &nodes);
        }
    }

    #[test]
    fn class_edits_follow_set_model(
        edits in prop::collection::vec(
            (any::<bool>(), prop::sample::select(vec!["a", "b", "hidden", "a-b"])),
            0..30,
        )
    ) {
        let (mut tree, nodes) = pool();
        let node = nodes[0];
        let mut model = BTreeSet::new();
        for (add, class) in edits {
            if add {
                tree.add_class(&node, class).unwrap();
                model.insert(class);
            } else {
                tree.remove_class(&node, class).unwrap();
                model.remove(class);
            }
            for class in ["a", "b", "hidden", "a-b"] {
                prop_assert_eq!(tree.has_class(&node, class), model.contains(class));
                prop_assert_eq!(tree.matches(&node, &Selector::class(class)), model.contains(class));
            }
        }
    }

    #[test]
    fn text_content_concatenates_in_order(parts in prop::collection::vec("[a-z ]{0,6}", 0..8)) {
        let (mut tree, nodes) = pool();
        for part in &parts {
            let span = tree.element(nodes[0], "span", &[]);
            tree.text(span, part);
        }
        prop_assert_eq!(tree.text_content(&nodes[0]), parts.concat());
    }
}
