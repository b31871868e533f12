//! Sibling indices are never reused, whatever the sequence of adds and removals.

use metapush::tree::Node;
use proptest::prelude::*;
use std::collections::HashSet;

#[derive(Debug, Clone)]
enum Op {
    Create(u8),
    Remove(u8),
    Restore(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..16).prop_map(Op::Create),
        (0u8..16).prop_map(Op::Remove),
        (0u8..16).prop_map(Op::Restore),
    ]
}

#[test]
fn test_indices_unique_under_any_history() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&prop::collection::vec(op(), 0..64), |ops| {
            let mut root = Node::root("repo");
            for op in ops {
                match op {
                    Op::Create(n) => {
                        let before = root.child(&format!("f{}", n)).map(|c| c.index);
                        let child = root.create_child(&format!("f{}", n));
                        if let Some(index) = before {
                            prop_assert_eq!(child.index, index);
                        }
                    }
                    Op::Remove(n) => {
                        if let Some(child) = root.child_mut(&format!("f{}", n)) {
                            child.remove();
                        }
                    }
                    Op::Restore(n) => {
                        if let Some(child) = root.child_mut(&format!("f{}", n)) {
                            child.restore();
                        }
                    }
                }
            }

            let mut indices = HashSet::new();
            let mut paths = HashSet::new();
            for child in root.children.values() {
                prop_assert!(indices.insert(child.index));
                prop_assert!(paths.insert(child.key_path.as_str().to_string()));
                let expected = format!("m/0/{}", child.index);
                prop_assert_eq!(child.key_path.as_str(), expected.as_str());
                prop_assert!(child.index < root.next_index());
            }
            Ok(())
        })
        .unwrap();
}
