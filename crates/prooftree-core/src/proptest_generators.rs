//! Property-test strategies, mirroring the teacher's `proptest_generators`
//! idiom: a shared [`proptest_config`] plus small `arb_*` leaf strategies
//! composed into the values under test.

use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;

use crate::events::{EventPayload, NewNode};
use crate::ids::NodeId;

/// Shared proptest configuration: bounded cases, generous shrink iterations.
pub fn proptest_config() -> ProptestConfig {
    ProptestConfig {
        cases: 256,
        max_shrink_iters: 1024,
        ..ProptestConfig::default()
    }
}

/// A single positive-integer path segment, rendered without leading zeros.
pub fn arb_segment() -> impl Strategy<Value = u64> {
    1u64..1000
}

/// A random dotted-path [`NodeId`] string, 1-4 segments deep, always rooted at `1`.
pub fn arb_node_id_string() -> impl Strategy<Value = String> {
    proptest::collection::vec(arb_segment(), 0..3).prop_map(|rest| {
        let mut segments = vec!["1".to_string()];
        segments.extend(rest.iter().map(ToString::to_string));
        segments.join(".")
    })
}

pub fn arb_node_id() -> impl Strategy<Value = NodeId> {
    arb_node_id_string().prop_map(|s| NodeId::parse(&s).expect("arb_node_id_string is valid"))
}

pub fn arb_statement() -> impl Strategy<Value = String> {
    "[A-Za-z0-9 ]{1,40}"
}

pub fn arb_node_type() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("claim".to_string()),
        Just("local_assume".to_string()),
        Just("definition".to_string()),
    ]
}

/// A `node_created` payload for a node with no dependencies, suitable for
/// seeding a flat fold without needing an existing tree.
pub fn arb_leaf_node_created(id: String) -> impl Strategy<Value = EventPayload> {
    (arb_node_type(), arb_statement()).prop_map(move |(node_type, statement)| {
        EventPayload::NodeCreated {
            node: NewNode {
                id: id.clone(),
                node_type,
                statement,
                inference_rule: "assumption".to_string(),
                dependencies: vec![],
                validation_deps: vec![],
            },
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(proptest_config())]

        #[test]
        fn node_id_round_trips_through_parse_and_display(s in arb_node_id_string()) {
            let id = NodeId::parse(&s).unwrap();
            prop_assert_eq!(id.to_string(), s);
        }

        #[test]
        fn node_id_ordering_is_consistent_with_reparse(a in arb_node_id(), b in arb_node_id()) {
            let ord = a.cmp(&b);
            let reparsed_a = NodeId::parse(&a.to_string()).unwrap();
            let reparsed_b = NodeId::parse(&b.to_string()).unwrap();
            prop_assert_eq!(ord, reparsed_a.cmp(&reparsed_b));
        }
    }
}
