//! Push-data framing picks the shortest length form and parses back exactly.

use metapush::codec::push_data::{
    build_script, parse_fields, push, OP_PUSHDATA1, OP_PUSHDATA2, OP_PUSHDATA4,
};
use proptest::prelude::*;

fn expected_prefix_len(len: usize) -> usize {
    match len {
        0..=75 => 1,
        76..=255 => 2,
        256..=65535 => 3,
        _ => 5,
    }
}

#[test]
fn test_length_prefix_is_shortest_form() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(0usize..70_000), |len| {
            let data = vec![0xabu8; len];
            let mut script = Vec::new();
            push(&mut script, &data);

            prop_assert_eq!(script.len(), expected_prefix_len(len) + len);
            match expected_prefix_len(len) {
                1 => prop_assert_eq!(script[0] as usize, len),
                2 => prop_assert_eq!(script[0], OP_PUSHDATA1),
                3 => prop_assert_eq!(script[0], OP_PUSHDATA2),
                _ => prop_assert_eq!(script[0], OP_PUSHDATA4),
            }
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_fields_survive_framing() {
    let mut runner = proptest::test_runner::TestRunner::default();
    let field = prop_oneof![
        prop::collection::vec(any::<u8>(), 0..80),
        prop::collection::vec(any::<u8>(), 250..300),
        prop::collection::vec(any::<u8>(), 65_530..65_540),
    ];

    runner
        .run(&prop::collection::vec(field, 0..6), |fields| {
            let script = build_script(0x6a, &fields);
            let parsed = parse_fields(&script).unwrap();
            prop_assert_eq!(parsed[0].clone(), vec![0x6a]);
            prop_assert_eq!(&parsed[1..], &fields[..]);
            Ok(())
        })
        .unwrap();
}
