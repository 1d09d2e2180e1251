//! Algebraic laws checked over random documents and operations.
//!
//! Verifies:
//! - Convergence: b'(a(doc)) == a'(b(doc)) for both tie-break sides
//! - Inverse:     inverse(op)(op(doc)) == doc
//! - Compose:     compose(a, b)(doc) == b(a(doc))
//! - Normalize:   idempotent, no adjacent runs of the same kind

use proptest::prelude::*;
use quire_ot::{compose, transform, Operation, Run, Side};

/// One step of a random edit script.
#[derive(Debug, Clone)]
enum Step {
    Retain(usize),
    Insert(Vec<u8>),
    Delete(usize),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (1usize..6).prop_map(Step::Retain),
        prop::collection::vec(b'A'..=b'Z', 1..5).prop_map(Step::Insert),
        (1usize..6).prop_map(Step::Delete),
    ]
}

fn script() -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec(step(), 0..10)
}

fn document() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(b'a'..=b'z', 0..24)
}

/// Turn a script into an operation valid against `doc`.
fn build(doc: &[u8], steps: &[Step]) -> Operation {
    let mut op = Operation::new();
    let mut pos = 0;
    for step in steps {
        let remaining = doc.len() - pos;
        match step {
            Step::Retain(n) => {
                let n = (*n).min(remaining);
                op.push_retain(n);
                pos += n;
            }
            Step::Insert(text) => op.push_insert(text),
            Step::Delete(n) => {
                let n = (*n).min(remaining);
                op.push_delete(&doc[pos..pos + n]);
                pos += n;
            }
        }
    }
    op.push_retain(doc.len() - pos);
    op
}

fn assert_normalized(op: &Operation) {
    for pair in op.runs().windows(2) {
        let same_kind = matches!(
            (&pair[0], &pair[1]),
            (Run::Retain(_), Run::Retain(_))
                | (Run::Insert(_), Run::Insert(_))
                | (Run::Delete(_), Run::Delete(_))
        );
        assert!(!same_kind, "adjacent runs of one kind: {:?}", op.runs());
        assert!(
            !matches!((&pair[0], &pair[1]), (Run::Delete(_), Run::Insert(_))),
            "insert after delete: {:?}",
            op.runs()
        );
    }
    assert!(op.runs().iter().all(|run| !run.is_empty()));
}

proptest! {
    #[test]
    fn prop_transform_converges(doc in document(), sa in script(), sb in script()) {
        let a = build(&doc, &sa);
        let b = build(&doc, &sb);
        for first in [Side::Left, Side::Right] {
            let (a_prime, b_prime) = transform(&a, &b, first).unwrap();
            let left = b_prime.apply(&a.apply(&doc).unwrap()).unwrap();
            let right = a_prime.apply(&b.apply(&doc).unwrap()).unwrap();
            prop_assert_eq!(left, right);
            assert_normalized(&a_prime);
            assert_normalized(&b_prime);
        }
    }

    #[test]
    fn prop_inverse_restores(doc in document(), steps in script()) {
        let op = build(&doc, &steps);
        let edited = op.apply(&doc).unwrap();
        prop_assert_eq!(op.inverse().apply(&edited).unwrap(), doc);
    }

    #[test]
    fn prop_compose_matches_sequential_apply(doc in document(), sa in script(), sb in script()) {
        let a = build(&doc, &sa);
        let mid = a.apply(&doc).unwrap();
        let b = build(&mid, &sb);
        let ab = compose(&a, &b).unwrap();
        prop_assert_eq!(ab.apply(&doc).unwrap(), b.apply(&mid).unwrap());
        assert_normalized(&ab);
    }

    #[test]
    fn prop_normalize_idempotent(doc in document(), steps in script()) {
        let op = build(&doc, &steps);
        let raw: Vec<Run> = op.runs().to_vec();
        let once = Operation::from_runs(raw.clone());
        let twice = Operation::from_runs(once.runs().to_vec());
        prop_assert_eq!(&once, &twice);
        prop_assert_eq!(&once, &op);
        assert_normalized(&once);
    }

    #[test]
    fn prop_transform_index_tracks_inserts(doc in document(), steps in script(), at in 0usize..24) {
        let op = build(&doc, &steps);
        let index = at.min(doc.len());
        let mapped = op.transform_index(index, Side::Left);
        prop_assert!(mapped <= op.target_len());
    }
}

#[test]
fn test_record_roundtrip_preserves_runs() {
    let op = Operation::new()
        .retain(3)
        .insert("new")
        .delete("old")
        .retain(2);
    let bytes = bincode::serde::encode_to_vec(&op, bincode::config::standard()).unwrap();
    let (decoded, _): (Operation, _) =
        bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).unwrap();
    assert_eq!(decoded.runs(), op.runs());
    assert_eq!(decoded.base_len(), op.base_len());
    assert_eq!(decoded.target_len(), op.target_len());
}
