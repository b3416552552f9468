use proptest::prelude::*;
use runnel_core::chunk::{merge, merge_all, ChunkAccumulator};
use runnel_core::{json, MergeError, Value};

#[test]
fn strings_concatenate() {
    assert_eq!(merge(json!("hel"), json!("lo")).unwrap(), json!("hello"));
}

#[test]
fn arrays_concatenate() {
    assert_eq!(merge(json!([1, 2]), json!([3])).unwrap(), json!([1, 2, 3]));
}

#[test]
fn objects_merge_recursively() {
    let left = json!({"text": "a", "usage": {"tokens": 2}, "id": "x"});
    let right = json!({"text": "b", "usage": {"tokens": 3, "calls": 1}});
    assert_eq!(
        merge(left, right).unwrap(),
        json!({"text": "ab", "usage": {"tokens": 5, "calls": 1}, "id": "x"})
    );
}

#[test]
fn numbers_add() {
    assert_eq!(merge(json!(2), json!(3)).unwrap(), json!(5));
    assert_eq!(merge(json!(0.5), json!(1)).unwrap(), json!(1.5));
}

#[test]
fn null_is_identity() {
    assert_eq!(merge(Value::Null, json!("x")).unwrap(), json!("x"));
    assert_eq!(merge(json!({"a": 1}), Value::Null).unwrap(), json!({"a": 1}));
}

#[test]
fn later_boolean_wins() {
    assert_eq!(merge(json!(true), json!(false)).unwrap(), json!(false));
}

#[test]
fn incompatible_kinds_fail() {
    let err = merge(json!("a"), json!(1)).unwrap_err();
    assert_eq!(
        err,
        MergeError {
            left: "string",
            right: "number"
        }
    );
}

#[test]
fn merge_all_of_nothing_is_null() {
    assert_eq!(merge_all(Vec::new()).unwrap(), Value::Null);
}

#[test]
fn accumulator_tracks_chunks() {
    let mut acc = ChunkAccumulator::new();
    acc.push(&json!("a")).unwrap();
    acc.push(&json!("b")).unwrap();
    assert_eq!(acc.chunks(), 2);
    assert_eq!(acc.current(), &json!("ab"));
    assert_eq!(acc.finish(), json!("ab"));
}

fn string_chunk() -> impl Strategy<Value = Value> {
    "[a-z]{0,6}".prop_map(Value::String)
}

fn array_chunk() -> impl Strategy<Value = Value> {
    prop::collection::vec(-1000i64..1000, 0..4).prop_map(|v| json!(v))
}

fn object_chunk() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[abc]", "[a-z]{0,3}", 0..3)
        .prop_map(|m| Value::Object(m.into_iter().map(|(k, v)| (k, Value::String(v))).collect()))
}

fn int_chunk() -> impl Strategy<Value = Value> {
    (-1_000_000i64..1_000_000).prop_map(|n| json!(n))
}

fn same_kind_triple() -> impl Strategy<Value = (Value, Value, Value)> {
    prop_oneof![
        (string_chunk(), string_chunk(), string_chunk()),
        (array_chunk(), array_chunk(), array_chunk()),
        (object_chunk(), object_chunk(), object_chunk()),
        (int_chunk(), int_chunk(), int_chunk()),
    ]
}

proptest! {
    #[test]
    fn merge_is_associative((a, b, c) in same_kind_triple()) {
        let left = merge(merge(a.clone(), b.clone()).unwrap(), c.clone()).unwrap();
        let right = merge(a, merge(b, c).unwrap()).unwrap();
        prop_assert_eq!(left, right);
    }

    #[test]
    fn null_is_two_sided_identity(a in prop_oneof![string_chunk(), array_chunk(), object_chunk(), int_chunk()]) {
        prop_assert_eq!(merge(Value::Null, a.clone()).unwrap(), a.clone());
        prop_assert_eq!(merge(a.clone(), Value::Null).unwrap(), a);
    }

    #[test]
    fn folding_split_strings_rebuilds_them(s in "[a-z]{0,24}", cut in 0usize..24) {
        let cut = cut.min(s.len());
        let (head, tail) = s.split_at(cut);
        let merged = merge_all(vec![json!(head), json!(tail)]).unwrap();
        prop_assert_eq!(merged, json!(s));
    }
}
