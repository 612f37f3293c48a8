use std::collections::BTreeMap;

use proptest::prelude::*;
use synchronized::{DenseIntMap, GrowthPolicy};

#[derive(Debug, Clone)]
enum Op {
    Put(i32, u16),
    Remove(i32),
    CompareAndPut(i32, Option<u16>, u16),
}

fn op() -> impl Strategy<Value = Op> {
    let key = 0..300i32;
    prop_oneof![
        4 => (key.clone(), any::<u16>()).prop_map(|(k, v)| Op::Put(k, v)),
        2 => key.clone().prop_map(Op::Remove),
        1 => (key, proptest::option::of(0..4u16), 0..4u16)
            .prop_map(|(k, e, v)| Op::CompareAndPut(k, e, v)),
    ]
}

fn policy() -> impl Strategy<Value = GrowthPolicy> {
    prop_oneof![Just(GrowthPolicy::Doubling), Just(GrowthPolicy::Exact)]
}

proptest! {
    /// A single-threaded run behaves exactly like a `BTreeMap`.
    #[test]
    fn behaves_like_btreemap(
        capacity in 0..64usize,
        policy in policy(),
        ops in proptest::collection::vec(op(), 0..200),
    ) {
        let map = DenseIntMap::with_capacity_and_policy(capacity, policy);
        let mut model = BTreeMap::new();
        let pinned = map.pin();
        let mut last_capacity = pinned.capacity();

        for op in ops {
            match op {
                Op::Put(key, value) => {
                    let previous = pinned.put(key, value).unwrap().copied();
                    prop_assert_eq!(previous, model.insert(key, value));
                }
                Op::Remove(key) => {
                    let removed = pinned.remove(key).unwrap().copied();
                    prop_assert_eq!(removed, model.remove(&key));
                }
                Op::CompareAndPut(key, existing, value) => {
                    let installed = pinned.compare_and_put(key, existing.as_ref(), value).unwrap();
                    let expected = model.get(&key).copied() == existing;
                    prop_assert_eq!(installed, expected);
                    if expected {
                        model.insert(key, value);
                    }
                }
            }

            prop_assert!(pinned.capacity() >= last_capacity);
            last_capacity = pinned.capacity();
            prop_assert_eq!(pinned.size(), model.len());
        }

        for key in 0..300 {
            prop_assert_eq!(pinned.get(key).unwrap().copied(), model.get(&key).copied());
            prop_assert_eq!(pinned.contains_key(key).unwrap(), model.contains_key(&key));
        }
        prop_assert_eq!(pinned.keys(), model.keys().copied().collect::<Vec<_>>());
    }
}
