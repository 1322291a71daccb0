use std::collections::HashSet as StdHashSet;

use concurrent_hashset::HashSet;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Insert(u16),
    Remove(u16),
    Contains(u16),
    Update(u16),
    GetOrInsert(u16),
    Clear,
}

// A small key domain so sequences collide and exercise chains.
fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        8 => (0u16..64).prop_map(Op::Insert),
        8 => (0u16..64).prop_map(Op::Remove),
        4 => (0u16..64).prop_map(Op::Contains),
        4 => (0u16..64).prop_map(Op::Update),
        4 => (0u16..64).prop_map(Op::GetOrInsert),
        1 => Just(Op::Clear),
    ]
}

proptest! {
    #[test]
    fn agrees_with_std_hashset(ops in proptest::collection::vec(op_strategy(), 0..400)) {
        let set = HashSet::with_capacity(1);
        let pinned = set.pin();
        let mut model = StdHashSet::new();

        for op in ops {
            match op {
                Op::Insert(v) => prop_assert_eq!(pinned.insert(v), model.insert(v)),
                Op::Remove(v) => prop_assert_eq!(pinned.remove(&v), model.remove(&v)),
                Op::Contains(v) => prop_assert_eq!(pinned.contains(&v), model.contains(&v)),
                Op::Update(v) => prop_assert_eq!(pinned.update(v), model.contains(&v)),
                Op::GetOrInsert(v) => {
                    let stored = *pinned.get_or_insert(v);
                    model.insert(v);
                    prop_assert_eq!(stored, v);
                }
                Op::Clear => {
                    pinned.clear();
                    model.clear();
                }
            }

            prop_assert_eq!(pinned.len(), model.len());
            prop_assert_eq!(pinned.is_empty(), model.is_empty());
        }

        let mut contents: Vec<u16> = pinned.iter().copied().collect();
        contents.sort_unstable();
        let mut expected: Vec<u16> = model.into_iter().collect();
        expected.sort_unstable();
        prop_assert_eq!(contents, expected);
    }
}
