use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};

use concurrent_hashset::HashSet;

/// Hashes everything to the same bucket, the worst case the resize engine
/// has to tell apart from genuine growth.
#[derive(Clone, Default)]
struct OneBucket;

struct ConstantHasher;

impl Hasher for ConstantHasher {
    fn finish(&self) -> u64 {
        0
    }

    fn write(&mut self, _bytes: &[u8]) {}
}

impl BuildHasher for OneBucket {
    type Hasher = ConstantHasher;

    fn build_hasher(&self) -> ConstantHasher {
        ConstantHasher
    }
}

#[test]
fn ten_thousand_distinct_inserts() {
    let set = HashSet::new();
    let pinned = set.pin();

    // Starts at the default capacity of 31 buckets, so this crosses many
    // full rehashes.
    for i in 0..10_000 {
        assert!(pinned.insert(i));
    }

    assert_eq!(pinned.len(), 10_000);

    for i in 0..10_000 {
        assert!(pinned.contains(&i));
    }

    let mut seen: Vec<i32> = pinned.iter().copied().collect();
    seen.sort_unstable();
    assert_eq!(seen.len(), 10_000, "enumeration must not duplicate or omit");
    assert_eq!(seen, (0..10_000).collect::<Vec<_>>());
}

#[test]
fn degenerate_hashing_stays_correct() {
    // Every element lands in one bucket of one stripe, so the stripe blows
    // its budget while the table stays almost empty. The first overflows
    // are answered with budget growth rather than reallocation; correctness
    // must hold across both responses.
    let set = HashSet::with_concurrency_level(8, 1024, OneBucket);
    let pinned = set.pin();

    for i in 0..400 {
        assert!(pinned.insert(i));
    }

    assert_eq!(pinned.len(), 400);
    for i in 0..400 {
        assert!(pinned.contains(&i));
    }

    let mut seen: Vec<i32> = pinned.iter().copied().collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..400).collect::<Vec<_>>());
}

#[test]
fn growth_preserves_removals_and_updates() {
    let set = HashSet::with_capacity(1);
    let pinned = set.pin();

    for i in 0..4_000 {
        pinned.insert(i);
    }
    for i in (0..4_000).step_by(2) {
        assert!(pinned.remove(&i));
    }

    assert_eq!(pinned.len(), 2_000);
    for i in 0..4_000 {
        assert_eq!(pinned.contains(&i), i % 2 == 1);
    }
}

#[test]
fn clear_after_growth_resets_the_budget() {
    let set = HashSet::with_concurrency_level(4, 16, RandomState::new());
    let pinned = set.pin();

    for i in 0..5_000 {
        pinned.insert(i);
    }
    pinned.clear();
    assert!(pinned.is_empty());

    // Growing again from the cleared state must work as from scratch.
    for i in 0..5_000 {
        assert!(pinned.insert(i));
    }
    assert_eq!(pinned.len(), 5_000);
}
