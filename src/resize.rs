/// The number of buckets allocated when no capacity is specified, and the
/// capacity a cleared table shrinks back to. Deliberately not divisible by a
/// small prime.
pub const DEFAULT_CAPACITY: usize = 31;

/// The maximum # of buckets a table can hold.
pub const MAX_BUCKETS: usize = isize::MAX as usize;

/// The maximum size the `locks` array is allowed to grow to. A caller can
/// exceed this by passing a larger concurrency level at construction.
pub const MAX_LOCKS: usize = 1024;

pub enum Growth {
    /// The table is poorly utilized, double the budget instead of resizing.
    DoubleBudget,
    /// Rehash into a larger bucket array.
    Rehash {
        /// The new number of buckets.
        buckets: usize,
        /// The bucket array has hit its cap and can never grow again.
        at_max: bool,
    },
}

/// Decides how a table whose stripe exceeded its budget should grow.
///
/// A mostly-empty bucket array means the overflow came from a bad hash
/// distribution rather than genuine growth, so reallocating would not help.
pub fn decide(current_buckets: usize, approx_len: usize) -> Growth {
    if approx_len < current_buckets / 4 {
        return Growth::DoubleBudget;
    }

    match next_table_size(current_buckets) {
        Some(buckets) if buckets <= MAX_BUCKETS => Growth::Rehash {
            buckets,
            at_max: false,
        },
        _ => Growth::Rehash {
            buckets: MAX_BUCKETS,
            at_max: true,
        },
    }
}

/// Computes the next bucket-array length: the smallest integer that is
///
/// 1) larger than twice the previous length
/// 2) not divisible by 2, 3, 5 or 7.
///
/// Returns `None` on arithmetic overflow.
fn next_table_size(current: usize) -> Option<usize> {
    // Double the length and add one, so that we have an odd integer.
    let mut new_len = current.checked_mul(2)?.checked_add(1)?;

    // Now, we only need to check odd integers, and find the first that is
    // not divisible by 3, 5 or 7.
    while new_len.checked_rem(3)? == 0
        || new_len.checked_rem(5)? == 0
        || new_len.checked_rem(7)? == 0
    {
        new_len = new_len.checked_add(2)?;
    }

    debug_assert!(new_len % 2 != 0);

    Some(new_len)
}

/// The per-stripe element budget for a table with the given dimensions.
///
/// At `MAX_BUCKETS` the budget pins to `usize::MAX` so the resize engine is
/// never entered again; `clear` resets it.
pub fn budget(buckets: usize, locks: usize) -> usize {
    if buckets == MAX_BUCKETS {
        return usize::MAX;
    }

    1.max(buckets / locks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_size_skips_small_factors() {
        let mut len = DEFAULT_CAPACITY;
        for _ in 0..16 {
            let next = next_table_size(len).unwrap();
            assert!(next > len * 2);
            assert!(next % 2 != 0 && next % 3 != 0 && next % 5 != 0 && next % 7 != 0);
            len = next;
        }
    }

    #[test]
    fn underutilized_table_doubles_budget() {
        assert!(matches!(decide(1024, 100), Growth::DoubleBudget));
        assert!(matches!(decide(1024, 255), Growth::DoubleBudget));
    }

    #[test]
    fn utilized_table_rehashes() {
        match decide(1024, 256) {
            Growth::Rehash { buckets, at_max } => {
                assert!(buckets > 2048);
                assert!(!at_max);
            }
            Growth::DoubleBudget => panic!("expected a rehash"),
        }
    }

    #[test]
    fn overflowing_size_pins_at_max() {
        match decide(MAX_BUCKETS - 1, MAX_BUCKETS) {
            Growth::Rehash { buckets, at_max } => {
                assert_eq!(buckets, MAX_BUCKETS);
                assert!(at_max);
            }
            Growth::DoubleBudget => panic!("expected a rehash"),
        }
    }

    #[test]
    fn budget_is_buckets_per_lock() {
        assert_eq!(budget(1024, 8), 128);
        assert_eq!(budget(31, 64), 1);
        assert_eq!(budget(MAX_BUCKETS, 1024), usize::MAX);
    }
}
