use crate::platform;
use crate::resize;
use crate::Pinned;

use std::borrow::Borrow;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash, Hasher};
use std::ops::Range;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::{fmt, iter};

use crossbeam_epoch::{Atomic, Collector, Guard, Owned, Shared};
use lock_api::RawMutex;
use parking_lot::Mutex;

/// A concurrent hash set with lock-free reads and striped-lock writes.
///
/// Lookups and iteration never take a lock; they walk a snapshot of the
/// table published through an atomic reference. Mutations take exactly one
/// stripe lock, so writers targeting different stripes never contend.
pub struct HashSet<T, S = RandomState> {
    // The maximum number of elements per stripe before we consider resizing.
    budget: AtomicUsize,
    // The builder used to hash elements.
    build_hasher: S,
    // Whether a resize is allowed to add more stripe locks.
    grow_locks: bool,
    // The internal state of this set.
    //
    // Wrapping this in a separate struct allows us
    // to atomically swap everything at once.
    table: Atomic<Table<T>>,
    // Instead of adding garbage to the default global collector
    // we add it to a local collector tied to this particular set.
    //
    // Since the global collector might destroy garbage arbitrarily
    // late in the future, we would have to add a `T: 'static` bound.
    // But a local collector will destroy all remaining garbage when
    // the set is dropped, so we can accept non-'static elements.
    collector: Collector,
}

struct Table<T> {
    // The hashtable.
    buckets: Box<[Atomic<Node<T>>]>,
    // A set of locks, each guarding a number of buckets.
    //
    // Locks are shared across table instances, hence the `Arc`s: a resize
    // keeps the existing locks in their slots and a clear reuses the whole
    // array, so a stripe's identity never changes under a blocked writer.
    locks: Arc<[Arc<Mutex<()>>]>,
    // The number of elements guarded by each lock.
    //
    // Only written while holding the corresponding stripe lock; read
    // without locks only where an approximate value is acceptable.
    counts: Box<[AtomicUsize]>,
}

impl<T> Table<T> {
    fn new(buckets: usize, locks: usize) -> Self {
        Self::with_locks(buckets, iter::repeat_with(Arc::default).take(locks).collect())
    }

    fn with_locks(buckets: usize, locks: Arc<[Arc<Mutex<()>>]>) -> Self {
        Self {
            buckets: iter::repeat_with(Atomic::null).take(buckets).collect(),
            counts: iter::repeat_with(AtomicUsize::default)
                .take(locks.len())
                .collect(),
            locks,
        }
    }

    fn len(&self) -> usize {
        self.counts
            .iter()
            .map(|count| count.load(Ordering::Relaxed))
            .sum()
    }
}

// A singly-linked list representing a bucket in the hashtable.
struct Node<T> {
    // The element stored in this node.
    value: T,
    // The hashcode of `value`.
    hash: u64,
    // The next node in the linked-list.
    next: Atomic<Self>,
}

impl<T> HashSet<T, RandomState> {
    /// Creates an empty `HashSet`.
    ///
    /// The stripe count defaults to the number of available processors,
    /// sampled at construction time.
    ///
    /// # Examples
    ///
    /// ```
    /// use concurrent_hashset::HashSet;
    /// let set: HashSet<i32> = HashSet::new();
    /// ```
    pub fn new() -> Self {
        Self::with_capacity_and_hasher(resize::DEFAULT_CAPACITY, RandomState::new())
    }

    /// Creates an empty `HashSet` that can hold at least `capacity` elements
    /// before its first rehash.
    ///
    /// # Examples
    ///
    /// ```
    /// use concurrent_hashset::HashSet;
    /// let set: HashSet<i32> = HashSet::with_capacity(100);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, RandomState::new())
    }
}

impl<T, S> HashSet<T, S> {
    /// Creates an empty `HashSet` which will use the given hash builder to
    /// hash elements.
    ///
    /// Warning: `build_hasher` is normally randomly generated, and is
    /// designed to make the set resistant to attacks that cause many
    /// collisions and very poor performance. Setting it manually using this
    /// function can expose a DoS attack vector.
    ///
    /// # Examples
    ///
    /// ```
    /// use concurrent_hashset::HashSet;
    /// use std::collections::hash_map::RandomState;
    ///
    /// let set = HashSet::with_hasher(RandomState::new());
    /// set.pin().insert(1);
    /// ```
    pub fn with_hasher(build_hasher: S) -> Self {
        Self::with_capacity_and_hasher(resize::DEFAULT_CAPACITY, build_hasher)
    }

    /// Creates an empty `HashSet` with the specified capacity, using
    /// `build_hasher` to hash elements.
    ///
    /// # Examples
    ///
    /// ```
    /// use concurrent_hashset::HashSet;
    /// use std::collections::hash_map::RandomState;
    ///
    /// let set = HashSet::with_capacity_and_hasher(10, RandomState::new());
    /// set.pin().insert(1);
    /// ```
    pub fn with_capacity_and_hasher(capacity: usize, build_hasher: S) -> Self {
        Self::with_config(
            platform::default_concurrency_level(),
            capacity,
            true,
            build_hasher,
        )
    }

    /// Creates an empty `HashSet` with an explicit stripe count.
    ///
    /// `concurrency_level` is the estimated number of threads that will
    /// update the set concurrently; one lock is allocated per level. A set
    /// built this way keeps its stripe count for its whole lifetime, where
    /// the other constructors let resizes add stripes.
    ///
    /// # Panics
    ///
    /// Panics if `concurrency_level` is zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use concurrent_hashset::HashSet;
    /// use std::collections::hash_map::RandomState;
    ///
    /// let set = HashSet::with_concurrency_level(4, 64, RandomState::new());
    /// set.pin().insert(1);
    /// ```
    pub fn with_concurrency_level(
        concurrency_level: usize,
        capacity: usize,
        build_hasher: S,
    ) -> Self {
        Self::with_config(concurrency_level, capacity, false, build_hasher)
    }

    fn with_config(
        concurrency_level: usize,
        capacity: usize,
        grow_locks: bool,
        build_hasher: S,
    ) -> Self {
        assert!(concurrency_level > 0, "concurrency level must be non-zero");

        // The capacity must be at least as large as the concurrency level,
        // otherwise we would have locks that don't guard any buckets.
        let capacity = capacity.max(concurrency_level);

        Self {
            budget: AtomicUsize::new(1.max(capacity / concurrency_level)),
            table: Atomic::new(Table::new(capacity, concurrency_level)),
            collector: Collector::new(),
            grow_locks,
            build_hasher,
        }
    }

    pub(crate) fn guard(&self) -> Guard {
        self.collector.register().pin()
    }

    /// Returns a reference to the set pinned to the current thread.
    ///
    /// The only way to access a set is through a pinned reference, which,
    /// when dropped, allows garbage created in the meantime to be collected.
    pub fn pin(&self) -> Pinned<'_, T, S> {
        Pinned {
            set: self,
            guard: self.guard(),
        }
    }

    /// Returns the number of elements in the set.
    ///
    /// Acquires every stripe lock, so the result is exact: it reflects a
    /// single moment in time, unlike the lock-free reads.
    pub(crate) fn len(&self, guard: &Guard) -> usize {
        let _all = self.lock_all(guard);

        let table = unsafe { self.table.load(Ordering::Acquire, guard).deref() };
        table.len()
    }

    /// Returns `true` if the set contains no elements.
    pub(crate) fn is_empty(&self, guard: &Guard) -> bool {
        let _all = self.lock_all(guard);

        let table = unsafe { self.table.load(Ordering::Acquire, guard).deref() };
        table
            .counts
            .iter()
            .all(|count| count.load(Ordering::Relaxed) == 0)
    }

    /// Copies the elements into `dest`, starting at `dest[offset]`.
    ///
    /// Panics before writing anything if the space after `offset` cannot
    /// hold the current element count.
    pub(crate) fn copy_to(&self, dest: &mut [T], offset: usize, guard: &Guard)
    where
        T: Clone,
    {
        let _all = self.lock_all(guard);

        let table = unsafe { self.table.load(Ordering::Acquire, guard).deref() };
        let len = table.len();

        assert!(offset <= dest.len(), "offset out of bounds");
        assert!(
            dest.len() - offset >= len,
            "destination is not large enough to hold the set"
        );

        let mut at = offset;
        for bucket in table.buckets.iter() {
            let mut node_ref = bucket.load(Ordering::Acquire, guard);
            while let Some(node) = unsafe { node_ref.as_ref() } {
                dest[at] = node.value.clone();
                at += 1;
                node_ref = node.next.load(Ordering::Acquire, guard);
            }
        }
    }

    /// An iterator visiting all elements in arbitrary order.
    ///
    /// The iterator is lock-free and weakly consistent: it walks the table
    /// snapshot captured here, so it may miss concurrent insertions and may
    /// yield elements removed after it started.
    pub(crate) fn iter<'g>(&self, guard: &'g Guard) -> Iter<'g, T> {
        let table = unsafe { self.table.load(Ordering::Acquire, guard).deref() };
        Iter {
            slot: table.buckets.first(),
            bucket: 0,
            table,
            guard,
        }
    }

    /// Acquires every stripe lock, in ascending order.
    fn lock_all<'g>(&'g self, guard: &'g Guard) -> (impl Drop + 'g, impl Drop + 'g) {
        // Acquire the first lock. A resize or clear must hold lock 0, so
        // once we have it the table can no longer be replaced.
        let table = unsafe { self.table.load(Ordering::Acquire, guard).deref() };
        let first = lock_range(&table.locks, 0..1);

        // Re-read the table: the lock array may have grown while we were
        // blocked on lock 0. Lock 0 itself is the same mutex in both tables
        // since existing locks keep their slots across resizes.
        let table = unsafe { self.table.load(Ordering::Acquire, guard).deref() };
        let rest = lock_range(&table.locks, 1..table.locks.len());

        (first, rest)
    }
}

impl<T, S> HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    /// Returns a reference to the stored element equal to `value`, if any.
    ///
    /// Lock-free: captures the live table once and walks the bucket chain
    /// with acquire loads, so a concurrent resize cannot tear the walk.
    pub(crate) fn get<'g, Q: ?Sized>(&'g self, value: &Q, guard: &'g Guard) -> Option<&'g T>
    where
        T: Borrow<Q>,
        Q: Hash + Eq,
    {
        let hash = self.hash(value);
        let table = unsafe { self.table.load(Ordering::Acquire, guard).deref() };
        let bucket = bucket_index(hash, table.buckets.len() as u64) as usize;

        // Look Ma, no lock!
        //
        // The acquire load ensures a node's fields are visible before the
        // pointer that exposes it, so we never read a half-built node.
        let mut node_ref = table.buckets[bucket].load(Ordering::Acquire, guard);

        while let Some(node) = unsafe { node_ref.as_ref() } {
            if node.hash == hash && node.value.borrow() == value {
                return Some(&node.value);
            }

            node_ref = node.next.load(Ordering::Acquire, guard);
        }

        None
    }

    /// Returns `true` if the set contains an element equal to `value`.
    pub(crate) fn contains<Q: ?Sized>(&self, value: &Q, guard: &Guard) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq,
    {
        self.get(value, guard).is_some()
    }

    fn hash<Q>(&self, value: &Q) -> u64
    where
        Q: Hash + ?Sized,
    {
        let mut h = self.build_hasher.build_hasher();
        value.hash(&mut h);
        h.finish()
    }
}

// Methods that require T: Send + Sync, as they retire nodes whose
// destructors the collector may run on another thread, and T: Clone,
// as a resize copies elements into freshly allocated nodes.
impl<T, S> HashSet<T, S>
where
    T: Hash + Eq + Clone + Send + Sync,
    S: BuildHasher,
{
    /// The single insert routine behind `insert`, `try_insert`,
    /// `get_or_insert` and `insert_or_replace`.
    ///
    /// Returns whether a new element was inserted, along with a reference
    /// to the stored element: the freshly inserted one, the pre-existing
    /// one (`update_if_exists == false`), or the replacement
    /// (`update_if_exists == true`).
    ///
    /// `acquire_lock` is only `false` for bulk construction of a set that
    /// is not shared with any other thread yet.
    pub(crate) fn insert_internal<'g>(
        &'g self,
        value: T,
        update_if_exists: bool,
        acquire_lock: bool,
        guard: &'g Guard,
    ) -> (bool, &'g T) {
        let hash = self.hash(&value);

        loop {
            let table_ptr = self.table.load(Ordering::Acquire, guard);
            let table = unsafe { table_ptr.deref() };

            let bucket = bucket_index(hash, table.buckets.len() as u64) as usize;
            let lock = lock_index(bucket as u64, table.locks.len() as u64) as usize;

            let mut should_resize = false;
            let stored;

            {
                let _lock = acquire_lock.then(|| table.locks[lock].lock());

                // If the table just got resized, we may not be holding the
                // right lock, and must retry.
                if !ptr::eq(
                    table_ptr.as_raw(),
                    self.table.load(Ordering::Acquire, guard).as_raw(),
                ) {
                    continue;
                }

                // Try to find the value in the bucket.
                let mut slot = &table.buckets[bucket];
                loop {
                    let node_ref = slot.load(Ordering::Acquire, guard);
                    let node = match unsafe { node_ref.as_ref() } {
                        Some(node) => node,
                        None => break,
                    };

                    if node.hash == hash && node.value == value {
                        if !update_if_exists {
                            return (false, &node.value);
                        }

                        // Splice a replacement node into the same chain
                        // position instead of overwriting the value, so a
                        // concurrent lock-free reader can never observe a
                        // partially written element.
                        let replacement = Owned::new(Node {
                            value,
                            hash,
                            next: node.next.clone(),
                        })
                        .into_shared(guard);

                        slot.store(replacement, Ordering::Release);
                        unsafe { guard.defer_destroy(node_ref) };

                        let replacement = unsafe { replacement.deref() };
                        return (false, &replacement.value);
                    }

                    slot = &node.next;
                }

                // The value is not in the bucket. Publish it as the new head.
                let head = &table.buckets[bucket];
                let new = Owned::new(Node {
                    value,
                    hash,
                    next: head.clone(),
                })
                .into_shared(guard);
                head.store(new, Ordering::Release);

                let new = unsafe { new.deref() };
                stored = &new.value;

                // The counter is only written under the stripe lock, so the
                // checked increment is race-free. Overflow means the
                // capacity invariant is broken beyond recovery.
                let count = table.counts[lock]
                    .load(Ordering::Relaxed)
                    .checked_add(1)
                    .expect("per-stripe element count overflowed");
                table.counts[lock].store(count, Ordering::Relaxed);

                // If the number of elements guarded by this stripe exceeded
                // the budget, resize the table. The resize may instead grow
                // the budget if the table is poorly utilized.
                if count > self.budget.load(Ordering::SeqCst) {
                    should_resize = true;
                }
            }

            // We just performed an insertion. Notice that we are not holding
            // the stripe lock when requesting a resize; holding it would
            // deadlock against the resize acquiring every lock. As a result
            // the resize may run unnecessarily, but it obtains lock 0 and
            // re-validates the table we pass it before doing any work.
            if should_resize {
                self.resize(table_ptr, guard);
            }

            return (true, stored);
        }
    }

    /// Removes the element equal to `value`, returning a reference to it.
    pub(crate) fn remove<'g, Q: ?Sized>(&'g self, value: &Q, guard: &'g Guard) -> Option<&'g T>
    where
        T: Borrow<Q>,
        Q: Hash + Eq,
    {
        let hash = self.hash(value);

        loop {
            let table_ptr = self.table.load(Ordering::Acquire, guard);
            let table = unsafe { table_ptr.deref() };

            let bucket = bucket_index(hash, table.buckets.len() as u64) as usize;
            let lock = lock_index(bucket as u64, table.locks.len() as u64) as usize;

            {
                let _lock = table.locks[lock].lock();

                // If the table just got resized, we may not be holding the
                // right lock, and must retry.
                if !ptr::eq(
                    table_ptr.as_raw(),
                    self.table.load(Ordering::Acquire, guard).as_raw(),
                ) {
                    continue;
                }

                // Walk the chain, unlinking through the slot that points at
                // the matched node: the bucket head if it is first, the
                // predecessor's link otherwise.
                let mut slot = &table.buckets[bucket];
                loop {
                    let node_ref = slot.load(Ordering::Acquire, guard);
                    let node = match unsafe { node_ref.as_ref() } {
                        Some(node) => node,
                        None => break,
                    };

                    if node.hash == hash && node.value.borrow() == value {
                        let next = node.next.load(Ordering::Acquire, guard);
                        slot.store(next, Ordering::Release);

                        // Only written under the stripe lock; see above.
                        let count = table.counts[lock].load(Ordering::Relaxed) - 1;
                        table.counts[lock].store(count, Ordering::Relaxed);

                        unsafe { guard.defer_destroy(node_ref) };

                        return Some(&node.value);
                    }

                    slot = &node.next;
                }
            }

            return None;
        }
    }

    /// Replaces the stored element equal to `value` with `value` itself.
    ///
    /// Never inserts or removes: returns `false` if no equal element is
    /// present. The replacement is a fresh node spliced into the matched
    /// node's chain position, for the same torn-read reason as updates in
    /// [`HashSet::insert_internal`].
    pub(crate) fn update(&self, value: T, guard: &Guard) -> bool {
        let hash = self.hash(&value);

        loop {
            let table_ptr = self.table.load(Ordering::Acquire, guard);
            let table = unsafe { table_ptr.deref() };

            let bucket = bucket_index(hash, table.buckets.len() as u64) as usize;
            let lock = lock_index(bucket as u64, table.locks.len() as u64) as usize;

            {
                let _lock = table.locks[lock].lock();

                // If the table just got resized, we may not be holding the
                // right lock, and must retry.
                if !ptr::eq(
                    table_ptr.as_raw(),
                    self.table.load(Ordering::Acquire, guard).as_raw(),
                ) {
                    continue;
                }

                let mut slot = &table.buckets[bucket];
                loop {
                    let node_ref = slot.load(Ordering::Acquire, guard);
                    let node = match unsafe { node_ref.as_ref() } {
                        Some(node) => node,
                        None => break,
                    };

                    if node.hash == hash && node.value == value {
                        let replacement = Owned::new(Node {
                            value,
                            hash,
                            next: node.next.clone(),
                        });

                        slot.store(replacement, Ordering::Release);
                        unsafe { guard.defer_destroy(node_ref) };

                        return true;
                    }

                    slot = &node.next;
                }
            }

            return false;
        }
    }

    /// Clears the set, removing all elements.
    pub(crate) fn clear(&self, guard: &Guard) {
        let _all = self.lock_all(guard);

        let table_ptr = self.table.load(Ordering::Acquire, guard);
        let table = unsafe { table_ptr.deref() };

        // The locks are reused, never discarded; only the buckets and
        // counters are replaced.
        let new_table = Table::with_locks(resize::DEFAULT_CAPACITY, table.locks.clone());
        let new_budget = resize::budget(new_table.buckets.len(), new_table.locks.len());

        self.table.store(Owned::new(new_table), Ordering::Release);
        self.budget.store(new_budget, Ordering::SeqCst);

        unsafe { Self::retire_table(table_ptr, guard) };
    }

    /// Replaces the bucket table with a larger one.
    ///
    /// To prevent multiple threads from resizing as a result of races, the
    /// table deemed too small must be passed as an argument. The thread
    /// that first obtains lock 0 performs the resize; everyone else blocks
    /// on lock 0, then notices the table reference already changed and
    /// bails out.
    ///
    /// May not resize at all: a poorly utilized table gets a doubled
    /// budget instead, since growing the array would not shorten chains
    /// produced by a bad hash function.
    fn resize<'g>(&'g self, table_ptr: Shared<'g, Table<T>>, guard: &'g Guard) {
        let table = unsafe { table_ptr.deref() };

        let _first = lock_range(&table.locks, 0..1);

        // Make sure nobody resized the table while we were waiting for
        // lock 0. A different reference means it was already resized (or
        // the budget was adjusted) and there is nothing left to do.
        if !ptr::eq(
            table_ptr.as_raw(),
            self.table.load(Ordering::Acquire, guard).as_raw(),
        ) {
            return;
        }

        let approx_len = table.len();

        let (new_len, at_max) = match resize::decide(table.buckets.len(), approx_len) {
            resize::Growth::DoubleBudget => {
                let budget = self.budget.load(Ordering::SeqCst);
                self.budget.store(budget.saturating_mul(2), Ordering::SeqCst);
                return;
            }
            resize::Growth::Rehash { buckets, at_max } => (buckets, at_max),
        };

        if at_max {
            // The table is at its maximum size. Pin the budget so the
            // resize engine is never entered again; `clear` resets it.
            self.budget.store(usize::MAX, Ordering::SeqCst);
        }

        // Now acquire the rest of the locks, in ascending order.
        let _rest = lock_range(&table.locks, 1..table.locks.len());

        let new_locks: Arc<[Arc<Mutex<()>>]> =
            if self.grow_locks && table.locks.len() < resize::MAX_LOCKS {
                // Double the stripe count. Existing locks keep their slots,
                // so writers blocked on an old stripe still hold the right
                // lock for the buckets it guarded.
                table
                    .locks
                    .iter()
                    .cloned()
                    .chain(iter::repeat_with(Arc::default).take(table.locks.len()))
                    .collect()
            } else {
                table.locks.clone()
            };

        let new_counts: Box<[AtomicUsize]> = iter::repeat_with(AtomicUsize::default)
            .take(new_locks.len())
            .collect();
        let mut new_buckets: Vec<Atomic<Node<T>>> =
            iter::repeat_with(Atomic::null).take(new_len).collect();

        // Copy all data into the new table, creating new nodes for all
        // elements. Old nodes are never re-linked: a lock-free reader may
        // still be walking the old chains, and a published node's `next`
        // must never change.
        for bucket in table.buckets.iter() {
            let mut node_ref = bucket.load(Ordering::Acquire, guard);
            while let Some(node) = unsafe { node_ref.as_ref() } {
                let new_bucket = bucket_index(node.hash, new_len as u64) as usize;
                let new_lock = lock_index(new_bucket as u64, new_locks.len() as u64) as usize;

                new_buckets[new_bucket] = Atomic::new(Node {
                    value: node.value.clone(),
                    hash: node.hash,
                    next: new_buckets[new_bucket].clone(),
                });

                new_counts[new_lock].fetch_add(1, Ordering::Relaxed);

                node_ref = node.next.load(Ordering::Acquire, guard);
            }
        }

        self.budget.store(
            resize::budget(new_len, new_locks.len()),
            Ordering::SeqCst,
        );

        // Replace the table with the new version atomically. Readers that
        // captured the old reference keep walking the old arrays, which
        // stay valid until the last guard goes away.
        self.table.store(
            Owned::new(Table {
                buckets: new_buckets.into_boxed_slice(),
                locks: new_locks,
                counts: new_counts,
            }),
            Ordering::Release,
        );

        unsafe { Self::retire_table(table_ptr, guard) };
    }

    /// Retires a table that has just been unlinked, along with every node
    /// it holds.
    ///
    /// # Safety
    ///
    /// The table must no longer be reachable through `self.table`.
    unsafe fn retire_table(table_ptr: Shared<'_, Table<T>>, guard: &Guard) {
        let table = unsafe { table_ptr.deref() };

        for bucket in table.buckets.iter() {
            let mut node_ref = bucket.load(Ordering::Acquire, guard);
            while let Some(node) = unsafe { node_ref.as_ref() } {
                let next = node.next.load(Ordering::Acquire, guard);
                unsafe { guard.defer_destroy(node_ref) };
                node_ref = next;
            }
        }

        unsafe { guard.defer_destroy(table_ptr) };
    }
}

impl<T, S> Drop for HashSet<T, S> {
    fn drop(&mut self) {
        // We have exclusive access, so the table and its chains can be
        // freed eagerly. Garbage retired earlier is destroyed when the
        // collector itself drops.
        unsafe {
            let guard = crossbeam_epoch::unprotected();
            let table_ptr = self.table.load(Ordering::Relaxed, guard);

            for bucket in table_ptr.deref().buckets.iter() {
                let mut node_ref = bucket.load(Ordering::Relaxed, guard);
                while !node_ref.is_null() {
                    let next = node_ref.deref().next.load(Ordering::Relaxed, guard);
                    drop(node_ref.into_owned());
                    node_ref = next;
                }
            }

            drop(table_ptr.into_owned());
        }
    }
}

/// Acquires a contiguous range of stripe locks, in ascending order.
///
/// The guard owns the lock array, so the locks can be released even if the
/// table that handed them out has been replaced in the meantime.
fn lock_range(locks: &Arc<[Arc<Mutex<()>>]>, range: Range<usize>) -> impl Drop {
    for i in range.clone() {
        unsafe { locks[i].raw().lock() };
    }

    /// Unlocks the locked range on drop.
    struct Unlock {
        locks: Arc<[Arc<Mutex<()>>]>,
        range: Range<usize>,
    }

    impl Drop for Unlock {
        fn drop(&mut self) {
            for i in self.range.clone() {
                unsafe { self.locks[i].raw().unlock() };
            }
        }
    }

    Unlock {
        locks: locks.clone(),
        range,
    }
}

/// Computes the bucket index for a particular hashcode.
fn bucket_index(hashcode: u64, bucket_count: u64) -> u64 {
    let bucket_index = (hashcode & 0x7fff_ffff) % bucket_count;
    debug_assert!(bucket_index < bucket_count);

    bucket_index
}

/// Computes the lock index for a particular bucket.
///
/// The stripe is derived from the bucket, not independently from the hash,
/// so each stripe guards a fixed, well-defined subset of buckets.
fn lock_index(bucket_index: u64, lock_count: u64) -> u64 {
    let lock_index = bucket_index % lock_count;
    debug_assert!(lock_index < lock_count);

    lock_index
}

/// An iterator over the elements of a `HashSet`.
///
/// This `struct` is created by the [`iter`] method on [`Pinned`]. See its
/// documentation for more.
///
/// [`iter`]: Pinned::iter
pub struct Iter<'g, T> {
    table: &'g Table<T>,
    guard: &'g Guard,
    slot: Option<&'g Atomic<Node<T>>>,
    bucket: usize,
}

impl<'g, T> Iterator for Iter<'g, T> {
    type Item = &'g T;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(node) = self
                .slot
                .and_then(|slot| unsafe { slot.load(Ordering::Acquire, self.guard).as_ref() })
            {
                self.slot = Some(&node.next);
                return Some(&node.value);
            }

            self.bucket += 1;

            if self.bucket >= self.table.buckets.len() {
                return None;
            }

            self.slot = Some(&self.table.buckets[self.bucket]);
        }
    }
}

impl<T> Clone for Iter<'_, T> {
    fn clone(&self) -> Self {
        Self {
            table: self.table,
            guard: self.guard,
            slot: self.slot,
            bucket: self.bucket,
        }
    }
}

impl<T, S> Clone for HashSet<T, S>
where
    T: Hash + Eq + Clone + Send + Sync,
    S: BuildHasher + Clone,
{
    fn clone(&self) -> HashSet<T, S> {
        let pinned = self.pin();
        let clone = Self::with_capacity_and_hasher(pinned.len(), self.build_hasher.clone());

        {
            let clone_pinned = clone.pin();
            for value in pinned.iter() {
                clone_pinned.insert(value.clone());
            }
        }

        clone
    }
}

impl<T, S> Default for HashSet<T, S>
where
    S: Default,
{
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<T, S> FromIterator<T> for HashSet<T, S>
where
    T: Hash + Eq + Clone + Send + Sync,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let set = Self::with_capacity_and_hasher(resize::DEFAULT_CAPACITY, S::default());

        {
            // The set is not shared with anyone yet, so the bulk
            // construction path can skip the stripe locks.
            let guard = set.guard();
            for value in iter {
                set.insert_internal(value, false, false, &guard);
            }
        }

        set
    }
}

impl<T, S> fmt::Debug for HashSet<T, S>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.pin().iter()).finish()
    }
}

impl<T, S> PartialEq for HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        self.pin() == other.pin()
    }
}

impl<T, S> Eq for HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_works() {
        let set = HashSet::new();
        let pinned = set.pin();

        assert!(pinned.insert(1));
        assert!(pinned.insert(2));
        assert!(!pinned.insert(1));

        assert_eq!(pinned.get(&1), Some(&1));
        assert_eq!(pinned.get(&3), None);

        assert!(pinned.remove(&2));
        assert!(!pinned.remove(&2));

        for i in 0..100 {
            pinned.insert(i);
        }

        for i in 0..100 {
            assert!(pinned.contains(&i));
        }

        assert_eq!(pinned.iter().count(), 100);
        assert_eq!(pinned.len(), 100);
    }

    #[test]
    fn growth_keeps_every_element() {
        // Small initial capacity, so insertion has to rehash repeatedly.
        let set = HashSet::with_capacity(1);
        let pinned = set.pin();

        for i in 0..1000 {
            assert!(pinned.insert(i));
        }

        assert_eq!(pinned.len(), 1000);
        for i in 0..1000 {
            assert!(pinned.contains(&i));
        }
    }

    #[test]
    fn clear_empties_and_reuses() {
        let set = HashSet::new();
        let pinned = set.pin();

        for i in 0..500 {
            pinned.insert(i);
        }
        pinned.clear();

        assert!(pinned.is_empty());
        assert_eq!(pinned.len(), 0);
        assert_eq!(pinned.iter().count(), 0);

        assert!(pinned.insert(1));
        assert_eq!(pinned.len(), 1);
    }

    #[test]
    fn addressing_is_stable() {
        assert_eq!(bucket_index(0x1_0000_0001, 31), (0x1 & 0x7fff_ffff) % 31);
        assert_eq!(lock_index(10, 4), 2);
    }
}
