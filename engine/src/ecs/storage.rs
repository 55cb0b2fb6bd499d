//! Component storage backends.
//!
//! Each registered component type owns one [`Storage`], keyed by entity
//! index. Two backings exist behind a uniform contract:
//!
//! - [`Backing::Dense`] preallocates a slot per possible entity. O(1)
//!   access with no hashing, paid for up front in memory. The right choice
//!   for components most entities carry.
//! - [`Backing::Sparse`] keeps a hash map and only pays for entities that
//!   actually carry the component. The right choice for rare components.
//!
//! The world never consults a storage to decide whether an entity has a
//! component; that answer lives in the composition masks. The contract is
//! that a storage holds a value for an index exactly when the matching
//! composition bit is set.

use std::collections::HashMap;

/// Which backing a component type's storage uses. Chosen once at
/// registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backing {
    Dense,
    Sparse,
}

/// Value storage for a single component type, keyed by entity index.
pub enum Storage<T> {
    Dense(Box<[Option<T>]>),
    Sparse(HashMap<u32, T>),
}

impl<T> Storage<T> {
    /// Create a storage. `capacity` bounds the valid index range for the
    /// dense backing; the sparse backing ignores it.
    pub fn new(backing: Backing, capacity: usize) -> Self {
        match backing {
            Backing::Dense => {
                let mut slots = Vec::with_capacity(capacity);
                slots.resize_with(capacity, || None);
                Storage::Dense(slots.into_boxed_slice())
            }
            Backing::Sparse => Storage::Sparse(HashMap::new()),
        }
    }

    /// The value at an index. `None` for empty or out-of-range indices,
    /// whichever the backing.
    pub fn get(&self, index: u32) -> Option<&T> {
        match self {
            Storage::Dense(slots) => slots.get(index as usize).and_then(Option::as_ref),
            Storage::Sparse(map) => map.get(&index),
        }
    }

    pub fn get_mut(&mut self, index: u32) -> Option<&mut T> {
        match self {
            Storage::Dense(slots) => slots.get_mut(index as usize).and_then(Option::as_mut),
            Storage::Sparse(map) => map.get_mut(&index),
        }
    }

    /// Store a value for an index, returning the displaced value if the
    /// index was already occupied.
    ///
    /// # Panics
    ///
    /// Panics for an index past a dense backing's capacity: the value could
    /// not be stored, so accepting it would break the composition
    /// invariant.
    pub fn insert(&mut self, index: u32, value: T) -> Option<T> {
        match self {
            Storage::Dense(slots) => slots[index as usize].replace(value),
            Storage::Sparse(map) => map.insert(index, value),
        }
    }

    /// Remove and return the value for an index. Removing an empty or
    /// out-of-range index is a no-op.
    pub fn remove(&mut self, index: u32) -> Option<T> {
        match self {
            Storage::Dense(slots) => slots.get_mut(index as usize).and_then(Option::take),
            Storage::Sparse(map) => map.remove(&index),
        }
    }

    /// Drop every stored value. Dense capacity is retained.
    pub fn clear(&mut self) {
        match self {
            Storage::Dense(slots) => slots.iter_mut().for_each(|slot| *slot = None),
            Storage::Sparse(map) => map.clear(),
        }
    }

    /// The number of stored values. O(capacity) for the dense backing.
    pub fn len(&self) -> usize {
        match self {
            Storage::Dense(slots) => slots.iter().filter(|slot| slot.is_some()).count(),
            Storage::Sparse(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(debug_assertions)]
const FREE: usize = 0;
#[cfg(debug_assertions)]
const WRITER: usize = 1;
// States at or above this count shard writers: SHARD_BASE + n means n
// shards of a single split system are writing disjoint ranges.
#[cfg(debug_assertions)]
const SHARD_BASE: usize = 1 << (usize::BITS - 1);

/// A debug-build shadow of the access rules the scheduler is supposed to
/// enforce through masks.
///
/// The scheduler's masks are the real safety mechanism; the sentinel exists
/// to catch a system that touches state it never declared. Any reader while
/// a writer is active (or vice versa) is a declaration bug, so the sentinel
/// panics immediately instead of waiting for the conflicting access to end.
///
/// Three access classes exist: shared readers, one exclusive writer, and
/// shared *shard writers*. The last is for a split system's shards, which
/// all write the same storage but over disjoint entity ranges; they may
/// overlap each other while still excluding readers and full writers.
///
/// In release builds this is a zero-sized no-op.
#[cfg(debug_assertions)]
pub struct AccessSentinel {
    // FREE, WRITER, n in 2..SHARD_BASE meaning n - 1 active readers, or
    // SHARD_BASE + n meaning n active shard writers.
    state: std::sync::atomic::AtomicUsize,
}

#[cfg(debug_assertions)]
impl AccessSentinel {
    pub fn new() -> Self {
        Self { state: std::sync::atomic::AtomicUsize::new(FREE) }
    }

    pub fn begin_read(&self, what: &str) {
        use std::sync::atomic::Ordering;
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current == WRITER {
                panic!("undeclared access: read of {what} while a writer is active");
            }
            if current >= SHARD_BASE {
                panic!("undeclared access: read of {what} while shard writers are active");
            }
            let next = if current == FREE { 2 } else { current + 1 };
            match self.state.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn end_read(&self) {
        use std::sync::atomic::Ordering;
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            debug_assert!(current >= 2, "end_read without a matching begin_read");
            let next = if current == 2 { FREE } else { current - 1 };
            match self.state.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn begin_write(&self, what: &str) {
        use std::sync::atomic::Ordering;
        if let Err(observed) =
            self.state.compare_exchange(FREE, WRITER, Ordering::AcqRel, Ordering::Acquire)
        {
            if observed == WRITER {
                panic!("undeclared access: write of {what} while a writer is active");
            }
            if observed >= SHARD_BASE {
                panic!("undeclared access: write of {what} while shard writers are active");
            }
            panic!(
                "undeclared access: write of {what} while {} reader(s) are active",
                observed - 1
            );
        }
    }

    pub fn end_write(&self) {
        use std::sync::atomic::Ordering;
        self.state.store(FREE, Ordering::Release);
    }

    pub fn begin_shard_write(&self, what: &str) {
        use std::sync::atomic::Ordering;
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current == WRITER {
                panic!("undeclared access: shard write of {what} while a writer is active");
            }
            if current != FREE && current < SHARD_BASE {
                panic!("undeclared access: shard write of {what} while readers are active");
            }
            let next = if current == FREE { SHARD_BASE + 1 } else { current + 1 };
            match self.state.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn end_shard_write(&self) {
        use std::sync::atomic::Ordering;
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            debug_assert!(current > SHARD_BASE, "end_shard_write without a matching begin");
            let next = if current == SHARD_BASE + 1 { FREE } else { current - 1 };
            match self.state.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }
}

#[cfg(not(debug_assertions))]
pub struct AccessSentinel;

#[cfg(not(debug_assertions))]
impl AccessSentinel {
    #[inline(always)]
    pub fn new() -> Self {
        Self
    }

    #[inline(always)]
    pub fn begin_read(&self, _what: &str) {}

    #[inline(always)]
    pub fn end_read(&self) {}

    #[inline(always)]
    pub fn begin_write(&self, _what: &str) {}

    #[inline(always)]
    pub fn end_write(&self) {}

    #[inline(always)]
    pub fn begin_shard_write(&self, _what: &str) {}

    #[inline(always)]
    pub fn end_shard_write(&self) {}
}

impl Default for AccessSentinel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storages() -> [Storage<u32>; 2] {
        [Storage::new(Backing::Dense, 16), Storage::new(Backing::Sparse, 16)]
    }

    #[test]
    fn backings_share_the_insert_get_remove_contract() {
        for mut storage in storages() {
            // When
            assert_eq!(storage.insert(3, 30), None);
            assert_eq!(storage.insert(7, 70), None);

            // Then
            assert_eq!(storage.get(3), Some(&30));
            assert_eq!(storage.get(7), Some(&70));
            assert_eq!(storage.get(4), None);
            assert_eq!(storage.len(), 2);

            // When - replace and remove
            assert_eq!(storage.insert(3, 31), Some(30));
            assert_eq!(storage.remove(3), Some(31));

            // Then
            assert_eq!(storage.get(3), None);
            assert_eq!(storage.remove(3), None);
            assert_eq!(storage.len(), 1);
        }
    }

    #[test]
    fn get_mut_edits_in_place() {
        for mut storage in storages() {
            // Given
            storage.insert(2, 10);

            // When
            *storage.get_mut(2).unwrap() += 5;

            // Then
            assert_eq!(storage.get(2), Some(&15));
            assert_eq!(storage.get_mut(9), None);
        }
    }

    #[test]
    fn out_of_range_reads_return_none_on_both_backings() {
        for mut storage in storages() {
            // Given - an index past the dense capacity of 16
            let index = u32::MAX;

            // Then - no value, no panic, on either backing
            assert_eq!(storage.get(index), None);
            assert_eq!(storage.get_mut(index), None);
            assert_eq!(storage.remove(index), None);
        }
    }

    #[test]
    fn clear_empties_both_backings() {
        for mut storage in storages() {
            // Given
            storage.insert(0, 1);
            storage.insert(15, 2);

            // When
            storage.clear();

            // Then
            assert!(storage.is_empty());
            assert_eq!(storage.get(0), None);
            assert_eq!(storage.get(15), None);
        }
    }

    #[cfg(debug_assertions)]
    mod sentinel {
        use super::*;

        #[test]
        fn readers_may_overlap() {
            // Given
            let sentinel = AccessSentinel::new();

            // When / Then - two concurrent readers are fine
            sentinel.begin_read("store");
            sentinel.begin_read("store");
            sentinel.end_read();
            sentinel.end_read();

            // Then - fully released, a writer may enter
            sentinel.begin_write("store");
            sentinel.end_write();
        }

        #[test]
        #[should_panic(expected = "undeclared access")]
        fn write_during_read_panics() {
            let sentinel = AccessSentinel::new();
            sentinel.begin_read("store");
            sentinel.begin_write("store");
        }

        #[test]
        #[should_panic(expected = "undeclared access")]
        fn read_during_write_panics() {
            let sentinel = AccessSentinel::new();
            sentinel.begin_write("store");
            sentinel.begin_read("store");
        }

        #[test]
        #[should_panic(expected = "undeclared access")]
        fn double_write_panics() {
            let sentinel = AccessSentinel::new();
            sentinel.begin_write("store");
            sentinel.begin_write("store");
        }

        #[test]
        fn shard_writers_may_overlap_each_other() {
            // Given
            let sentinel = AccessSentinel::new();

            // When / Then - two shards of one system
            sentinel.begin_shard_write("store");
            sentinel.begin_shard_write("store");
            sentinel.end_shard_write();
            sentinel.end_shard_write();

            // Then - fully released, a reader may enter
            sentinel.begin_read("store");
            sentinel.end_read();
        }

        #[test]
        #[should_panic(expected = "undeclared access")]
        fn read_during_shard_write_panics() {
            let sentinel = AccessSentinel::new();
            sentinel.begin_shard_write("store");
            sentinel.begin_read("store");
        }

        #[test]
        #[should_panic(expected = "undeclared access")]
        fn shard_write_during_read_panics() {
            let sentinel = AccessSentinel::new();
            sentinel.begin_read("store");
            sentinel.begin_shard_write("store");
        }
    }
}
