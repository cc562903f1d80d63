//! Fixed-capacity entry blocks: the unit of storage and of skip-list routing.
//!
//! A block owns an unordered vector of entries and a tower of per-level
//! forward pointers. Entries stay unsorted between operations; the single
//! sort happens at split time, when half of them migrate to a fresh block.
//! All entry access goes through the block's mutex; the version counter is
//! the one field read optimistically without it.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicI64, AtomicPtr, Ordering};

use parking_lot::lock_api::RawMutex as _;
use parking_lot::RawMutex;

/// A single key/value pair stored inside a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Entry {
    pub key: i64,
    pub value: i64,
}

/// A bucket of up to `block_capacity` entries plus its routing state.
pub(crate) struct Block {
    /// Lowest key routed to this block. Immutable once the block is linked.
    anchor: i64,
    /// Bumped under `mu` whenever this block's neighbourhood is rewired.
    /// Optimistic descents read it without the lock and restart on change.
    version: AtomicI64,
    /// Guards `values` and all forward-pointer rewrites. Raw so the writer
    /// protocol can acquire and release across non-lexical scopes.
    mu: RawMutex,
    /// Per-level successor tower, one slot per skip-list level. Null above
    /// the highest level this block is linked at.
    forward: Box<[AtomicPtr<Block>]>,
    values: UnsafeCell<Vec<Entry>>,
}

// Blocks are shared by raw pointer between threads; every mutable access is
// serialized by `mu` and the atomics carry the rest.
unsafe impl Send for Block {}
unsafe impl Sync for Block {}

impl Block {
    pub(crate) fn new(anchor: i64, levels: usize) -> Box<Block> {
        Self::with_entries(anchor, levels, Vec::new())
    }

    /// A block pre-populated with entries, used by split before publication.
    pub(crate) fn with_entries(anchor: i64, levels: usize, entries: Vec<Entry>) -> Box<Block> {
        Box::new(Block {
            anchor,
            version: AtomicI64::new(0),
            mu: RawMutex::INIT,
            forward: (0..levels)
                .map(|_| AtomicPtr::new(std::ptr::null_mut()))
                .collect(),
            values: UnsafeCell::new(entries),
        })
    }

    #[inline]
    pub(crate) fn anchor(&self) -> i64 {
        self.anchor
    }

    #[inline]
    pub(crate) fn version(&self) -> i64 {
        self.version.load(Ordering::Acquire)
    }

    /// Invalidates every descent that cached this block's version. Callers
    /// hold `mu`; the counter itself stays lock-free for readers.
    #[inline]
    pub(crate) fn bump_version(&self) {
        self.version.fetch_add(1, Ordering::Release);
    }

    #[inline]
    pub(crate) fn forward(&self, level: usize) -> *mut Block {
        self.forward[level].load(Ordering::Acquire)
    }

    /// Rewires the successor at `level`. Callers hold `mu`, except during
    /// construction and split set-up while the block is still unpublished.
    #[inline]
    pub(crate) fn set_forward(&self, level: usize, next: *mut Block) {
        self.forward[level].store(next, Ordering::Release);
    }

    #[inline]
    pub(crate) fn lock(&self) {
        self.mu.lock();
    }

    #[inline]
    pub(crate) fn try_lock(&self) -> bool {
        self.mu.try_lock()
    }

    /// # Safety
    ///
    /// The current thread must hold `mu` via a prior `lock` or successful
    /// `try_lock`.
    #[inline]
    pub(crate) unsafe fn unlock(&self) {
        self.mu.unlock();
    }

    /// Number of live entries.
    ///
    /// # Safety
    ///
    /// The caller must hold `mu`, or otherwise guarantee the block is not
    /// being mutated concurrently.
    pub(crate) unsafe fn len(&self) -> usize {
        (*self.values.get()).len()
    }

    /// Inserts or overwrites in place. Returns true when the key was new.
    ///
    /// # Safety
    ///
    /// The caller must hold `mu`.
    pub(crate) unsafe fn insert_entry(&self, key: i64, value: i64) -> bool {
        let values = &mut *self.values.get();
        if let Some(entry) = values.iter_mut().find(|e| e.key == key) {
            entry.value = value;
            return false;
        }
        values.push(Entry { key, value });
        true
    }

    /// # Safety
    ///
    /// The caller must hold `mu`.
    pub(crate) unsafe fn find_entry(&self, key: i64) -> Option<i64> {
        let values = &*self.values.get();
        values.iter().find(|e| e.key == key).map(|e| e.value)
    }

    /// Removes `key` by swapping the last entry into its slot.
    ///
    /// # Safety
    ///
    /// The caller must hold `mu`.
    pub(crate) unsafe fn remove_entry(&self, key: i64) -> Option<i64> {
        let values = &mut *self.values.get();
        let index = values.iter().position(|e| e.key == key)?;
        Some(values.swap_remove(index).value)
    }

    /// Sorts the entries and moves the upper half out, returning the pivot
    /// key (the anchor of the successor-to-be) and the moved entries.
    ///
    /// # Safety
    ///
    /// The caller must hold `mu`.
    pub(crate) unsafe fn split_upper_half(&self) -> (i64, Vec<Entry>) {
        let values = &mut *self.values.get();
        values.sort_unstable_by_key(|e| e.key);
        let mid = values.len() / 2;
        let upper = values.split_off(mid);
        (upper[0].key, upper)
    }

    /// # Safety
    ///
    /// The caller must hold `mu` or guarantee quiescence (the diagnostic
    /// dump path).
    pub(crate) unsafe fn entries(&self) -> &[Entry] {
        &*self.values.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_overwrites_in_place() {
        let block = Block::new(0, 1);
        unsafe {
            assert!(block.insert_entry(5, 100));
            assert!(!block.insert_entry(5, 200));
            assert_eq!(block.len(), 1);
            assert_eq!(block.find_entry(5), Some(200));
        }
    }

    #[test]
    fn remove_swaps_with_last() {
        let block = Block::new(0, 1);
        unsafe {
            block.insert_entry(1, 10);
            block.insert_entry(2, 20);
            block.insert_entry(3, 30);
            assert_eq!(block.remove_entry(1), Some(10));
            assert_eq!(block.len(), 2);
            // the last entry took the vacated slot
            assert_eq!(block.entries()[0], Entry { key: 3, value: 30 });
            assert_eq!(block.remove_entry(1), None);
        }
    }

    #[test]
    fn split_moves_upper_half() {
        let block = Block::new(0, 1);
        unsafe {
            for key in [4i64, 1, 3, 2] {
                block.insert_entry(key, key * 10);
            }
            let (pivot, upper) = block.split_upper_half();
            assert_eq!(pivot, 3);
            assert_eq!(block.len(), 2);
            assert_eq!(upper.len(), 2);
            assert!(block.entries().iter().all(|e| e.key < pivot));
            assert!(upper.iter().all(|e| e.key >= pivot));
        }
    }

    #[test]
    fn try_lock_is_exclusive() {
        let block = Block::new(0, 1);
        assert!(block.try_lock());
        assert!(!block.try_lock());
        unsafe { block.unlock() };
        assert!(block.try_lock());
        unsafe { block.unlock() };
    }
}
