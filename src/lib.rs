#![doc = include_str!("../README.md")]
//! The core, concurrent block skip-list implementation.
//!
//! This module provides [`BlockSkipList`], an ordered `i64 -> i64` index
//! that layers a probabilistic skip-list over fixed-capacity blocks of
//! entries.
//!
//! # Internals
//!
//! -   **Blocks:** Keys route to blocks by *anchor*: a key lives in the last
//!     block whose anchor does not exceed it. Within a block, entries are
//!     unordered and scanned linearly; blocks are small enough that the scan
//!     beats maintaining sorted order under mutation.
//! -   **Versioned descent:** Readers and writers descend the levels without
//!     locks, caching the version counter of every block they step through.
//!     Any concurrent split bumps the versions of both bracketing blocks, so
//!     a stale descent notices and restarts from the top.
//! -   **Writer protocol:** Writers re-validate and try-lock the
//!     `(previous, current)` pair at every level they may touch, top-down,
//!     never blocking while holding a lock. A full block is split in place
//!     under those locks, which is the only way new topology is published.
//! -   **Reclamation:** Unlinked blocks are retired to a
//!     [`GarbageCollector`] that frees them once every registered thread has
//!     moved past the retirement epoch.

use std::io;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use ::metrics::counter;
use crossbeam_utils::CachePadded;
use log::{debug, trace};

mod block;
mod clock;
pub mod error;
pub mod gc;
pub mod metrics;
pub mod registry;

use crate::block::Block;
use crate::metrics::{
    DESCENT_RESTARTS_TOTAL, LABEL_OPERATION_TYPE, OPERATIONS_TOTAL, SPLITS_TOTAL,
};
pub use crate::error::Error;
pub use crate::gc::{GarbageCollector, GcOptions};
pub use crate::registry::{ThreadContext, ThreadContextList};

const DEFAULT_P: f64 = 0.25;
const DEFAULT_MAX_LEVEL: usize = 16;
const DEFAULT_BLOCK_CAPACITY: usize = 1024;

#[inline]
fn blk_mut(block: &Block) -> *mut Block {
    block as *const Block as *mut Block
}

#[inline]
fn forward_ref<'a>(block: &'a Block, level: usize) -> &'a Block {
    let next = block.forward(level);
    debug_assert!(
        !next.is_null(),
        "linked block missing a successor at level {}",
        level
    );
    // SAFETY: a block linked at `level` always carries a successor there,
    // and blocks are only freed after the list (or the collector) has proven
    // no traversal can reach them.
    unsafe { &*next }
}

fn release_locks(locked: &[&Block]) {
    for block in locked.iter().rev() {
        // SAFETY: every entry in `locked` was locked by this thread.
        unsafe { block.unlock() };
    }
}

/// The per-level `(previous, current)` block pairs and the versions observed
/// for them, collected by one descent.
struct Splice<'a> {
    prev: Vec<&'a Block>,
    curr: Vec<&'a Block>,
    prev_version: Vec<i64>,
    curr_version: Vec<i64>,
}

impl<'a> Splice<'a> {
    fn new(levels: usize, head: &'a Block) -> Splice<'a> {
        Splice {
            prev: vec![head; levels],
            curr: vec![head; levels],
            prev_version: vec![0; levels],
            curr_version: vec![0; levels],
        }
    }

    /// True while the cached pair at `level` still reflects the live list:
    /// both versions unchanged and `prev` still pointing at `curr`.
    fn validate(&self, level: usize) -> bool {
        self.prev_version[level] == self.prev[level].version()
            && self.curr_version[level] == self.curr[level].version()
            && ptr::eq(self.prev[level].forward(level), self.curr[level])
    }

    fn advance(&mut self, level: usize, next: &'a Block) {
        self.prev[level] = self.curr[level];
        self.prev_version[level] = self.curr_version[level];
        self.curr[level] = next;
        self.curr_version[level] = next.version();
    }

    fn step_down(&mut self, level: usize) {
        self.prev[level - 1] = self.prev[level];
        self.prev_version[level - 1] = self.prev_version[level];
        let below = forward_ref(self.prev[level - 1], level - 1);
        self.curr[level - 1] = below;
        self.curr_version[level - 1] = below.version();
    }
}

/// A builder for a [`BlockSkipList`] with custom parameters.
#[derive(Debug, Clone, Copy)]
pub struct Builder {
    p: f64,
    max_level: usize,
    block_capacity: usize,
    gc: Option<GcOptions>,
}

impl Builder {
    /// Branching probability of the level distribution. Must lie in
    /// `(0, 1)`; the expected block height is `1 / (1 - p)`.
    pub fn p(mut self, p: f64) -> Builder {
        self.p = p;
        self
    }

    /// Index of the topmost level. New blocks are assigned heights up to
    /// `max_level - 1`; the top level itself only carries the sentinels.
    pub fn max_level(mut self, max_level: usize) -> Builder {
        self.max_level = max_level;
        self
    }

    /// Number of entries a block holds before it is split. Must be at
    /// least 2.
    pub fn block_capacity(mut self, block_capacity: usize) -> Builder {
        self.block_capacity = block_capacity;
        self
    }

    /// Runs the garbage collector on a background thread with the given
    /// options. Without this, retired blocks are only reclaimed by explicit
    /// [`GarbageCollector::perform_gc_pass`] calls and on drop.
    pub fn gc(mut self, options: GcOptions) -> Builder {
        self.gc = Some(options);
        self
    }

    pub fn build(self) -> Result<BlockSkipList, Error> {
        if !(self.p > 0.0 && self.p < 1.0) {
            return Err(Error::Configuration(format!(
                "branching probability must lie in (0, 1), got {}",
                self.p
            )));
        }
        if self.max_level == 0 {
            return Err(Error::Configuration(
                "maximum level must be at least 1".to_string(),
            ));
        }
        if self.block_capacity < 2 {
            return Err(Error::Configuration(format!(
                "block capacity must be at least 2, got {}",
                self.block_capacity
            )));
        }
        Ok(BlockSkipList::from_parts(
            self.p,
            self.max_level,
            self.block_capacity,
            self.gc,
        ))
    }
}

impl Default for Builder {
    fn default() -> Self {
        Builder {
            p: DEFAULT_P,
            max_level: DEFAULT_MAX_LEVEL,
            block_capacity: DEFAULT_BLOCK_CAPACITY,
            gc: None,
        }
    }
}

/// A concurrent, ordered `i64 -> i64` map backed by blocks of entries.
///
/// Lookups descend optimistically and take a single short-lived lock on the
/// target block; inserts and removes lock the handful of blocks bracketing
/// the affected neighbourhood. Operations are linearizable and never fail;
/// contention is resolved by restarting the descent.
///
/// Keys must lie strictly between `i64::MIN` and `i64::MAX`: the two
/// extremes anchor the head and tail sentinels.
pub struct BlockSkipList {
    head: *mut Block,
    p: f64,
    max_level: usize,
    block_capacity: usize,
    len: CachePadded<AtomicUsize>,
    contexts: Arc<ThreadContextList>,
    gc: Arc<GarbageCollector>,
}

// The raw head pointer is owned by this struct; all shared mutation behind
// it is coordinated by the per-block locks and atomics.
unsafe impl Send for BlockSkipList {}
unsafe impl Sync for BlockSkipList {}

impl Default for BlockSkipList {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockSkipList {
    /// Creates an empty list with the default parameters
    /// (`p = 0.25`, `max_level = 16`, `block_capacity = 1024`).
    pub fn new() -> BlockSkipList {
        BlockSkipList::from_parts(DEFAULT_P, DEFAULT_MAX_LEVEL, DEFAULT_BLOCK_CAPACITY, None)
    }

    pub fn builder() -> Builder {
        Builder::default()
    }

    fn from_parts(
        p: f64,
        max_level: usize,
        block_capacity: usize,
        gc_options: Option<GcOptions>,
    ) -> BlockSkipList {
        let levels = max_level + 1;
        let head = Box::into_raw(Block::new(i64::MIN, levels));
        let base = Box::into_raw(Block::new(i64::MIN + 1, levels));
        let tail = Box::into_raw(Block::new(i64::MAX, levels));
        for level in 0..levels {
            // SAFETY: freshly allocated, not yet shared.
            unsafe {
                (*head).set_forward(level, base);
                (*base).set_forward(level, tail);
            }
        }

        let contexts = Arc::new(ThreadContextList::new());
        let gc = Arc::new(GarbageCollector::new(
            Arc::clone(&contexts),
            gc_options.unwrap_or_default(),
        ));
        if gc_options.is_some() {
            gc.start();
        }

        debug!(
            "initialized: p={}, max_level={}, block_capacity={}",
            p, max_level, block_capacity
        );
        BlockSkipList {
            head,
            p,
            max_level,
            block_capacity,
            len: CachePadded::new(AtomicUsize::new(0)),
            contexts,
            gc,
        }
    }

    /// Returns the number of keys in the list.
    ///
    /// The count is maintained by free-running atomics, so an observer racing
    /// in-flight operations may see it lag by those operations.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Returns `true` if the list contains no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The deferred-reclamation queue attached to this list.
    pub fn garbage_collector(&self) -> &Arc<GarbageCollector> {
        &self.gc
    }

    /// The registry of per-thread activity epochs attached to this list.
    pub fn thread_contexts(&self) -> &Arc<ThreadContextList> {
        &self.contexts
    }

    /// Draws the height for a freshly split block: geometric-like over
    /// `0..max_level`, with a fresh uniform draw on every iteration.
    fn rand_level(&self) -> usize {
        let mut level = 0;
        while fastrand::f64() < self.p && level < self.max_level - 1 {
            level += 1;
        }
        level
    }

    /// Descends the levels collecting, per level, the last block whose
    /// anchor does not exceed `key` (`prev`) and its successor (`curr`),
    /// together with the versions observed for both. Restarts from the top
    /// whenever a cached version goes stale.
    fn locate(&self, key: i64) -> Splice<'_> {
        let top = self.max_level;
        // SAFETY: the head outlives `self`.
        let head = unsafe { &*self.head };
        let mut restarts = 0u64;
        let splice = 'restart: loop {
            let mut s = Splice::new(top + 1, head);
            s.prev_version[top] = head.version();
            let first = forward_ref(head, top);
            s.curr[top] = first;
            s.curr_version[top] = first.version();
            let mut level = top;
            loop {
                if !s.validate(level) {
                    restarts += 1;
                    continue 'restart;
                }
                while s.curr[level].anchor() <= key {
                    let next = forward_ref(s.curr[level], level);
                    s.advance(level, next);
                    if !s.validate(level) {
                        restarts += 1;
                        continue 'restart;
                    }
                }
                if level == 0 {
                    break;
                }
                s.step_down(level);
                level -= 1;
            }
            break s;
        };
        if restarts > 0 {
            counter!(DESCENT_RESTARTS_TOTAL).increment(restarts);
        }
        splice
    }

    /// Look-one-ahead variant of [`BlockSkipList::locate`]: advances while
    /// the *successor's* anchor still does not exceed `key`, so that on exit
    /// `curr[0]` is the block whose range covers `key` and `prev[0]` is its
    /// predecessor.
    fn locate_containing(&self, key: i64) -> Splice<'_> {
        let top = self.max_level;
        // SAFETY: the head outlives `self`.
        let head = unsafe { &*self.head };
        let mut restarts = 0u64;
        let splice = 'restart: loop {
            let mut s = Splice::new(top + 1, head);
            s.prev_version[top] = head.version();
            let first = forward_ref(head, top);
            s.curr[top] = first;
            s.curr_version[top] = first.version();
            let mut level = top;
            loop {
                if !s.validate(level) {
                    restarts += 1;
                    continue 'restart;
                }
                loop {
                    let ahead = s.curr[level].forward(level);
                    if ahead.is_null() {
                        // `curr` is the tail.
                        break;
                    }
                    // SAFETY: non-null successors stay allocated while any
                    // thread is inside an operation.
                    let ahead = unsafe { &*ahead };
                    if ahead.anchor() > key {
                        break;
                    }
                    s.advance(level, ahead);
                    if !s.validate(level) {
                        restarts += 1;
                        continue 'restart;
                    }
                }
                if level == 0 {
                    break;
                }
                s.step_down(level);
                level -= 1;
            }
            break s;
        };
        if restarts > 0 {
            counter!(DESCENT_RESTARTS_TOTAL).increment(restarts);
        }
        splice
    }

    /// Validate-and-lock over levels `rlevel..=0`, top-down, `prev` before
    /// `curr`, coalescing per distinct block.
    ///
    /// Returns the locked blocks on success. Returns `None` on a version
    /// mismatch, in which case the caller re-descends. A failed try-lock
    /// instead releases everything held and retries against the same splice:
    /// blocking on the contended lock while still holding others would
    /// deadlock against a writer acquiring the overlap in another order.
    fn lock_splice<'a>(&self, splice: &Splice<'a>, rlevel: usize) -> Option<Vec<&'a Block>> {
        'acquire: loop {
            let mut locked: Vec<&'a Block> = Vec::with_capacity(2 * (rlevel + 1));
            for level in (0..=rlevel).rev() {
                for b in [splice.prev[level], splice.curr[level]] {
                    if locked.iter().any(|held| ptr::eq(*held, b)) {
                        continue;
                    }
                    if b.try_lock() {
                        locked.push(b);
                    } else {
                        release_locks(&locked);
                        thread::yield_now();
                        continue 'acquire;
                    }
                }
                if !splice.validate(level) {
                    release_locks(&locked);
                    return None;
                }
            }
            return Some(locked);
        }
    }

    /// Inserts `key -> value`, overwriting in place when the key is already
    /// present.
    pub fn insert(&self, key: i64, value: i64) {
        debug_assert!(
            key > i64::MIN && key < i64::MAX,
            "key {} collides with a sentinel anchor",
            key
        );
        let _op = registry::pin(&self.contexts);
        counter!(OPERATIONS_TOTAL, LABEL_OPERATION_TYPE => "insert").increment(1);
        let rlevel = self.rand_level();
        loop {
            let splice = self.locate(key);
            let Some(locked) = self.lock_splice(&splice, rlevel) else {
                counter!(DESCENT_RESTARTS_TOTAL).increment(1);
                continue;
            };
            let target = splice.prev[0];
            // SAFETY: `target` is locked via `lock_splice`.
            let inserted = unsafe { target.insert_entry(key, value) };
            if inserted {
                self.len.fetch_add(1, Ordering::Relaxed);
            }
            // SAFETY: still locked.
            let filled = unsafe { target.len() };
            debug_assert!(filled <= self.block_capacity);
            if filled == self.block_capacity {
                self.split(&splice, rlevel);
            }
            release_locks(&locked);
            return;
        }
    }

    /// Returns the value stored under `key`, if any.
    pub fn get(&self, key: i64) -> Option<i64> {
        debug_assert!(
            key > i64::MIN && key < i64::MAX,
            "key {} collides with a sentinel anchor",
            key
        );
        let _op = registry::pin(&self.contexts);
        counter!(OPERATIONS_TOTAL, LABEL_OPERATION_TYPE => "get").increment(1);
        loop {
            let splice = self.locate(key);
            let target = splice.prev[0];
            // The lock pins the entry vector: without it the linear scan
            // could race an in-progress insert, remove, or split.
            target.lock();
            if !splice.validate(0) {
                // SAFETY: locked just above.
                unsafe { target.unlock() };
                counter!(DESCENT_RESTARTS_TOTAL).increment(1);
                continue;
            }
            // SAFETY: locked.
            let found = unsafe { target.find_entry(key) };
            // SAFETY: locked just above.
            unsafe { target.unlock() };
            return found;
        }
    }

    /// Removes `key`, returning the value it held.
    pub fn remove(&self, key: i64) -> Option<i64> {
        debug_assert!(
            key > i64::MIN && key < i64::MAX,
            "key {} collides with a sentinel anchor",
            key
        );
        let _op = registry::pin(&self.contexts);
        counter!(OPERATIONS_TOTAL, LABEL_OPERATION_TYPE => "remove").increment(1);
        loop {
            let splice = self.locate_containing(key);
            // Top level at which the containing block is present.
            let mut rlevel = 0;
            while rlevel < self.max_level && ptr::eq(splice.curr[rlevel + 1], splice.curr[rlevel])
            {
                rlevel += 1;
            }
            let Some(locked) = self.lock_splice(&splice, rlevel) else {
                counter!(DESCENT_RESTARTS_TOTAL).increment(1);
                continue;
            };
            let victim = splice.curr[0];
            // SAFETY: `victim` is locked via `lock_splice`.
            let removed = unsafe { victim.remove_entry(key) };
            if removed.is_some() {
                self.len.fetch_sub(1, Ordering::Relaxed);
            }
            // Emptied blocks stay linked: unlinking would need a merge with
            // the predecessor, and a vacant block is routed through and
            // refilled like any other.
            release_locks(&locked);
            return removed;
        }
    }

    /// Splits the full `splice.prev[0]` under the locks held by the caller
    /// for every level in `0..=rlevel`, publishing a fresh block that takes
    /// over the upper half of the key range.
    fn split(&self, splice: &Splice<'_>, rlevel: usize) {
        let full = splice.prev[0];
        // SAFETY: locked by the caller.
        let (pivot, upper) = unsafe { full.split_upper_half() };
        let next = Box::into_raw(Block::with_entries(pivot, self.max_level + 1, upper));
        for level in 0..=rlevel {
            // The new block is wired up before it becomes reachable; both
            // bracketing versions are bumped so any descent that cached this
            // neighbourhood restarts.
            // SAFETY: `next` is unpublished below `level`; `prev`/`curr` are
            // locked by the caller.
            unsafe { (*next).set_forward(level, blk_mut(splice.curr[level])) };
            splice.curr[level].bump_version();
            splice.prev[level].set_forward(level, next);
            splice.prev[level].bump_version();
        }
        counter!(SPLITS_TOTAL).increment(1);
        trace!(
            "split block anchored at {}: pivot {}, top level {}",
            full.anchor(),
            pivot,
            rlevel
        );
    }

    /// Writes a level-0 walk of the list: every block's anchor, the anchors
    /// of its successors per level, and its keys.
    ///
    /// Diagnostic only. Takes no locks, so the output is only meaningful on
    /// a quiescent list.
    pub fn dump(&self, w: &mut impl io::Write) -> io::Result<()> {
        let mut node = self.head;
        while !node.is_null() {
            // SAFETY: reachable blocks stay allocated for the list's life.
            let b = unsafe { &*node };
            write!(w, "[anchor={} forward={{ ", b.anchor())?;
            for level in 0..=self.max_level {
                let next = b.forward(level);
                if next.is_null() {
                    break;
                }
                // SAFETY: as above.
                write!(w, "{} ", unsafe { &*next }.anchor())?;
            }
            write!(w, "}} values={{ ")?;
            // SAFETY: quiescence is the caller's contract.
            for entry in unsafe { b.entries() } {
                write!(w, "{} ", entry.key)?;
            }
            writeln!(w, "}}]")?;
            node = b.forward(0);
        }
        Ok(())
    }

    #[cfg(test)]
    fn check_structure(&self) {
        use std::collections::HashSet;

        unsafe {
            let mut below: Option<HashSet<*mut Block>> = None;
            for level in 0..=self.max_level {
                let mut seen = HashSet::new();
                let mut node = self.head;
                let mut last_anchor = None;
                while !node.is_null() {
                    let b = &*node;
                    if let Some(last) = last_anchor {
                        assert!(
                            last < b.anchor(),
                            "anchors out of order at level {}",
                            level
                        );
                    }
                    last_anchor = Some(b.anchor());
                    if level == 0 {
                        assert!(
                            b.len() <= self.block_capacity,
                            "block anchored at {} over capacity",
                            b.anchor()
                        );
                        let next = b.forward(0);
                        if !next.is_null() {
                            let upper = (*next).anchor();
                            for entry in b.entries() {
                                assert!(
                                    b.anchor() <= entry.key && entry.key < upper,
                                    "key {} routed outside [{}, {})",
                                    entry.key,
                                    b.anchor(),
                                    upper
                                );
                            }
                        }
                    }
                    seen.insert(node);
                    node = b.forward(level);
                }
                assert_eq!(last_anchor, Some(i64::MAX), "level {} missing the tail", level);
                if let Some(wider) = &below {
                    for ptr in &seen {
                        assert!(
                            wider.contains(ptr),
                            "block present at level {} but absent below",
                            level
                        );
                    }
                }
                below = Some(seen);
            }
        }
    }
}

impl Drop for BlockSkipList {
    fn drop(&mut self) {
        self.gc.stop();
        // Anything still queued in the collector is freed by its own drop;
        // everything reachable at level 0 is freed here, sentinels included.
        let mut node = self.head;
        while !node.is_null() {
            // SAFETY: each level-0 block is owned by the list and visited
            // exactly once.
            let next = unsafe { (*node).forward(0) };
            drop(unsafe { Box::from_raw(node) });
            node = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    fn small_list() -> BlockSkipList {
        BlockSkipList::builder()
            .p(0.25)
            .max_level(8)
            .block_capacity(4)
            .build()
            .unwrap()
    }

    #[test]
    fn new_list_is_empty() {
        let list = small_list();
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
        assert_eq!(list.get(42), None);
        list.check_structure();
    }

    #[test]
    fn builder_rejects_invalid_parameters() {
        assert!(matches!(
            BlockSkipList::builder().p(0.0).build(),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            BlockSkipList::builder().p(1.0).build(),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            BlockSkipList::builder().max_level(0).build(),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            BlockSkipList::builder().block_capacity(1).build(),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn insert_and_get_shuffled() {
        let list = BlockSkipList::builder()
            .p(0.25)
            .max_level(16)
            .block_capacity(16)
            .build()
            .unwrap();

        let mut keys: Vec<i64> = (1..=1024).collect();
        keys.shuffle(&mut rand::rngs::StdRng::seed_from_u64(7));
        for &k in &keys {
            list.insert(k, k);
        }

        assert_eq!(list.len(), 1024);
        for &k in &keys {
            assert_eq!(list.get(k), Some(k), "key {} lost", k);
        }
        assert_eq!(list.get(0), None);
        assert_eq!(list.get(1025), None);
        list.check_structure();
    }

    #[test]
    fn insert_overwrites_existing_key() {
        let list = small_list();
        list.insert(5, 100);
        list.insert(5, 200);
        assert_eq!(list.get(5), Some(200));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn remove_round_trip() {
        let list = small_list();
        list.insert(7, 7);
        assert_eq!(list.remove(7), Some(7));
        assert_eq!(list.get(7), None);
        assert_eq!(list.remove(7), None);
        assert_eq!(list.len(), 0);
        list.check_structure();
    }

    #[test]
    fn tiny_blocks_force_splits() {
        let list = small_list();
        for k in 0..256 {
            list.insert(k, k * 2);
        }
        assert_eq!(list.len(), 256);
        for k in 0..256 {
            assert_eq!(list.get(k), Some(k * 2));
        }
        list.check_structure();
    }

    #[test]
    fn mixed_inserts_and_removes_keep_structure() {
        let list = small_list();
        let mut rng = rand::rngs::StdRng::seed_from_u64(21);
        let mut keys: Vec<i64> = (0..512).collect();
        keys.shuffle(&mut rng);
        for &k in &keys {
            list.insert(k, k);
        }
        for &k in keys.iter().filter(|k| *k % 3 == 0) {
            assert_eq!(list.remove(k), Some(k));
        }
        let expected = keys.iter().filter(|k| *k % 3 != 0).count();
        assert_eq!(list.len(), expected);
        for &k in &keys {
            if k % 3 == 0 {
                assert_eq!(list.get(k), None);
            } else {
                assert_eq!(list.get(k), Some(k));
            }
        }
        list.check_structure();
    }

    #[test]
    fn boundary_keys_are_routable() {
        let list = small_list();
        list.insert(i64::MIN + 1, -1);
        list.insert(i64::MAX - 1, 1);
        assert_eq!(list.get(i64::MIN + 1), Some(-1));
        assert_eq!(list.get(i64::MAX - 1), Some(1));
        assert_eq!(list.remove(i64::MIN + 1), Some(-1));
        list.check_structure();
    }

    #[test]
    fn negative_values_are_ordinary() {
        let list = small_list();
        list.insert(1, -1);
        assert_eq!(list.get(1), Some(-1));
        assert_eq!(list.remove(1), Some(-1));
    }

    #[test]
    fn rand_level_stays_in_range() {
        let list = BlockSkipList::builder()
            .p(0.5)
            .max_level(4)
            .block_capacity(8)
            .build()
            .unwrap();
        for _ in 0..10_000 {
            let level = list.rand_level();
            assert!(level < 4);
        }
    }

    #[test]
    fn dump_walks_level_zero() {
        let list = small_list();
        for k in [10, 20, 30, 40, 50] {
            list.insert(k, k);
        }
        let mut out = Vec::new();
        list.dump(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("anchor"));
        for k in ["10", "20", "30", "40", "50"] {
            assert!(text.contains(k), "dump missing key {}", k);
        }
    }
}
