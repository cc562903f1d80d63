//! Per-thread activity epochs.
//!
//! Every thread that touches the list registers a [`ThreadContext`] holding
//! a single published timestamp: the moment it entered its current operation,
//! or zero while it is outside one. The garbage collector snapshots the
//! minimum published epoch to decide which retired blocks no thread can
//! still be observing.
//!
//! Registration is lazy and thread-local: the first operation a thread runs
//! against a given list registers it, and the registration is dropped (and
//! the context deregistered) when the thread exits.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::clock;

/// One thread's published activity epoch.
pub struct ThreadContext {
    /// Timestamp taken on operation entry; 0 while the thread is outside.
    epoch: AtomicU64,
}

impl ThreadContext {
    fn new() -> ThreadContext {
        ThreadContext {
            epoch: AtomicU64::new(0),
        }
    }

    /// Publishes the current timestamp, marking this thread as inside an
    /// operation.
    pub fn enter(&self) {
        self.epoch.store(clock::now(), Ordering::SeqCst);
    }

    /// Clears the published epoch, marking this thread as idle.
    pub fn exit(&self) {
        self.epoch.store(0, Ordering::SeqCst);
    }

    /// The last published epoch, or 0 when the thread is idle.
    pub fn last_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }
}

static NEXT_LIST_ID: AtomicU64 = AtomicU64::new(1);

/// The registry of all thread contexts attached to one list.
///
/// Enumeration is read-mostly: the garbage collector takes a short read
/// snapshot once per pass, while registration and deregistration (rare)
/// take the write side.
pub struct ThreadContextList {
    id: u64,
    contexts: RwLock<Vec<Arc<ThreadContext>>>,
}

impl ThreadContextList {
    pub fn new() -> ThreadContextList {
        ThreadContextList {
            id: NEXT_LIST_ID.fetch_add(1, Ordering::Relaxed),
            contexts: RwLock::new(Vec::new()),
        }
    }

    /// Adds a fresh context for the calling thread and returns it.
    pub fn register(&self) -> Arc<ThreadContext> {
        let context = Arc::new(ThreadContext::new());
        self.contexts.write().push(Arc::clone(&context));
        context
    }

    /// Removes a previously registered context.
    pub fn deregister(&self, context: &Arc<ThreadContext>) {
        self.contexts
            .write()
            .retain(|c| !Arc::ptr_eq(c, context));
    }

    /// The minimum epoch over all threads currently inside an operation, or
    /// `None` when every registered thread is idle.
    pub fn snapshot_min_epoch(&self) -> Option<u64> {
        self.contexts
            .read()
            .iter()
            .map(|c| c.last_epoch())
            .filter(|&e| e != 0)
            .min()
    }

    /// Number of registered contexts.
    pub fn registered(&self) -> usize {
        self.contexts.read().len()
    }
}

impl Default for ThreadContextList {
    fn default() -> Self {
        Self::new()
    }
}

/// Brackets one operation: publishes the calling thread's epoch on creation
/// and clears it on drop.
pub struct Guard {
    context: Arc<ThreadContext>,
}

impl Drop for Guard {
    fn drop(&mut self) {
        self.context.exit();
    }
}

struct Registration {
    list_id: u64,
    list: Weak<ThreadContextList>,
    context: Arc<ThreadContext>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(list) = self.list.upgrade() {
            list.deregister(&self.context);
        }
    }
}

thread_local! {
    static REGISTRATIONS: RefCell<Vec<Registration>> = const { RefCell::new(Vec::new()) };
}

/// Marks the calling thread as inside an operation on `list`, registering it
/// on first use. The returned [`Guard`] clears the published epoch when it
/// drops.
pub fn pin(list: &Arc<ThreadContextList>) -> Guard {
    let context = REGISTRATIONS.with(|registrations| {
        let mut registrations = registrations.borrow_mut();
        if let Some(existing) = registrations.iter().find(|r| r.list_id == list.id) {
            return Arc::clone(&existing.context);
        }
        let context = list.register();
        registrations.push(Registration {
            list_id: list.id,
            list: Arc::downgrade(list),
            context: Arc::clone(&context),
        });
        context
    });
    context.enter();
    Guard { context }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_epoch_ignores_idle_threads() {
        let list = ThreadContextList::new();
        let a = list.register();
        let b = list.register();
        assert_eq!(list.snapshot_min_epoch(), None);

        a.enter();
        let first = list.snapshot_min_epoch();
        assert_eq!(first, Some(a.last_epoch()));

        b.enter();
        // `a` entered earlier, so it still bounds the snapshot.
        assert_eq!(list.snapshot_min_epoch(), first);

        a.exit();
        assert_eq!(list.snapshot_min_epoch(), Some(b.last_epoch()));
        b.exit();
        assert_eq!(list.snapshot_min_epoch(), None);
    }

    #[test]
    fn deregister_removes_context() {
        let list = ThreadContextList::new();
        let context = list.register();
        assert_eq!(list.registered(), 1);
        list.deregister(&context);
        assert_eq!(list.registered(), 0);
    }

    #[test]
    fn pin_registers_once_per_thread() {
        let list = Arc::new(ThreadContextList::new());
        {
            let _first = pin(&list);
            assert_eq!(list.registered(), 1);
            assert!(list.snapshot_min_epoch().is_some());
        }
        assert_eq!(list.snapshot_min_epoch(), None);
        let _second = pin(&list);
        assert_eq!(list.registered(), 1);
    }

    #[test]
    fn thread_exit_deregisters() {
        let list = Arc::new(ThreadContextList::new());
        let list_clone = Arc::clone(&list);
        std::thread::spawn(move || {
            let _guard = pin(&list_clone);
            assert_eq!(list_clone.registered(), 1);
        })
        .join()
        .unwrap();
        assert_eq!(list.registered(), 0);
    }
}
