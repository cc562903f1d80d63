//! Deferred reclamation for unlinked blocks.
//!
//! Writers cannot free a block the moment they unlink it: a concurrent
//! descent may still be walking through its stale forward pointers. Instead
//! they hand the block to the [`GarbageCollector`], which queues it together
//! with the timestamp at which it was retired. A background thread (or an
//! explicit [`GarbageCollector::perform_gc_pass`]) later frees every queued
//! item whose timestamp precedes the epoch of every thread currently inside
//! an operation — at that point no live traversal can have observed the
//! retired pointer.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use ::metrics::{counter, gauge, histogram};
use log::{debug, error, trace};
use parking_lot::{Condvar, Mutex};

use crate::clock;
use crate::metrics::{GC_PASS_DURATION_SECONDS, GC_PENDING_ITEMS, GC_RECLAIMED_TOTAL};
use crate::registry::ThreadContextList;

/// Options for the background reclamation thread.
#[derive(Debug, Clone, Copy)]
pub struct GcOptions {
    /// How long the background thread sleeps between passes.
    pub interval: Duration,
}

impl Default for GcOptions {
    fn default() -> Self {
        GcOptions {
            interval: Duration::from_secs(1),
        }
    }
}

/// A pointer that may cross to the collector thread. The deleter that
/// travels with it is the sole owner of the pointee.
struct SendPtr<T>(*mut T);

unsafe impl<T> Send for SendPtr<T> {}

/// One queued deallocation: the retirement timestamp, the raw pointer (kept
/// only for diagnostics), and the type-erased destructor.
struct Retired {
    timestamp: u64,
    pointer: *mut (),
    deleter: Box<dyn FnOnce() + Send>,
}

unsafe impl Send for Retired {}

struct State {
    queue: VecDeque<Retired>,
    shutdown: bool,
}

/// Timestamp-ordered deferred deallocation.
///
/// The queue is FIFO and retirement timestamps are monotone, so a pass can
/// stop at the first item that is not yet safe to free.
pub struct GarbageCollector {
    contexts: Arc<ThreadContextList>,
    interval: Duration,
    state: Mutex<State>,
    wakeup: Condvar,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl GarbageCollector {
    pub fn new(contexts: Arc<ThreadContextList>, options: GcOptions) -> GarbageCollector {
        GarbageCollector {
            contexts,
            interval: options.interval,
            state: Mutex::new(State {
                queue: VecDeque::new(),
                shutdown: false,
            }),
            wakeup: Condvar::new(),
            worker: Mutex::new(None),
        }
    }

    /// Queues `pointer` for deferred release via `Box::from_raw`.
    ///
    /// # Safety
    ///
    /// `pointer` must originate from `Box::into_raw`, must not be freed by
    /// anyone else, and must not be dereferenced by any thread that starts
    /// an operation after this call returns.
    pub unsafe fn mark<T: Send + 'static>(&self, pointer: *mut T) {
        self.mark_with(pointer, |p| drop(unsafe { Box::from_raw(p) }));
    }

    /// Queues `pointer` with a caller-supplied destructor, for blocks whose
    /// release needs more than a plain drop.
    ///
    /// # Safety
    ///
    /// As for [`GarbageCollector::mark`]; in addition `deleter` must fully
    /// release whatever `pointer` owns, exactly once.
    pub unsafe fn mark_with<T: 'static, F>(&self, pointer: *mut T, deleter: F)
    where
        F: FnOnce(*mut T) + Send + 'static,
    {
        let timestamp = clock::now();
        let sendable = SendPtr(pointer);
        let retired = Retired {
            timestamp,
            pointer: pointer.cast(),
            deleter: Box::new(move || {
                let sendable = sendable;
                deleter(sendable.0)
            }),
        };
        let mut state = self.state.lock();
        state.queue.push_back(retired);
        gauge!(GC_PENDING_ITEMS).set(state.queue.len() as f64);
    }

    /// Starts the background thread. Idempotent: a second call while the
    /// thread is running is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }
        self.state.lock().shutdown = false;
        let collector = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("stratamap-gc".into())
            .spawn(move || collector.run())
            .expect("failed to spawn the garbage collector thread");
        *worker = Some(handle);
    }

    /// Signals the background thread to exit and joins it.
    pub fn stop(&self) {
        let handle = self.worker.lock().take();
        {
            let mut state = self.state.lock();
            state.shutdown = true;
        }
        self.wakeup.notify_all();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("garbage collector thread panicked");
            }
        }
    }

    fn run(&self) {
        debug!("garbage collector started, interval {:?}", self.interval);
        loop {
            let mut state = self.state.lock();
            if state.shutdown {
                break;
            }
            self.wakeup.wait_for(&mut state, self.interval);
            if state.shutdown {
                break;
            }
            drop(state);
            self.perform_gc_pass();
        }
        debug!("garbage collector stopped");
    }

    /// Runs a single reclamation pass.
    ///
    /// Items are freed in retirement order, up to (not including) the first
    /// item whose timestamp is not older than every published epoch. When no
    /// thread is inside an operation the whole queue is eligible.
    pub fn perform_gc_pass(&self) {
        let started = Instant::now();
        let safe_before = self
            .contexts
            .snapshot_min_epoch()
            .unwrap_or_else(clock::now);

        let mut ready = Vec::new();
        {
            let mut state = self.state.lock();
            while state
                .queue
                .front()
                .is_some_and(|item| item.timestamp < safe_before)
            {
                if let Some(item) = state.queue.pop_front() {
                    ready.push(item);
                }
            }
            gauge!(GC_PENDING_ITEMS).set(state.queue.len() as f64);
        }

        if !ready.is_empty() {
            trace!(
                "reclaiming {} block(s) retired before epoch {}",
                ready.len(),
                safe_before
            );
        }
        let reclaimed = ready.len() as u64;
        // Destructors run outside the queue lock.
        for item in ready {
            (item.deleter)();
        }
        counter!(GC_RECLAIMED_TOTAL).increment(reclaimed);
        histogram!(GC_PASS_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    }

    /// Number of queued items not yet reclaimed.
    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Writes the pending queue, oldest first, for diagnostics.
    pub fn dump(&self, w: &mut impl io::Write) -> io::Result<()> {
        let state = self.state.lock();
        writeln!(w, "garbage collector: {} item(s) pending", state.queue.len())?;
        for (index, item) in state.queue.iter().enumerate() {
            writeln!(
                w,
                "  [{}] timestamp={} pointer={:p}",
                index, item.timestamp, item.pointer
            )?;
        }
        Ok(())
    }
}

impl Drop for GarbageCollector {
    fn drop(&mut self) {
        self.stop();
        // Whatever is still queued belongs to nobody else now.
        let mut state = self.state.lock();
        while let Some(item) = state.queue.pop_front() {
            (item.deleter)();
        }
    }
}
