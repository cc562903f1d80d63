//! Tests for the metrics layer.

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshot, Snapshotter};
use once_cell::sync::Lazy;
use stratamap::metrics::{
    GC_RECLAIMED_TOTAL, LABEL_OPERATION_TYPE, OPERATIONS_TOTAL, SPLITS_TOTAL,
};
use stratamap::{BlockSkipList, GarbageCollector, GcOptions, ThreadContextList};
use std::sync::Arc;

/// Sets up a `DebuggingRecorder` to capture metrics emitted during a test.
/// This is wrapped in a `Lazy` to ensure it's only initialized once.
static SNAPSHOTTER: Lazy<Snapshotter> = Lazy::new(|| {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install recorder");
    snapshotter
});

/// Sums every counter named `name`, optionally restricted to one label pair.
/// The recorder is process-global and tests run in parallel, so assertions
/// below are floors, not exact values.
fn counter_total(snapshot: Snapshot, name: &str, label: Option<(&str, &str)>) -> u64 {
    snapshot
        .into_vec()
        .into_iter()
        .filter_map(|(composite_key, _, _, value)| {
            let (_, key) = composite_key.into_parts();
            if key.name() != name {
                return None;
            }
            if let Some((lk, lv)) = label {
                if !key.labels().any(|l| l.key() == lk && l.value() == lv) {
                    return None;
                }
            }
            match value {
                DebugValue::Counter(c) => Some(c),
                _ => None,
            }
        })
        .sum()
}

#[test]
fn operations_and_splits_are_counted() {
    let snapshotter = &*SNAPSHOTTER;

    let list = BlockSkipList::builder().block_capacity(4).build().unwrap();
    for k in 0..64 {
        list.insert(k, k);
    }
    for k in 0..64 {
        assert_eq!(list.get(k), Some(k));
    }
    for k in 0..32 {
        list.remove(k);
    }

    let snapshot = snapshotter.snapshot();
    let inserts = counter_total(
        snapshotter.snapshot(),
        OPERATIONS_TOTAL,
        Some((LABEL_OPERATION_TYPE, "insert")),
    );
    assert!(inserts >= 64, "insert counter too low: {}", inserts);
    let gets = counter_total(
        snapshotter.snapshot(),
        OPERATIONS_TOTAL,
        Some((LABEL_OPERATION_TYPE, "get")),
    );
    assert!(gets >= 64, "get counter too low: {}", gets);
    let removes = counter_total(
        snapshotter.snapshot(),
        OPERATIONS_TOTAL,
        Some((LABEL_OPERATION_TYPE, "remove")),
    );
    assert!(removes >= 32, "remove counter too low: {}", removes);

    // 64 inserts into capacity-4 blocks must have split repeatedly.
    let splits = counter_total(snapshot, SPLITS_TOTAL, None);
    assert!(splits >= 8, "split counter too low: {}", splits);
}

#[test]
fn reclamations_are_counted() {
    let snapshotter = &*SNAPSHOTTER;

    let contexts = Arc::new(ThreadContextList::new());
    let gc = GarbageCollector::new(contexts, GcOptions::default());
    let pointer = Box::into_raw(Box::new(7i64));
    // SAFETY: ownership of the allocation moves to the collector.
    unsafe { gc.mark(pointer) };
    gc.perform_gc_pass();

    let reclaimed = counter_total(snapshotter.snapshot(), GC_RECLAIMED_TOTAL, None);
    assert!(reclaimed >= 1, "reclaim counter too low: {}", reclaimed);
}
