//! Defines the metric keys and labels used throughout the crate.
//!
//! Using a central module for these constants helps prevent typos and
//! ensures consistency across the codebase.

// --- Metric Keys ---

/// Tracks the total number of user-initiated operations.
///
/// Labels:
/// - `type`: "insert", "get", "remove"
pub const OPERATIONS_TOTAL: &str = "stratamap_operations_total";

/// Tracks the total number of block splits.
pub const SPLITS_TOTAL: &str = "stratamap_block_splits_total";

/// Tracks how often an optimistic descent observed a concurrent structural
/// change and restarted from the top level.
pub const DESCENT_RESTARTS_TOTAL: &str = "stratamap_descent_restarts_total";

/// Tracks the total number of retired blocks reclaimed by the collector.
pub const GC_RECLAIMED_TOTAL: &str = "stratamap_gc_blocks_reclaimed_total";

/// A gauge holding the current depth of the pending-reclamation queue.
pub const GC_PENDING_ITEMS: &str = "stratamap_gc_pending_items";

/// A histogram measuring the duration of one reclamation pass in seconds.
pub const GC_PASS_DURATION_SECONDS: &str = "stratamap_gc_pass_duration_seconds";

// --- Label Keys ---

pub const LABEL_OPERATION_TYPE: &str = "type";
