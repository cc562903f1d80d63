//! The process-wide timestamp source for epoch accounting.
//!
//! Retirement timestamps are compared against epochs published by other
//! threads, so the source must be monotonic and consistent across cores. A
//! raw CPU cycle counter guarantees neither on multi-socket machines;
//! `Instant` does, at a cost that is negligible next to a queue append.

use std::time::Instant;

use once_cell::sync::Lazy;

static ANCHOR: Lazy<Instant> = Lazy::new(Instant::now);

/// Nanoseconds since the first timestamp taken by this process. Never zero:
/// the thread registry reserves 0 for "not inside an operation".
pub(crate) fn now() -> u64 {
    (ANCHOR.elapsed().as_nanos() as u64).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_are_monotonic_and_nonzero() {
        let a = now();
        let b = now();
        assert!(a > 0);
        assert!(b >= a);
    }
}
