//! Property-based tests for ring structural invariants.

use evring::Ring;
use proptest::prelude::*;

proptest! {
    /// Effective capacity is the smallest power of two >= max(16, requested),
    /// clamped to the documented maximum.
    #[test]
    fn prop_capacity_rounding(requested in 0usize..1_000_000) {
        let ring = Ring::<u64>::with_capacity(requested);
        let cap = ring.capacity();

        prop_assert!(cap.is_power_of_two());
        prop_assert!(cap >= Ring::<u64>::MIN_CAPACITY);
        prop_assert!(cap <= Ring::<u64>::MAX_CAPACITY);
        prop_assert!(cap >= requested.max(Ring::<u64>::MIN_CAPACITY));
        // Smallest such power of two: halving it drops below the request.
        if cap > Ring::<u64>::MIN_CAPACITY {
            prop_assert!(cap / 2 < requested);
        }
    }

    /// The committed backlog never exceeds capacity after any interleaving
    /// of enqueues and pops.
    #[test]
    fn prop_bounded_backlog(ops in prop::collection::vec(prop::bool::ANY, 1..200)) {
        let ring = Ring::<u64>::with_capacity(16);
        let cap = ring.capacity();
        let mut queued = 0usize;

        for push in ops {
            if push {
                // Stay below capacity so single-threaded enqueue can't
                // block on back-pressure.
                if queued < cap {
                    ring.enqueue(queued as u64);
                    queued += 1;
                }
            } else if ring.try_pop().is_some() {
                queued -= 1;
            }
            prop_assert!(ring.len() <= cap);
            prop_assert_eq!(ring.len(), queued);
        }
    }

    /// Pops come back in exactly the order enqueued.
    #[test]
    fn prop_fifo_order(items in prop::collection::vec(any::<u64>(), 0..16)) {
        let ring = Ring::with_capacity(16);
        for &v in &items {
            ring.enqueue(v);
        }
        let mut out = Vec::new();
        while let Some(v) = ring.try_pop() {
            out.push(v);
        }
        prop_assert_eq!(out, items);
    }
}
