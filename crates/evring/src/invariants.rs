//! Debug assertion macros for ring invariants.
//!
//! Active in debug builds only (`debug_assert!`), so release builds pay
//! nothing for them.

/// Assert that the reserved window never exceeds capacity.
///
/// Holds after a producer clears the back-pressure spin: `seq - read < capacity`.
macro_rules! debug_assert_window {
    ($seq:expr, $read:expr, $capacity:expr) => {
        debug_assert!(
            $seq.wrapping_sub($read) < $capacity as u64,
            "reserved sequence {} outside capacity window (read {}, capacity {})",
            $seq,
            $read,
            $capacity
        )
    };
}

/// Assert that a cursor only moves forward.
macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "{} cursor decreased from {} to {}",
            $name,
            $old,
            $new
        )
    };
}

/// Assert that a sequence about to be read is committed.
///
/// A reader must only touch slots in `[read, cursor]`.
macro_rules! debug_assert_committed_read {
    ($seq:expr, $cursor:expr) => {
        debug_assert!(
            $seq <= $cursor,
            "reading sequence {} past commit cursor {}",
            $seq,
            $cursor
        )
    };
}

pub(crate) use debug_assert_committed_read;
pub(crate) use debug_assert_monotonic;
pub(crate) use debug_assert_window;
