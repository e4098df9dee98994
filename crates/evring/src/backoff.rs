use std::hint;
use std::thread;
use std::time::Duration;

/// Sleep used by producers spinning on a full ring or a pending commit.
///
/// A zero duration degrades to a single PAUSE hint; anything else goes
/// through the OS sleep, which rounds up to scheduler granularity. The
/// default of 1 ns is therefore "yield the CPU briefly", not a precise
/// delay — producers blocked on back-pressure wake at scheduler
/// resolution, which is the intent.
#[inline]
pub fn spin_sleep(nanos: u64) {
    if nanos == 0 {
        hint::spin_loop();
    } else {
        thread::sleep(Duration::from_nanos(nanos));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spin_sleep_zero_returns() {
        // Degenerate case must not sleep at all.
        spin_sleep(0);
        spin_sleep(1);
    }
}
