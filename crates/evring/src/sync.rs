//! Small synchronization toolkit: an atomic-flag spin lock (with a
//! sleep-wait variant) and a monitor pairing a mutex with a condition
//! variable.
//!
//! The monitor is what serializes pop-selection in the worker pool and
//! what idle consumers sleep on. Producers never block on it: wakeups go
//! through [`Monitor::try_notify_one`], which drops the notification when
//! the mutex is contended. Consumers therefore always wait with a bound
//! so a missed notification heals itself.

use crossbeam_utils::Backoff;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

// ---------------------------------------------------------------------
// Spin lock
// ---------------------------------------------------------------------

/// Busy-wait lock over a single atomic flag.
///
/// Cheaper than a mutex when the critical section is a handful of
/// instructions and contention is rare. Prefer [`SleepLock`] when the
/// hold time is not known to be tiny.
#[derive(Debug, Default)]
pub struct SpinLock {
    flag: AtomicBool,
}

impl SpinLock {
    /// Creates an unlocked flag.
    pub const fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
        }
    }

    #[inline]
    fn try_acquire(&self) -> bool {
        !self.flag.swap(true, Ordering::Acquire)
    }

    /// Acquires the lock, spinning with adaptive backoff until free.
    pub fn lock(&self) -> SpinGuard<'_> {
        let backoff = Backoff::new();
        while !self.try_acquire() {
            backoff.snooze();
        }
        SpinGuard { lock: self }
    }

    /// Acquires the lock without blocking. Returns `None` if held.
    pub fn try_lock(&self) -> Option<SpinGuard<'_>> {
        if self.try_acquire() {
            Some(SpinGuard { lock: self })
        } else {
            None
        }
    }

    /// Acquires the lock, sleeping `nanos` between attempts instead of
    /// busy-spinning.
    pub fn lock_sleep(&self, nanos: u64) -> SpinGuard<'_> {
        while !self.try_acquire() {
            crate::backoff::spin_sleep(nanos);
        }
        SpinGuard { lock: self }
    }
}

/// RAII guard for [`SpinLock`]; releases the flag on drop.
#[derive(Debug)]
pub struct SpinGuard<'a> {
    lock: &'a SpinLock,
}

impl Drop for SpinGuard<'_> {
    fn drop(&mut self) {
        self.lock.flag.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------
// Sleep lock
// ---------------------------------------------------------------------

/// [`SpinLock`] variant whose `lock` sleeps a fixed duration per failed
/// attempt. Wastes less CPU than a pure spin when hold times are longer.
#[derive(Debug, Default)]
pub struct SleepLock {
    inner: SpinLock,
    nanos: u64,
}

impl SleepLock {
    pub const DEFAULT_SLEEP_NANOS: u64 = 1;

    /// Creates an unlocked flag with the default per-iteration sleep.
    pub const fn new() -> Self {
        Self::with_sleep(Self::DEFAULT_SLEEP_NANOS)
    }

    /// Creates an unlocked flag sleeping `nanos` per failed attempt.
    pub const fn with_sleep(nanos: u64) -> Self {
        Self {
            inner: SpinLock::new(),
            nanos,
        }
    }

    /// Acquires the lock, sleeping between attempts.
    pub fn lock(&self) -> SpinGuard<'_> {
        self.inner.lock_sleep(self.nanos)
    }

    /// Acquires the lock without blocking. Returns `None` if held.
    pub fn try_lock(&self) -> Option<SpinGuard<'_>> {
        self.inner.try_lock()
    }
}

// ---------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------

/// A mutex with an attached condition variable.
///
/// Lock poisoning is deliberately ignored: the protected state is the
/// unit value, so a panicking holder cannot leave it inconsistent.
#[derive(Debug, Default)]
pub struct Monitor {
    mutex: Mutex<()>,
    cond: Condvar,
}

/// RAII guard for [`Monitor::lock`]; unlocks on drop.
#[derive(Debug)]
pub struct MonitorGuard<'a> {
    inner: MutexGuard<'a, ()>,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the monitor mutex.
    pub fn lock(&self) -> MonitorGuard<'_> {
        MonitorGuard {
            inner: self.mutex.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Locks without blocking. Returns `None` if the mutex is held.
    pub fn try_lock(&self) -> Option<MonitorGuard<'_>> {
        match self.mutex.try_lock() {
            Ok(inner) => Some(MonitorGuard { inner }),
            Err(std::sync::TryLockError::Poisoned(e)) => Some(MonitorGuard {
                inner: e.into_inner(),
            }),
            Err(std::sync::TryLockError::WouldBlock) => None,
        }
    }

    /// Polls for the lock until `timeout_ms` elapses.
    ///
    /// The OS mutex has no timed acquire, so this retries with a short
    /// sleep; under sustained contention it can starve. Returns `None`
    /// on timeout.
    pub fn try_lock_for(&self, timeout_ms: u64) -> Option<MonitorGuard<'_>> {
        let deadline = std::time::Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if let Some(guard) = self.try_lock() {
                return Some(guard);
            }
            if std::time::Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(Duration::from_micros(100));
        }
    }

    /// Waits for a notification with no timeout.
    ///
    /// May wake spuriously; callers must re-check their condition.
    pub fn wait<'a>(&'a self, guard: MonitorGuard<'a>) -> MonitorGuard<'a> {
        MonitorGuard {
            inner: self
                .cond
                .wait(guard.inner)
                .unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Waits for a notification or until `timeout_ms` elapses.
    ///
    /// A zero timeout returns immediately. Returns the reacquired guard
    /// and whether the wait ended before the timeout.
    pub fn wait_ms<'a>(
        &'a self,
        guard: MonitorGuard<'a>,
        timeout_ms: u64,
    ) -> (MonitorGuard<'a>, bool) {
        if timeout_ms == 0 {
            return (guard, false);
        }
        let (inner, result) = self
            .cond
            .wait_timeout(guard.inner, Duration::from_millis(timeout_ms))
            .unwrap_or_else(PoisonError::into_inner);
        (MonitorGuard { inner }, !result.timed_out())
    }

    /// Wakes one waiting thread.
    pub fn notify_one(&self) {
        self.cond.notify_one();
    }

    /// Wakes all waiting threads.
    pub fn notify_all(&self) {
        self.cond.notify_all();
    }

    /// Locks, wakes one waiter, unlocks.
    pub fn lock_notify_one(&self) {
        let guard = self.lock();
        self.cond.notify_one();
        drop(guard);
    }

    /// Locks, wakes all waiters, unlocks.
    pub fn lock_notify_all(&self) {
        let guard = self.lock();
        self.cond.notify_all();
        drop(guard);
    }

    /// Best-effort wakeup: notifies one waiter only if the mutex is free.
    ///
    /// Returns whether a notification was sent. Dropped notifications are
    /// expected; waiters use a bounded [`Monitor::wait_ms`] to recover.
    pub fn try_notify_one(&self) -> bool {
        if let Some(guard) = self.try_lock() {
            self.cond.notify_one();
            drop(guard);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_spin_lock_mutual_exclusion() {
        let lock = Arc::new(SpinLock::new());
        let counter = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let lock = Arc::clone(&lock);
            let counter = Arc::clone(&counter);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    let _g = lock.lock();
                    let v = counter.load(Ordering::Relaxed);
                    counter.store(v + 1, Ordering::Relaxed);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 4000);
    }

    #[test]
    fn test_try_lock_fails_while_held() {
        let lock = SpinLock::new();
        let g = lock.lock();
        assert!(lock.try_lock().is_none());
        drop(g);
        assert!(lock.try_lock().is_some());
    }

    #[test]
    fn test_sleep_lock_roundtrip() {
        let lock = SleepLock::with_sleep(100);
        let g = lock.lock();
        assert!(lock.try_lock().is_none());
        drop(g);
        let _g2 = lock.lock();
    }

    #[test]
    fn test_monitor_wait_times_out() {
        let m = Monitor::new();
        let guard = m.lock();
        let (_guard, notified) = m.wait_ms(guard, 10);
        assert!(!notified);
    }

    #[test]
    fn test_monitor_notify_wakes_waiter() {
        let m = Arc::new(Monitor::new());
        let flag = Arc::new(AtomicBool::new(false));

        let m2 = Arc::clone(&m);
        let flag2 = Arc::clone(&flag);
        let h = thread::spawn(move || {
            let mut guard = m2.lock();
            while !flag2.load(Ordering::Acquire) {
                let (g, _) = m2.wait_ms(guard, 50);
                guard = g;
            }
        });

        thread::sleep(Duration::from_millis(5));
        flag.store(true, Ordering::Release);
        m.lock_notify_all();
        h.join().unwrap();
    }

    #[test]
    fn test_try_lock_for_times_out_and_recovers() {
        let m = Monitor::new();
        let guard = m.lock();
        let start = std::time::Instant::now();
        assert!(m.try_lock_for(20).is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
        drop(guard);
        assert!(m.try_lock_for(20).is_some());
    }

    #[test]
    fn test_try_notify_one_skips_contended_mutex() {
        let m = Monitor::new();
        let guard = m.lock();
        assert!(!m.try_notify_one());
        drop(guard);
        assert!(m.try_notify_one());
    }
}
