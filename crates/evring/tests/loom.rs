//! Loom-based interleaving tests for the reserve/commit/read protocol.
//!
//! Run with: `cargo test --features loom --test loom --release`
//!
//! Loom exhaustively explores thread interleavings. The full ring's
//! back-pressure spin-sleep is outside loom's model, so these tests drive
//! a reduced model with the same counter protocol: fetch-add reservation,
//! fenced slot store, CAS commit on the predecessor sequence, Acquire
//! gate on the commit cursor.

#![cfg(feature = "loom")]

use loom::sync::atomic::{fence, AtomicU64, Ordering};
use loom::sync::Arc;
use loom::thread;
use std::cell::UnsafeCell;

const CAPACITY: usize = 4;

struct ModelRing {
    next: AtomicU64,
    cursor: AtomicU64,
    read: AtomicU64,
    slots: UnsafeCell<[u64; CAPACITY]>,
}

unsafe impl Send for ModelRing {}
unsafe impl Sync for ModelRing {}

impl ModelRing {
    fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            cursor: AtomicU64::new(0),
            read: AtomicU64::new(1),
            slots: UnsafeCell::new([0; CAPACITY]),
        }
    }

    /// Reserve + store + in-order commit. Capacity is never exceeded in
    /// these models, so the back-pressure loop is a no-op assertion.
    fn enqueue(&self, value: u64) {
        let seq = self.next.fetch_add(1, Ordering::AcqRel);
        assert!(seq - self.read.load(Ordering::Acquire) < CAPACITY as u64);

        fence(Ordering::Acquire);
        unsafe {
            (*self.slots.get())[(seq as usize) & (CAPACITY - 1)] = value;
        }
        fence(Ordering::Release);

        let prev = seq - 1;
        while self
            .cursor
            .compare_exchange(prev, seq, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            loom::thread::yield_now();
        }
    }

    fn try_pop(&self) -> Option<u64> {
        let seq = self.read.load(Ordering::Acquire);
        if seq > self.cursor.load(Ordering::Acquire) {
            return None;
        }
        let value = unsafe { (*self.slots.get())[(seq as usize) & (CAPACITY - 1)] };
        self.read.fetch_add(1, Ordering::AcqRel);
        Some(value)
    }
}

/// Two producers, one consumer: both items arrive, each exactly once,
/// and the commit order matches the reservation order.
#[test]
fn loom_two_producers_exactly_once() {
    loom::model(|| {
        let ring = Arc::new(ModelRing::new());

        let handles: Vec<_> = (0..2u64)
            .map(|p| {
                let ring = Arc::clone(&ring);
                thread::spawn(move || ring.enqueue(100 + p))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let a = ring.try_pop().expect("first committed item");
        let b = ring.try_pop().expect("second committed item");
        assert!(ring.try_pop().is_none());

        assert_ne!(a, b);
        assert!(a == 100 || a == 101);
        assert!(b == 100 || b == 101);
    });
}

/// Producer writes happen-before the consumer's observation of the
/// committed sequence.
#[test]
fn loom_commit_publishes_store() {
    loom::model(|| {
        let ring = Arc::new(ModelRing::new());

        let producer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || ring.enqueue(42))
        };

        // Either the pop sees nothing yet, or it sees the full store.
        let consumed_early = match ring.try_pop() {
            Some(v) => {
                assert_eq!(v, 42);
                true
            }
            None => false,
        };

        producer.join().unwrap();
        if !consumed_early {
            assert_eq!(ring.try_pop(), Some(42));
        }
        assert!(ring.try_pop().is_none());
    });
}
