use crate::backoff::spin_sleep;
use crate::invariants::{
    debug_assert_committed_read, debug_assert_monotonic, debug_assert_window,
};
use crate::sync::Monitor;
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{fence, AtomicBool, AtomicU64, Ordering};

// =============================================================================
// MEMORY ORDERING & SYNCHRONIZATION STRATEGY
// =============================================================================
//
// This MPMC ring uses a reservation/commit protocol with three unbounded
// u64 sequence counters (index = sequence & mask, so wrap-around of the
// buffer never aliases a live slot):
//
// - `next`   — next sequence a producer will reserve (fetch_add, AcqRel)
// - `cursor` — highest sequence committed and visible to consumers
// - `read`   — next sequence a consumer will take
//
// Counters start at 1 (`cursor` at 0), and `read <= cursor + 1 <= next`
// holds at all times. At one million operations per second the 64-bit
// sequence space lasts more than five hundred thousand years, so overflow
// is documented as out of reach rather than handled.
//
// **Producer (enqueue):**
// 1. Reserve: `seq = next.fetch_add(1, AcqRel)`
// 2. Back-pressure: spin-sleep while `seq - read >= capacity`; producers
//    are throttled by the slowest consumer, never failed
// 3. Store the item into `slots[seq & mask]` between an Acquire and a
//    Release fence
// 4. Commit strictly in order: CAS `cursor` from `seq - 1` to `seq`
//    (AcqRel, Acquire on failure), spin-sleeping until the previous
//    reservation has committed
//
// **Consumer (drain/pop):**
// 1. Load `read` and gate on `cursor` with Acquire — the Acquire load of
//    `cursor` synchronizes with the committing producer's Release, so
//    every write the producer made before enqueue is visible
// 2. Move the item out of the slot, then advance `read`
//
// A slot is only ever written by the producer holding its reservation and
// only ever read by the consumer that claimed its sequence, so the slot
// itself needs no atomics. The single-consumer entry points (`try_pop`,
// `drain`) require external serialization: results are undefined if two
// threads call them concurrently. The multi-consumer entry points take a
// Monitor whose mutex serializes pop-selection; the item is moved out and
// `read` advanced while holding it, and the event runs outside it.
// =============================================================================

/// Bounded MPMC ring of owned items with a monotone sequence space and an
/// explicit in-order commit cursor.
///
/// Enqueue never fails: a full ring throttles producers with a spin-sleep
/// until the slowest consumer frees a slot. Capacity is rounded up to a
/// power of two and clamped to `[MIN_CAPACITY, MAX_CAPACITY]`.
pub struct Ring<T> {
    /// Next sequence to reserve (producer claim counter).
    next: CachePadded<AtomicU64>,
    /// Highest sequence committed (visible to consumers).
    cursor: CachePadded<AtomicU64>,
    /// Next sequence a consumer will take.
    read: CachePadded<AtomicU64>,

    mask: u64,
    capacity: usize,

    /// Slot storage, indexed by `sequence & mask`.
    ///
    /// `Box<[_]>` rather than `Vec<_>`: the size is fixed at construction
    /// and never changes.
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

// Safety: slots are handed off producer -> consumer through the
// Release/Acquire pair on `cursor`; each slot has exactly one writer and
// one reader per sequence.
unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T> Ring<T> {
    /// Smallest effective capacity.
    pub const MIN_CAPACITY: usize = 16;
    /// Largest effective capacity.
    pub const MAX_CAPACITY: usize = (u32::MAX as usize >> 1) + 1;
    /// Capacity used by [`Ring::new`].
    pub const DEFAULT_CAPACITY: usize = 256;
    /// Producer spin-sleep used by the no-argument enqueue, in nanoseconds.
    pub const DEFAULT_SPIN_NANOS: u64 = 1;

    /// Creates a ring with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Creates a ring with `capacity` rounded up to the next power of two
    /// and clamped to `[MIN_CAPACITY, MAX_CAPACITY]`.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = Self::adjust_capacity(capacity);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || UnsafeCell::new(MaybeUninit::uninit()));

        Self {
            next: CachePadded::new(AtomicU64::new(1)),
            cursor: CachePadded::new(AtomicU64::new(0)),
            read: CachePadded::new(AtomicU64::new(1)),
            mask: (capacity - 1) as u64,
            capacity,
            slots: slots.into_boxed_slice(),
        }
    }

    fn adjust_capacity(capacity: usize) -> usize {
        if capacity <= Self::MIN_CAPACITY {
            Self::MIN_CAPACITY
        } else if capacity >= Self::MAX_CAPACITY {
            Self::MAX_CAPACITY
        } else {
            capacity.next_power_of_two()
        }
    }

    /// Returns the effective (rounded) capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of committed, not-yet-consumed items.
    ///
    /// A racy snapshot; exact only when producers and consumers are quiet.
    pub fn len(&self) -> usize {
        let cursor = self.cursor.load(Ordering::Acquire);
        let read = self.read.load(Ordering::Acquire);
        if cursor < read {
            0
        } else {
            (cursor - read + 1) as usize
        }
    }

    /// Returns whether no committed items are pending.
    pub fn is_empty(&self) -> bool {
        self.read.load(Ordering::Acquire) > self.cursor.load(Ordering::Acquire)
    }

    // ---------------------------------------------------------------------
    // PRODUCER API
    // ---------------------------------------------------------------------

    /// Adds an item, blocking on back-pressure while the ring is full.
    ///
    /// Equivalent to [`enqueue_spin`](Self::enqueue_spin) with
    /// [`DEFAULT_SPIN_NANOS`](Self::DEFAULT_SPIN_NANOS).
    #[inline]
    pub fn enqueue(&self, item: T) {
        self.enqueue_spin(item, Self::DEFAULT_SPIN_NANOS);
    }

    /// Adds an item, sleeping `spin_nanos` per back-pressure iteration.
    ///
    /// Takes ownership unconditionally; the item is handed to whichever
    /// consumer claims its sequence. A full ring should be avoided — the
    /// reservation blocks until the slowest consumer frees a slot.
    ///
    /// Caution: never call from a consumer of the same ring while it may
    /// be full; the reservation would wait on back-pressure only that
    /// consumer could relieve.
    pub fn enqueue_spin(&self, item: T, spin_nanos: u64) {
        // Claim a sequence, then wait for its slot to come free
        let seq = self.next.fetch_add(1, Ordering::AcqRel);
        while seq.wrapping_sub(self.read.load(Ordering::Acquire)) >= self.capacity as u64 {
            spin_sleep(spin_nanos);
        }
        debug_assert_window!(seq, self.read.load(Ordering::Acquire), self.capacity);

        fence(Ordering::Acquire);
        // SAFETY: the back-pressure loop above guarantees the previous
        // occupant of this slot was consumed (`seq - read < capacity`),
        // and only the producer holding reservation `seq` writes it.
        unsafe {
            (*self.slots[(seq & self.mask) as usize].get()).write(item);
        }
        fence(Ordering::Release);

        // Commit strictly in reservation order: wait for the previous
        // reservation to publish, then advance the cursor past ours.
        let prev = seq - 1;
        while self
            .cursor
            .compare_exchange(prev, seq, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            spin_sleep(spin_nanos);
        }
        debug_assert_monotonic!("cursor", prev, seq);
    }

    // ---------------------------------------------------------------------
    // SINGLE-CONSUMER API
    // ---------------------------------------------------------------------

    /// Takes the next committed item, or `None` when the ring is empty.
    ///
    /// Caution: single-consumer only — results are undefined if two
    /// threads pop concurrently. Use the `drain_multi*` entry points for
    /// shared consumption.
    pub fn try_pop(&self) -> Option<T> {
        let seq = self.read.load(Ordering::Acquire);
        if seq > self.cursor.load(Ordering::Acquire) {
            return None;
        }
        debug_assert_committed_read!(seq, self.cursor.load(Ordering::Acquire));
        let item = unsafe { self.take(seq) };
        self.read.fetch_add(1, Ordering::AcqRel);
        Some(item)
    }

    /// Drains every committed item into `f` and returns whether anything
    /// was drained.
    ///
    /// Caution: single-consumer only, like [`try_pop`](Self::try_pop).
    pub fn drain<F>(&self, mut f: F) -> bool
    where
        F: FnMut(T),
    {
        let start = self.read.load(Ordering::Acquire);
        let mut seq = start;
        while seq <= self.cursor.load(Ordering::Acquire) {
            let item = unsafe { self.take(seq) };
            seq = self.read.fetch_add(1, Ordering::AcqRel) + 1;
            f(item);
        }
        seq > start
    }

    // ---------------------------------------------------------------------
    // MULTI-CONSUMER API
    // ---------------------------------------------------------------------

    /// Drains committed items with pop-selection serialized by `monitor`.
    ///
    /// The monitor mutex is held only while an item is claimed; `f` runs
    /// with it released so other consumers can pop in parallel. All
    /// consumers of one ring must share the same monitor.
    pub fn drain_multi<F>(&self, monitor: &Monitor, mut f: F) -> bool
    where
        F: FnMut(T),
    {
        let mut count = 0u64;
        let mut guard = monitor.lock();
        loop {
            let seq = self.read.load(Ordering::Relaxed);
            if seq > self.cursor.load(Ordering::Acquire) {
                break;
            }
            let item = unsafe { self.take(seq) };
            self.read.fetch_add(1, Ordering::Release);
            drop(guard);
            f(item);
            count += 1;
            guard = monitor.lock();
        }
        drop(guard);
        count > 0
    }

    /// As [`drain_multi`](Self::drain_multi), but waits on the monitor
    /// with a `wait_ms` bound while empty, until `stop` becomes true.
    ///
    /// Producers should call [`Monitor::try_notify_one`] after enqueueing;
    /// the notification is best-effort, so `wait_ms` must be non-zero in
    /// practice for a missed notify to self-heal within the bound.
    pub fn drain_multi_wait<F>(
        &self,
        monitor: &Monitor,
        stop: &AtomicBool,
        wait_ms: u64,
        mut f: F,
    ) where
        F: FnMut(T),
    {
        let mut guard = monitor.lock();
        loop {
            loop {
                let seq = self.read.load(Ordering::Relaxed);
                if seq > self.cursor.load(Ordering::Acquire) {
                    break;
                }
                let item = unsafe { self.take(seq) };
                self.read.fetch_add(1, Ordering::Release);
                drop(guard);
                f(item);
                guard = monitor.lock();
            }
            if stop.load(Ordering::Relaxed) {
                break;
            }
            let (reacquired, _notified) = monitor.wait_ms(guard, wait_ms);
            guard = reacquired;
        }
        drop(guard);
    }

    /// Moves the item out of the slot for `seq`.
    ///
    /// # Safety
    ///
    /// `seq` must be committed (`seq <= cursor`), claimed by exactly this
    /// caller, and not yet taken.
    #[inline]
    unsafe fn take(&self, seq: u64) -> T {
        (*self.slots[(seq & self.mask) as usize].get()).assume_init_read()
    }
}

impl<T> Default for Ring<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        // Release items still committed but never consumed. Graceful
        // shutdown is expected to drain first; anything left here was
        // abandoned by the owner.
        let read = self.read.load(Ordering::Relaxed);
        let cursor = self.cursor.load(Ordering::Relaxed);
        let mut seq = read;
        while seq <= cursor {
            let idx = (seq & self.mask) as usize;
            unsafe {
                ptr::drop_in_place((*self.slots[idx].get()).as_mut_ptr());
            }
            seq += 1;
        }
    }
}
