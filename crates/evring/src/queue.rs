use crate::event::BoxEvent;
use crate::ring::Ring;
use crate::sync::Monitor;
use std::sync::atomic::AtomicBool;

/// Lock-free event processing queue.
///
/// Many producers [`add`](Self::add) events while one or more consumers
/// invoke them. Two consumer models are supported:
///
/// - **Single**: one thread calls [`process`](Self::process) repeatedly,
///   typically from an existing event loop that has its own way of
///   waiting. Only one thread may do this at a time.
/// - **Multi**: several threads call [`process_multi`](Self::process_multi)
///   (or the waiting variant) with a shared [`Monitor`]. The monitor only
///   serializes which consumer pops next; events always run outside it.
///
/// Every event is invoked exactly once, in commit order as observed by a
/// single consumer. Producers spin-wait while the queue is full, so a
/// full queue should be avoided.
///
/// Caution: an event running on a consumer of this queue must not `add`
/// to the same queue if it may be full — the reservation would block on
/// back-pressure only that consumer could relieve.
pub struct EventQueue {
    ring: Ring<BoxEvent>,
}

impl EventQueue {
    /// Capacity used by [`EventQueue::new`].
    pub const DEFAULT_CAPACITY: usize = Ring::<BoxEvent>::DEFAULT_CAPACITY;

    /// Creates a queue with the default capacity.
    pub fn new() -> Self {
        Self { ring: Ring::new() }
    }

    /// Creates a queue with `capacity` rounded like
    /// [`Ring::with_capacity`].
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: Ring::with_capacity(capacity),
        }
    }

    /// Returns the effective capacity.
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Returns whether no committed events are pending.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Adds an event, blocking on back-pressure while the queue is full.
    ///
    /// Takes ownership of the handle; it is released by whichever
    /// consumer invokes it. With consumers in
    /// [`process_multi_wait`](Self::process_multi_wait), follow up with
    /// [`notify`](Self::notify).
    pub fn add(&self, event: BoxEvent) {
        self.ring.enqueue(event);
    }

    /// As [`add`](Self::add) with an explicit back-pressure sleep.
    pub fn add_spin(&self, event: BoxEvent, spin_nanos: u64) {
        self.ring.enqueue_spin(event, spin_nanos);
    }

    /// Best-effort wakeup of one idle consumer.
    ///
    /// Non-blocking: skipped when the monitor is contended. The event is
    /// still picked up when a waiting consumer's bounded wait elapses.
    pub fn notify(&self, monitor: &Monitor) {
        monitor.try_notify_one();
    }

    /// Pops and invokes every queued event; returns whether any ran.
    ///
    /// Caution: only one thread may call this at a time, otherwise
    /// results are undefined.
    pub fn process(&self) -> bool {
        self.ring.drain(|event| {
            event.invoke();
        })
    }

    /// Pops and invokes queued events with pop-selection serialized by
    /// `monitor`; returns whether any ran.
    ///
    /// Do not mix with [`process`](Self::process) on the same queue.
    pub fn process_multi(&self, monitor: &Monitor) -> bool {
        self.ring.drain_multi(monitor, |event| {
            event.invoke();
        })
    }

    /// As [`process_multi`](Self::process_multi), waiting on `monitor`
    /// with a `wait_ms` bound while empty, until `stop` becomes true.
    pub fn process_multi_wait(&self, monitor: &Monitor, stop: &AtomicBool, wait_ms: u64) {
        self.ring.drain_multi_wait(monitor, stop, wait_ms, |event| {
            event.invoke();
        });
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
