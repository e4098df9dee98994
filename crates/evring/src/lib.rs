//! evring - Bounded MPMC Event Ring with a Worker-Pool Consumer Model
//!
//! A fixed-capacity ring of owned event handles with a monotone sequence
//! space: producers reserve sequences with a fetch-add, commit strictly
//! in order through a CAS cursor, and consumers observe events in commit
//! order. Enqueue never fails — a full ring throttles producers with a
//! nanosecond-scale spin-sleep.
//!
//! # Key pieces
//!
//! - [`Ring`] — the sequenced MPMC ring over any owned item type
//! - [`Event`] / [`EventQueue`] — boxed deferred-work items and the queue
//!   that invokes them (single- or multi-consumer)
//! - [`EventWorkerPool`] — N threads draining one queue under one
//!   [`Monitor`], with cooperative shutdown
//! - [`SpinLock`] / [`SleepLock`] / [`Monitor`] — the synchronization
//!   toolkit the above are built from
//!
//! # Example
//!
//! ```
//! use evring::{EventQueue, FnEvent};
//!
//! let queue = EventQueue::with_capacity(64);
//!
//! queue.add(FnEvent::boxed(|| {
//!     println!("deferred work");
//!     true
//! }));
//!
//! // Process queue (single consumer)
//! queue.process();
//! ```

mod backoff;
mod event;
mod invariants;
mod pool;
mod queue;
mod ring;
mod sync;

pub use backoff::spin_sleep;
pub use event::{BoxEvent, Event, FnEvent};
pub use pool::EventWorkerPool;
pub use queue::EventQueue;
pub use ring::Ring;
pub use sync::{Monitor, MonitorGuard, SleepLock, SpinGuard, SpinLock};
