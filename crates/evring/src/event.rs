//! Event base type used with [`EventQueue`](crate::EventQueue) and
//! [`EventWorkerPool`](crate::EventWorkerPool).

/// A unit of deferred work.
///
/// An event is boxed by the producer and handed to a queue or pool, which
/// owns it until exactly one consumer pops and invokes it.
///
/// `invoke` consumes the box. Return `true` when the event finished and
/// was released here; return `false` when the event transferred itself to
/// another owner (re-queued itself, handed itself to a different
/// subsystem) before returning. Consumers use the return value for
/// accounting only — ownership already moved either way.
///
/// Caution: `invoke` must not panic. The queue runs events with no
/// recovery; a panic unwinds through a consumer thread and poisons
/// nothing but kills that worker.
pub trait Event: Send {
    /// Runs the event once, consuming it.
    fn invoke(self: Box<Self>) -> bool;
}

/// Boxed event handle as stored in a queue.
pub type BoxEvent = Box<dyn Event>;

/// Implement [`Event`] with a closure.
///
/// Convenient for small one-shot work items; for hot paths a concrete
/// type implementing [`Event`] avoids the extra indirection.
pub struct FnEvent<F> {
    func: F,
}

impl<F> FnEvent<F>
where
    F: FnOnce() -> bool + Send,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }

    /// Boxes the closure straight into an event handle.
    pub fn boxed(func: F) -> BoxEvent
    where
        F: 'static,
    {
        Box::new(Self { func })
    }
}

impl<F> Event for FnEvent<F>
where
    F: FnOnce() -> bool + Send,
{
    fn invoke(self: Box<Self>) -> bool {
        (self.func)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_fn_event_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let ev = FnEvent::boxed(move || {
            c.fetch_add(1, Ordering::SeqCst);
            true
        });
        assert!(ev.invoke());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_drop_tracking() {
        struct Tracked(Arc<AtomicUsize>);
        impl Drop for Tracked {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
        impl Event for Tracked {
            fn invoke(self: Box<Self>) -> bool {
                true
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        let ev: BoxEvent = Box::new(Tracked(Arc::clone(&drops)));
        ev.invoke();
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
