use crate::event::BoxEvent;
use crate::queue::EventQueue;
use crate::sync::Monitor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// State shared between the pool handle and its worker threads.
struct PoolShared {
    queue: EventQueue,
    monitor: Monitor,
    shutdown: AtomicBool,
    wait_ms: u64,
}

/// Event processing thread pool.
///
/// Runs a group of threads as queue consumers. Events added with
/// [`add`](Self::add) are popped by exactly one worker, invoked, and
/// released when their `invoke` reports completion.
///
/// Use [`start`](Self::start) to launch workers, then
/// [`shutdown`](Self::shutdown) and [`join`](Self::join) to stop; drop
/// does both. In-flight events complete during shutdown; events still
/// queued are dropped without being invoked — drain first if that
/// matters.
///
/// # Example
///
/// ```
/// use evring::{EventWorkerPool, FnEvent};
///
/// let mut pool = EventWorkerPool::new();
/// pool.start(2);
/// pool.add(FnEvent::boxed(|| {
///     // ...
///     true
/// }));
/// pool.shutdown();
/// pool.join();
/// ```
pub struct EventWorkerPool {
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
}

impl EventWorkerPool {
    /// Default bound on a worker's idle wait, in milliseconds.
    pub const DEFAULT_WAIT_MS: u64 = 1;

    /// Creates a pool with default queue capacity and idle wait.
    pub fn new() -> Self {
        Self::with_config(EventQueue::new(), Self::DEFAULT_WAIT_MS)
    }

    /// Creates a pool with an explicit queue capacity and idle-wait
    /// bound. The bound is what heals a dropped best-effort wakeup, so
    /// keep it non-zero.
    pub fn with_capacity(capacity: usize, wait_ms: u64) -> Self {
        Self::with_config(EventQueue::with_capacity(capacity), wait_ms)
    }

    fn with_config(queue: EventQueue, wait_ms: u64) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                queue,
                monitor: Monitor::new(),
                shutdown: AtomicBool::new(false),
                wait_ms,
            }),
            workers: Vec::new(),
        }
    }

    /// Launches `count` worker threads.
    pub fn start(&mut self, count: usize) {
        for _ in 0..count {
            let shared = Arc::clone(&self.shared);
            self.workers.push(thread::spawn(move || {
                Self::worker(&shared);
            }));
        }
    }

    fn worker(shared: &PoolShared) {
        while !shared.shutdown.load(Ordering::Acquire) {
            shared
                .queue
                .process_multi_wait(&shared.monitor, &shared.shutdown, shared.wait_ms);
        }
    }

    /// Adds an event to be invoked by one worker.
    ///
    /// Takes ownership of the handle and wakes an idle worker
    /// best-effort. Blocks on back-pressure while the queue is full.
    ///
    /// Caution: do not call from an event running on this pool while the
    /// queue may be full — that is a self-deadlock. Adding after
    /// [`shutdown`](Self::shutdown) once workers have exited is a caller
    /// error; stop producers first.
    pub fn add(&self, event: BoxEvent) {
        self.shared.queue.add(event);
        self.shared.queue.notify(&self.shared.monitor);
    }

    /// Number of running workers.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Begins cooperative shutdown. Idempotent and safe from any thread;
    /// call [`join`](Self::join) to wait for workers to exit.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.monitor.lock_notify_all();
    }

    /// Waits for every worker to exit. Returns once all have.
    pub fn join(&mut self) {
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Default for EventWorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventWorkerPool {
    fn drop(&mut self) {
        self.shutdown();
        self.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::FnEvent;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_pool_runs_all_events() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut pool = EventWorkerPool::with_capacity(16, 1);
        pool.start(2);

        for _ in 0..100 {
            let count = Arc::clone(&count);
            pool.add(FnEvent::boxed(move || {
                count.fetch_add(1, Ordering::SeqCst);
                true
            }));
        }

        // Workers drain on their own; give them a bounded window.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while count.load(Ordering::SeqCst) < 100 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(count.load(Ordering::SeqCst), 100);

        pool.shutdown();
        pool.join();
    }

    #[test]
    fn test_shutdown_idempotent() {
        let mut pool = EventWorkerPool::new();
        pool.start(2);
        pool.shutdown();
        pool.shutdown();
        pool.join();
        pool.join();
        assert_eq!(pool.worker_count(), 0);
    }

    #[test]
    fn test_drop_without_start() {
        let pool = EventWorkerPool::new();
        drop(pool);
    }
}
