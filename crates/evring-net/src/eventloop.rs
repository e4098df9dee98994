use evring::{BoxEvent, EventQueue, Monitor};
use evring_log::{log_debug, Log, LogRef};
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};

/// Timer expiry hook.
///
/// Timers are one-shot: when one expires it is deactivated before
/// `on_timer` runs. To fire again, call [`TimerHandle::reset`] from the
/// handler.
pub trait OnTimer: Send + Sync {
    fn on_timer(&self, timer: &TimerHandle);
}

/// Outstanding-work probe registered by attached clients; the owning
/// loop runs until none of these report activity.
pub trait LoopTask: Send + Sync {
    fn is_active(&self) -> bool;
}

#[derive(PartialEq, Eq)]
struct TimerDue {
    deadline: Instant,
    id: u64,
}

// Min-heap by deadline.
impl Ord for TimerDue {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .deadline
            .cmp(&self.deadline)
            .then(other.id.cmp(&self.id))
    }
}

impl PartialOrd for TimerDue {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct TimerState {
    heap: BinaryHeap<TimerDue>,
    armed: HashMap<u64, (Instant, Arc<dyn OnTimer>)>,
}

/// The event-loop core: an event queue drained once per iteration, a
/// one-shot timer heap, and a wake/exit protocol safe from any thread.
///
/// This is the multiplexer-free default; an I/O-readiness loop can stand
/// in anywhere one of these is used, as long as it offers the same
/// run-one-iteration, wake, exit, and timer surface.
pub struct EventLoop {
    queue: EventQueue,
    monitor: Monitor,
    shutdown: AtomicBool,
    next_timer_id: AtomicU64,
    timers: Mutex<TimerState>,
}

impl EventLoop {
    /// Idle wait bound when no timer deadline is pending.
    const IDLE_WAIT_MS: u64 = 100;

    pub fn new() -> Arc<Self> {
        Self::with_capacity(EventQueue::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(queue_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            queue: EventQueue::with_capacity(queue_capacity),
            monitor: Monitor::new(),
            shutdown: AtomicBool::new(false),
            next_timer_id: AtomicU64::new(1),
            timers: Mutex::new(TimerState::default()),
        })
    }

    /// Whether the loop has not yet exited.
    pub fn active(&self) -> bool {
        !self.shutdown.load(Ordering::Acquire)
    }

    /// Queues an event to run on the loop thread and wakes the loop.
    ///
    /// Safe from any thread; this is how I/O-driven threads hand work to
    /// the iteration that drains the queue.
    pub fn post(&self, event: BoxEvent) {
        self.queue.add(event);
        self.wake();
    }

    /// Wakes a blocked [`run_once`](Self::run_once). Safe from any
    /// thread.
    pub fn wake(&self) {
        self.monitor.lock_notify_all();
    }

    /// Schedules loop exit. Idempotent and safe from any thread.
    pub fn shutdown(&self) {
        if self
            .shutdown
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.wake();
        }
    }

    /// Arms a fresh one-shot timer expiring after `ms` milliseconds.
    pub fn set_timer(self: &Arc<Self>, handler: Arc<dyn OnTimer>, ms: u64) -> TimerHandle {
        let id = self.next_timer_id.fetch_add(1, Ordering::Relaxed);
        self.arm(id, &handler, ms);
        self.wake();
        TimerHandle {
            core: Arc::downgrade(self),
            handler,
            id,
        }
    }

    fn arm(&self, id: u64, handler: &Arc<dyn OnTimer>, ms: u64) {
        let deadline = Instant::now() + Duration::from_millis(ms);
        let mut timers = lock(&self.timers);
        timers.armed.insert(id, (deadline, Arc::clone(handler)));
        timers.heap.push(TimerDue { deadline, id });
    }

    fn disarm(&self, id: u64) {
        lock(&self.timers).armed.remove(&id);
    }

    /// Runs one iteration: drain the queue, fire due timers, and when
    /// there was nothing to do, sleep until the next deadline or a wake.
    ///
    /// When every timer has fired and the queue is empty the loop exits
    /// naturally: shutdown is set and later calls return false. Only one
    /// thread may drive this at a time; other threads interact through
    /// [`post`](Self::post), [`wake`](Self::wake), and
    /// [`shutdown`](Self::shutdown).
    ///
    /// Returns false once the loop is no longer active.
    pub fn run_once(self: &Arc<Self>) -> bool {
        if !self.active() {
            return false;
        }

        let mut progressed = self.queue.process();
        progressed |= self.fire_due_timers();
        if progressed {
            return true;
        }

        let wait_ms = match self.next_deadline_ms() {
            Some(ms) => ms.max(1),
            None => {
                // Nothing queued, nothing armed: natural exit
                if self.queue.is_empty() {
                    self.shutdown();
                    return true;
                }
                Self::IDLE_WAIT_MS
            }
        };

        let guard = self.monitor.lock();
        // Re-check under the lock so a post() racing with the idle check
        // cannot be slept through.
        if self.queue.is_empty() && self.active() {
            let _ = self.monitor.wait_ms(guard, wait_ms);
        } else {
            drop(guard);
        }

        self.queue.process();
        self.fire_due_timers();
        true
    }

    fn next_deadline_ms(&self) -> Option<u64> {
        let timers = lock(&self.timers);
        let top = timers.heap.peek()?;
        if timers.armed.is_empty() {
            return None;
        }
        let now = Instant::now();
        Some(top.deadline.saturating_duration_since(now).as_millis() as u64)
    }

    fn fire_due_timers(self: &Arc<Self>) -> bool {
        let now = Instant::now();
        let mut due = Vec::new();
        {
            let mut timers = lock(&self.timers);
            while let Some(top) = timers.heap.peek() {
                if top.deadline > now {
                    break;
                }
                let entry = match timers.heap.pop() {
                    Some(entry) => entry,
                    None => break,
                };
                // Stale heap entries (cancelled or re-armed ids) are
                // skipped; the armed map holds the live deadline.
                let live = timers
                    .armed
                    .get(&entry.id)
                    .is_some_and(|(deadline, _)| *deadline == entry.deadline);
                if live {
                    if let Some((_, handler)) = timers.armed.remove(&entry.id) {
                        due.push((entry.id, handler));
                    }
                }
            }
        }

        let fired = !due.is_empty();
        for (id, handler) in due {
            let timer = TimerHandle {
                core: Arc::downgrade(self),
                handler: Arc::clone(&handler),
                id,
            };
            handler.on_timer(&timer);
        }
        fired
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to an armed (or fired) one-shot timer.
pub struct TimerHandle {
    core: Weak<EventLoop>,
    handler: Arc<dyn OnTimer>,
    id: u64,
}

impl TimerHandle {
    /// Re-arms the timer to expire after `ms` milliseconds.
    ///
    /// Usable from inside `on_timer` to make a periodic timer. Returns
    /// false when the loop is gone.
    pub fn reset(&self, ms: u64) -> bool {
        match self.core.upgrade() {
            Some(core) => {
                core.arm(self.id, &self.handler, ms);
                core.wake();
                true
            }
            None => false,
        }
    }

    /// Deactivates the timer if it has not fired yet.
    pub fn cancel(&self) {
        if let Some(core) = self.core.upgrade() {
            core.disarm(self.id);
        }
    }
}

/// Binds components to an event loop.
///
/// The first binding in a chain owns the loop; further bindings
/// [`attach`](Self::attach) to it and share the core without owning it.
/// Only the owner may drive iterations — attached bindings schedule
/// timers, post events, and register outstanding-work probes, and the
/// owner's [`run_local_until_idle`](Self::run_local_until_idle) runs
/// until every probe reports idle.
pub struct LoopBinding {
    core: Arc<EventLoop>,
    owner: bool,
    tasks: Arc<Mutex<Vec<Weak<dyn LoopTask>>>>,
    read_timeout_ms: u64,
    write_timeout_ms: u64,
    /// Low-level detail and error reporting; unset by default.
    pub logger: LogRef,
}

impl LoopBinding {
    /// Creates a binding that owns a fresh loop.
    pub fn new() -> Self {
        Self::with_capacity(EventQueue::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(queue_capacity: usize) -> Self {
        Self {
            core: EventLoop::with_capacity(queue_capacity),
            owner: true,
            tasks: Arc::new(Mutex::new(Vec::new())),
            read_timeout_ms: 0,
            write_timeout_ms: 0,
            logger: LogRef::none(),
        }
    }

    /// Attaches to `parent`'s loop. The new binding never owns the loop
    /// and cannot drive iterations.
    pub fn attach(parent: &LoopBinding) -> Self {
        Self {
            core: Arc::clone(&parent.core),
            owner: false,
            tasks: Arc::clone(&parent.tasks),
            read_timeout_ms: parent.read_timeout_ms,
            write_timeout_ms: parent.write_timeout_ms,
            logger: parent.logger.clone(),
        }
    }

    pub fn is_owner(&self) -> bool {
        self.owner
    }

    pub fn core(&self) -> &Arc<EventLoop> {
        &self.core
    }

    /// Sets the logger used for low-level detail and errors.
    pub fn set_logger(&mut self, logger: Option<Arc<dyn Log>>) {
        self.logger.set(logger);
    }

    /// Socket read/write timeouts handed to protocol code, 0 for none.
    pub fn set_timeout(&mut self, read_timeout_ms: u64, write_timeout_ms: u64) {
        self.read_timeout_ms = read_timeout_ms;
        self.write_timeout_ms = write_timeout_ms;
    }

    pub fn read_timeout_ms(&self) -> u64 {
        self.read_timeout_ms
    }

    pub fn write_timeout_ms(&self) -> u64 {
        self.write_timeout_ms
    }

    /// Queues an event onto the loop. Safe from any thread.
    pub fn post(&self, event: BoxEvent) {
        self.core.post(event);
    }

    /// Arms a one-shot timer on the loop.
    pub fn set_timer(&self, handler: Arc<dyn OnTimer>, ms: u64) -> TimerHandle {
        self.core.set_timer(handler, ms)
    }

    /// Registers an outstanding-work probe for
    /// [`run_local_until_idle`](Self::run_local_until_idle).
    pub fn register_task(&self, task: &Arc<dyn LoopTask>) {
        lock(&self.tasks).push(Arc::downgrade(task));
    }

    /// Runs one loop iteration. Returns false if this binding does not
    /// own the loop, or once the loop has exited.
    pub fn run_once(&self) -> bool {
        if !self.owner {
            return false;
        }
        self.core.run_once()
    }

    /// Schedules loop exit. Idempotent; safe from any thread and from
    /// attached bindings.
    pub fn shutdown(&self) {
        log_debug!(self.logger, "event loop shutdown requested");
        self.core.shutdown();
    }

    /// Runs iterations until no registered probe reports outstanding
    /// work. Returns false if this binding does not own the loop or the
    /// loop reports an error.
    pub fn run_local_until_idle(&self) -> bool {
        if !self.owner {
            return false;
        }
        if self.core.active() && !self.core.run_once() {
            return false;
        }
        let probes: Vec<Weak<dyn LoopTask>> = lock(&self.tasks).clone();
        for probe in probes {
            while self.core.active() {
                let active = match probe.upgrade() {
                    Some(task) => task.is_active(),
                    None => false,
                };
                if !active {
                    break;
                }
                if !self.core.run_once() {
                    return false;
                }
            }
        }
        // Dropped probes are pruned once idle
        lock(&self.tasks).retain(|w| w.upgrade().is_some());
        true
    }
}

impl Default for LoopBinding {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evring::FnEvent;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_post_runs_on_iteration() {
        let binding = LoopBinding::with_capacity(16);
        let ran = Arc::new(AtomicUsize::new(0));

        let r = Arc::clone(&ran);
        binding.post(FnEvent::boxed(move || {
            r.fetch_add(1, Ordering::SeqCst);
            true
        }));

        assert!(binding.run_once());
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_attached_binding_cannot_drive() {
        let parent = LoopBinding::new();
        let child = LoopBinding::attach(&parent);
        assert!(parent.is_owner());
        assert!(!child.is_owner());
        assert!(!child.run_once());
        assert!(!child.run_local_until_idle());
    }

    #[test]
    fn test_shutdown_idempotent() {
        let binding = LoopBinding::new();
        binding.shutdown();
        binding.shutdown();
        assert!(!binding.core().active());
        assert!(!binding.run_once());
    }

    #[test]
    fn test_natural_exit_when_idle() {
        let binding = LoopBinding::new();
        assert!(binding.run_once());
        assert!(!binding.core().active());
    }

    struct CountedTimer {
        fires: AtomicUsize,
        rearms: usize,
    }

    impl OnTimer for CountedTimer {
        fn on_timer(&self, timer: &TimerHandle) {
            let n = self.fires.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.rearms {
                timer.reset(1);
            }
        }
    }

    #[test]
    fn test_timer_fires_once_at_or_after_deadline() {
        let binding = LoopBinding::new();
        let handler = Arc::new(CountedTimer {
            fires: AtomicUsize::new(0),
            rearms: 0,
        });
        let start = Instant::now();
        let _timer = binding.set_timer(handler.clone(), 20);

        while binding.core().active() {
            binding.run_once();
        }
        assert_eq!(handler.fires.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_timer_rearm_fires_again() {
        let binding = LoopBinding::new();
        let handler = Arc::new(CountedTimer {
            fires: AtomicUsize::new(0),
            rearms: 2,
        });
        let _timer = binding.set_timer(handler.clone(), 5);

        while binding.core().active() {
            binding.run_once();
        }
        assert_eq!(handler.fires.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_cancelled_timer_never_fires() {
        let binding = LoopBinding::new();
        let handler = Arc::new(CountedTimer {
            fires: AtomicUsize::new(0),
            rearms: 0,
        });
        let timer = binding.set_timer(handler.clone(), 10);
        timer.cancel();

        while binding.core().active() {
            binding.run_once();
        }
        assert_eq!(handler.fires.load(Ordering::SeqCst), 0);
    }

    struct CountdownTask {
        remaining: AtomicUsize,
    }

    impl LoopTask for CountdownTask {
        fn is_active(&self) -> bool {
            self.remaining.load(Ordering::SeqCst) > 0
        }
    }

    #[test]
    fn test_run_local_until_idle_drains_task() {
        let binding = LoopBinding::with_capacity(16);
        let task = Arc::new(CountdownTask {
            remaining: AtomicUsize::new(3),
        });
        let probe: Arc<dyn LoopTask> = task.clone();
        binding.register_task(&probe);

        for _ in 0..3 {
            let t = Arc::clone(&task);
            binding.post(FnEvent::boxed(move || {
                t.remaining.fetch_sub(1, Ordering::SeqCst);
                true
            }));
        }

        assert!(binding.run_local_until_idle());
        assert_eq!(task.remaining.load(Ordering::SeqCst), 0);
    }
}
