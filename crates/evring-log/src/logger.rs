use crate::record::Record;
use crate::Level;
use evring::{Monitor, Ring};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::SystemTime;

/// Default inline buffer size per queued message.
pub const DEFAULT_MESSAGE_BUFFER: usize = 512;

/// Errors surfaced by the logger's producer-side lifecycle calls.
///
/// Errors inside the consumer thread (file writes failing after startup)
/// are not returned from any call; they are stored and fetched with
/// [`Logger::last_error`].
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("log file path is empty")]
    EmptyPath,
    #[error("log file path must be a file, not a directory: {0}")]
    DirectoryPath(String),
    #[error("logger can't open a file while its thread is active")]
    ThreadActive,
    #[error("log file not open; call open() before start_thread()")]
    NotOpen,
    #[error("can't open log file {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Common logging interface.
///
/// Implemented by [`Logger`] and by [`NullLogger`]; components take an
/// optional `Arc<dyn Log>` to make their logging pluggable.
pub trait Log: Send + Sync {
    /// Whether a message at `level` would currently be recorded.
    ///
    /// Call before formatting so messages that won't be logged are never
    /// built — the helper macros do exactly this.
    fn check(&self, level: Level) -> bool;

    /// Records `msg` without re-checking the level.
    ///
    /// Assumes [`check`](Self::check) returned true.
    fn log_direct(&self, level: Level, msg: &str);

    /// Checks the level, then records. Returns whether it was recorded.
    fn log(&self, level: Level, msg: &str) -> bool {
        if self.check(level) {
            self.log_direct(level, msg);
            true
        } else {
            false
        }
    }

    /// Sets the severity floor; less severe messages are dropped.
    fn set_level(&self, level: Level);

    /// Requests that the consumer close and reopen the file between
    /// records. Safe from any thread, including a signal-handler shim.
    fn rotate(&self) {}

    /// Takes the last consumer-side error, resetting it.
    fn last_error(&self) -> Option<String> {
        None
    }
}

/// A logger that records nothing.
///
/// Useful where a [`Log`] implementation is required but output is
/// unwanted; `check` always answers false so callers skip formatting.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl Log for NullLogger {
    fn check(&self, _level: Level) -> bool {
        false
    }

    fn log_direct(&self, _level: Level, _msg: &str) {}

    fn set_level(&self, _level: Level) {}
}

/// An optional logger reference.
///
/// Components hold one of these to make logging pluggable: unset, every
/// `check` answers false and nothing is formatted or recorded.
#[derive(Clone, Default)]
pub struct LogRef {
    inner: Option<Arc<dyn Log>>,
}

impl LogRef {
    /// A disabled reference.
    pub fn none() -> Self {
        Self { inner: None }
    }

    pub fn new(logger: Arc<dyn Log>) -> Self {
        Self {
            inner: Some(logger),
        }
    }

    /// Replaces the referenced logger; `None` disables logging.
    pub fn set(&mut self, logger: Option<Arc<dyn Log>>) {
        self.inner = logger;
    }

    pub fn is_set(&self) -> bool {
        self.inner.is_some()
    }
}

impl Log for LogRef {
    fn check(&self, level: Level) -> bool {
        self.inner.as_ref().is_some_and(|l| l.check(level))
    }

    fn log_direct(&self, level: Level, msg: &str) {
        if let Some(logger) = &self.inner {
            logger.log_direct(level, msg);
        }
    }

    fn set_level(&self, level: Level) {
        if let Some(logger) = &self.inner {
            logger.set_level(level);
        }
    }

    fn rotate(&self) {
        if let Some(logger) = &self.inner {
            logger.rotate();
        }
    }

    fn last_error(&self) -> Option<String> {
        self.inner.as_ref().and_then(|l| l.last_error())
    }
}

struct Shared<const N: usize> {
    ring: Ring<Record<N>>,
    monitor: Monitor,
    shutdown: AtomicBool,
    rotate: AtomicBool,
    local_time: AtomicBool,
    level: AtomicU8,
    errmsg: Mutex<Option<String>>,
    path: Mutex<PathBuf>,
    file: Mutex<Option<File>>,
}

/// High performance background logger.
///
/// Producers queue records lock-free from any thread; one consumer
/// thread pops them and writes the file. A producer never blocks on the
/// consumer except through queue back-pressure, and never touches the
/// file handle.
///
/// Each record is written as `[DATE:TIME LEVEL] MESSAGE` with `DATE` as
/// `YYYY-MM-DD`, `TIME` as `HH:MM:SS`, and `LEVEL` one of `ALRT`, `ERRR`,
/// `WARN`, `INFO`, `dbug`, `dbgl`. Messages should not end with a
/// newline; embedded newlines are written as-is and should be followed by
/// indentation chosen by the caller. An empty line is written each time
/// the file is opened or re-opened.
///
/// Default severity floor: [`Level::Warn`].
///
/// `N` is the inline buffer size per queued message — messages within it
/// don't allocate when queued.
///
/// # Example
///
/// ```no_run
/// use evring_log::{log_error, log_info, Logger};
///
/// let mut logger = Logger::<512>::new();
/// logger.start("out.log").unwrap();
///
/// log_error!(logger, "something broke: {}", 123);
/// log_info!(logger, "not recorded at the default Warn floor");
/// // Drop flushes queued records and stops the thread.
/// ```
pub struct Logger<const N: usize = DEFAULT_MESSAGE_BUFFER> {
    shared: Arc<Shared<N>>,
    consumer: Option<JoinHandle<()>>,
}

impl<const N: usize> Logger<N> {
    /// Default queue size; override with [`with_queue_size`](Self::with_queue_size).
    pub const DEFAULT_QUEUE_SIZE: usize = 256;

    /// Bound on the consumer's idle wait. Producer wakeups are
    /// best-effort, so the consumer must wake on its own within this.
    const WAKE_TIMEOUT_MS: u64 = 500;

    /// Creates a logger with the default queue size.
    pub fn new() -> Self {
        Self::with_queue_size(Self::DEFAULT_QUEUE_SIZE)
    }

    /// Creates a logger whose queue holds `queue_size` records (rounded
    /// up to a power of two).
    pub fn with_queue_size(queue_size: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                ring: Ring::with_capacity(queue_size),
                monitor: Monitor::new(),
                shutdown: AtomicBool::new(false),
                rotate: AtomicBool::new(false),
                local_time: AtomicBool::new(false),
                level: AtomicU8::new(Level::Warn as u8),
                errmsg: Mutex::new(None),
                path: Mutex::new(PathBuf::new()),
                file: Mutex::new(None),
            }),
            consumer: None,
        }
    }

    /// Inline buffer size per queued message. Useful for pre-sizing a
    /// format buffer so messages within it never allocate when queued.
    pub fn message_buffer_size(&self) -> usize {
        N
    }

    /// Whether to convert record timestamps to local time. Adds a small
    /// per-record conversion cost on the consumer.
    pub fn set_local_time(&self, local: bool) {
        self.shared.local_time.store(local, Ordering::Relaxed);
    }

    /// The current severity floor.
    pub fn level(&self) -> Level {
        Level::from_u8(self.shared.level.load(Ordering::Relaxed))
    }

    /// Opens the log file without starting the consumer thread.
    ///
    /// Useful to confirm the file is writable before daemonizing; call
    /// [`start_thread`](Self::start_thread) afterwards.
    pub fn open<P: AsRef<Path>>(&mut self, path: P) -> Result<(), LogError> {
        if self.consumer.is_some() {
            let err = LogError::ThreadActive;
            self.shared.set_error(err.to_string());
            return Err(err);
        }

        let path = path.as_ref();
        let display = path.display().to_string();
        if display.is_empty() {
            let err = LogError::EmptyPath;
            self.shared.set_error(err.to_string());
            return Err(err);
        }
        if display.ends_with('/') {
            let err = LogError::DirectoryPath(display);
            self.shared.set_error(err.to_string());
            return Err(err);
        }

        match open_append(path) {
            Ok(mut file) => {
                if let Err(source) = file.write_all(b"\n") {
                    let err = LogError::Open {
                        path: display,
                        source,
                    };
                    self.shared.set_error(err.to_string());
                    return Err(err);
                }
                *lock(&self.shared.path) = path.to_path_buf();
                *lock(&self.shared.file) = Some(file);
                *lock(&self.shared.errmsg) = None;
                Ok(())
            }
            Err(source) => {
                let err = LogError::Open {
                    path: display,
                    source,
                };
                self.shared.set_error(err.to_string());
                Err(err)
            }
        }
    }

    /// Starts the consumer thread for an already open file.
    ///
    /// No-op if the thread is already running. Once started, consumer
    /// errors are reported through [`last_error`](Log::last_error).
    pub fn start_thread(&mut self) -> Result<(), LogError> {
        if self.consumer.is_some() {
            return Ok(());
        }
        if lock(&self.shared.file).is_none() {
            let err = LogError::NotOpen;
            self.shared.set_error(err.to_string());
            return Err(err);
        }
        *lock(&self.shared.errmsg) = None;
        self.shared.shutdown.store(false, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        self.consumer = Some(std::thread::spawn(move || consume(&shared)));
        Ok(())
    }

    /// Opens the log file and starts the consumer thread.
    pub fn start<P: AsRef<Path>>(&mut self, path: P) -> Result<(), LogError> {
        self.open(path)?;
        self.start_thread()
    }

    /// Stops the consumer thread after it drains the queue once.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.consumer.take() {
            self.shared.shutdown.store(true, Ordering::Release);
            self.shared.monitor.lock_notify_one();
            let _ = handle.join();
        }
    }
}

impl<const N: usize> Log for Logger<N> {
    fn check(&self, level: Level) -> bool {
        level != Level::Disabled && (level as u8) <= self.shared.level.load(Ordering::Relaxed)
    }

    fn log_direct(&self, level: Level, msg: &str) {
        if level == Level::Disabled {
            return;
        }
        self.shared.ring.enqueue(Record::new(level, msg.as_bytes()));
        self.shared.monitor.try_notify_one();
    }

    fn set_level(&self, level: Level) {
        self.shared.level.store(level as u8, Ordering::Relaxed);
    }

    fn rotate(&self) {
        self.shared.rotate.store(true, Ordering::Release);
    }

    fn last_error(&self) -> Option<String> {
        lock(&self.shared.errmsg).take()
    }
}

impl<const N: usize> Default for Logger<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Drop for Logger<N> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<const N: usize> Shared<N> {
    fn set_error(&self, msg: String) {
        *lock(&self.errmsg) = Some(msg);
    }

    fn current_error(&self) -> String {
        lock(&self.errmsg).clone().unwrap_or_default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// `[DATE:TIME LEVEL] ` prefix for one record.
fn format_header(timestamp: SystemTime, level: Level, local: bool) -> String {
    const STAMP: &str = "%Y-%m-%d:%H:%M:%S";
    let stamp = if local {
        chrono::DateTime::<chrono::Local>::from(timestamp)
            .format(STAMP)
            .to_string()
    } else {
        chrono::DateTime::<chrono::Utc>::from(timestamp)
            .format(STAMP)
            .to_string()
    };
    format!("[{} {}] ", stamp, level.tag())
}

/// Synthetic record written after the file becomes writable again.
fn format_recovery(lost: u64, errmsg: &str) -> String {
    format!("[] Logger recovered from error (lost: {}): {}\n", lost, errmsg)
}

fn write_record<const N: usize>(
    file: &mut File,
    record: &Record<N>,
    local: bool,
) -> io::Result<()> {
    let header = format_header(record.timestamp(), record.level(), local);
    file.write_all(header.as_bytes())?;
    let (first, rest) = record.parts();
    file.write_all(first)?;
    if !rest.is_empty() {
        file.write_all(rest)?;
    }
    file.write_all(b"\n")
}

/// Consumer thread body: pop, format, write; count drops while the file
/// is broken; reopen on rotation or recovery; drain once on shutdown.
fn consume<const N: usize>(shared: &Shared<N>) {
    let mut closed = false;
    let mut drop_count: u64 = 0;

    loop {
        // Consume all queued records
        while let Some(record) = shared.ring.try_pop() {
            if closed {
                drop_count += 1;
                continue;
            }
            let local = shared.local_time.load(Ordering::Relaxed);
            let mut file_guard = lock(&shared.file);
            let result = match file_guard.as_mut() {
                Some(file) => write_record(file, &record, local),
                None => Err(io::Error::new(io::ErrorKind::NotConnected, "file not open")),
            };
            if let Err(err) = result {
                // Unable to write; drop until the file reopens
                drop_count += 1;
                *file_guard = None;
                closed = true;
                drop(file_guard);
                let path = lock(&shared.path).display().to_string();
                shared.set_error(format!("Logger file write error: {} -- {}", path, err));
                break;
            }
        }
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }

        if closed || shared.rotate.load(Ordering::Acquire) {
            let path = lock(&shared.path).clone();
            let mut file_guard = lock(&shared.file);
            *file_guard = None;
            match open_append(&path) {
                Ok(mut file) => {
                    let mut ok = file.write_all(b"\n").is_ok();
                    if ok && closed {
                        let note = format_recovery(drop_count, &shared.current_error());
                        ok = file.write_all(note.as_bytes()).is_ok();
                    }
                    if ok {
                        *file_guard = Some(file);
                        drop(file_guard);
                        *lock(&shared.errmsg) = None;
                        closed = false;
                        drop_count = 0;
                    } else {
                        drop(file_guard);
                        closed = true;
                    }
                }
                Err(err) => {
                    drop(file_guard);
                    if !closed {
                        shared.set_error(format!(
                            "Logger can't open: {} -- {}",
                            path.display(),
                            err
                        ));
                        closed = true;
                    }
                }
            }
            shared.rotate.store(false, Ordering::Release);
        }

        // Wakeups from producers are best-effort, so wait with a bound in
        // case a notification was missed.
        let guard = shared.monitor.lock();
        let _ = shared.monitor.wait_ms(guard, Logger::<N>::WAKE_TIMEOUT_MS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_shape() {
        let header = format_header(SystemTime::UNIX_EPOCH, Level::Error, false);
        assert_eq!(header, "[1970-01-01:00:00:00 ERRR] ");
    }

    #[test]
    fn test_recovery_record_shape() {
        let note = format_recovery(7, "disk on fire");
        assert_eq!(note, "[] Logger recovered from error (lost: 7): disk on fire\n");
    }

    #[test]
    fn test_check_honours_floor() {
        let logger: Logger = Logger::new();
        assert!(logger.check(Level::Alert));
        assert!(logger.check(Level::Warn));
        assert!(!logger.check(Level::Info));

        logger.set_level(Level::Error);
        assert!(!logger.check(Level::Warn));
        assert!(logger.check(Level::Error));

        logger.set_level(Level::Disabled);
        assert!(!logger.check(Level::Alert));
        assert!(!logger.check(Level::Disabled));
    }

    #[test]
    fn test_null_logger_records_nothing() {
        let logger = NullLogger;
        assert!(!logger.check(Level::Alert));
        assert!(!logger.log(Level::Alert, "ignored"));
    }

    #[test]
    fn test_start_thread_requires_open() {
        let mut logger: Logger = Logger::new();
        assert!(matches!(logger.start_thread(), Err(LogError::NotOpen)));
        assert!(logger.last_error().is_some());
        assert!(logger.last_error().is_none());
    }
}
