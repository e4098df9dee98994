//! evring-log - Background Logger over the evring Queue Discipline
//!
//! Producers queue records lock-free and never touch the file; a single
//! consumer thread formats and writes them. The pipeline carries the same
//! guarantees as the event ring it is built on: bounded storage with
//! back-pressure, best-effort wakeups healed by a bounded consumer wait,
//! and exactly-once consumption.
//!
//! - [`Logger`] — the background logger (open / start / rotate / shutdown)
//! - [`Log`] — the pluggable logging façade, also implemented by
//!   [`NullLogger`]
//! - [`Level`] — severities `alert` through `debug_low`
//! - [`log_warn!`] and friends — check-then-format helper macros
//!
//! # Example
//!
//! ```no_run
//! use evring_log::{log_error, log_warn, Logger};
//!
//! let mut logger = Logger::<512>::new();
//! logger.set_local_time(true);
//! logger.start("out.log").unwrap();
//!
//! log_error!(logger, "this is an error -- test {}", 123);
//! log_warn!(logger, "this is a warning -- test {}", 123);
//! // Messages below the Warn floor are neither formatted nor queued.
//! ```

mod level;
mod logger;
mod macros;
mod record;

pub use level::{Level, ParseLevelError};
pub use logger::{Log, LogError, LogRef, Logger, NullLogger, DEFAULT_MESSAGE_BUFFER};
pub use record::Record;
