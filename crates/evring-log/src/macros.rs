//! Helper macros for logging.
//!
//! Each macro checks the level first and only then formats the message,
//! so arguments are never evaluated for messages that won't be recorded.

/// Logs a critical alert. See [`Level::Alert`](crate::Level::Alert).
#[macro_export]
macro_rules! log_alert {
    ($logger:expr, $($arg:tt)+) => {
        if $crate::Log::check(&$logger, $crate::Level::Alert) {
            $crate::Log::log_direct(&$logger, $crate::Level::Alert, &format!($($arg)+));
        }
    };
}

/// Logs an error. See [`Level::Error`](crate::Level::Error).
#[macro_export]
macro_rules! log_error {
    ($logger:expr, $($arg:tt)+) => {
        if $crate::Log::check(&$logger, $crate::Level::Error) {
            $crate::Log::log_direct(&$logger, $crate::Level::Error, &format!($($arg)+));
        }
    };
}

/// Logs a warning. See [`Level::Warn`](crate::Level::Warn).
#[macro_export]
macro_rules! log_warn {
    ($logger:expr, $($arg:tt)+) => {
        if $crate::Log::check(&$logger, $crate::Level::Warn) {
            $crate::Log::log_direct(&$logger, $crate::Level::Warn, &format!($($arg)+));
        }
    };
}

/// Logs an informational message. See [`Level::Info`](crate::Level::Info).
#[macro_export]
macro_rules! log_info {
    ($logger:expr, $($arg:tt)+) => {
        if $crate::Log::check(&$logger, $crate::Level::Info) {
            $crate::Log::log_direct(&$logger, $crate::Level::Info, &format!($($arg)+));
        }
    };
}

/// Logs a high-level debug message. See [`Level::Debug`](crate::Level::Debug).
#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $($arg:tt)+) => {
        if $crate::Log::check(&$logger, $crate::Level::Debug) {
            $crate::Log::log_direct(&$logger, $crate::Level::Debug, &format!($($arg)+));
        }
    };
}

/// Logs a low-level debug message. See [`Level::DebugLow`](crate::Level::DebugLow).
#[macro_export]
macro_rules! log_debug_low {
    ($logger:expr, $($arg:tt)+) => {
        if $crate::Log::check(&$logger, $crate::Level::DebugLow) {
            $crate::Log::log_direct(&$logger, $crate::Level::DebugLow, &format!($($arg)+));
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::{Level, Log};
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingLog {
        lines: Mutex<Vec<(Level, String)>>,
    }

    impl Log for CapturingLog {
        fn check(&self, level: Level) -> bool {
            level <= Level::Warn
        }
        fn log_direct(&self, level: Level, msg: &str) {
            self.lines.lock().unwrap().push((level, msg.to_string()));
        }
        fn set_level(&self, _level: Level) {}
    }

    #[test]
    fn test_macro_skips_formatting_below_floor() {
        let log = CapturingLog::default();
        let mut formatted = 0u32;
        let mut touch = || {
            formatted += 1;
            "x"
        };

        log_warn!(log, "warn {}", touch());
        log_info!(log, "info {}", touch());

        assert_eq!(formatted, 1, "info arm must not format");
        let lines = log.lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0], (Level::Warn, "warn x".to_string()));
    }
}
