use std::fmt;
use std::str::FromStr;

/// Log severity level.
///
/// Lower discriminants are more severe; a message is recorded when its
/// level is at or above the logger's configured severity floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Level {
    /// Logging disabled.
    Disabled = 0,
    /// Critical alert needing immediate attention (`ALRT`).
    Alert = 1,
    /// Something isn't working as expected (`ERRR`).
    Error = 2,
    /// Potential issue that may lead to an error (`WARN`).
    Warn = 3,
    /// Notices and context (`INFO`).
    Info = 4,
    /// High-level debug detail (`dbug`).
    Debug = 5,
    /// Low-level internal debug detail (`dbgl`).
    DebugLow = 6,
}

impl Level {
    /// The 4-character tag written into each record.
    pub fn tag(self) -> &'static str {
        match self {
            Level::Disabled => "    ",
            Level::Alert => "ALRT",
            Level::Error => "ERRR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "dbug",
            Level::DebugLow => "dbgl",
        }
    }

    pub(crate) fn from_u8(value: u8) -> Level {
        match value {
            1 => Level::Alert,
            2 => Level::Error,
            3 => Level::Warn,
            4 => Level::Info,
            5 => Level::Debug,
            6 => Level::DebugLow,
            _ => Level::Disabled,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Disabled => "disabled",
            Level::Alert => "alert",
            Level::Error => "error",
            Level::Warn => "warn",
            Level::Info => "info",
            Level::Debug => "debug",
            Level::DebugLow => "debug_low",
        };
        f.write_str(name)
    }
}

/// Error returned when parsing an unknown level name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level name: {0}")]
pub struct ParseLevelError(String);

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disabled" => Ok(Level::Disabled),
            "alert" => Ok(Level::Alert),
            "error" => Ok(Level::Error),
            "warn" => Ok(Level::Warn),
            "info" => Ok(Level::Info),
            "debug" => Ok(Level::Debug),
            "debug_low" => Ok(Level::DebugLow),
            other => Err(ParseLevelError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_four_chars() {
        for level in [
            Level::Disabled,
            Level::Alert,
            Level::Error,
            Level::Warn,
            Level::Info,
            Level::Debug,
            Level::DebugLow,
        ] {
            assert_eq!(level.tag().len(), 4);
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Level::Alert < Level::Error);
        assert!(Level::Warn < Level::Info);
        assert!(Level::Debug < Level::DebugLow);
    }

    #[test]
    fn test_name_roundtrip() {
        for level in [Level::Alert, Level::Warn, Level::DebugLow] {
            assert_eq!(level.to_string().parse::<Level>().unwrap(), level);
        }
        assert!("verbose".parse::<Level>().is_err());
    }
}
