//! Log severity levels.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Severity with total ordering: Debug < Info < Warn < Error < Fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
    Fatal = 4,
}

impl LogLevel {
    /// Tag used inside the formatted line (`[WARN]`).
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }

    /// Records at or above this level are flushed immediately.
    pub const fn forces_flush(self) -> bool {
        matches!(self, Self::Error | Self::Fatal)
    }

    /// Records at or above this level are mirrored to the console.
    pub const fn mirrors_to_console(self) -> bool {
        !matches!(self, Self::Debug | Self::Info)
    }

    /// Console facade level used for the mirror.
    pub const fn console_level(self) -> log::Level {
        match self {
            Self::Debug => log::Level::Debug,
            Self::Info => log::Level::Info,
            Self::Warn => log::Level::Warn,
            Self::Error | Self::Fatal => log::Level::Error,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a level name is not recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownLevel;

impl fmt::Display for UnknownLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown level (expected DEBUG, INFO, WARN, ERROR or FATAL)")
    }
}

impl FromStr for LogLevel {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        [
            Self::Debug,
            Self::Info,
            Self::Warn,
            Self::Error,
            Self::Fatal,
        ]
        .into_iter()
        .find(|l| l.as_str().eq_ignore_ascii_case(s))
        .or_else(|| s.eq_ignore_ascii_case("WARNING").then_some(Self::Warn))
        .ok_or(UnknownLevel)
    }
}
