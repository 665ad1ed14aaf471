//! Unified error types for the resilience & diagnostics subsystem.
//!
//! A single `Error` enum that every component converts into, so the
//! composition root can treat watchdog, storage and truncation failures
//! uniformly.  All variants are `Copy` so they can be passed around the
//! main loop without allocation.
//!
//! None of these are fatal: the only thing allowed to end execution is the
//! hardware watchdog reset, which is observed on the next boot as a
//! [`ResetCause`](crate::diagnostics::crash::ResetCause), never as an `Error`.

use core::fmt;

use crate::app::ports::StorageError;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the subsystem funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The hardware watchdog could not be armed.  Non-fatal: the caller
    /// continues without crash protection.
    HardwareConfig(WatchdogError),
    /// Removable storage could not be mounted or opened.  The logger
    /// degrades to a silent no-op.
    StorageUnavailable(StorageError),
    /// A write did not complete within the retry budget.  Escalates to
    /// `StorageUnavailable` after repeated consecutive failures.
    WriteFailure {
        /// Attempts made during the failed operation.
        attempts: u8,
        /// Consecutive failed operations so far.
        consecutive: u8,
    },
    /// A bounded field was too small for its input and was truncated.
    DataTruncated {
        field: &'static str,
        limit: usize,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HardwareConfig(e) => write!(f, "watchdog: {e}"),
            Self::StorageUnavailable(e) => write!(f, "storage unavailable: {e}"),
            Self::WriteFailure {
                attempts,
                consecutive,
            } => write!(
                f,
                "write failed after {attempts} attempts ({consecutive} consecutive)"
            ),
            Self::DataTruncated { field, limit } => {
                write!(f, "{field} truncated to {limit} bytes")
            }
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::StorageUnavailable(e)
    }
}

// ---------------------------------------------------------------------------
// Watchdog errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogError {
    /// `initialize()` called while the supervisor is already armed.
    AlreadyArmed,
    /// The peripheral refused the configuration (ESP-IDF error code).
    HardwareRejected(i32),
    /// A zero-second timeout was requested.
    InvalidTimeout,
}

impl fmt::Display for WatchdogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyArmed => write!(f, "already armed"),
            Self::HardwareRejected(code) => write!(f, "hardware rejected config ({code})"),
            Self::InvalidTimeout => write!(f, "timeout must be at least one second"),
        }
    }
}

impl From<WatchdogError> for Error {
    fn from(e: WatchdogError) -> Self {
        Self::HardwareConfig(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Subsystem-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
