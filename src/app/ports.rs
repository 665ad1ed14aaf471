//! Port traits: the hexagonal boundary between the diagnostics core and
//! the hardware it runs on.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ CrashRecorder / PersistentLogger / WatchdogSupervisor
//! ```
//!
//! Driven adapters (SD card, clocks, reset-cause register, watchdog timer)
//! implement these traits.  The domain types consume them via generics, so
//! none of the core logic touches ESP-IDF directly and all of it runs on
//! the host under `cargo test`.

use chrono::NaiveDateTime;

use crate::diagnostics::crash::ResetCause;
use crate::diagnostics::memory::MemorySnapshot;
use crate::error::WatchdogError;

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ removable SD card)
// ───────────────────────────────────────────────────────────────

/// Removable block storage holding the log tree.
///
/// Paths are absolute within the mounted volume and use `/` separators
/// (e.g. `/logs/system/system_2026-10-18.log`).  The card can disappear
/// between any two calls, so every operation is fallible and callers must
/// treat an error as "maybe the card is gone", not as a bug.
///
/// `append` and `write_new` return the number of bytes actually written;
/// a short count is a partial write and the caller decides whether to
/// resume.
pub trait StoragePort {
    /// Cheap-ish presence check (card detect / card-type query).
    fn probe(&mut self) -> bool;

    /// Mount the filesystem.  Idempotent when already mounted.
    fn mount(&mut self) -> Result<(), StorageError>;

    /// Release the filesystem after removal is detected.
    fn unmount(&mut self);

    /// Whether a file or directory exists.
    fn exists(&self, path: &str) -> bool;

    /// Create a single directory level.
    fn create_dir(&mut self, path: &str) -> Result<(), StorageError>;

    /// Open in append mode (creating if missing) and write `data`.
    fn append(&mut self, path: &str, data: &[u8]) -> Result<usize, StorageError>;

    /// Create `path` and write `data`.  Fails with
    /// [`StorageError::AlreadyExists`] rather than replacing an existing file.
    fn write_new(&mut self, path: &str, data: &[u8]) -> Result<usize, StorageError>;

    /// Read up to `buf.len()` bytes starting at `offset`.  `Ok(0)` is EOF.
    fn read_at(&self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Delete a file.
    fn remove(&mut self, path: &str) -> Result<(), StorageError>;

    /// Names (not paths) of the regular files directly inside `dir`.
    /// Order is unspecified.
    fn list(&self, dir: &str) -> Result<Vec<String>, StorageError>;

    /// Size in bytes, `None` if the file does not exist.
    fn file_size(&self, path: &str) -> Option<u64>;

    fn free_bytes(&self) -> u64;

    fn total_bytes(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic uptime plus wall-clock time.
pub trait ClockPort {
    /// Milliseconds since boot.  Wraps after ~49 days; callers compare
    /// with `wrapping_sub`.
    fn uptime_ms(&self) -> u32;

    /// Current wall-clock time in UTC.  Before SNTP sync this is whatever
    /// the RTC holds (usually 1970-01-01).
    fn now(&self) -> NaiveDateTime;
}

impl<T: ClockPort + ?Sized> ClockPort for &T {
    fn uptime_ms(&self) -> u32 {
        (**self).uptime_ms()
    }

    fn now(&self) -> NaiveDateTime {
        (**self).now()
    }
}

// ───────────────────────────────────────────────────────────────
// Platform port (reset-cause register, heap statistics)
// ───────────────────────────────────────────────────────────────

/// Read-only chip state consulted by the crash recorder.
pub trait PlatformPort {
    /// Decoded hardware reset-cause register.  Always succeeds.
    fn reset_cause(&self) -> ResetCause;

    /// Heap / PSRAM statistics at the time of the call.
    fn memory(&self) -> MemorySnapshot;
}

// ───────────────────────────────────────────────────────────────
// Watchdog port (hardware liveness timer)
// ───────────────────────────────────────────────────────────────

/// The hardware watchdog peripheral, as seen by the supervisor.
pub trait WatchdogPort {
    /// Configure the timeout and subscribe the calling task.
    fn arm(&mut self, timeout_ms: u32) -> Result<(), WatchdogError>;

    /// Restart the countdown.  Must not block.
    fn reset(&mut self);

    /// Unsubscribe the calling task.
    fn disarm(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// No card detected.
    NotPresent,
    /// Card detected but the filesystem could not be mounted.
    MountFailed,
    /// Requested file does not exist.
    NotFound,
    /// File could not be opened for writing.
    OpenFailed,
    /// `write_new` target is already on the card.
    AlreadyExists,
    /// Generic I/O error.
    IoError,
}

/// Errors from configuration validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotPresent => write!(f, "card not present"),
            Self::MountFailed => write!(f, "mount failed"),
            Self::NotFound => write!(f, "file not found"),
            Self::OpenFailed => write!(f, "open failed"),
            Self::AlreadyExists => write!(f, "file already exists"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
        }
    }
}
