//! Buffered, rotating logger over removable storage.
//!
//! ```text
//!   log() ──▶ LogBuffer (4 KB) ──flush──▶ /logs/system/system_<date>.log
//!                  ▲                              │
//!            Error/Fatal, full,              retry + backoff,
//!            flush interval                  N failures ⇒ Absent
//! ```
//!
//! The session moves `Uninitialized → Ready ⇄ Absent`.  While the card is
//! absent every write path is a silent no-op; [`PersistentLogger::check_hot_swap`]
//! notices removal and reinsertion on a rate-limited probe.
//!
//! Specialised records (API calls, CSV series, memory usage) live in
//! [`records`]; read-back for the operator console lives in [`export`].

pub mod buffer;
pub mod export;
pub mod layout;
pub mod level;
pub mod records;

#[cfg(test)]
pub(crate) mod mock;

use core::fmt::{self, Write};

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use embedded_hal::delay::DelayNs;
use serde::Serialize;

use crate::app::ports::{ClockPort, ConfigError, StoragePort, StorageError};
use crate::config::LoggerConfig;
use crate::error::{Error, Result};

use buffer::LogBuffer;
use layout::{FilePattern, LogCategory, BOOT_PREFIX, DIRECTORIES, SYSTEM_PREFIX};
use level::LogLevel;

pub use export::{ExportKind, ExportSummary};

/// Messages longer than this are truncated.
pub const MAX_MESSAGE_LEN: usize = 250;

/// Alternatives tried after the plain stamped name of a boot or dump file
/// is taken.
const MAX_STAMP_SUFFIX: u32 = 99;

/// `[` ts `] [` level `] ` message `\n`
const MAX_LINE_LEN: usize = 1 + 23 + 3 + 5 + 2 + MAX_MESSAGE_LEN + 1;

type Line = heapless::String<MAX_LINE_LEN>;

/// Storage session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// `initialize()` has not run yet.
    Uninitialized,
    Ready,
    /// Card missing, unmountable, or failing writes.
    Absent,
}

/// Operator-facing summary of the logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoggerStatus {
    NotReady,
    Disabled,
    CardAbsent,
    Active,
}

impl LoggerStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotReady => "NOT_READY",
            Self::Disabled => "DISABLED",
            Self::CardAbsent => "CARD_ABSENT",
            Self::Active => "ACTIVE",
        }
    }
}

impl fmt::Display for LoggerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one [`PersistentLogger::check_hot_swap`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotSwap {
    /// Probed; nothing changed (or logger never initialised).
    Unchanged,
    /// Too soon since the previous probe.
    RateLimited,
    Removed,
    Recovered,
    RecoveryFailed,
}

pub struct PersistentLogger<S: StoragePort, C: ClockPort, D: DelayNs> {
    storage: S,
    clock: C,
    delay: D,
    config: LoggerConfig,
    session: SessionState,
    buffer: LogBuffer,
    rotation: Option<NaiveDate>,
    last_flush_ms: u32,
    last_probe_ms: Option<u32>,
    consecutive_failures: u8,
}

/// Bytes written and attempts used by [`write_with_retry`].
struct WriteOutcome {
    written: usize,
    attempts: u8,
}

/// Append `data` to `path`, resuming after partial writes, up to
/// `max_attempts` tries with `backoff_ms` between them.
fn write_with_retry<S: StoragePort, D: DelayNs>(
    storage: &mut S,
    delay: &mut D,
    config: &LoggerConfig,
    path: &str,
    data: &[u8],
) -> WriteOutcome {
    let max_attempts = config.max_write_retries.max(1);
    let mut out = WriteOutcome {
        written: 0,
        attempts: 0,
    };

    while out.attempts < max_attempts {
        out.attempts += 1;
        match storage.append(path, &data[out.written..]) {
            Ok(n) => {
                out.written = (out.written + n).min(data.len());
                if out.written == data.len() {
                    break;
                }
                log::warn!(
                    "SD short write to {} ({}/{} bytes)",
                    path,
                    out.written,
                    data.len()
                );
            }
            Err(e) => log::warn!("SD write attempt {} to {} failed: {}", out.attempts, path, e),
        }
        if out.attempts < max_attempts {
            delay.delay_ms(config.retry_backoff_ms);
        }
    }
    out
}

/// Cut `msg` to [`MAX_MESSAGE_LEN`] bytes on a character boundary.
fn truncate_message(msg: &str) -> (&str, bool) {
    if msg.len() <= MAX_MESSAGE_LEN {
        return (msg, false);
    }
    let mut end = MAX_MESSAGE_LEN;
    while !msg.is_char_boundary(end) {
        end -= 1;
    }
    (&msg[..end], true)
}

impl<S: StoragePort, C: ClockPort, D: DelayNs> PersistentLogger<S, C, D> {
    pub fn new(storage: S, clock: C, delay: D, config: LoggerConfig) -> Self {
        Self {
            storage,
            clock,
            delay,
            config,
            session: SessionState::Uninitialized,
            buffer: LogBuffer::new(),
            rotation: None,
            last_flush_ms: 0,
            last_probe_ms: None,
            consecutive_failures: 0,
        }
    }

    // ── Session ───────────────────────────────────────────────

    /// Probe and mount the card, create the directory tree and set the
    /// rotation key.  On error the session is `Absent` and logging is a
    /// no-op until [`check_hot_swap`](Self::check_hot_swap) recovers it.
    pub fn initialize(&mut self) -> core::result::Result<(), StorageError> {
        let now_ms = self.clock.uptime_ms();
        self.last_probe_ms = Some(now_ms);

        if !self.storage.probe() {
            self.session = SessionState::Absent;
            log::warn!("SD card not detected, logging disabled until inserted");
            return Err(StorageError::NotPresent);
        }
        if let Err(e) = self.storage.mount() {
            self.session = SessionState::Absent;
            log::warn!("SD card mount failed: {}", e);
            return Err(e);
        }
        if let Err(e) = self.ensure_layout() {
            self.storage.unmount();
            self.session = SessionState::Absent;
            log::warn!("SD log directories could not be created: {}", e);
            return Err(e);
        }

        // Records buffered before a removal keep their day's file.
        if self.rotation.is_none() || self.buffer.is_empty() {
            self.rotation = Some(self.today());
        }
        self.last_flush_ms = now_ms;
        self.consecutive_failures = 0;
        self.session = SessionState::Ready;
        log::info!(
            "SD logger ready: {} KB free of {} KB",
            self.storage.free_bytes() / 1024,
            self.storage.total_bytes() / 1024
        );
        Ok(())
    }

    fn ensure_layout(&mut self) -> core::result::Result<(), StorageError> {
        for dir in DIRECTORIES {
            if !self.storage.exists(dir) {
                self.storage.create_dir(dir)?;
            }
        }
        Ok(())
    }

    fn mark_absent(&mut self, why: &str) {
        self.session = SessionState::Absent;
        self.storage.unmount();
        log::warn!("SD logger suspended: {}", why);
    }

    /// Probe for removal or reinsertion.  Rate-limited to one probe per
    /// `hot_swap_interval_ms`.
    pub fn check_hot_swap(&mut self) -> HotSwap {
        if self.session == SessionState::Uninitialized {
            return HotSwap::Unchanged;
        }
        let now_ms = self.clock.uptime_ms();
        if let Some(last) = self.last_probe_ms {
            if now_ms.wrapping_sub(last) < self.config.hot_swap_interval_ms {
                return HotSwap::RateLimited;
            }
        }
        self.last_probe_ms = Some(now_ms);

        let present = self.storage.probe();
        match (self.session, present) {
            (SessionState::Ready, false) => {
                self.mark_absent("card removed");
                HotSwap::Removed
            }
            (SessionState::Absent, true) => match self.initialize() {
                Ok(()) => {
                    self.log(LogLevel::Info, "SD card recovered after hot-swap");
                    let _ = self.flush();
                    HotSwap::Recovered
                }
                Err(_) => HotSwap::RecoveryFailed,
            },
            _ => HotSwap::Unchanged,
        }
    }

    // ── Writing ───────────────────────────────────────────────

    /// Buffer one record.  Silently dropped when below the threshold,
    /// disabled, or the card is not ready.
    pub fn log(&mut self, level: LogLevel, message: &str) {
        if !self.config.enabled || level < self.config.level {
            return;
        }
        if self.session != SessionState::Ready {
            return;
        }
        if level.mirrors_to_console() {
            log::log!(level.console_level(), "{}", message);
        }

        if !self.rotate_if_needed() {
            // Yesterday's batch is still buffered; today's record would
            // land in yesterday's file.
            self.buffer.note_dropped();
            return;
        }

        let (message, truncated) = truncate_message(message);
        if truncated {
            log::debug!(
                "{}",
                Error::DataTruncated {
                    field: "log message",
                    limit: MAX_MESSAGE_LEN,
                }
            );
        }

        let mut line = Line::new();
        let _ = writeln!(
            line,
            "[{}] [{}] {}",
            layout::timestamp(self.local_now()),
            level,
            message
        );

        if !self.buffer.fits(line.len()) {
            let _ = self.flush();
        }
        if !self.buffer.push_line(line.as_bytes()) {
            self.buffer.note_dropped();
            log::debug!("Log buffer full, record dropped");
            return;
        }

        if level.forces_flush() || self.flush_due() {
            let _ = self.flush();
        }
    }

    /// Formatting variant of [`log`](Self::log).
    pub fn logf(&mut self, level: LogLevel, args: fmt::Arguments<'_>) {
        if !self.config.enabled || level < self.config.level || !self.is_ready() {
            return;
        }
        let mut msg = String::new();
        let _ = msg.write_fmt(args);
        self.log(level, &msg);
    }

    fn flush_due(&self) -> bool {
        self.clock.uptime_ms().wrapping_sub(self.last_flush_ms) >= self.config.flush_interval_ms
    }

    /// Write the buffer to today's system log.  An empty buffer is a
    /// no-op.  A failed flush keeps the buffer for the next attempt.
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        if self.session != SessionState::Ready {
            return Err(Error::StorageUnavailable(StorageError::NotPresent));
        }

        let path = self.system_log_path();
        let total = self.buffer.len();
        let out = write_with_retry(
            &mut self.storage,
            &mut self.delay,
            &self.config,
            &path,
            self.buffer.as_bytes(),
        );

        if out.written == total {
            self.buffer.clear();
            self.last_flush_ms = self.clock.uptime_ms();
            self.consecutive_failures = 0;
            return Ok(());
        }

        self.buffer.consume(out.written);
        let consecutive = self.note_write_failure();
        Err(Error::WriteFailure {
            attempts: out.attempts,
            consecutive,
        })
    }

    /// Count a failed write and suspend the session once the threshold
    /// is reached.
    fn note_write_failure(&mut self) -> u8 {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let n = self.consecutive_failures;
        if n >= self.config.failure_threshold {
            self.mark_absent("too many consecutive write failures");
        }
        n
    }

    /// Append a complete payload to an arbitrary file, with the same retry
    /// policy as [`flush`](Self::flush).
    fn append_file(&mut self, path: &str, data: &[u8]) -> core::result::Result<(), StorageError> {
        if self.session != SessionState::Ready {
            return Err(StorageError::NotPresent);
        }
        let out = write_with_retry(&mut self.storage, &mut self.delay, &self.config, path, data);
        if out.written == data.len() {
            self.consecutive_failures = 0;
            Ok(())
        } else {
            self.note_write_failure();
            Err(StorageError::IoError)
        }
    }

    /// Flush and move the system log to today's file.  Never deletes.
    ///
    /// Buffered records belong to the file of the day they were logged, so
    /// the key only moves once the buffer has reached that file.  On a
    /// failed flush the old key stays and the next `log`/`tick` retries.
    pub fn rotate(&mut self) -> Result<()> {
        if let Err(e) = self.flush() {
            log::warn!("Rotation deferred, previous day not flushed: {}", e);
            return Err(e);
        }
        let today = self.today();
        if self.rotation != Some(today) {
            log::info!("Log rotated to {}", layout::date_key(today));
        }
        self.rotation = Some(today);
        Ok(())
    }

    /// `true` once the rotation key matches today.
    fn rotate_if_needed(&mut self) -> bool {
        self.rotation == Some(self.today()) || self.rotate().is_ok()
    }

    /// One file per boot under `/logs/system`, plus a system-log record.
    pub fn log_boot(&mut self, message: &str) -> core::result::Result<String, StorageError> {
        if self.session != SessionState::Ready {
            return Err(StorageError::NotPresent);
        }
        let now = self.local_now();
        let (message, _) = truncate_message(message);

        let mut text = String::new();
        let _ = writeln!(text, "[{}] BOOT {}", layout::timestamp(now), message);
        let path = self.write_stamped(LogCategory::System, BOOT_PREFIX, now, text.as_bytes())?;

        self.logf(LogLevel::Info, format_args!("Boot: {}", message));
        Ok(path)
    }

    /// Write a crash or watchdog dump to `/logs/errors`.
    pub fn write_dump(
        &mut self,
        prefix: &str,
        at: NaiveDateTime,
        text: &str,
    ) -> core::result::Result<String, StorageError> {
        if self.session != SessionState::Ready {
            return Err(StorageError::NotPresent);
        }
        let path = self.write_stamped(LogCategory::Errors, prefix, at, text.as_bytes())?;
        self.logf(LogLevel::Fatal, format_args!("Crash dump created: {}", path));
        Ok(path)
    }

    /// Create a new `<prefix><stamp>.log` file.  The wall clock may not be
    /// set yet at boot, so two runs can produce the same stamp; a taken name
    /// gets a `-1`, `-2`, ... suffix and existing files are never replaced.
    fn write_stamped(
        &mut self,
        category: LogCategory,
        prefix: &str,
        at: NaiveDateTime,
        data: &[u8],
    ) -> core::result::Result<String, StorageError> {
        for n in 0..=MAX_STAMP_SUFFIX {
            let path = if n == 0 {
                layout::stamped_path(category, prefix, at)
            } else {
                layout::numbered_stamped_path(category, prefix, at, n)
            };
            match self.storage.write_new(&path, data) {
                Ok(w) if w == data.len() => return Ok(path),
                Err(StorageError::AlreadyExists) => continue,
                Ok(_) => {
                    self.note_write_failure();
                    return Err(StorageError::IoError);
                }
                Err(e) => {
                    self.note_write_failure();
                    return Err(e);
                }
            }
        }
        log::warn!("No free name for {}{} in {}", prefix, layout::file_stamp(at), category.dir());
        Err(StorageError::AlreadyExists)
    }

    /// Main-loop housekeeping: hot-swap probe and timed flush.
    pub fn tick(&mut self) -> HotSwap {
        let swap = self.check_hot_swap();
        if self.is_ready() && self.rotate_if_needed() {
            if !self.buffer.is_empty() && self.flush_due() {
                let _ = self.flush();
            }
        }
        swap
    }

    // ── Retention ─────────────────────────────────────────────

    /// Delete files matching `pattern` whose embedded date is more than
    /// `retention_days` old.  Returns the number removed.
    pub fn cleanup(
        &mut self,
        pattern: FilePattern<'_>,
        retention_days: u32,
    ) -> core::result::Result<usize, StorageError> {
        self.cleanup_with(pattern, retention_days, &mut || {})
    }

    /// [`cleanup`](Self::cleanup), calling `keepalive` before each file is
    /// examined so a caller can feed the watchdog on a crowded card.
    pub fn cleanup_with(
        &mut self,
        pattern: FilePattern<'_>,
        retention_days: u32,
        keepalive: &mut impl FnMut(),
    ) -> core::result::Result<usize, StorageError> {
        if self.session != SessionState::Ready {
            return Err(StorageError::NotPresent);
        }
        let today = self.today();
        let dir = pattern.category.dir();
        let mut removed = 0;

        for name in self.storage.list(dir)? {
            keepalive();
            if !pattern.matches(&name) {
                continue;
            }
            let Some(date) = layout::parse_file_date(&name) else {
                continue;
            };
            if layout::age_in_days(date, today) <= i64::from(retention_days) {
                continue;
            }
            let path = layout::join(dir, &name);
            match self.storage.remove(&path) {
                Ok(()) => removed += 1,
                Err(e) => log::warn!("Cleanup could not remove {}: {}", path, e),
            }
        }
        if removed > 0 {
            log::info!("Cleanup removed {} file(s) from {}", removed, dir);
        }
        Ok(removed)
    }

    /// Apply `retention_days` to system, API and API-error logs and the
    /// per-prefix table to CSV data.  Returns the total removed.
    pub fn cleanup_all(&mut self) -> usize {
        self.cleanup_all_with(|| {})
    }

    /// [`cleanup_all`](Self::cleanup_all) with a per-file `keepalive`.
    pub fn cleanup_all_with(&mut self, mut keepalive: impl FnMut()) -> usize {
        let days = self.config.retention_days;
        let rules = self.config.data_retention.clone();

        let mut patterns: heapless::Vec<(FilePattern<'_>, u32), 8> = heapless::Vec::new();
        let _ = patterns.push((FilePattern::new(LogCategory::System, SYSTEM_PREFIX), days));
        let _ = patterns.push((FilePattern::new(LogCategory::Api, ""), days));
        let _ = patterns.push((
            FilePattern::new(LogCategory::Errors, layout::API_ERRORS_PREFIX),
            days,
        ));
        for rule in &rules {
            let _ = patterns.push((FilePattern::new(LogCategory::Data, rule.prefix.as_str()), rule.days));
        }

        let mut total = 0;
        for (pattern, days) in patterns {
            match self.cleanup_with(pattern, days, &mut keepalive) {
                Ok(n) => total += n,
                Err(e) => {
                    log::warn!("Cleanup of {} stopped: {}", pattern.category.dir(), e);
                    break;
                }
            }
        }
        self.logf(LogLevel::Info, format_args!("Cleanup complete, {} file(s) removed", total));
        total
    }

    // ── Status & controls ─────────────────────────────────────

    pub fn status(&self) -> LoggerStatus {
        match self.session {
            SessionState::Uninitialized => LoggerStatus::NotReady,
            _ if !self.config.enabled => LoggerStatus::Disabled,
            SessionState::Absent => LoggerStatus::CardAbsent,
            SessionState::Ready => LoggerStatus::Active,
        }
    }

    pub fn session(&self) -> SessionState {
        self.session
    }

    pub fn is_ready(&self) -> bool {
        self.session == SessionState::Ready
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn enable(&mut self) {
        self.config.enabled = true;
        log::info!("SD logging enabled");
    }

    /// Flush what is buffered, then stop recording.
    pub fn disable(&mut self) {
        let _ = self.flush();
        self.config.enabled = false;
        log::info!("SD logging disabled");
    }

    pub fn level(&self) -> LogLevel {
        self.config.level
    }

    pub fn set_level(&mut self, level: LogLevel) {
        self.config.level = level;
        log::info!("SD log level set to {}", level);
    }

    pub fn set_flush_interval(&mut self, ms: u32) -> core::result::Result<(), ConfigError> {
        if !(1_000..=3_600_000).contains(&ms) {
            return Err(ConfigError::ValidationFailed(
                "flush_interval_ms must be 1000–3600000",
            ));
        }
        self.config.flush_interval_ms = ms;
        Ok(())
    }

    pub fn set_retention_days(&mut self, days: u32) -> core::result::Result<(), ConfigError> {
        if !(1..=3650).contains(&days) {
            return Err(ConfigError::ValidationFailed(
                "retention_days must be 1–3650",
            ));
        }
        self.config.retention_days = days;
        Ok(())
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    pub fn buffered_records(&self) -> usize {
        self.buffer.records()
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }

    pub fn dropped_records(&self) -> u32 {
        self.buffer.dropped()
    }

    pub fn consecutive_failures(&self) -> u8 {
        self.consecutive_failures
    }

    pub fn rotation_key(&self) -> Option<NaiveDate> {
        self.rotation
    }

    /// Path of the current system log.
    pub fn system_log_path(&self) -> String {
        let date = self.rotation.unwrap_or_else(|| self.today());
        layout::daily_path(LogCategory::System, SYSTEM_PREFIX, date, "log")
    }

    pub fn free_space(&self) -> u64 {
        if self.is_ready() { self.storage.free_bytes() } else { 0 }
    }

    pub fn total_space(&self) -> u64 {
        if self.is_ready() { self.storage.total_bytes() } else { 0 }
    }

    /// Total size of every file under `/logs`.
    pub fn log_size(&self) -> u64 {
        self.each_log_file().map(|(_, size)| size).sum()
    }

    pub fn log_file_count(&self) -> usize {
        self.each_log_file().count()
    }

    fn each_log_file(&self) -> impl Iterator<Item = (String, u64)> + '_ {
        let ready = self.is_ready();
        LogCategory::ALL
            .into_iter()
            .filter(move |_| ready)
            .flat_map(move |cat| {
                let dir = cat.dir();
                self.storage
                    .list(dir)
                    .unwrap_or_default()
                    .into_iter()
                    .map(move |name| layout::join(dir, &name))
            })
            .map(|path| {
                let size = self.storage.file_size(&path).unwrap_or(0);
                (path, size)
            })
    }

    /// One-line summary for the console.
    pub fn status_string(&self) -> String {
        let mut s = String::new();
        let _ = write!(s, "SD: {}", self.status());
        if self.is_ready() {
            let _ = write!(
                s,
                ", {} KB free / {} KB, {} files ({} KB)",
                self.free_space() / 1024,
                self.total_space() / 1024,
                self.log_file_count(),
                self.log_size() / 1024
            );
        }
        let _ = write!(
            s,
            ", level {}, {} buffered, {} dropped",
            self.config.level,
            self.buffer.records(),
            self.buffer.dropped()
        );
        s
    }

    // ── Time ──────────────────────────────────────────────────

    /// Wall clock with the configured UTC offset applied.
    pub fn local_now(&self) -> NaiveDateTime {
        let utc = self.clock.now();
        utc.checked_add_signed(TimeDelta::minutes(i64::from(self.config.utc_offset_minutes)))
            .unwrap_or(utc)
    }

    pub fn today(&self) -> NaiveDate {
        self.local_now().date()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Direct access for tests and adapters that need to simulate card
    /// events.
    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}
