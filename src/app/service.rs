//! Diagnostics service: the composition of watchdog, crash recorder and
//! SD logger.
//!
//! [`DiagnosticsService`] owns all three and exposes the calls the rest of
//! the firmware makes: one `boot()` at start-up, `poll()` on every main
//! loop iteration, context updates from the UI and network layers, leveled
//! logging, and the operator command surface.  All I/O flows through port
//! traits, so the whole service runs against mocks on the host.
//!
//! ```text
//!  PlatformPort ──▶ ┌──────────────────────────────┐ ──▶ StoragePort
//!                   │      DiagnosticsService       │
//!  WatchdogPort ◀── │ Recorder · Logger · Watchdog  │ ◀── ClockPort
//!                   └──────────────────────────────┘
//! ```

use std::io;

use embedded_hal::delay::DelayNs;
use log::{info, warn};

use crate::config::DiagnosticsConfig;
use crate::diagnostics::crash::{CrashEvent, CrashInfo, CrashRecorder, DumpOutcome};
use crate::diagnostics::memory::MemorySnapshot;
use crate::diagnostics::retained::RetainedState;
use crate::diagnostics::watchdog::WatchdogSupervisor;
use crate::error::{Error, WatchdogError};
use crate::logger::level::LogLevel;
use crate::logger::{HotSwap, PersistentLogger};

use super::commands::{DiagCommand, ParseError};
use super::ports::{ClockPort, ConfigError, PlatformPort, StorageError, StoragePort, WatchdogPort};

/// How often `poll()` appends a row to `memory_usage.csv` (milliseconds).
const MEMORY_SAMPLE_INTERVAL_MS: u32 = 5 * 60 * 1000;

/// What happened during [`DiagnosticsService::boot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootReport {
    pub event: CrashEvent,
    pub storage: Result<(), StorageError>,
    pub dump: DumpOutcome,
    pub watchdog: Result<(), WatchdogError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    Parse(ParseError),
    Storage(StorageError),
    /// The console sink refused output.
    Sink,
}

impl core::fmt::Display for CommandError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "{e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Sink => write!(f, "console write failed"),
        }
    }
}

impl From<ParseError> for CommandError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

impl From<StorageError> for CommandError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<io::Error> for CommandError {
    fn from(_: io::Error) -> Self {
        Self::Sink
    }
}

pub struct DiagnosticsService<'r, S, C, D, W>
where
    S: StoragePort,
    C: ClockPort + Clone,
    D: DelayNs,
    W: WatchdogPort,
{
    logger: PersistentLogger<S, C, D>,
    recorder: CrashRecorder<'r, C>,
    watchdog: WatchdogSupervisor<W>,
    clock: C,
    watchdog_timeout_secs: u32,
    last_memory_sample_ms: Option<u32>,
}

impl<'r, S, C, D, W> DiagnosticsService<'r, S, C, D, W>
where
    S: StoragePort,
    C: ClockPort + Clone,
    D: DelayNs,
    W: WatchdogPort,
{
    /// Validate `config` and wire the components.  Nothing touches the
    /// hardware until [`boot`](Self::boot).
    pub fn new(
        config: DiagnosticsConfig,
        retained: &'r mut RetainedState,
        storage: S,
        clock: C,
        delay: D,
        watchdog: W,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            logger: PersistentLogger::new(storage, clock.clone(), delay, config.logger),
            recorder: CrashRecorder::new(retained, clock.clone()),
            watchdog: WatchdogSupervisor::new(watchdog),
            clock,
            watchdog_timeout_secs: config.watchdog_timeout_secs,
            last_memory_sample_ms: None,
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Classify the reset, bring up storage, record the boot and any
    /// crash dump, then arm the watchdog.  Never fails: each step degrades
    /// on its own and the outcome is reported.
    pub fn boot(&mut self, platform: &impl PlatformPort, banner: &str) -> BootReport {
        let event = self.recorder.on_boot(platform);

        let storage = self.logger.initialize();
        if storage.is_ok() {
            if let Err(e) = self.logger.log_boot(banner) {
                warn!("Boot record not written: {}", e);
            }
            self.logger.logf(
                LogLevel::Info,
                format_args!("Reset cause: {} ({})", event.cause, event.cause.description()),
            );
        }

        let dump = self.recorder.write_crash_dump(&event, &mut self.logger);

        let watchdog = self.watchdog.initialize(self.watchdog_timeout_secs);
        if let Err(e) = watchdog {
            warn!("{} (continuing without crash protection)", Error::from(e));
        }

        info!(
            "Diagnostics up: {}, crash count {}",
            self.logger.status(),
            event.crash_count
        );
        BootReport {
            event,
            storage,
            dump,
            watchdog,
        }
    }

    /// Main-loop housekeeping: feed the watchdog, probe the card, flush
    /// on the timer and sample memory periodically.
    pub fn poll(&mut self, platform: &impl PlatformPort) -> HotSwap {
        self.watchdog.feed();
        let swap = self.logger.tick();

        let now = self.clock.uptime_ms();
        let due = match self.last_memory_sample_ms {
            None => true,
            Some(last) => now.wrapping_sub(last) >= MEMORY_SAMPLE_INTERVAL_MS,
        };
        if due && self.logger.is_ready() {
            self.last_memory_sample_ms = Some(now);
            let _ = self.logger.log_memory_usage(&platform.memory());
        }
        swap
    }

    /// Restart the watchdog countdown.  Safe to call from anywhere in the
    /// loop; never blocks.
    pub fn feed(&mut self) {
        self.watchdog.feed();
    }

    /// Flush and stop supervising before a deliberate restart.
    pub fn prepare_restart(&mut self) {
        self.logger.log(LogLevel::Warn, "Planned restart");
        let _ = self.logger.flush();
        self.watchdog.disable();
    }

    // ── Context & logging ─────────────────────────────────────

    pub fn set_current_screen(&mut self, name: &str) {
        self.recorder.set_current_screen(name);
    }

    pub fn set_last_call(&mut self, service: &str, endpoint: &str) {
        self.recorder.set_last_call(service, endpoint);
    }

    pub fn log(&mut self, level: LogLevel, message: &str) {
        self.logger.log(level, message);
    }

    pub fn log_memory_snapshot(&mut self, snapshot: &MemorySnapshot) {
        let _ = self.logger.log_memory_usage(snapshot);
    }

    pub fn crash_info(&self) -> CrashInfo {
        self.recorder.crash_info()
    }

    pub fn logger(&self) -> &PersistentLogger<S, C, D> {
        &self.logger
    }

    pub fn logger_mut(&mut self) -> &mut PersistentLogger<S, C, D> {
        &mut self.logger
    }

    pub fn recorder(&self) -> &CrashRecorder<'r, C> {
        &self.recorder
    }

    pub fn watchdog(&self) -> &WatchdogSupervisor<W> {
        &self.watchdog
    }

    // ── Operator commands ─────────────────────────────────────

    /// Parse and execute one console line, writing the reply to `out`.
    pub fn handle_command<O: io::Write>(&mut self, line: &str, out: &mut O) -> Result<(), CommandError> {
        let cmd: DiagCommand = match line.parse() {
            Ok(cmd) => cmd,
            Err(e) => {
                writeln!(out, "ERROR: {}", e)?;
                return Err(e.into());
            }
        };
        self.execute(cmd, out)
    }

    pub fn execute<O: io::Write>(&mut self, cmd: DiagCommand, out: &mut O) -> Result<(), CommandError> {
        match cmd {
            DiagCommand::SetLogging(true) => {
                self.logger.enable();
                writeln!(out, "SD logging enabled")?;
            }
            DiagCommand::SetLogging(false) => {
                self.logger.disable();
                writeln!(out, "SD logging disabled")?;
            }
            DiagCommand::SetLevel(level) => {
                self.logger.set_level(level);
                writeln!(out, "SD log level: {}", level)?;
            }
            DiagCommand::Flush => match self.logger.flush() {
                Ok(()) => writeln!(out, "SD log flushed")?,
                Err(e) => writeln!(out, "SD flush failed: {}", e)?,
            },
            DiagCommand::Cleanup => {
                let watchdog = &mut self.watchdog;
                let removed = self.logger.cleanup_all_with(|| watchdog.feed());
                writeln!(out, "SD cleanup removed {} file(s)", removed)?;
            }
            DiagCommand::Export(kind) => {
                let watchdog = &mut self.watchdog;
                if let Err(e) = self.logger.export_data_with(kind, out, || watchdog.feed()) {
                    writeln!(out, "Export failed: {}", e)?;
                    return Err(e.into());
                }
            }
            DiagCommand::CrashInfo => {
                out.write_all(self.recorder.last_crash_report().as_bytes())?;
                if let Ok(json) = serde_json::to_string(&self.recorder.crash_info()) {
                    writeln!(out, "JSON: {}", json)?;
                }
            }
            DiagCommand::Status => {
                writeln!(out, "{}", self.logger.status_string())?;
            }
        }
        Ok(())
    }
}
