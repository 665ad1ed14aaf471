//! Reset-cause classification and crash dumps.
//!
//! [`CrashRecorder::on_boot`] runs once, before anything else touches the
//! retained region.  It reads the hardware reset cause, folds in whatever
//! the previous run left in [`RetainedState`], bumps the lifetime counter
//! and hands back a [`CrashEvent`].  If the logger is up, the event is
//! written to `/logs/errors` as a human-readable dump.
//!
//! During normal operation the recorder is the only writer of the retained
//! region: the UI reports the current screen, network clients report their
//! last outbound call, and both land in RTC memory immediately so a reset
//! at any point still leaves the context behind.

use core::fmt::{self, Write};
use std::sync::OnceLock;
use std::thread::ThreadId;

use chrono::NaiveDateTime;
use embedded_hal::delay::DelayNs;
use serde::{Deserialize, Serialize};

use super::memory::MemorySnapshot;
use super::retained::{BoundedStr, CALL_LEN, REASON_LEN, RetainedState, SCREEN_LEN};
use crate::app::ports::{ClockPort, PlatformPort, StoragePort};
use crate::error::Error;
use crate::logger::PersistentLogger;
use crate::logger::layout::{self, CRASH_PREFIX, WATCHDOG_PREFIX};

// ───────────────────────────────────────────────────────────────
// Reset cause
// ───────────────────────────────────────────────────────────────

/// Decoded hardware reset reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResetCause {
    PowerOn,
    ExternalReset,
    SoftwareReset,
    Exception,
    WatchdogTimeout,
    BrownOut,
    Unknown,
}

impl ResetCause {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PowerOn => "POWER_ON",
            Self::ExternalReset => "EXTERNAL_RESET",
            Self::SoftwareReset => "SOFTWARE_RESET",
            Self::Exception => "EXCEPTION",
            Self::WatchdogTimeout => "WATCHDOG_TIMEOUT",
            Self::BrownOut => "BROWN_OUT",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::PowerOn => "Normal power-on",
            Self::ExternalReset => "External reset pin",
            Self::SoftwareReset => "Software restart",
            Self::Exception => "Exception/panic",
            Self::WatchdogTimeout => "Watchdog timeout (main loop stalled)",
            Self::BrownOut => "Brown-out (supply voltage dropped)",
            Self::Unknown => "Unknown reset reason",
        }
    }

    /// Resets that count towards the lifetime crash counter.
    pub const fn is_crash(self) -> bool {
        matches!(self, Self::Exception | Self::WatchdogTimeout)
    }

    pub const fn is_watchdog(self) -> bool {
        matches!(self, Self::WatchdogTimeout)
    }
}

impl fmt::Display for ResetCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ───────────────────────────────────────────────────────────────
// Events
// ───────────────────────────────────────────────────────────────

/// What the application was doing when it went down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashContext {
    pub screen: BoundedStr<SCREEN_LEN>,
    /// `"<service> <endpoint>"`
    pub last_call: BoundedStr<CALL_LEN>,
    /// Uptime at which `last_call` was made.
    pub last_call_ms: u32,
}

/// One classified boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashEvent {
    pub cause: ResetCause,
    pub reason: BoundedStr<REASON_LEN>,
    /// Uptime of the previous run when it went down; 0 when unknown.
    pub uptime_at_event_ms: u32,
    pub free_heap_bytes: u32,
    pub memory: MemorySnapshot,
    pub context: CrashContext,
    /// Lifetime counter after this event was counted.
    pub crash_count: u32,
}

impl CrashEvent {
    /// Milliseconds between the last outbound call and the reset, if both
    /// are known.
    pub fn since_last_call_ms(&self) -> Option<u32> {
        if self.context.last_call.is_empty() || self.uptime_at_event_ms == 0 {
            return None;
        }
        self.uptime_at_event_ms.checked_sub(self.context.last_call_ms)
    }
}

/// Result of [`CrashRecorder::write_crash_dump`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpOutcome {
    /// Clean power-on; nothing to record.
    Skipped,
    /// Storage was not ready or the write failed.
    Dropped,
    Written(String),
}

/// Summary served to the operator console.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashInfo {
    pub crash_count: u32,
    pub last_cause: Option<ResetCause>,
    pub last_reason: BoundedStr<REASON_LEN>,
    pub last_screen: BoundedStr<SCREEN_LEN>,
    pub last_call: BoundedStr<CALL_LEN>,
    pub uptime_at_crash_ms: u32,
    pub watchdog_timeout: bool,
}

// ───────────────────────────────────────────────────────────────
// Recorder
// ───────────────────────────────────────────────────────────────

pub struct CrashRecorder<'r, C: ClockPort> {
    retained: &'r mut RetainedState,
    clock: C,
    last_event: Option<CrashEvent>,
}

impl<'r, C: ClockPort> CrashRecorder<'r, C> {
    pub fn new(retained: &'r mut RetainedState, clock: C) -> Self {
        Self {
            retained,
            clock,
            last_event: None,
        }
    }

    /// Classify the reset that started this run.  Call once, first.
    pub fn on_boot(&mut self, platform: &impl PlatformPort) -> CrashEvent {
        if self.retained.validate_or_reset() {
            log::info!("Retained state initialised (power loss or first boot)");
        }

        let register = platform.reset_cause();
        let memory = platform.memory();
        let pending = self.retained.has_pending_crash;

        let cause = match register {
            ResetCause::WatchdogTimeout => ResetCause::WatchdogTimeout,
            ResetCause::SoftwareReset | ResetCause::Unknown if pending => ResetCause::Exception,
            other => other,
        };

        let r = &mut *self.retained;
        if pending || cause.is_crash() {
            r.crash_count = r.crash_count.saturating_add(1);
        }
        if !pending && cause.is_crash() {
            r.last_crash_reason.set(cause.description());
            r.last_crash_uptime_ms = 0;
        }
        r.watchdog_timeout = cause.is_watchdog();
        r.has_pending_crash = false;

        let reason = if pending && !r.last_crash_reason.is_empty() {
            r.last_crash_reason
        } else {
            BoundedStr::from_str_truncating(cause.description())
        };

        let event = CrashEvent {
            cause,
            reason,
            uptime_at_event_ms: if pending { r.last_crash_uptime_ms } else { 0 },
            free_heap_bytes: memory.free_heap,
            memory,
            context: CrashContext {
                screen: r.last_screen,
                last_call: r.last_call,
                last_call_ms: r.last_call_ms,
            },
            crash_count: r.crash_count,
        };

        if cause == ResetCause::PowerOn {
            log::info!("Boot: {}", cause.description());
        } else {
            log::warn!(
                "Boot after {} ({}), crash count {}",
                cause,
                event.reason,
                event.crash_count
            );
        }

        self.last_event = Some(event);
        event
    }

    /// Record the screen currently shown.  Returns `true` if the name was
    /// truncated.
    pub fn set_current_screen(&mut self, name: &str) -> bool {
        let truncated = self.retained.last_screen.set(name);
        if truncated {
            log::debug!(
                "{}",
                Error::DataTruncated {
                    field: "screen name",
                    limit: SCREEN_LEN - 1,
                }
            );
        }
        truncated
    }

    /// Record an outbound call as `"<service> <endpoint>"` with the current
    /// uptime.  Returns `true` if the text was truncated.
    pub fn set_last_call(&mut self, service: &str, endpoint: &str) -> bool {
        let truncated = self.retained.last_call.set_joined(service, endpoint);
        self.retained.last_call_ms = self.clock.uptime_ms();
        if truncated {
            log::debug!(
                "{}",
                Error::DataTruncated {
                    field: "last call",
                    limit: CALL_LEN - 1,
                }
            );
        }
        truncated
    }

    /// Flag a crash in progress so the next boot reports it as one.
    pub fn mark_crash(&mut self, reason: &str) {
        record_pending_crash(self.retained, reason, self.clock.uptime_ms());
    }

    /// Write the boot event to `/logs/errors`.  Clean power-ons are
    /// skipped; if the logger is not ready the dump is dropped with a
    /// console warning.
    pub fn write_crash_dump<S, LC, D>(
        &self,
        event: &CrashEvent,
        logger: &mut PersistentLogger<S, LC, D>,
    ) -> DumpOutcome
    where
        S: StoragePort,
        LC: ClockPort,
        D: DelayNs,
    {
        if event.cause == ResetCause::PowerOn {
            return DumpOutcome::Skipped;
        }
        if !logger.is_ready() {
            log::warn!("Storage not ready, {} dump dropped", event.cause);
            return DumpOutcome::Dropped;
        }

        let now = logger.local_now();
        let prefix = if event.cause.is_watchdog() {
            WATCHDOG_PREFIX
        } else {
            CRASH_PREFIX
        };
        let text = render_dump(event, now);
        match logger.write_dump(prefix, now, &text) {
            Ok(path) => DumpOutcome::Written(path),
            Err(e) => {
                log::warn!("Crash dump not written: {}", e);
                DumpOutcome::Dropped
            }
        }
    }

    pub fn crash_count(&self) -> u32 {
        self.retained.crash_count
    }

    pub fn last_event(&self) -> Option<&CrashEvent> {
        self.last_event.as_ref()
    }

    pub fn crash_info(&self) -> CrashInfo {
        let r = &*self.retained;
        CrashInfo {
            crash_count: r.crash_count,
            last_cause: self.last_event.map(|e| e.cause),
            last_reason: r.last_crash_reason,
            last_screen: r.last_screen,
            last_call: r.last_call,
            uptime_at_crash_ms: r.last_crash_uptime_ms,
            watchdog_timeout: r.watchdog_timeout,
        }
    }

    /// Multi-line summary of the most recent crash for the console.
    pub fn last_crash_report(&self) -> String {
        let info = self.crash_info();
        let mut s = String::new();
        let _ = writeln!(s, "=== CRASH INFO ===");
        let _ = writeln!(s, "Total crashes: {}", info.crash_count);
        if let Some(cause) = info.last_cause {
            let _ = writeln!(s, "Last boot: {} ({})", cause, cause.description());
        }
        if info.crash_count == 0 {
            let _ = writeln!(s, "No crashes recorded");
            return s;
        }
        let _ = writeln!(s, "Last reason: {}", or_none(info.last_reason.as_str()));
        let _ = writeln!(s, "Watchdog: {}", if info.watchdog_timeout { "yes" } else { "no" });
        let _ = writeln!(s, "Uptime at crash: {} ms", info.uptime_at_crash_ms);
        let _ = writeln!(s, "Last screen: {}", or_none(info.last_screen.as_str()));
        let _ = writeln!(s, "Last call: {}", or_none(info.last_call.as_str()));
        s
    }
}

/// Shared by [`CrashRecorder::mark_crash`] and the panic hook.
pub fn record_pending_crash(state: &mut RetainedState, reason: &str, uptime_ms: u32) {
    state.validate_or_reset();
    state.has_pending_crash = true;
    state.last_crash_reason.set(reason);
    state.last_crash_uptime_ms = uptime_ms;
}

// ───────────────────────────────────────────────────────────────
// Panic hook: marks a pending crash in RTC memory before reset
// ───────────────────────────────────────────────────────────────

/// Thread that owns the retained region, registered by [`install_panic_hook`].
static RETAINED_OWNER: OnceLock<ThreadId> = OnceLock::new();

/// Register the calling thread as the owner of the retained region.
/// Later calls from other threads do not change the owner.
fn claim_retained_owner() {
    let _ = RETAINED_OWNER.get_or_init(|| std::thread::current().id());
}

/// Whether the current thread may write the retained region from the
/// panic hook.  A panic on any other thread leaves the region alone while
/// the owner may still be updating it; the reset-cause register still
/// reports the crash on the next boot.
fn owns_retained() -> bool {
    RETAINED_OWNER
        .get()
        .is_some_and(|id| *id == std::thread::current().id())
}

/// Install a panic hook that leaves the panic message in retained memory.
///
/// Call once, after [`CrashRecorder::on_boot`], from the thread that holds
/// the service.  The reset-cause register stays authoritative; this only
/// supplies the reason text and uptime.
pub fn install_panic_hook() {
    claim_retained_owner();
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let reason = if let Some(msg) = info.payload().downcast_ref::<&str>() {
            *msg
        } else if let Some(msg) = info.payload().downcast_ref::<String>() {
            msg.as_str()
        } else {
            "unknown panic"
        };

        log::error!("PANIC: {}", reason);
        let owner = owns_retained();

        #[cfg(target_os = "espidf")]
        if owner {
            // SAFETY: esp_timer_get_time is a counter read.  The hook is
            // running on the owning thread, which is unwinding and cannot
            // be inside a recorder call, so this is the only live access.
            let uptime_ms = (unsafe { esp_idf_svc::sys::esp_timer_get_time() } / 1000) as u32;
            let state = unsafe { &mut *super::retained::retained_raw() };
            record_pending_crash(state, reason, uptime_ms);
        }
        if !owner {
            log::error!("Panic outside the main task, reason not retained");
        }

        default_hook(info);
    }));
}

// ───────────────────────────────────────────────────────────────
// Dump rendering
// ───────────────────────────────────────────────────────────────

const LOW_HEAP_BYTES: u32 = 20 * 1024;
const FRAGMENTED_BLOCK_BYTES: u32 = 8 * 1024;
/// A call this close to the reset is treated as a suspect.
const RECENT_CALL_MS: u32 = 10_000;

fn or_none(s: &str) -> &str {
    if s.is_empty() { "(none)" } else { s }
}

/// Hints, most specific first.
pub fn likely_causes(event: &CrashEvent) -> Vec<String> {
    let mut hints = Vec::new();
    let since_call = event.since_last_call_ms();

    match event.cause {
        ResetCause::WatchdogTimeout => {
            hints.push("Main loop blocked longer than the watchdog timeout".to_string());
            if let Some(ms) = since_call.filter(|ms| *ms < RECENT_CALL_MS) {
                hints.push(format!(
                    "Outbound call '{}' started {} ms before reset and may have hung",
                    event.context.last_call, ms
                ));
            }
        }
        ResetCause::Exception => {
            hints.push(format!("Panic or CPU exception: {}", event.reason));
        }
        ResetCause::BrownOut => {
            hints.push("Supply voltage dropped below the brown-out threshold".to_string());
        }
        ResetCause::ExternalReset => {
            hints.push("Reset button or external reset line".to_string());
        }
        ResetCause::SoftwareReset => {
            hints.push("Restart requested by firmware".to_string());
        }
        ResetCause::Unknown => {
            hints.push("Reset reason not reported by the chip".to_string());
        }
        ResetCause::PowerOn => {}
    }

    if event.memory.total_heap > 0 && event.memory.min_free_heap < LOW_HEAP_BYTES {
        hints.push(format!(
            "Heap ran low (minimum free {} bytes)",
            event.memory.min_free_heap
        ));
    }
    if event.memory.total_heap > 0 && event.memory.largest_free_block < FRAGMENTED_BLOCK_BYTES {
        hints.push(format!(
            "Heap fragmented (largest free block {} bytes)",
            event.memory.largest_free_block
        ));
    }
    hints
}

fn recommended_actions(cause: ResetCause) -> &'static [&'static str] {
    match cause {
        ResetCause::WatchdogTimeout => &[
            "Check network timeouts on the last outbound call",
            "Look for blocking loops on the last screen",
            "Review system log lines just before the reset",
        ],
        ResetCause::Exception => &[
            "Review the panic reason and the last screen",
            "Check heap figures for exhaustion",
            "Review system log lines just before the reset",
        ],
        ResetCause::BrownOut => &[
            "Check the power supply and battery",
            "Check for current spikes from the display backlight",
        ],
        _ => &["No action required unless resets repeat"],
    }
}

/// Human-readable dump written to `/logs/errors`.
pub fn render_dump(event: &CrashEvent, now: NaiveDateTime) -> String {
    let mut s = String::with_capacity(1024);
    let m = &event.memory;
    let secs = event.uptime_at_event_ms / 1000;

    let _ = writeln!(s, "========== CRASH REPORT ==========");
    let _ = writeln!(s, "Timestamp: {}", layout::timestamp(now));
    let _ = writeln!(s, "Cause: {} ({})", event.cause, event.cause.description());
    let _ = writeln!(s, "Reason: {}", or_none(event.reason.as_str()));
    let _ = writeln!(
        s,
        "Uptime at crash: {} s ({}h {}m {}s)",
        secs,
        secs / 3600,
        secs % 3600 / 60,
        secs % 60
    );
    let _ = writeln!(s, "Crash count: {}", event.crash_count);

    let _ = writeln!(s);
    let _ = writeln!(s, "--- Memory ---");
    let _ = writeln!(s, "Free heap: {} bytes", m.free_heap);
    let _ = writeln!(s, "Total heap: {} bytes", m.total_heap);
    let _ = writeln!(s, "Heap used: {:.1}%", m.heap_used_percent());
    let _ = writeln!(s, "Min free heap: {} bytes", m.min_free_heap);
    let _ = writeln!(s, "Largest free block: {} bytes", m.largest_free_block);
    if m.total_psram > 0 {
        let _ = writeln!(s, "Free PSRAM: {} bytes", m.free_psram);
        let _ = writeln!(s, "Total PSRAM: {} bytes", m.total_psram);
        let _ = writeln!(s, "PSRAM used: {:.1}%", m.psram_used_percent());
    }

    let _ = writeln!(s);
    let _ = writeln!(s, "--- Application context ---");
    let _ = writeln!(s, "Last screen: {}", or_none(event.context.screen.as_str()));
    let _ = writeln!(s, "Last call: {}", or_none(event.context.last_call.as_str()));
    if let Some(ms) = event.since_last_call_ms() {
        let _ = writeln!(s, "Time since last call: {} ms", ms);
    }

    let _ = writeln!(s);
    let _ = writeln!(s, "--- Likely causes ---");
    for hint in likely_causes(event) {
        let _ = writeln!(s, "- {}", hint);
    }

    let _ = writeln!(s);
    let _ = writeln!(s, "--- Recommended actions ---");
    for (i, action) in recommended_actions(event.cause).iter().enumerate() {
        let _ = writeln!(s, "{}. {}", i + 1, action);
    }
    let _ = writeln!(s, "========== END CRASH REPORT ==========");
    s
}
