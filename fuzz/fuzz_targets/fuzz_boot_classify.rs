//! Fuzz target: boot classification over arbitrary retained memory
//!
//! RTC memory can hold anything after a brown-out, so `on_boot` is driven
//! with fuzzed retained fields and reset causes.  Verifies:
//! - No panics
//! - The pending flag is always cleared
//! - The crash counter never decreases while the magic word is intact
//! - A watchdog register always yields a watchdog event
//!
//! cargo fuzz run fuzz_boot_classify

#![no_main]

use chrono::{NaiveDate, NaiveDateTime};
use libfuzzer_sys::fuzz_target;
use panel_sentinel::app::ports::{ClockPort, PlatformPort};
use panel_sentinel::diagnostics::crash::{CrashRecorder, ResetCause};
use panel_sentinel::diagnostics::memory::MemorySnapshot;
use panel_sentinel::diagnostics::retained::{RETAINED_MAGIC, RetainedState};

const CAUSES: [ResetCause; 7] = [
    ResetCause::PowerOn,
    ResetCause::ExternalReset,
    ResetCause::SoftwareReset,
    ResetCause::Exception,
    ResetCause::WatchdogTimeout,
    ResetCause::BrownOut,
    ResetCause::Unknown,
];

struct Chip(ResetCause);

impl PlatformPort for Chip {
    fn reset_cause(&self) -> ResetCause {
        self.0
    }

    fn memory(&self) -> MemorySnapshot {
        MemorySnapshot::default()
    }
}

struct Clock;

impl ClockPort for Clock {
    fn uptime_ms(&self) -> u32 {
        0
    }

    fn now(&self) -> NaiveDateTime {
        NaiveDate::MIN.and_hms_opt(0, 0, 0).unwrap_or_default()
    }
}

fn word(data: &[u8], at: usize) -> u32 {
    data.get(at..at + 4)
        .and_then(|s| s.try_into().ok())
        .map(u32::from_le_bytes)
        .unwrap_or(0)
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    let cause = CAUSES[data[0] as usize % CAUSES.len()];
    let mut state = RetainedState::new();
    if data[1] & 1 == 0 {
        state.magic = word(data, 2);
    }
    state.has_pending_crash = data[1] & 2 != 0;
    state.crash_count = word(data, 6);
    state.last_crash_uptime_ms = word(data, 10);
    state.last_call_ms = word(data, 14);

    let text = core::str::from_utf8(data.get(18..).unwrap_or_default()).unwrap_or("");
    state.last_crash_reason.set(text);
    state.last_screen.set(text);
    state.last_call.set_joined(text, text);

    let intact = state.magic == RETAINED_MAGIC;
    let before = state.crash_count;

    let mut rec = CrashRecorder::new(&mut state, Clock);
    let event = rec.on_boot(&Chip(cause));
    let _ = event.since_last_call_ms();

    assert!(!state.has_pending_crash, "pending flag survived boot");
    if intact {
        assert!(state.crash_count >= before, "crash count went backwards");
    }
    if cause == ResetCause::WatchdogTimeout {
        assert_eq!(event.cause, ResetCause::WatchdogTimeout);
        assert!(state.watchdog_timeout);
    }
});
