//! Boot-time crash classification and dump writing.
//!
//! Drives `CrashRecorder::on_boot` and `write_crash_dump` against a mock
//! card and reset-cause register, simulating the retained region across
//! several "reboots" by reusing one `RetainedState`.

use super::mock_hw::{MockCard, MockChip, NoDelay, SimClock};

use panel_sentinel::config::LoggerConfig;
use panel_sentinel::diagnostics::crash::{
    CrashRecorder, DumpOutcome, ResetCause, record_pending_crash,
};
use panel_sentinel::diagnostics::retained::RetainedState;
use panel_sentinel::logger::PersistentLogger;

fn ready_logger(clock: &SimClock) -> PersistentLogger<MockCard, &SimClock, NoDelay> {
    let mut logger = PersistentLogger::new(MockCard::new(), clock, NoDelay, LoggerConfig::default());
    logger.initialize().unwrap();
    logger
}

fn error_files(logger: &PersistentLogger<MockCard, &SimClock, NoDelay>) -> Vec<String> {
    logger.storage().files_in("/logs/errors")
}

// ── Clean power-on ────────────────────────────────────────────

#[test]
fn power_on_with_nothing_pending_writes_no_dump() {
    let clock = SimClock::at(2026, 10, 18);
    let mut retained = RetainedState::ZEROED;
    let mut logger = ready_logger(&clock);

    let mut rec = CrashRecorder::new(&mut retained, &clock);
    let event = rec.on_boot(&MockChip::new(ResetCause::PowerOn));

    assert_eq!(event.cause, ResetCause::PowerOn);
    assert_eq!(event.crash_count, 0);
    assert_eq!(rec.write_crash_dump(&event, &mut logger), DumpOutcome::Skipped);
    assert!(error_files(&logger).is_empty());
    assert!(retained.is_valid(), "magic written on first boot");
}

// ── Panic → software reset → reboot ───────────────────────────

#[test]
fn pending_crash_is_reported_with_screen_and_cleared() {
    let clock = SimClock::at(2026, 10, 18);
    let mut retained = RetainedState::new();
    retained.last_screen.set("Main");
    retained.last_call.set_joined("mempool", "/api/blocks/tip/height");
    retained.last_call_ms = 41_000;
    record_pending_crash(&mut retained, "LoadProhibited", 45_000);

    let mut logger = ready_logger(&clock);
    let mut rec = CrashRecorder::new(&mut retained, &clock);
    let event = rec.on_boot(&MockChip::new(ResetCause::SoftwareReset));

    assert_eq!(event.cause, ResetCause::Exception);
    assert_eq!(event.reason.as_str(), "LoadProhibited");
    assert_eq!(event.uptime_at_event_ms, 45_000);
    assert_eq!(event.crash_count, 1);
    assert_eq!(event.since_last_call_ms(), Some(4_000));

    let DumpOutcome::Written(path) = rec.write_crash_dump(&event, &mut logger) else {
        panic!("dump not written");
    };
    assert!(path.starts_with("/logs/errors/crash_"), "{path}");
    let text = logger.storage().text(&path);
    assert!(text.contains("========== CRASH REPORT =========="));
    assert!(text.contains("Main"));
    assert!(text.contains("mempool /api/blocks/tip/height"));
    assert!(text.contains("Uptime at crash: 45 s"));
    assert!(text.contains("========== END CRASH REPORT =========="));

    assert!(!retained.has_pending_crash);
}

#[test]
fn exception_register_with_pending_crash_names_the_screen() {
    let clock = SimClock::at(2026, 10, 18);
    let mut retained = RetainedState::new();
    retained.last_screen.set("Main");
    record_pending_crash(&mut retained, "StoreProhibited", 12_000);

    let mut logger = ready_logger(&clock);
    let mut rec = CrashRecorder::new(&mut retained, &clock);
    let event = rec.on_boot(&MockChip::new(ResetCause::Exception));

    assert_eq!(event.cause, ResetCause::Exception);
    assert_eq!(event.reason.as_str(), "StoreProhibited");
    assert_eq!(event.crash_count, 1, "pending flag and register are one crash");

    let DumpOutcome::Written(path) = rec.write_crash_dump(&event, &mut logger) else {
        panic!("dump not written");
    };
    assert!(path.starts_with("/logs/errors/crash_"), "{path}");
    assert!(logger.storage().text(&path).contains("Main"));
    assert!(!retained.has_pending_crash);
}

#[test]
fn crashes_at_the_same_clock_reading_keep_separate_dumps() {
    // Before SNTP the wall clock restarts at the epoch, so consecutive
    // boots reach the dump with the same stamp.
    let clock = SimClock::at(1970, 1, 1);
    clock.advance_ms(1_234);
    let mut retained = RetainedState::new();
    let mut logger = ready_logger(&clock);

    let mut written = Vec::new();
    for reason in ["first panic", "second panic"] {
        record_pending_crash(&mut retained, reason, 1_000);
        let mut rec = CrashRecorder::new(&mut retained, &clock);
        let event = rec.on_boot(&MockChip::new(ResetCause::SoftwareReset));
        let DumpOutcome::Written(path) = rec.write_crash_dump(&event, &mut logger) else {
            panic!("dump not written");
        };
        written.push(path);
    }

    assert_eq!(
        written,
        [
            "/logs/errors/crash_1970-01-01_08-30-01-234.log",
            "/logs/errors/crash_1970-01-01_08-30-01-234-1.log",
        ]
    );
    assert_eq!(error_files(&logger).len(), 2);
    assert!(logger.storage().text(&written[0]).contains("first panic"));
    assert!(logger.storage().text(&written[1]).contains("second panic"));
}

#[test]
fn watchdog_register_wins_over_pending_flag() {
    let clock = SimClock::at(2026, 10, 18);
    let mut retained = RetainedState::new();
    record_pending_crash(&mut retained, "stuck in draw loop", 90_000);

    let mut logger = ready_logger(&clock);
    let mut rec = CrashRecorder::new(&mut retained, &clock);
    let event = rec.on_boot(&MockChip::new(ResetCause::WatchdogTimeout));

    assert_eq!(event.cause, ResetCause::WatchdogTimeout);
    assert_eq!(event.crash_count, 1, "one event, counted once");

    let DumpOutcome::Written(path) = rec.write_crash_dump(&event, &mut logger) else {
        panic!("dump not written");
    };
    assert!(path.starts_with("/logs/errors/watchdog_"), "{path}");
    assert!(retained.watchdog_timeout);
}

#[test]
fn crash_count_survives_consecutive_reboots() {
    let clock = SimClock::at(2026, 10, 18);
    let mut retained = RetainedState::new();

    for expected in 1..=3 {
        let mut rec = CrashRecorder::new(&mut retained, &clock);
        let event = rec.on_boot(&MockChip::new(ResetCause::Exception));
        assert_eq!(event.crash_count, expected);
    }

    // A clean software restart does not count.
    let mut rec = CrashRecorder::new(&mut retained, &clock);
    let event = rec.on_boot(&MockChip::new(ResetCause::SoftwareReset));
    assert_eq!(event.crash_count, 3);
}

#[test]
fn corrupt_retained_region_starts_over() {
    let clock = SimClock::at(2026, 10, 18);
    let mut retained = RetainedState::new();
    retained.crash_count = 12;
    retained.magic = 0xDEAD_BEEF;

    let mut rec = CrashRecorder::new(&mut retained, &clock);
    let event = rec.on_boot(&MockChip::new(ResetCause::BrownOut));

    assert_eq!(event.crash_count, 0);
    assert!(retained.is_valid());
}

// ── Storage unavailable ───────────────────────────────────────

#[test]
fn dump_is_dropped_without_a_card() {
    let clock = SimClock::at(2026, 10, 18);
    let mut retained = RetainedState::new();
    let mut logger = PersistentLogger::new(MockCard::removed(), &clock, NoDelay, LoggerConfig::default());
    assert!(logger.initialize().is_err());

    let mut rec = CrashRecorder::new(&mut retained, &clock);
    let event = rec.on_boot(&MockChip::new(ResetCause::Exception));

    assert_eq!(rec.write_crash_dump(&event, &mut logger), DumpOutcome::Dropped);
    // The count is still kept in retained memory.
    assert_eq!(rec.crash_count(), 1);
}

#[test]
fn low_heap_shows_up_in_likely_causes() {
    let clock = SimClock::at(2026, 10, 18);
    let mut retained = RetainedState::new();
    let mut chip = MockChip::new(ResetCause::Exception);
    chip.memory.free_heap = 12_000;
    chip.memory.min_free_heap = 12_000;

    let mut logger = ready_logger(&clock);
    let mut rec = CrashRecorder::new(&mut retained, &clock);
    let event = rec.on_boot(&chip);

    let DumpOutcome::Written(path) = rec.write_crash_dump(&event, &mut logger) else {
        panic!("dump not written");
    };
    let text = logger.storage().text(&path);
    assert!(text.contains("--- Likely causes ---"));
    assert!(text.contains("Heap ran low (minimum free 12000 bytes)"));
}
