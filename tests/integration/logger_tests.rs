//! SD logger behaviour across card events, write failures and day
//! boundaries.
//!
//! Most tests run against `MockCard`; the last group uses the host
//! simulation of `SdCardStorage` over a temp directory so the std::fs
//! path is exercised as well.

use super::mock_hw::{MockCard, NoDelay, SimClock};

use chrono::{Days, NaiveDate};

use panel_sentinel::adapters::sd_card::SdCardStorage;
use panel_sentinel::config::LoggerConfig;
use panel_sentinel::logger::layout::{self, LogCategory, SYSTEM_PREFIX};
use panel_sentinel::logger::level::LogLevel;
use panel_sentinel::logger::{HotSwap, LoggerStatus, PersistentLogger};

type Logger<'c> = PersistentLogger<MockCard, &'c SimClock, NoDelay>;

const TODAY_LOG: &str = "/logs/system/system_2026-10-18.log";

fn logger(clock: &SimClock) -> Logger<'_> {
    let mut l = PersistentLogger::new(MockCard::new(), clock, NoDelay, LoggerConfig::default());
    l.initialize().unwrap();
    l
}

fn lines(l: &Logger<'_>, path: &str) -> Vec<String> {
    l.storage().text(path).lines().map(str::to_string).collect()
}

// ── Buffering & flush ─────────────────────────────────────────

#[test]
fn error_flushes_the_records_buffered_before_it() {
    let clock = SimClock::at(2026, 10, 18);
    let mut l = logger(&clock);

    l.log(LogLevel::Info, "wifi connected");
    l.log(LogLevel::Info, "price updated");
    l.log(LogLevel::Warn, "mempool slow");
    assert!(l.storage().text(TODAY_LOG).is_empty(), "still buffered");

    l.log(LogLevel::Error, "block fetch failed");

    let got = lines(&l, TODAY_LOG);
    assert_eq!(got.len(), 4);
    assert!(got[0].ends_with("[INFO] wifi connected"), "{}", got[0]);
    assert!(got[1].ends_with("[INFO] price updated"));
    assert!(got[2].ends_with("[WARN] mempool slow"));
    assert!(got[3].ends_with("[ERROR] block fetch failed"));
    assert!(got[0].starts_with("[2026-10-18 08:30:00.000]"), "{}", got[0]);
    assert_eq!(l.buffered_records(), 0);
}

#[test]
fn empty_flush_is_a_noop() {
    let clock = SimClock::at(2026, 10, 18);
    let mut l = logger(&clock);

    assert!(l.flush().is_ok());
    assert!(l.flush().is_ok());
    assert!(!l.storage().files.contains_key(TODAY_LOG));
}

#[test]
fn timed_flush_happens_on_tick() {
    let clock = SimClock::at(2026, 10, 18);
    let mut l = logger(&clock);

    l.log(LogLevel::Info, "idle");
    l.tick();
    assert_eq!(l.buffered_records(), 1);

    clock.advance_ms(l.config().flush_interval_ms);
    l.tick();
    assert_eq!(l.buffered_records(), 0);
    assert_eq!(lines(&l, TODAY_LOG).len(), 1);
}

#[test]
fn records_below_threshold_are_dropped() {
    let clock = SimClock::at(2026, 10, 18);
    let mut l = logger(&clock);
    l.set_level(LogLevel::Warn);

    l.log(LogLevel::Info, "chatty");
    l.log(LogLevel::Debug, "chattier");
    l.log(LogLevel::Error, "kept");

    assert_eq!(lines(&l, TODAY_LOG).len(), 1);
}

// ── Hot-swap ──────────────────────────────────────────────────

#[test]
fn card_pulled_and_reinserted_recovers() {
    let clock = SimClock::at(2026, 10, 18);
    let mut l = logger(&clock);
    let probe_ms = l.config().hot_swap_interval_ms;

    l.storage_mut().inserted = false;
    clock.advance_ms(probe_ms);
    assert_eq!(l.tick(), HotSwap::Removed);
    assert_eq!(l.status(), LoggerStatus::CardAbsent);

    // Nothing is buffered while the card is out.
    l.log(LogLevel::Error, "lost");
    assert_eq!(l.buffered_records(), 0);

    l.storage_mut().inserted = true;
    clock.advance_ms(100);
    assert_eq!(l.tick(), HotSwap::RateLimited);

    clock.advance_ms(probe_ms);
    assert_eq!(l.tick(), HotSwap::Recovered);
    assert_eq!(l.status(), LoggerStatus::Active);

    let text = l.storage().text(TODAY_LOG);
    assert!(text.contains("SD card recovered after hot-swap"), "{text}");
    assert!(!text.contains("lost"));
}

#[test]
fn repeated_write_failures_suspend_then_recover_without_loss() {
    let clock = SimClock::at(2026, 10, 18);
    let mut l = logger(&clock);
    let threshold = l.config().failure_threshold;

    l.storage_mut().fail_writes = true;
    for i in 0..threshold {
        l.log(LogLevel::Error, &format!("attempt {i}"));
    }
    assert_eq!(l.status(), LoggerStatus::CardAbsent);
    assert_eq!(l.buffered_records(), usize::from(threshold));

    l.storage_mut().fail_writes = false;
    clock.advance_ms(l.config().hot_swap_interval_ms);
    assert_eq!(l.tick(), HotSwap::Recovered);

    let got = lines(&l, TODAY_LOG);
    assert_eq!(got.len(), usize::from(threshold) + 1);
    assert!(got[0].ends_with("attempt 0"));
    assert!(got.last().unwrap().ends_with("SD card recovered after hot-swap"));
    assert_eq!(l.consecutive_failures(), 0);
}

// ── Rotation ──────────────────────────────────────────────────

#[test]
fn midnight_moves_records_to_the_next_file() {
    let clock = SimClock::at(2026, 10, 18);
    let mut l = logger(&clock);

    l.log(LogLevel::Info, "before midnight");
    // 08:30 + 16 h = 00:30 the next day.
    clock.advance_ms(16 * 3_600_000);
    l.log(LogLevel::Error, "after midnight");

    assert_eq!(lines(&l, TODAY_LOG).len(), 1);
    let next = lines(&l, "/logs/system/system_2026-10-19.log");
    assert_eq!(next.len(), 1);
    assert!(next[0].ends_with("after midnight"));
    assert_eq!(l.rotation_key(), NaiveDate::from_ymd_opt(2026, 10, 19));
}

// ── Retention ─────────────────────────────────────────────────

#[test]
fn cleanup_removes_only_files_past_retention() {
    let clock = SimClock::at(2026, 10, 18);
    let mut l = logger(&clock);
    l.set_retention_days(90).unwrap();

    let today = l.today();
    for age in [95, 40, 5] {
        let date = today.checked_sub_days(Days::new(age)).unwrap();
        let path = layout::daily_path(LogCategory::System, SYSTEM_PREFIX, date, "log");
        l.storage_mut().seed(&path, "x\n");
    }
    l.storage_mut().seed("/logs/errors/crash_2025-01-01_00-00-00-000.log", "old dump");

    assert_eq!(l.cleanup_all(), 1);

    let left = l.storage().files_in("/logs/system");
    assert_eq!(left.len(), 2);
    assert!(left.iter().all(|n| n != "system_2026-07-15.log"));
    assert!(l.storage().files.contains_key("/logs/errors/crash_2025-01-01_00-00-00-000.log"));
}

#[test]
fn data_files_use_their_own_retention() {
    let clock = SimClock::at(2026, 10, 18);
    let mut l = logger(&clock);

    // Default rules: price 90 days, mempool 30 days, blocks kept.
    l.storage_mut().seed("/logs/data/btc_price_2026-08-01.csv", "h\n");
    l.storage_mut().seed("/logs/data/btc_mempool_2026-08-01.csv", "h\n");
    l.storage_mut().seed("/logs/data/btc_blocks_2020-01-01.csv", "h\n");

    assert_eq!(l.cleanup_all(), 1);
    assert!(!l.storage().files.contains_key("/logs/data/btc_mempool_2026-08-01.csv"));
    assert!(l.storage().files.contains_key("/logs/data/btc_price_2026-08-01.csv"));
    assert!(l.storage().files.contains_key("/logs/data/btc_blocks_2020-01-01.csv"));
}

// ── Structured records ────────────────────────────────────────

#[test]
fn api_calls_and_csv_rows_land_in_their_files() {
    let clock = SimClock::at(2026, 10, 18);
    let mut l = logger(&clock);

    l.log_api("mempool", "/api/v1/fees/recommended", 200, 312, 1_024).unwrap();
    l.log_api_error("openai", "/v1/chat/completions", 429, "rate limited").unwrap();
    l.log_price(67_000.5, 61_500.25).unwrap();
    l.log_price(67_010.0, 61_510.0).unwrap();

    let api = l.storage().text("/logs/api/mempool_2026-10-18.log");
    let v: serde_json::Value = serde_json::from_str(api.trim()).unwrap();
    assert_eq!(v["status"], 200);
    assert_eq!(v["success"], true);

    let err = l.storage().text("/logs/errors/api_errors_2026-10-18.log");
    assert!(err.contains("rate limited"));

    let csv = lines(&l, "/logs/data/btc_price_2026-10-18.csv");
    assert_eq!(csv.len(), 3, "one header, two rows");
    assert_eq!(csv[0], "timestamp,price_usd,price_eur");
    assert!(csv[1].ends_with(",67000.50,61500.25"));

    // The API error also produced a flushed system-log line.
    assert!(l.storage().text(TODAY_LOG).contains("API error: openai"));
}

// ── Host SD card simulation (std::fs) ─────────────────────────

#[test]
fn sd_card_simulation_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let clock = SimClock::at(2026, 10, 18);
    let card = SdCardStorage::simulated(dir.path(), 64 << 20);
    let mut l = PersistentLogger::new(card, &clock, NoDelay, LoggerConfig::default());

    l.initialize().unwrap();
    for sub in ["system", "api", "data", "errors", "debug"] {
        assert!(dir.path().join("logs").join(sub).is_dir(), "{sub}");
    }

    l.log(LogLevel::Info, "hello");
    l.log(LogLevel::Error, "world");
    let on_disk = std::fs::read_to_string(dir.path().join("logs/system/system_2026-10-18.log")).unwrap();
    assert_eq!(on_disk.lines().count(), 2);
    assert!(l.free_space() < 64 << 20);

    l.storage_mut().set_present(false);
    clock.advance_ms(l.config().hot_swap_interval_ms);
    assert_eq!(l.tick(), HotSwap::Removed);

    l.storage_mut().set_present(true);
    clock.advance_ms(l.config().hot_swap_interval_ms);
    assert_eq!(l.tick(), HotSwap::Recovered);
    let on_disk = std::fs::read_to_string(dir.path().join("logs/system/system_2026-10-18.log")).unwrap();
    assert_eq!(on_disk.lines().count(), 3);
}
