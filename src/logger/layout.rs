//! On-card directory layout and file naming.
//!
//! ```text
//! /logs
//! ├── system   system_YYYY-MM-DD.log, boot_<stamp>.log
//! ├── api      <service>_YYYY-MM-DD.log          (JSON lines)
//! ├── data     btc_price_YYYY-MM-DD.csv, btc_blocks_…, btc_mempool_…,
//! │            memory_usage.csv
//! ├── errors   crash_<stamp>.log, watchdog_<stamp>.log,
//! │            api_errors_YYYY-MM-DD.log
//! └── debug
//! ```
//!
//! Daily files embed an ISO date between the last `_` and the extension;
//! retention scanning relies on that, so these names must stay stable.

use core::fmt::Write;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

pub const LOG_ROOT: &str = "/logs";
pub const SYSTEM_DIR: &str = "/logs/system";
pub const API_DIR: &str = "/logs/api";
pub const DATA_DIR: &str = "/logs/data";
pub const ERRORS_DIR: &str = "/logs/errors";
pub const DEBUG_DIR: &str = "/logs/debug";

/// Created (parents first) on every successful mount.
pub const DIRECTORIES: [&str; 6] = [LOG_ROOT, SYSTEM_DIR, API_DIR, DATA_DIR, ERRORS_DIR, DEBUG_DIR];

pub const SYSTEM_PREFIX: &str = "system_";
pub const BOOT_PREFIX: &str = "boot_";
pub const PRICE_PREFIX: &str = "btc_price_";
pub const BLOCKS_PREFIX: &str = "btc_blocks_";
pub const MEMPOOL_PREFIX: &str = "btc_mempool_";
pub const CRASH_PREFIX: &str = "crash_";
pub const WATCHDOG_PREFIX: &str = "watchdog_";
pub const API_ERRORS_PREFIX: &str = "api_errors_";

pub const MEMORY_USAGE_FILE: &str = "/logs/data/memory_usage.csv";

/// `YYYY-MM-DD`
pub type DateKey = heapless::String<10>;
/// `YYYY-MM-DD HH:MM:SS.mmm`
pub type Timestamp = heapless::String<23>;
/// `YYYY-MM-DD_HH-MM-SS-mmm`, safe on FAT.
pub type FileStamp = heapless::String<23>;

/// Top-level directories under `/logs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCategory {
    System,
    Api,
    Data,
    Errors,
    Debug,
}

impl LogCategory {
    pub const ALL: [Self; 5] = [Self::System, Self::Api, Self::Data, Self::Errors, Self::Debug];

    pub const fn dir(self) -> &'static str {
        match self {
            Self::System => SYSTEM_DIR,
            Self::Api => API_DIR,
            Self::Data => DATA_DIR,
            Self::Errors => ERRORS_DIR,
            Self::Debug => DEBUG_DIR,
        }
    }
}

/// Files in `category` whose name starts with `prefix`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilePattern<'a> {
    pub category: LogCategory,
    pub prefix: &'a str,
}

impl<'a> FilePattern<'a> {
    pub const fn new(category: LogCategory, prefix: &'a str) -> Self {
        Self { category, prefix }
    }

    pub fn matches(&self, name: &str) -> bool {
        name.starts_with(self.prefix)
    }
}

pub fn date_key(date: NaiveDate) -> DateKey {
    let mut s = DateKey::new();
    let _ = write!(s, "{:04}-{:02}-{:02}", date.year(), date.month(), date.day());
    s
}

/// Millisecond-precision line timestamp.
pub fn timestamp(t: NaiveDateTime) -> Timestamp {
    let mut s = Timestamp::new();
    let _ = write!(
        s,
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:03}",
        t.year(),
        t.month(),
        t.day(),
        t.hour(),
        t.minute(),
        t.second(),
        t.nanosecond() / 1_000_000 % 1000,
    );
    s
}

/// Timestamp usable inside a file name.
pub fn file_stamp(t: NaiveDateTime) -> FileStamp {
    let mut s = FileStamp::new();
    let _ = write!(
        s,
        "{:04}-{:02}-{:02}_{:02}-{:02}-{:02}-{:03}",
        t.year(),
        t.month(),
        t.day(),
        t.hour(),
        t.minute(),
        t.second(),
        t.nanosecond() / 1_000_000 % 1000,
    );
    s
}

/// `<dir>/<prefix><YYYY-MM-DD>.<ext>`
pub fn daily_path(category: LogCategory, prefix: &str, date: NaiveDate, ext: &str) -> String {
    format!("{}/{}{}.{}", category.dir(), prefix, date_key(date), ext)
}

/// `<dir>/<prefix><stamp>.log`
pub fn stamped_path(category: LogCategory, prefix: &str, t: NaiveDateTime) -> String {
    format!("{}/{}{}.log", category.dir(), prefix, file_stamp(t))
}

/// `<dir>/<prefix><stamp>-<n>.log`, the `n`th alternative when the plain
/// stamped name is already taken.
pub fn numbered_stamped_path(category: LogCategory, prefix: &str, t: NaiveDateTime, n: u32) -> String {
    format!("{}/{}{}-{}.log", category.dir(), prefix, file_stamp(t), n)
}

pub fn join(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name)
}

/// Extract the `YYYY-MM-DD` embedded between the last `_` and the last
/// `.` of a file name.  `None` for names without a parseable date
/// (including stamped dump files) or with a non-canonical one.
pub fn parse_file_date(name: &str) -> Option<NaiveDate> {
    let start = name.rfind('_')? + 1;
    let end = name.rfind('.')?;
    if end <= start {
        return None;
    }

    let key = &name[start..end];
    let b = key.as_bytes();
    let shape_ok = b.len() == 10
        && b[4] == b'-'
        && b[7] == b'-'
        && b.iter()
            .enumerate()
            .all(|(i, c)| i == 4 || i == 7 || c.is_ascii_digit());
    if !shape_ok {
        return None;
    }

    let year: i32 = key[..4].parse().ok()?;
    let month: u32 = key[5..7].parse().ok()?;
    let day: u32 = key[8..].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Whole calendar days between `file_date` and `today`.  Negative for
/// files dated in the future (clock stepped backwards).
pub fn age_in_days(file_date: NaiveDate, today: NaiveDate) -> i64 {
    today.signed_duration_since(file_date).num_days()
}
