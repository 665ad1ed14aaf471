//! Mock hardware adapters for integration tests.
//!
//! An in-memory SD card with failure injection, a hand-cranked clock, a
//! reset-cause register and a watchdog timer that records every call.

use std::cell::Cell;
use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use embedded_hal::delay::DelayNs;

use panel_sentinel::app::ports::{ClockPort, PlatformPort, StorageError, StoragePort, WatchdogPort};
use panel_sentinel::diagnostics::crash::ResetCause;
use panel_sentinel::diagnostics::memory::MemorySnapshot;
use panel_sentinel::error::WatchdogError;

// ── MockCard ──────────────────────────────────────────────────

pub struct MockCard {
    pub files: BTreeMap<String, Vec<u8>>,
    pub dirs: Vec<String>,
    pub inserted: bool,
    pub mounted: bool,
    pub fail_writes: bool,
}

#[allow(dead_code)]
impl MockCard {
    pub fn new() -> Self {
        Self {
            files: BTreeMap::new(),
            dirs: Vec::new(),
            inserted: true,
            mounted: false,
            fail_writes: false,
        }
    }

    pub fn removed() -> Self {
        Self {
            inserted: false,
            ..Self::new()
        }
    }

    pub fn text(&self, path: &str) -> String {
        self.files
            .get(path)
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default()
    }

    pub fn seed(&mut self, path: &str, body: &str) {
        self.files.insert(path.to_string(), body.as_bytes().to_vec());
    }

    pub fn files_in(&self, dir: &str) -> Vec<String> {
        let prefix = format!("{dir}/");
        self.files
            .keys()
            .filter_map(|p| p.strip_prefix(&prefix))
            .map(str::to_string)
            .collect()
    }

    fn ready(&self) -> Result<(), StorageError> {
        if self.inserted && self.mounted {
            Ok(())
        } else {
            Err(StorageError::NotPresent)
        }
    }
}

impl Default for MockCard {
    fn default() -> Self {
        Self::new()
    }
}

impl StoragePort for MockCard {
    fn probe(&mut self) -> bool {
        self.inserted
    }

    fn mount(&mut self) -> Result<(), StorageError> {
        if !self.inserted {
            return Err(StorageError::NotPresent);
        }
        self.mounted = true;
        Ok(())
    }

    fn unmount(&mut self) {
        self.mounted = false;
    }

    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path) || self.dirs.iter().any(|d| d == path)
    }

    fn create_dir(&mut self, path: &str) -> Result<(), StorageError> {
        self.ready()?;
        if !self.dirs.iter().any(|d| d == path) {
            self.dirs.push(path.to_string());
        }
        Ok(())
    }

    fn append(&mut self, path: &str, data: &[u8]) -> Result<usize, StorageError> {
        self.ready()?;
        if self.fail_writes {
            return Err(StorageError::IoError);
        }
        self.files.entry(path.to_string()).or_default().extend_from_slice(data);
        Ok(data.len())
    }

    fn write_new(&mut self, path: &str, data: &[u8]) -> Result<usize, StorageError> {
        self.ready()?;
        if self.fail_writes {
            return Err(StorageError::OpenFailed);
        }
        if self.files.contains_key(path) {
            return Err(StorageError::AlreadyExists);
        }
        self.files.insert(path.to_string(), data.to_vec());
        Ok(data.len())
    }

    fn read_at(&self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.ready()?;
        let f = self.files.get(path).ok_or(StorageError::NotFound)?;
        let start = (offset as usize).min(f.len());
        let n = buf.len().min(f.len() - start);
        buf[..n].copy_from_slice(&f[start..start + n]);
        Ok(n)
    }

    fn remove(&mut self, path: &str) -> Result<(), StorageError> {
        self.ready()?;
        self.files.remove(path).map(|_| ()).ok_or(StorageError::NotFound)
    }

    fn list(&self, dir: &str) -> Result<Vec<String>, StorageError> {
        self.ready()?;
        Ok(self.files_in(dir))
    }

    fn file_size(&self, path: &str) -> Option<u64> {
        self.files.get(path).map(|f| f.len() as u64)
    }

    fn free_bytes(&self) -> u64 {
        8 << 30
    }

    fn total_bytes(&self) -> u64 {
        16 << 30
    }
}

// ── SimClock ──────────────────────────────────────────────────

/// Uptime advanced by hand; wall clock = `start` + uptime.
pub struct SimClock {
    uptime: Cell<u32>,
    start: NaiveDateTime,
}

#[allow(dead_code)]
impl SimClock {
    pub fn at(y: i32, m: u32, d: u32) -> Self {
        Self {
            uptime: Cell::new(0),
            start: NaiveDate::from_ymd_opt(y, m, d)
                .unwrap()
                .and_hms_opt(8, 30, 0)
                .unwrap(),
        }
    }

    pub fn advance_ms(&self, ms: u32) {
        self.uptime.set(self.uptime.get() + ms);
    }
}

impl ClockPort for SimClock {
    fn uptime_ms(&self) -> u32 {
        self.uptime.get()
    }

    fn now(&self) -> NaiveDateTime {
        self.start + TimeDelta::milliseconds(i64::from(self.uptime.get()))
    }
}

// ── NoDelay ───────────────────────────────────────────────────

pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

// ── MockChip ──────────────────────────────────────────────────

pub struct MockChip {
    pub cause: ResetCause,
    pub memory: MemorySnapshot,
}

#[allow(dead_code)]
impl MockChip {
    pub fn new(cause: ResetCause) -> Self {
        Self {
            cause,
            memory: MemorySnapshot {
                free_heap: 150_000,
                total_heap: 320_000,
                min_free_heap: 120_000,
                largest_free_block: 90_000,
                free_psram: 6_000_000,
                total_psram: 8_388_608,
            },
        }
    }
}

impl PlatformPort for MockChip {
    fn reset_cause(&self) -> ResetCause {
        self.cause
    }

    fn memory(&self) -> MemorySnapshot {
        self.memory
    }
}

// ── MockTimer ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum TimerCall {
    Arm(u32),
    Reset,
    Disarm,
}

#[derive(Default)]
pub struct MockTimer {
    pub calls: Vec<TimerCall>,
    pub reject: Option<i32>,
}

#[allow(dead_code)]
impl MockTimer {
    pub fn resets(&self) -> usize {
        self.calls.iter().filter(|c| **c == TimerCall::Reset).count()
    }
}

impl WatchdogPort for MockTimer {
    fn arm(&mut self, timeout_ms: u32) -> Result<(), WatchdogError> {
        if let Some(code) = self.reject {
            return Err(WatchdogError::HardwareRejected(code));
        }
        self.calls.push(TimerCall::Arm(timeout_ms));
        Ok(())
    }

    fn reset(&mut self) {
        self.calls.push(TimerCall::Reset);
    }

    fn disarm(&mut self) {
        self.calls.push(TimerCall::Disarm);
    }
}
