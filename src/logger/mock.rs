//! In-memory card, manual clock and no-op delay for unit tests.

use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use embedded_hal::delay::DelayNs;

use super::PersistentLogger;
use crate::app::ports::{ClockPort, StorageError, StoragePort};
use crate::config::LoggerConfig;

pub struct MemStorage {
    pub files: BTreeMap<String, Vec<u8>>,
    pub dirs: BTreeSet<String>,
    pub present: bool,
    pub mounted: bool,
    pub fail_mount: bool,
    pub fail_writes: bool,
    /// Next N appends write only half their payload.
    pub short_writes: u32,
    pub appends: u32,
    pub probes: u32,
}

impl Default for MemStorage {
    fn default() -> Self {
        Self {
            files: BTreeMap::new(),
            dirs: BTreeSet::new(),
            present: true,
            mounted: false,
            fail_mount: false,
            fail_writes: false,
            short_writes: 0,
            appends: 0,
            probes: 0,
        }
    }
}

impl MemStorage {
    pub fn put(&mut self, path: &str, data: &[u8]) {
        self.files.insert(path.to_string(), data.to_vec());
    }

    pub fn read_string(&self, path: &str) -> String {
        self.files
            .get(path)
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default()
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.present && self.mounted {
            Ok(())
        } else {
            Err(StorageError::NotPresent)
        }
    }
}

impl StoragePort for MemStorage {
    fn probe(&mut self) -> bool {
        self.probes += 1;
        self.present
    }

    fn mount(&mut self) -> Result<(), StorageError> {
        if !self.present {
            return Err(StorageError::NotPresent);
        }
        if self.fail_mount {
            return Err(StorageError::MountFailed);
        }
        self.mounted = true;
        Ok(())
    }

    fn unmount(&mut self) {
        self.mounted = false;
    }

    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path) || self.dirs.contains(path)
    }

    fn create_dir(&mut self, path: &str) -> Result<(), StorageError> {
        self.check()?;
        self.dirs.insert(path.to_string());
        Ok(())
    }

    fn append(&mut self, path: &str, data: &[u8]) -> Result<usize, StorageError> {
        self.check()?;
        if self.fail_writes {
            return Err(StorageError::IoError);
        }
        self.appends += 1;
        let n = if self.short_writes > 0 && data.len() > 1 {
            self.short_writes -= 1;
            data.len() / 2
        } else {
            data.len()
        };
        self.files
            .entry(path.to_string())
            .or_default()
            .extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn write_new(&mut self, path: &str, data: &[u8]) -> Result<usize, StorageError> {
        self.check()?;
        if self.fail_writes {
            return Err(StorageError::OpenFailed);
        }
        if self.files.contains_key(path) {
            return Err(StorageError::AlreadyExists);
        }
        self.put(path, data);
        Ok(data.len())
    }

    fn read_at(&self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.check()?;
        let file = self.files.get(path).ok_or(StorageError::NotFound)?;
        let start = (offset as usize).min(file.len());
        let n = buf.len().min(file.len() - start);
        buf[..n].copy_from_slice(&file[start..start + n]);
        Ok(n)
    }

    fn remove(&mut self, path: &str) -> Result<(), StorageError> {
        self.check()?;
        self.files.remove(path).map(|_| ()).ok_or(StorageError::NotFound)
    }

    fn list(&self, dir: &str) -> Result<Vec<String>, StorageError> {
        self.check()?;
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        Ok(self
            .files
            .keys()
            .filter_map(|p| p.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect())
    }

    fn file_size(&self, path: &str) -> Option<u64> {
        self.files.get(path).map(|f| f.len() as u64)
    }

    fn free_bytes(&self) -> u64 {
        30 * 1024 * 1024 * 1024
    }

    fn total_bytes(&self) -> u64 {
        32 * 1024 * 1024 * 1024
    }
}

/// Uptime under test control; wall clock is 2026-10-18 12:00:00 UTC plus
/// uptime.
pub struct ManualClock {
    uptime: Cell<u32>,
    base: NaiveDateTime,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            uptime: Cell::new(0),
            base: NaiveDate::from_ymd_opt(2026, 10, 18)
                .and_then(|d| d.and_hms_opt(12, 0, 0))
                .unwrap_or_default(),
        }
    }
}

impl ManualClock {
    pub fn advance_ms(&self, ms: u32) {
        self.uptime.set(self.uptime.get().wrapping_add(ms));
    }
}

impl ClockPort for ManualClock {
    fn uptime_ms(&self) -> u32 {
        self.uptime.get()
    }

    fn now(&self) -> NaiveDateTime {
        self.base + TimeDelta::milliseconds(i64::from(self.uptime.get()))
    }
}

#[derive(Default)]
pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

pub fn logger_with(config: LoggerConfig) -> PersistentLogger<MemStorage, ManualClock, NoDelay> {
    PersistentLogger::new(
        MemStorage::default(),
        ManualClock::default(),
        NoDelay,
        config,
    )
}
