//! Specialised records: API calls as JSON lines, CSV data series and
//! memory usage.
//!
//! All of these bypass the line buffer and append straight to their own
//! file with the same retry policy as a flush.  They are no-ops while the
//! logger is disabled.

use core::fmt::Write;

use embedded_hal::delay::DelayNs;
use serde::Serialize;

use super::layout::{
    self, API_ERRORS_PREFIX, BLOCKS_PREFIX, LogCategory, MEMORY_USAGE_FILE, MEMPOOL_PREFIX,
    PRICE_PREFIX,
};
use super::level::LogLevel;
use super::PersistentLogger;
use crate::app::ports::{ClockPort, StorageError, StoragePort};
use crate::diagnostics::memory::MemorySnapshot;

pub const PRICE_HEADER: &str = "timestamp,price_usd,price_eur";
pub const BLOCKS_HEADER: &str = "timestamp,height,tx_count,block_time";
pub const MEMPOOL_HEADER: &str = "timestamp,tx_count,size_mb";
pub const MEMORY_HEADER: &str = "timestamp,free_heap,total_heap,heap_used_pct,min_free_heap,largest_block,free_psram,total_psram,psram_used_pct";

/// Usage above this percentage is reported at Warn.
pub const MEMORY_WARN_PERCENT: f32 = 80.0;

/// API log file prefix for a service name.
pub fn api_bucket(service: &str) -> &'static str {
    let s = service.to_ascii_lowercase();
    if s.contains("mempool") {
        "mempool_"
    } else if s.contains("gemini") {
        "gemini_"
    } else if s.contains("openai") || s.contains("gpt") {
        "openai_"
    } else {
        "general_"
    }
}

#[derive(Serialize)]
struct ApiCall<'a> {
    timestamp: &'a str,
    service: &'a str,
    endpoint: &'a str,
    status: i32,
    duration_ms: u32,
    response_size: usize,
    success: bool,
}

#[derive(Serialize)]
struct ApiFailure<'a> {
    timestamp: &'a str,
    service: &'a str,
    endpoint: &'a str,
    status: i32,
    error: &'a str,
}

type Result = core::result::Result<(), StorageError>;

impl<S: StoragePort, C: ClockPort, D: DelayNs> PersistentLogger<S, C, D> {
    /// Append one JSON line to `/logs/api/<bucket>_<date>.log`.
    pub fn log_api(
        &mut self,
        service: &str,
        endpoint: &str,
        status: i32,
        duration_ms: u32,
        response_size: usize,
    ) -> Result {
        if !self.is_enabled() {
            return Ok(());
        }
        let now = self.local_now();
        let ts = layout::timestamp(now);
        let record = ApiCall {
            timestamp: &ts,
            service,
            endpoint,
            status,
            duration_ms,
            response_size,
            success: (200..300).contains(&status),
        };
        let path = layout::daily_path(LogCategory::Api, api_bucket(service), now.date(), "log");
        self.append_json(&path, &record)?;

        self.logf(
            LogLevel::Debug,
            format_args!("API {} {} -> {} ({} ms)", service, endpoint, status, duration_ms),
        );
        Ok(())
    }

    /// Record a failed call: an Error line in the system log and a JSON
    /// line in `/logs/errors/api_errors_<date>.log`.
    pub fn log_api_error(&mut self, service: &str, endpoint: &str, status: i32, error: &str) -> Result {
        if !self.is_enabled() {
            return Ok(());
        }
        let now = self.local_now();
        let ts = layout::timestamp(now);
        let record = ApiFailure {
            timestamp: &ts,
            service,
            endpoint,
            status,
            error,
        };
        let path = layout::daily_path(LogCategory::Errors, API_ERRORS_PREFIX, now.date(), "log");
        let written = self.append_json(&path, &record);

        self.logf(
            LogLevel::Error,
            format_args!("API error: {} {} -> {}: {}", service, endpoint, status, error),
        );
        written
    }

    fn append_json<T: Serialize>(&mut self, path: &str, record: &T) -> Result {
        let mut line = serde_json::to_vec(record).map_err(|_| StorageError::IoError)?;
        line.push(b'\n');
        self.append_file(path, &line)
    }

    /// Append a CSV row, writing `header` first if the file is new.
    pub fn log_data(&mut self, path: &str, header: &str, row: &str) -> Result {
        if !self.is_enabled() {
            return Ok(());
        }
        if !self.is_ready() {
            return Err(StorageError::NotPresent);
        }
        let mut text = String::with_capacity(header.len() + row.len() + 2);
        if !self.storage().exists(path) {
            text.push_str(header);
            text.push('\n');
        }
        text.push_str(row);
        text.push('\n');
        self.append_file(path, text.as_bytes())
    }

    fn log_daily_csv(&mut self, prefix: &str, header: &str, fields: core::fmt::Arguments<'_>) -> Result {
        let now = self.local_now();
        let path = layout::daily_path(LogCategory::Data, prefix, now.date(), "csv");
        let mut row = String::new();
        let _ = write!(row, "{},{}", layout::timestamp(now), fields);
        self.log_data(&path, header, &row)
    }

    pub fn log_price(&mut self, usd: f64, eur: f64) -> Result {
        self.log_daily_csv(PRICE_PREFIX, PRICE_HEADER, format_args!("{:.2},{:.2}", usd, eur))
    }

    pub fn log_block(&mut self, height: u64, tx_count: u32, block_time: i64) -> Result {
        self.log_daily_csv(
            BLOCKS_PREFIX,
            BLOCKS_HEADER,
            format_args!("{},{},{}", height, tx_count, block_time),
        )
    }

    pub fn log_mempool(&mut self, tx_count: u32, size_mb: f32) -> Result {
        self.log_daily_csv(
            MEMPOOL_PREFIX,
            MEMPOOL_HEADER,
            format_args!("{},{:.2}", tx_count, size_mb),
        )
    }

    /// Append a row to `memory_usage.csv`; Warn when heap or PSRAM use is
    /// above [`MEMORY_WARN_PERCENT`].
    pub fn log_memory_usage(&mut self, m: &MemorySnapshot) -> Result {
        let heap_pct = m.heap_used_percent();
        let psram_pct = m.psram_used_percent();

        let mut row = String::new();
        let _ = write!(
            row,
            "{},{},{},{:.1},{},{},{},{},{:.1}",
            layout::timestamp(self.local_now()),
            m.free_heap,
            m.total_heap,
            heap_pct,
            m.min_free_heap,
            m.largest_free_block,
            m.free_psram,
            m.total_psram,
            psram_pct
        );
        let written = self.log_data(MEMORY_USAGE_FILE, MEMORY_HEADER, &row);

        if heap_pct > MEMORY_WARN_PERCENT {
            self.logf(LogLevel::Warn, format_args!("High heap usage: {:.1}%", heap_pct));
        }
        if psram_pct > MEMORY_WARN_PERCENT {
            self.logf(LogLevel::Warn, format_args!("High PSRAM usage: {:.1}%", psram_pct));
        }
        written
    }
}
