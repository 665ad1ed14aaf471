//! Diagnostics configuration parameters
//!
//! All tunables for the watchdog, crash recorder and SD logger.
//! The key/value settings store owned by the UI layer can override these
//! at boot; anything it hands over goes through [`DiagnosticsConfig::validate`].

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;
use crate::logger::layout::{MEMPOOL_PREFIX, PRICE_PREFIX};
use crate::logger::level::LogLevel;

/// Maximum number of per-category retention rules.
pub const MAX_RETENTION_RULES: usize = 4;

/// Core diagnostics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Hardware watchdog timeout (seconds).  The main loop must feed
    /// faster than this.
    pub watchdog_timeout_secs: u32,
    /// SD logger settings.
    pub logger: LoggerConfig,
}

/// Settings for the persistent SD card logger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Operator enable switch.
    pub enabled: bool,
    /// Records below this level are dropped.
    pub level: LogLevel,
    /// Buffered records are flushed at least this often (milliseconds).
    pub flush_interval_ms: u32,
    /// Age (days) after which daily system logs are removed by cleanup.
    pub retention_days: u32,
    /// Minimum spacing between card presence probes (milliseconds).
    pub hot_swap_interval_ms: u32,
    /// Attempts per flush before it counts as failed.
    pub max_write_retries: u8,
    /// Delay between attempts (milliseconds).
    pub retry_backoff_ms: u32,
    /// Consecutive failed flushes before the card is treated as removed.
    pub failure_threshold: u8,
    /// Offset applied to the UTC wall clock for timestamps and file dates.
    pub utc_offset_minutes: i16,
    /// Per-category retention for CSV data files.  Files whose prefix has
    /// no rule are kept indefinitely.
    pub data_retention: heapless::Vec<RetentionRule, MAX_RETENTION_RULES>,
}

/// Retention window for files starting with `prefix`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionRule {
    pub prefix: heapless::String<24>,
    pub days: u32,
}

impl RetentionRule {
    pub fn new(prefix: &str, days: u32) -> Self {
        let mut p = heapless::String::new();
        for c in prefix.chars() {
            if p.push(c).is_err() {
                break;
            }
        }
        Self { prefix: p, days }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            watchdog_timeout_secs: 30,
            logger: LoggerConfig::default(),
        }
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        let mut data_retention = heapless::Vec::new();
        // Block data is low volume and kept indefinitely.
        let _ = data_retention.push(RetentionRule::new(PRICE_PREFIX, 90));
        let _ = data_retention.push(RetentionRule::new(MEMPOOL_PREFIX, 30));

        Self {
            enabled: true,
            level: LogLevel::Info,
            flush_interval_ms: 30_000,
            retention_days: 30,
            hot_swap_interval_ms: 5_000,
            max_write_retries: 3,
            retry_backoff_ms: 50,
            failure_threshold: 5,
            utc_offset_minutes: 0,
            data_retention,
        }
    }
}

impl LoggerConfig {
    /// Worst-case time a single flush may spend sleeping between retries.
    pub fn worst_case_backoff_ms(&self) -> u32 {
        u32::from(self.max_write_retries.saturating_sub(1)) * self.retry_backoff_ms
    }
}

impl DiagnosticsConfig {
    /// Range-check every field.  Invalid values are rejected, not clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let l = &self.logger;
        if !(5..=300).contains(&self.watchdog_timeout_secs) {
            return Err(ConfigError::ValidationFailed(
                "watchdog_timeout_secs must be 5–300",
            ));
        }
        if !(1_000..=3_600_000).contains(&l.flush_interval_ms) {
            return Err(ConfigError::ValidationFailed(
                "flush_interval_ms must be 1000–3600000",
            ));
        }
        if !(1..=3650).contains(&l.retention_days) {
            return Err(ConfigError::ValidationFailed(
                "retention_days must be 1–3650",
            ));
        }
        if !(500..=600_000).contains(&l.hot_swap_interval_ms) {
            return Err(ConfigError::ValidationFailed(
                "hot_swap_interval_ms must be 500–600000",
            ));
        }
        if !(1..=10).contains(&l.max_write_retries) {
            return Err(ConfigError::ValidationFailed(
                "max_write_retries must be 1–10",
            ));
        }
        if l.failure_threshold == 0 {
            return Err(ConfigError::ValidationFailed(
                "failure_threshold must be at least 1",
            ));
        }
        if !(-720..=840).contains(&l.utc_offset_minutes) {
            return Err(ConfigError::ValidationFailed(
                "utc_offset_minutes must be -720–840",
            ));
        }
        if l.data_retention.iter().any(|r| r.prefix.is_empty() || r.days == 0) {
            return Err(ConfigError::ValidationFailed(
                "data_retention rules need a prefix and a non-zero window",
            ));
        }
        // A flush must never be able to starve the watchdog it reports on.
        if l.worst_case_backoff_ms() >= self.watchdog_timeout_secs * 1000 / 2 {
            return Err(ConfigError::ValidationFailed(
                "retry backoff must stay below half the watchdog timeout",
            ));
        }
        Ok(())
    }
}
