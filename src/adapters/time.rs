//! System clock adapter.
//!
//! Implements [`ClockPort`] for the dashboard.
//!
//! - **`target_os = "espidf"`**: uptime from `esp_timer_get_time()` (the
//!   ESP-IDF high-resolution timer, microsecond precision, monotonic).
//! - **`not(target_os = "espidf")`**: uptime from `std::time::Instant`.
//!
//! Wall-clock time comes from the system RTC via `chrono::Utc::now()` on
//! both; before SNTP sync it starts at the epoch.

use chrono::{NaiveDateTime, Utc};

use crate::app::ports::ClockPort;

/// Wall clock earlier than this is treated as not yet synced.
const EPOCH_2020: i64 = 1_577_836_800;

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Microseconds since boot (monotonic).
    #[cfg(target_os = "espidf")]
    pub fn uptime_us(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64
    }

    /// Microseconds since boot (monotonic).
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    /// Whether SNTP (or someone) has set the wall clock.
    pub fn is_synced(&self) -> bool {
        Utc::now().timestamp() >= EPOCH_2020
    }
}

impl ClockPort for SystemClock {
    fn uptime_ms(&self) -> u32 {
        (self.uptime_us() / 1_000) as u32
    }

    fn now(&self) -> NaiveDateTime {
        Utc::now().naive_utc()
    }
}
