//! Chip state adapter: reset-cause register and heap statistics.
//!
//! - **`target_os = "espidf"`**: `esp_reset_reason()` and heap caps.
//! - **`not(target_os = "espidf")`**: a fixed, settable reset cause and
//!   synthetic memory figures for simulation.

use crate::app::ports::PlatformPort;
use crate::diagnostics::crash::ResetCause;
use crate::diagnostics::memory::MemorySnapshot;

pub struct EspPlatform {
    #[cfg(not(target_os = "espidf"))]
    cause: ResetCause,
}

impl Default for EspPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl EspPlatform {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            cause: ResetCause::PowerOn,
        }
    }

    /// Simulation with a given register value.
    #[cfg(not(target_os = "espidf"))]
    pub fn simulated(cause: ResetCause) -> Self {
        Self { cause }
    }
}

/// Map the ESP-IDF reset reason onto [`ResetCause`].
#[cfg(target_os = "espidf")]
pub fn decode_reset_reason(reason: esp_idf_svc::sys::esp_reset_reason_t) -> ResetCause {
    use esp_idf_svc::sys::*;

    #[allow(non_upper_case_globals)]
    match reason {
        esp_reset_reason_t_ESP_RST_POWERON => ResetCause::PowerOn,
        esp_reset_reason_t_ESP_RST_EXT | esp_reset_reason_t_ESP_RST_SDIO => {
            ResetCause::ExternalReset
        }
        esp_reset_reason_t_ESP_RST_SW | esp_reset_reason_t_ESP_RST_DEEPSLEEP => {
            ResetCause::SoftwareReset
        }
        esp_reset_reason_t_ESP_RST_PANIC => ResetCause::Exception,
        esp_reset_reason_t_ESP_RST_INT_WDT
        | esp_reset_reason_t_ESP_RST_TASK_WDT
        | esp_reset_reason_t_ESP_RST_WDT => ResetCause::WatchdogTimeout,
        esp_reset_reason_t_ESP_RST_BROWNOUT => ResetCause::BrownOut,
        _ => ResetCause::Unknown,
    }
}

impl PlatformPort for EspPlatform {
    #[cfg(target_os = "espidf")]
    fn reset_cause(&self) -> ResetCause {
        // SAFETY: reads a latched register value.
        decode_reset_reason(unsafe { esp_idf_svc::sys::esp_reset_reason() })
    }

    #[cfg(not(target_os = "espidf"))]
    fn reset_cause(&self) -> ResetCause {
        self.cause
    }

    fn memory(&self) -> MemorySnapshot {
        MemorySnapshot::collect()
    }
}
