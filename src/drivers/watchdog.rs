//! Task Watchdog Timer (TWDT) driver.
//!
//! Implements [`WatchdogPort`] over the ESP-IDF TWDT API: the main task
//! subscribes with the configured timeout and the chip panics, then
//! resets, if it stops feeding.  On the host a simulated deadline tracks
//! whether the timer would have fired.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

use crate::app::ports::WatchdogPort;
use crate::error::WatchdogError;

pub struct TaskWatchdog {
    subscribed: bool,
    #[cfg(not(target_os = "espidf"))]
    timeout_ms: u32,
    #[cfg(not(target_os = "espidf"))]
    last_reset: Option<std::time::Instant>,
}

impl Default for TaskWatchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskWatchdog {
    pub fn new() -> Self {
        Self {
            subscribed: false,
            #[cfg(not(target_os = "espidf"))]
            timeout_ms: 0,
            #[cfg(not(target_os = "espidf"))]
            last_reset: None,
        }
    }

    /// Whether the simulated timer has run past its deadline.
    #[cfg(not(target_os = "espidf"))]
    pub fn expired(&self) -> bool {
        match self.last_reset {
            Some(t) if self.subscribed => t.elapsed().as_millis() > u128::from(self.timeout_ms),
            _ => false,
        }
    }
}

impl WatchdogPort for TaskWatchdog {
    #[cfg(target_os = "espidf")]
    fn arm(&mut self, timeout_ms: u32) -> Result<(), WatchdogError> {
        // SAFETY: TWDT calls from the main task; the config is copied.
        unsafe {
            let cfg = esp_task_wdt_config_t {
                timeout_ms,
                idle_core_mask: 0,
                trigger_panic: true,
            };
            let ret = esp_task_wdt_reconfigure(&cfg);
            if ret == ESP_ERR_INVALID_STATE {
                // TWDT not started by the bootloader config: start it.
                let ret = esp_task_wdt_init(&cfg);
                if ret != ESP_OK {
                    return Err(WatchdogError::HardwareRejected(ret));
                }
            } else if ret != ESP_OK {
                return Err(WatchdogError::HardwareRejected(ret));
            }

            let ret = esp_task_wdt_add(core::ptr::null_mut());
            if ret != ESP_OK {
                return Err(WatchdogError::HardwareRejected(ret));
            }
        }
        self.subscribed = true;
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn arm(&mut self, timeout_ms: u32) -> Result<(), WatchdogError> {
        log::info!("Watchdog(sim): armed, {} ms", timeout_ms);
        self.timeout_ms = timeout_ms;
        self.last_reset = Some(std::time::Instant::now());
        self.subscribed = true;
        Ok(())
    }

    fn reset(&mut self) {
        if !self.subscribed {
            return;
        }
        #[cfg(target_os = "espidf")]
        unsafe {
            esp_task_wdt_reset();
        }
        #[cfg(not(target_os = "espidf"))]
        {
            self.last_reset = Some(std::time::Instant::now());
        }
    }

    fn disarm(&mut self) {
        if !self.subscribed {
            return;
        }
        #[cfg(target_os = "espidf")]
        {
            let ret = unsafe { esp_task_wdt_delete(core::ptr::null_mut()) };
            if ret != ESP_OK {
                log::warn!("Watchdog: unsubscribe returned {}", ret);
            }
        }
        self.subscribed = false;
    }
}
