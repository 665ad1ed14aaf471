//! Main-loop liveness supervision.
//!
//! Arms the hardware watchdog once at boot; the main loop then calls
//! [`WatchdogSupervisor::feed`] on every iteration.  If an iteration takes
//! longer than the timeout the chip resets and the next boot classifies
//! the reset as [`ResetCause::WatchdogTimeout`].
//!
//! [`ResetCause::WatchdogTimeout`]: super::crash::ResetCause::WatchdogTimeout

use crate::app::ports::WatchdogPort;
use crate::error::WatchdogError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    Unarmed,
    Armed { timeout_secs: u32 },
}

pub struct WatchdogSupervisor<W: WatchdogPort> {
    port: W,
    state: WatchdogState,
    feeds: u32,
}

impl<W: WatchdogPort> WatchdogSupervisor<W> {
    pub fn new(port: W) -> Self {
        Self {
            port,
            state: WatchdogState::Unarmed,
            feeds: 0,
        }
    }

    /// Arm the hardware timer.  On error the supervisor stays unarmed and
    /// the device runs without crash protection.
    pub fn initialize(&mut self, timeout_secs: u32) -> Result<(), WatchdogError> {
        if matches!(self.state, WatchdogState::Armed { .. }) {
            return Err(WatchdogError::AlreadyArmed);
        }
        if timeout_secs == 0 {
            return Err(WatchdogError::InvalidTimeout);
        }

        self.port.arm(timeout_secs.saturating_mul(1000))?;
        self.state = WatchdogState::Armed { timeout_secs };
        log::info!("Watchdog armed ({}s timeout)", timeout_secs);
        Ok(())
    }

    /// Restart the countdown.  No-op while unarmed.
    pub fn feed(&mut self) {
        if let WatchdogState::Armed { .. } = self.state {
            self.port.reset();
            self.feeds = self.feeds.wrapping_add(1);
        }
    }

    /// Stop supervising.  Safe to call repeatedly.
    pub fn disable(&mut self) {
        if self.state == WatchdogState::Unarmed {
            return;
        }
        self.port.disarm();
        self.state = WatchdogState::Unarmed;
        log::info!("Watchdog disabled");
    }

    pub fn state(&self) -> WatchdogState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, WatchdogState::Armed { .. })
    }

    /// Feeds since boot (wrapping).
    pub fn feed_count(&self) -> u32 {
        self.feeds
    }
}
