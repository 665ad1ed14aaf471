//! Application core: the diagnostics service and its boundaries.
//!
//! The service composes the watchdog supervisor, crash recorder and SD
//! logger. All interaction with hardware happens through **port traits**
//! defined in [`ports`], keeping this layer testable without a card,
//! an RTC or a watchdog timer.

pub mod commands;
pub mod ports;
pub mod service;
