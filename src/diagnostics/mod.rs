//! Crash survival: retained memory, reset classification, heap statistics
//! and the liveness watchdog.

pub mod crash;
pub mod memory;
pub mod retained;
pub mod watchdog;

pub use crash::{CrashEvent, CrashInfo, CrashRecorder, DumpOutcome, ResetCause};
pub use memory::MemorySnapshot;
pub use retained::{BoundedStr, RetainedState};
pub use watchdog::{WatchdogState, WatchdogSupervisor};
