//! Panel Sentinel: resilience and diagnostics for the dashboard firmware.
//!
//! Exposes the pure-logic modules for integration testing. All
//! ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod logger;

pub mod adapters;
pub mod drivers;
