//! Panel Sentinel firmware entry point.
//!
//! Composition root for the diagnostics subsystem on the ESP32-S3.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                     │
//! │                                                              │
//! │  SdCardStorage   SystemClock   EspPlatform   TaskWatchdog    │
//! │  (StoragePort)   (ClockPort)   (Platform)    (WatchdogPort)  │
//! │                                                              │
//! │  ─────────────── Port Trait Boundary ───────────────────     │
//! │                                                              │
//! │  ┌──────────────────────────────────────────────────────┐    │
//! │  │        DiagnosticsService (pure logic)               │    │
//! │  │  CrashRecorder · PersistentLogger · Watchdog         │    │
//! │  └──────────────────────────────────────────────────────┘    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::mpsc;

use anyhow::{Result, anyhow};
use esp_idf_svc::hal::delay::FreeRtos;
use log::{info, warn};

use panel_sentinel::adapters::platform::EspPlatform;
use panel_sentinel::adapters::sd_card::{SdCardStorage, SdSpiPins};
use panel_sentinel::adapters::time::SystemClock;
use panel_sentinel::app::service::DiagnosticsService;
use panel_sentinel::config::DiagnosticsConfig;
use panel_sentinel::diagnostics::crash::install_panic_hook;
use panel_sentinel::diagnostics::retained::take_retained;
use panel_sentinel::drivers::watchdog::TaskWatchdog;

/// Main loop period; must stay well inside the watchdog timeout.
const LOOP_INTERVAL_MS: u32 = 100;

/// Read console lines on a helper thread so the main loop never blocks
/// on the UART.
fn spawn_console() -> Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("console".into())
        .stack_size(4096)
        .spawn(move || {
            for line in std::io::stdin().lines() {
                let Ok(line) = line else { continue };
                if !line.trim().is_empty() && tx.send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Panel Sentinel v{}                  ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Diagnostics wiring ─────────────────────────────────
    let retained = take_retained().ok_or_else(|| anyhow!("retained state already taken"))?;
    let clock = SystemClock::new();
    let platform = EspPlatform::new();

    let mut diag = DiagnosticsService::new(
        DiagnosticsConfig::default(),
        retained,
        SdCardStorage::new(SdSpiPins::default()),
        clock,
        FreeRtos,
        TaskWatchdog::new(),
    )
    .map_err(|e| anyhow!("diagnostics config: {}", e))?;

    // ── 3. Boot: classify reset, mount card, dump, arm watchdog ─
    let report = diag.boot(
        &platform,
        concat!("Panel Sentinel v", env!("CARGO_PKG_VERSION")),
    );
    if let Err(e) = report.storage {
        warn!("Running without SD logging: {}", e);
    }
    if !clock.is_synced() {
        warn!("Wall clock not set, log stamps count from the epoch until SNTP sync");
    }
    // Must run on this thread: the panic hook only writes RTC memory from
    // the thread that owns the service.
    install_panic_hook();
    diag.set_current_screen("Boot");

    let console = match spawn_console() {
        Ok(rx) => Some(rx),
        Err(e) => {
            warn!("Console thread not started: {}", e);
            None
        }
    };

    info!("System ready. Entering main loop.");

    // ── 4. Main loop ──────────────────────────────────────────
    loop {
        diag.poll(&platform);

        if let Some(rx) = &console {
            while let Ok(line) = rx.try_recv() {
                let mut out = std::io::stdout();
                if let Err(e) = diag.handle_command(&line, &mut out) {
                    warn!("Command '{}' failed: {}", line.trim(), e);
                }
            }
        }

        FreeRtos::delay_ms(LOOP_INTERVAL_MS);
    }
}
