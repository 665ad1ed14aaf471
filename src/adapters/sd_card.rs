//! SD card storage adapter.
//!
//! Implements [`StoragePort`] over a FAT volume.
//!
//! - **`target_os = "espidf"`**: SPI-attached card (SC01 Plus wiring)
//!   mounted at `/sdcard` with `esp_vfs_fat_sdspi_mount`; once mounted the
//!   VFS makes it reachable through `std::fs`.
//! - **`not(target_os = "espidf")`**: a plain directory stands in for the
//!   card; [`SdCardStorage::set_present`] simulates pulling it out.

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use crate::app::ports::{StorageError, StoragePort};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

/// VFS mount point on target.
pub const MOUNT_POINT: &str = "/sdcard";

/// SPI wiring of the card slot.
#[derive(Debug, Clone, Copy)]
pub struct SdSpiPins {
    pub sclk: i32,
    pub mosi: i32,
    pub miso: i32,
    pub cs: i32,
}

impl Default for SdSpiPins {
    /// SC01 Plus card slot.
    fn default() -> Self {
        Self {
            sclk: 39,
            mosi: 40,
            miso: 38,
            cs: 41,
        }
    }
}

pub struct SdCardStorage {
    root: PathBuf,
    mounted: bool,
    #[cfg(target_os = "espidf")]
    pins: SdSpiPins,
    #[cfg(target_os = "espidf")]
    bus_ready: bool,
    #[cfg(target_os = "espidf")]
    card: *mut sdmmc_card_t,
    #[cfg(not(target_os = "espidf"))]
    present: bool,
    #[cfg(not(target_os = "espidf"))]
    capacity: u64,
}

impl SdCardStorage {
    /// Card on the SPI bus, mounted at [`MOUNT_POINT`] on demand.
    #[cfg(target_os = "espidf")]
    pub fn new(pins: SdSpiPins) -> Self {
        Self {
            root: PathBuf::from(MOUNT_POINT),
            mounted: false,
            pins,
            bus_ready: false,
            card: core::ptr::null_mut(),
        }
    }

    /// Simulated card backed by `root`, reporting `capacity` bytes.
    #[cfg(not(target_os = "espidf"))]
    pub fn simulated(root: impl Into<PathBuf>, capacity: u64) -> Self {
        Self {
            root: root.into(),
            mounted: false,
            present: true,
            capacity,
        }
    }

    /// Simulate inserting or pulling the card.  Pulling also drops the
    /// mount, as the real VFS would start failing.
    #[cfg(not(target_os = "espidf"))]
    pub fn set_present(&mut self, present: bool) {
        self.present = present;
        if !present {
            self.mounted = false;
        }
    }

    fn host_path(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.mounted {
            Ok(())
        } else {
            Err(StorageError::NotPresent)
        }
    }

    // ── Target mount plumbing ─────────────────────────────────

    #[cfg(target_os = "espidf")]
    const SPI_HOST: spi_host_device_t = spi_host_device_t_SPI2_HOST;

    #[cfg(target_os = "espidf")]
    fn init_bus(&mut self) -> Result<(), StorageError> {
        if self.bus_ready {
            return Ok(());
        }
        let bus = spi_bus_config_t {
            __bindgen_anon_1: spi_bus_config_t__bindgen_ty_1 {
                mosi_io_num: self.pins.mosi,
            },
            __bindgen_anon_2: spi_bus_config_t__bindgen_ty_2 {
                miso_io_num: self.pins.miso,
            },
            sclk_io_num: self.pins.sclk,
            __bindgen_anon_3: spi_bus_config_t__bindgen_ty_3 { quadwp_io_num: -1 },
            __bindgen_anon_4: spi_bus_config_t__bindgen_ty_4 { quadhd_io_num: -1 },
            max_transfer_sz: 4000,
            ..Default::default()
        };
        // SAFETY: called from the main task only; the config outlives the call.
        let ret = unsafe { spi_bus_initialize(Self::SPI_HOST, &bus, spi_common_dma_t_SPI_DMA_CH_AUTO) };
        if ret != ESP_OK && ret != ESP_ERR_INVALID_STATE {
            log::warn!("SD: SPI bus init failed ({})", ret);
            return Err(StorageError::MountFailed);
        }
        self.bus_ready = true;
        Ok(())
    }

    /// Field-for-field equivalent of `SDSPI_HOST_DEFAULT()`.
    #[cfg(target_os = "espidf")]
    fn sdspi_host() -> sdmmc_host_t {
        sdmmc_host_t {
            flags: SDMMC_HOST_FLAG_SPI | SDMMC_HOST_FLAG_DEINIT_ARG,
            slot: Self::SPI_HOST as i32,
            max_freq_khz: SDMMC_FREQ_DEFAULT as i32,
            io_voltage: 3.3,
            init: Some(sdspi_host_init),
            set_card_clk: Some(sdspi_host_set_card_clk),
            do_transaction: Some(sdspi_host_do_transaction),
            __bindgen_anon_1: sdmmc_host_t__bindgen_ty_1 {
                deinit_p: Some(sdspi_host_remove_device),
            },
            io_int_enable: Some(sdspi_host_io_int_enable),
            io_int_wait: Some(sdspi_host_io_int_wait),
            get_real_freq: Some(sdspi_host_get_real_freq),
            ..Default::default()
        }
    }

    #[cfg(target_os = "espidf")]
    fn mount_card(&mut self) -> Result<(), StorageError> {
        self.init_bus()?;

        let host = Self::sdspi_host();
        let slot = sdspi_device_config_t {
            host_id: Self::SPI_HOST,
            gpio_cs: self.pins.cs,
            gpio_cd: -1,
            gpio_wp: -1,
            gpio_int: -1,
            ..Default::default()
        };
        let mount_cfg = esp_vfs_fat_sdmmc_mount_config_t {
            format_if_mount_failed: false,
            max_files: 5,
            allocation_unit_size: 16 * 1024,
            ..Default::default()
        };
        let base = c"/sdcard";
        let mut card: *mut sdmmc_card_t = core::ptr::null_mut();

        // SAFETY: all configs live for the duration of the call; `card` is
        // written by the driver and released in `unmount`.
        let ret = unsafe { esp_vfs_fat_sdspi_mount(base.as_ptr(), &host, &slot, &mount_cfg, &mut card) };
        match ret {
            ESP_OK => {
                self.card = card;
                self.mounted = true;
                Ok(())
            }
            ESP_FAIL => Err(StorageError::MountFailed),
            _ => Err(StorageError::NotPresent),
        }
    }
}

impl StoragePort for SdCardStorage {
    #[cfg(target_os = "espidf")]
    fn probe(&mut self) -> bool {
        if self.mounted {
            // SAFETY: `card` is valid while mounted.
            return unsafe { sdmmc_get_status(self.card) } == ESP_OK;
        }
        // No card-detect line on this slot: a successful mount is the probe.
        self.mount_card().is_ok()
    }

    #[cfg(not(target_os = "espidf"))]
    fn probe(&mut self) -> bool {
        self.present && self.root.is_dir()
    }

    #[cfg(target_os = "espidf")]
    fn mount(&mut self) -> Result<(), StorageError> {
        if self.mounted {
            return Ok(());
        }
        self.mount_card()
    }

    #[cfg(not(target_os = "espidf"))]
    fn mount(&mut self) -> Result<(), StorageError> {
        if !self.present {
            return Err(StorageError::NotPresent);
        }
        if !self.root.is_dir() {
            return Err(StorageError::MountFailed);
        }
        self.mounted = true;
        Ok(())
    }

    fn unmount(&mut self) {
        #[cfg(target_os = "espidf")]
        if self.mounted {
            // SAFETY: `card` came from esp_vfs_fat_sdspi_mount.
            let ret = unsafe { esp_vfs_fat_sdcard_unmount(c"/sdcard".as_ptr(), self.card) };
            if ret != ESP_OK {
                log::warn!("SD: unmount returned {}", ret);
            }
            self.card = core::ptr::null_mut();
        }
        self.mounted = false;
    }

    fn exists(&self, path: &str) -> bool {
        self.mounted && self.host_path(path).exists()
    }

    fn create_dir(&mut self, path: &str) -> Result<(), StorageError> {
        self.check()?;
        match fs::create_dir(self.host_path(path)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(_) => Err(StorageError::IoError),
        }
    }

    fn append(&mut self, path: &str, data: &[u8]) -> Result<usize, StorageError> {
        self.check()?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.host_path(path))
            .map_err(|_| StorageError::OpenFailed)?;
        let n = file.write(data).map_err(|_| StorageError::IoError)?;
        file.flush().map_err(|_| StorageError::IoError)?;
        Ok(n)
    }

    fn write_new(&mut self, path: &str, data: &[u8]) -> Result<usize, StorageError> {
        self.check()?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.host_path(path))
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => StorageError::AlreadyExists,
                _ => StorageError::OpenFailed,
            })?;
        file.write_all(data).map_err(|_| StorageError::IoError)?;
        Ok(data.len())
    }

    fn read_at(&self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.check()?;
        let mut file = fs::File::open(self.host_path(path)).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound,
            _ => StorageError::IoError,
        })?;
        file.seek(SeekFrom::Start(offset)).map_err(|_| StorageError::IoError)?;
        file.read(buf).map_err(|_| StorageError::IoError)
    }

    fn remove(&mut self, path: &str) -> Result<(), StorageError> {
        self.check()?;
        fs::remove_file(self.host_path(path)).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound,
            _ => StorageError::IoError,
        })
    }

    fn list(&self, dir: &str) -> Result<Vec<String>, StorageError> {
        self.check()?;
        let entries = fs::read_dir(self.host_path(dir)).map_err(|_| StorageError::NotFound)?;
        Ok(entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|e| e.file_name().into_string().ok())
            .collect())
    }

    fn file_size(&self, path: &str) -> Option<u64> {
        if !self.mounted {
            return None;
        }
        fs::metadata(self.host_path(path))
            .ok()
            .filter(|m| m.is_file())
            .map(|m| m.len())
    }

    #[cfg(target_os = "espidf")]
    fn free_bytes(&self) -> u64 {
        self.fat_info().map(|(_, free)| free).unwrap_or(0)
    }

    #[cfg(not(target_os = "espidf"))]
    fn free_bytes(&self) -> u64 {
        if !self.mounted {
            return 0;
        }
        self.capacity.saturating_sub(used_bytes(&self.root))
    }

    #[cfg(target_os = "espidf")]
    fn total_bytes(&self) -> u64 {
        self.fat_info().map(|(total, _)| total).unwrap_or(0)
    }

    #[cfg(not(target_os = "espidf"))]
    fn total_bytes(&self) -> u64 {
        if self.mounted { self.capacity } else { 0 }
    }
}

#[cfg(target_os = "espidf")]
impl SdCardStorage {
    fn fat_info(&self) -> Option<(u64, u64)> {
        if !self.mounted {
            return None;
        }
        let (mut total, mut free) = (0u64, 0u64);
        // SAFETY: plain out-parameters.
        let ret = unsafe { esp_vfs_fat_info(c"/sdcard".as_ptr(), &mut total, &mut free) };
        (ret == ESP_OK).then_some((total, free))
    }
}

/// Bytes used by every file below `dir`.
#[cfg(not(target_os = "espidf"))]
fn used_bytes(dir: &std::path::Path) -> u64 {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(|e| e.ok())
        .map(|e| match e.metadata() {
            Ok(m) if m.is_dir() => used_bytes(&e.path()),
            Ok(m) => m.len(),
            Err(_) => 0,
        })
        .sum()
}
