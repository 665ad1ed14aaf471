//! Heap and PSRAM statistics for crash dumps and memory-usage records.

use serde::{Deserialize, Serialize};

/// Point-in-time memory statistics, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub free_heap: u32,
    pub total_heap: u32,
    pub min_free_heap: u32,
    pub largest_free_block: u32,
    pub free_psram: u32,
    pub total_psram: u32,
}

impl MemorySnapshot {
    #[cfg(target_os = "espidf")]
    pub fn collect() -> Self {
        use esp_idf_svc::sys::*;

        // SAFETY: heap_caps queries only read allocator bookkeeping.
        unsafe {
            Self {
                free_heap: esp_get_free_heap_size(),
                total_heap: heap_caps_get_total_size(MALLOC_CAP_DEFAULT) as u32,
                min_free_heap: esp_get_minimum_free_heap_size(),
                largest_free_block: heap_caps_get_largest_free_block(MALLOC_CAP_DEFAULT) as u32,
                free_psram: heap_caps_get_free_size(MALLOC_CAP_SPIRAM) as u32,
                total_psram: heap_caps_get_total_size(MALLOC_CAP_SPIRAM) as u32,
            }
        }
    }

    /// Synthetic values for simulation, shaped like an S3 with 8 MB PSRAM.
    #[cfg(not(target_os = "espidf"))]
    pub fn collect() -> Self {
        Self {
            free_heap: 180_224,
            total_heap: 327_680,
            min_free_heap: 151_552,
            largest_free_block: 110_592,
            free_psram: 7_340_032,
            total_psram: 8_388_608,
        }
    }

    pub fn used_heap(&self) -> u32 {
        self.total_heap.saturating_sub(self.free_heap)
    }

    pub fn used_psram(&self) -> u32 {
        self.total_psram.saturating_sub(self.free_psram)
    }

    pub fn heap_used_percent(&self) -> f32 {
        percent(self.used_heap(), self.total_heap)
    }

    /// 0.0 on boards without PSRAM.
    pub fn psram_used_percent(&self) -> f32 {
        percent(self.used_psram(), self.total_psram)
    }
}

fn percent(used: u32, total: u32) -> f32 {
    if total == 0 {
        0.0
    } else {
        used as f32 * 100.0 / total as f32
    }
}
