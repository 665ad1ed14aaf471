//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements   | Connects to                    |
//! |------------|--------------|--------------------------------|
//! | `sd_card`  | StoragePort  | SPI SD card, FAT via VFS       |
//! | `time`     | ClockPort    | esp_timer + system RTC         |
//! | `platform` | PlatformPort | Reset-reason register, heap    |

pub mod platform;
pub mod sd_card;
pub mod time;
