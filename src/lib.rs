//! Board support for the Niobe U4 (ESP32): device framework glue for the RTC
//! watchdog, the littlefs block devices, the interrupt registry and start-up.

pub mod boot;
pub mod device;
pub mod irq;
pub mod logger;
pub mod registers;
pub mod settings;
pub mod storage;
pub mod watchdog;

#[cfg(target_arch = "xtensa")]
pub mod driver;
