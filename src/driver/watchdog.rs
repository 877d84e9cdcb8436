use crate::registers::RegisterBus;
use crate::watchdog::WatchdogDriver;

/// Volatile access to the chip's memory-mapped registers
pub struct Mmio {
    _private: (),
}

impl Mmio {
    /// # Safety
    /// Every address passed to `read`/`write` must be a valid, aligned
    /// peripheral register, and only one `Mmio` may drive a given block.
    pub unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl RegisterBus for Mmio {
    fn read(&self, addr: u32) -> u32 {
        unsafe { core::ptr::read_volatile(addr as usize as *const u32) }
    }

    fn write(&mut self, addr: u32, value: u32) {
        unsafe { core::ptr::write_volatile(addr as usize as *mut u32, value) }
    }
}

/// Watchdog driver entry bound to the real RTC_CNTL registers
pub fn esp_watchdog_driver() -> WatchdogDriver<Mmio> {
    // SAFETY: the watchdog driver is the only user of the RTC WDT registers
    WatchdogDriver::new(unsafe { Mmio::new() })
}
