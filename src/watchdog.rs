//! RTC watchdog timer.
//!
//! The RTC watchdog configuration registers are write protected: every change
//! has to be wrapped in an unlock / feed / modify / lock sequence. The running
//! state is never cached, it is read back from the enable bit in `CFG0`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::device::{DeviceError, DeviceObject, DriverEntry};
use crate::registers::RegisterBus;

pub const RWDT_PROTECT: u32 = 0x3ff4_80a4;
pub const RWDT_CFG0: u32 = 0x3ff4_808c;
pub const RWDT_CFG1: u32 = 0x3ff4_8090;
pub const RWDT_FEED: u32 = 0x3ff4_80a0;
pub const RWDT_TICKS_TYPE: u32 = 0x3ff4_8070;

pub const RWDT_PROTECT_KEY: u32 = 0x50d8_3aa1;
pub const RWDT_FEED_VALUE: u32 = 1 << 31;
pub const RWDT_ENABLE_BIT: u32 = 1 << 31;

/// CFG0 when enabled:
/// - bit 10: keep the watchdog armed in flash boot mode
/// - bits 11-13: system reset pulse length (7)
/// - bits 28-30: stage 0 action, 3 = system reset
/// - bit 31: enable
pub const RWDT_CFG0_ENABLE: u32 = (1 << 10) | (7 << 11) | (3 << 28) | RWDT_ENABLE_BIT;

const TICKS_TYPE_SHIFT: u32 = 30;
const TICKS_TYPE_MASK: u32 = 0b11;

/// Timeout used until someone calls `set_timeout`
pub const DEFAULT_TIMEOUT_SECS: u32 = 5;

/// Clock domain currently driving the watchdog counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSource {
    /// Internal ~150kHz RC oscillator
    SlowClock,
    /// External 32.768kHz crystal
    Xtal32k,
    /// 8MHz oscillator divided by 256
    Ck8mD256,
}

impl ClockSource {
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => ClockSource::Xtal32k,
            2 => ClockSource::Ck8mD256,
            _ => ClockSource::SlowClock,
        }
    }

    pub const fn ticks_per_second(self) -> u32 {
        match self {
            ClockSource::SlowClock => 150 * 1000,
            ClockSource::Xtal32k => 32768,
            ClockSource::Ck8mD256 => 8 * 1000 * 1000 / 256,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum WatchdogError {
    #[error("no watchdog controller attached to the device")]
    NotAttached,
    #[error("watchdog timeout must be at least one second")]
    ZeroTimeout,
    #[error("timeout of {seconds}s at {ticks_per_second} ticks/s does not fit the 32-bit counter")]
    TimeoutOverflow { seconds: u32, ticks_per_second: u32 },
}

/// Plain enable/kick/disable interface used by the idle task
#[cfg_attr(test, automock)]
pub trait Watchdog {
    fn enable(&mut self);
    fn kick(&mut self);
    fn disable(&mut self);
}

/// Controller for the RTC watchdog. Not reentrant: callers sharing it between
/// tasks must serialise access themselves.
#[derive(Debug)]
pub struct RtcWatchdog<R: RegisterBus> {
    bus: R,
    timeout_secs: u32,
}

impl<R: RegisterBus> RtcWatchdog<R> {
    pub fn new(bus: R) -> Self {
        Self {
            bus,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn into_bus(self) -> R {
        self.bus
    }

    pub fn bus(&self) -> &R {
        &self.bus
    }

    pub fn clock_source(&self) -> ClockSource {
        let code = (self.bus.read(RWDT_TICKS_TYPE) >> TICKS_TYPE_SHIFT) & TICKS_TYPE_MASK;
        ClockSource::from_code(code)
    }

    pub fn is_running(&self) -> bool {
        self.bus.read(RWDT_CFG0) & RWDT_ENABLE_BIT != 0
    }

    pub fn timeout(&self) -> u32 {
        self.timeout_secs
    }

    /// Only takes effect on the next `start`
    pub fn set_timeout(&mut self, seconds: u32) {
        self.timeout_secs = seconds;
    }

    /// Starts counting with the stored timeout. Does nothing if already running.
    pub fn start(&mut self) -> Result<(), WatchdogError> {
        if self.is_running() {
            return Ok(());
        }

        let clock = self.clock_source();
        let ticks = timeout_ticks(self.timeout_secs, clock)?;

        self.unlock();
        self.write_feed();
        self.bus.write(RWDT_CFG0, RWDT_CFG0_ENABLE);
        self.bus.write(RWDT_CFG1, ticks);
        self.lock();

        log::info!(
            "RTC watchdog started: {}s on {:?} ({} ticks)",
            self.timeout_secs,
            clock,
            ticks
        );
        Ok(())
    }

    /// Stops counting. Does nothing if already stopped.
    pub fn stop(&mut self) {
        if !self.is_running() {
            return;
        }

        self.unlock();
        self.write_feed();
        self.bus.write(RWDT_CFG0, 0);
        self.lock();

        log::info!("RTC watchdog stopped");
    }

    /// Restarts the countdown without touching the configuration
    pub fn feed(&mut self) {
        self.unlock();
        self.write_feed();
        self.lock();
    }

    fn unlock(&mut self) {
        self.bus.write(RWDT_PROTECT, RWDT_PROTECT_KEY);
    }

    fn lock(&mut self) {
        self.bus.write(RWDT_PROTECT, 0);
    }

    fn write_feed(&mut self) {
        self.bus.write(RWDT_FEED, RWDT_FEED_VALUE);
    }
}

fn timeout_ticks(seconds: u32, clock: ClockSource) -> Result<u32, WatchdogError> {
    if seconds == 0 {
        return Err(WatchdogError::ZeroTimeout);
    }
    let ticks_per_second = clock.ticks_per_second();
    seconds
        .checked_mul(ticks_per_second)
        .ok_or(WatchdogError::TimeoutOverflow {
            seconds,
            ticks_per_second,
        })
}

impl<R: RegisterBus> Watchdog for RtcWatchdog<R> {
    /// Arms the counter with the configured timeout
    fn enable(&mut self) {
        if let Err(e) = self.start() {
            log::error!("Could not enable watchdog: {e}");
        }
    }

    fn kick(&mut self) {
        self.feed();
    }

    fn disable(&mut self) {
        self.stop();
    }
}

/// Device object carrying an RTC watchdog in its private slot
pub type WatchdogDevice<R> = DeviceObject<RtcWatchdog<R>>;

/// Requests routed to a watchdog device by the framework
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub enum WatchdogRequest {
    GetStatus,
    SetTimeout(u32),
    GetTimeout,
    Start,
    Stop,
    Feed,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub enum WatchdogReply {
    Status(bool),
    Timeout(u32),
    Done,
}

impl<R: RegisterBus> WatchdogDevice<R> {
    fn controller(&self) -> Result<&RtcWatchdog<R>, WatchdogError> {
        self.private().ok_or(WatchdogError::NotAttached)
    }

    fn controller_mut(&mut self) -> Result<&mut RtcWatchdog<R>, WatchdogError> {
        self.private_mut().ok_or(WatchdogError::NotAttached)
    }

    pub fn get_status(&self) -> Result<bool, WatchdogError> {
        Ok(self.controller()?.is_running())
    }

    pub fn set_timeout(&mut self, seconds: u32) -> Result<(), WatchdogError> {
        self.controller_mut()?.set_timeout(seconds);
        Ok(())
    }

    pub fn get_timeout(&self) -> Result<u32, WatchdogError> {
        Ok(self.controller()?.timeout())
    }

    pub fn start(&mut self) -> Result<(), WatchdogError> {
        self.controller_mut()?.start()
    }

    pub fn stop(&mut self) -> Result<(), WatchdogError> {
        self.controller_mut()?.stop();
        Ok(())
    }

    pub fn feed(&mut self) -> Result<(), WatchdogError> {
        self.controller_mut()?.feed();
        Ok(())
    }

    pub fn dispatch(&mut self, request: WatchdogRequest) -> Result<WatchdogReply, WatchdogError> {
        match request {
            WatchdogRequest::GetStatus => self.get_status().map(WatchdogReply::Status),
            WatchdogRequest::SetTimeout(seconds) => {
                self.set_timeout(seconds).map(|_| WatchdogReply::Done)
            }
            WatchdogRequest::GetTimeout => self.get_timeout().map(WatchdogReply::Timeout),
            WatchdogRequest::Start => self.start().map(|_| WatchdogReply::Done),
            WatchdogRequest::Stop => self.stop().map(|_| WatchdogReply::Done),
            WatchdogRequest::Feed => self.feed().map(|_| WatchdogReply::Done),
        }
    }
}

/// Driver entry for the RTC watchdog. Owns the register bus while no device
/// is initialized and hands it to the controller on `init`.
pub struct WatchdogDriver<R: RegisterBus> {
    bus: Option<R>,
}

impl<R: RegisterBus> WatchdogDriver<R> {
    pub fn new(bus: R) -> Self {
        Self { bus: Some(bus) }
    }

    /// The register bus, when no device currently holds it
    pub fn bus(&self) -> Option<&R> {
        self.bus.as_ref()
    }
}

impl<R: RegisterBus> DriverEntry for WatchdogDriver<R> {
    type Private = RtcWatchdog<R>;

    const MODULE_NAME: &'static str = "HDF_WATCHDOG_MODULE";

    fn init(&mut self, object: &mut WatchdogDevice<R>) -> Result<(), DeviceError> {
        if object.is_attached() {
            return Err(DeviceError::AlreadyInitialized(Self::MODULE_NAME));
        }
        let bus = self
            .bus
            .take()
            .ok_or(DeviceError::Unavailable(Self::MODULE_NAME))?;
        object.attach(RtcWatchdog::new(bus))?;
        log::info!("{} attached to {}", Self::MODULE_NAME, object.name());
        Ok(())
    }

    fn release(&mut self, object: &mut WatchdogDevice<R>) {
        if let Some(mut wdt) = object.detach() {
            wdt.stop();
            self.bus = Some(wdt.into_bus());
            log::info!("{} released from {}", Self::MODULE_NAME, object.name());
        }
    }
}
