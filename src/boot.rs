//! Start-up glue: runs the optional pre-run hook and the application entry,
//! then keeps the watchdog fed from the idle task.

use embedded_hal::blocking::delay::DelayMs;

use crate::watchdog::Watchdog;

/// Length of one RTOS tick
pub const TICK_MS: u32 = 10;

const START_DELAY_TICKS: u32 = 10;
const FEED_INTERVAL_TICKS: u32 = 100;

/// Time between two feeds from the idle task
pub const FEED_INTERVAL_MS: u32 = FEED_INTERVAL_TICKS * TICK_MS;

/// An entry point that the application may or may not provide
#[derive(Debug, Clone, Copy, Default)]
pub enum AppEntry {
    Present(fn()),
    #[default]
    Absent,
}

impl AppEntry {
    /// Returns whether there was anything to call
    pub fn call(&self) -> bool {
        match self {
            AppEntry::Present(f) => {
                f();
                true
            }
            AppEntry::Absent => false,
        }
    }
}

impl From<Option<fn()>> for AppEntry {
    fn from(f: Option<fn()>) -> Self {
        f.map_or(AppEntry::Absent, AppEntry::Present)
    }
}

#[derive(Debug, Default)]
pub struct Boot {
    before_run: AppEntry,
    app: AppEntry,
}

impl Boot {
    pub fn new(app: AppEntry) -> Self {
        Self {
            before_run: AppEntry::Absent,
            app,
        }
    }

    pub fn with_before_run(mut self, hook: AppEntry) -> Self {
        self.before_run = hook;
        self
    }

    pub fn before_run(&self) {
        self.before_run.call();
    }

    pub fn start_app(&self, delay: &mut impl DelayMs<u32>) {
        delay.delay_ms(START_DELAY_TICKS * TICK_MS);
        if let AppEntry::Present(_) = self.app {
            log::info!("<--------------- Application start here --------------->");
            self.app.call();
        } else {
            log::error!("<--------------- No application entry --------------->");
        }
    }

    pub fn idle_tick(&self, watchdog: &mut impl Watchdog, delay: &mut impl DelayMs<u32>) {
        delay.delay_ms(FEED_INTERVAL_MS);
        watchdog.kick();
    }

    /// Idle loop, feeds the watchdog once per second forever
    pub fn run(&self, watchdog: &mut impl Watchdog, delay: &mut impl DelayMs<u32>) -> ! {
        loop {
            self.idle_tick(watchdog, delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watchdog::MockWatchdog;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingDelay(Vec<u32>);

    impl DelayMs<u32> for RecordingDelay {
        fn delay_ms(&mut self, ms: u32) {
            self.0.push(ms);
        }
    }

    static APP_CALLS: AtomicUsize = AtomicUsize::new(0);
    static HOOK_CALLS: AtomicUsize = AtomicUsize::new(0);

    fn app() {
        APP_CALLS.fetch_add(1, Ordering::SeqCst);
    }

    fn hook() {
        HOOK_CALLS.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn runs_present_entries() {
        let boot = Boot::new(AppEntry::Present(app)).with_before_run(AppEntry::Present(hook));
        let mut delay = RecordingDelay::default();

        boot.before_run();
        assert_eq!(HOOK_CALLS.load(Ordering::SeqCst), 1);

        boot.start_app(&mut delay);
        assert_eq!(APP_CALLS.load(Ordering::SeqCst), 1);
        assert_eq!(delay.0, vec![100]);
    }

    #[test]
    fn absent_entries_are_skipped() {
        let boot = Boot::default();
        let mut delay = RecordingDelay::default();
        boot.before_run();
        boot.start_app(&mut delay);
        assert!(!AppEntry::Absent.call());
        assert_eq!(delay.0, vec![100]);
    }

    #[test]
    fn converts_from_option() {
        assert!(matches!(AppEntry::from(None), AppEntry::Absent));
        assert!(matches!(AppEntry::from(Some(hook as fn())), AppEntry::Present(_)));
    }

    #[test]
    fn idle_tick_waits_then_feeds() {
        let mut watchdog = MockWatchdog::new();
        watchdog.expect_kick().times(3).return_const(());

        let boot = Boot::default();
        let mut delay = RecordingDelay::default();
        for _ in 0..3 {
            boot.idle_tick(&mut watchdog, &mut delay);
        }
        assert_eq!(delay.0, vec![1000, 1000, 1000]);
    }
}
