#![allow(unexpected_cfgs)]

#[cfg(target_arch = "xtensa")]
mod config;

#[cfg(target_arch = "xtensa")]
esp_idf_sys::esp_app_desc! {}

#[cfg(target_arch = "xtensa")]
mod board {
    use anyhow::anyhow;
    use esp_idf_hal::delay::FreeRtos;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;

    use niobe::boot::{AppEntry, Boot};
    use niobe::device::DriverEntry;
    use niobe::driver::{flash::EspPartition, irq::EspInterruptAllocator, watchdog::*};
    use niobe::irq::IrqRegistry;
    use niobe::logger::ConsoleLogger;
    use niobe::settings::BoardSettings;
    use niobe::storage::{StorageKind, Volume};
    use niobe::watchdog::{WatchdogDevice, WatchdogDriver};

    use crate::config;

    /// Everything the board drivers own. Torn down in reverse order of bring-up.
    struct DriverContext {
        irqs: IrqRegistry<EspInterruptAllocator>,
        watchdog_driver: WatchdogDriver<Mmio>,
        watchdog: WatchdogDevice<Mmio>,
        volume: Volume,
    }

    impl DriverContext {
        fn init(settings: &BoardSettings) -> Result<Self, anyhow::Error> {
            let irqs = IrqRegistry::new(EspInterruptAllocator);

            let mut watchdog_driver = esp_watchdog_driver();
            let mut watchdog = WatchdogDevice::new("watchdog0");
            watchdog_driver.bind(&mut watchdog)?;
            watchdog_driver.init(&mut watchdog)?;
            watchdog.set_timeout(settings.watchdog_timeout())?;

            let volume = match settings.storage {
                StorageKind::Flash => {
                    let partition = EspPartition::find_littlefs()
                        .ok_or_else(|| anyhow!("No littlefs data partition"))?;
                    let (address, size) = (partition.address(), partition.size());
                    Volume::flash(partition, address, size)?
                }
                StorageKind::Ram => Volume::ram()?,
            };
            volume.verify()?;
            log::info!("Littlefs volume {}", volume.describe());

            Ok(Self {
                irqs,
                watchdog_driver,
                watchdog,
                volume,
            })
        }
    }

    impl Drop for DriverContext {
        fn drop(&mut self) {
            self.watchdog_driver.release(&mut self.watchdog);
        }
    }

    fn app_main() {
        log::info!("Board up, nothing else to run");
    }

    pub fn run() -> Result<(), anyhow::Error> {
        esp_idf_svc::sys::link_patches();

        let settings = EspDefaultNvsPartition::take()
            .map_err(anyhow::Error::from)
            .and_then(config::load)
            .unwrap_or_else(|e| {
                println!("Could not load settings, using defaults: {e}");
                BoardSettings::default()
            });
        ConsoleLogger::install(settings.level_filter_or_default())?;
        log::info!("Started logger");

        let boot = Boot::new(AppEntry::Present(app_main));
        boot.before_run();

        let mut context = DriverContext::init(&settings)?;
        log::info!(
            "{} interrupt lines free, littlefs callbacks ready for {}",
            (0..niobe::irq::MAX_IRQ_ID)
                .filter(|irq| !context.irqs.is_registered(*irq))
                .count(),
            context.volume.mount_point()
        );

        context.watchdog.start()?;
        boot.start_app(&mut FreeRtos);

        let watchdog = context
            .watchdog
            .private_mut()
            .ok_or_else(|| anyhow!("Watchdog not attached"))?;
        boot.run(watchdog, &mut FreeRtos)
    }
}

#[cfg(target_arch = "xtensa")]
fn main() -> Result<(), anyhow::Error> {
    board::run()
}

#[cfg(not(target_arch = "xtensa"))]
fn main() {
    eprintln!("The niobe firmware only runs on the ESP32, use `cargo test` on the host");
}
