pub mod flash;
pub mod irq;
pub mod watchdog;
