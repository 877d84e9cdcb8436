//! Memory-mapped register access.
//!
//! Drivers never dereference raw addresses themselves, they go through a
//! [`RegisterBus`]. On the chip that is a volatile MMIO accessor (see
//! `driver::watchdog::Mmio`), in tests it is [`MemoryRegisters`].

use std::collections::BTreeMap;

#[cfg(test)]
use mockall::automock;

/// 32-bit register reads and writes at absolute addresses.
#[cfg_attr(test, automock)]
pub trait RegisterBus {
    fn read(&self, addr: u32) -> u32;
    fn write(&mut self, addr: u32, value: u32);
}

/// A register file backed by memory. Registers that were never written read as 0.
#[derive(Debug, Default, Clone)]
pub struct MemoryRegisters {
    values: BTreeMap<u32, u32>,
    writes: Vec<(u32, u32)>,
}

impl MemoryRegisters {
    pub fn new() -> Self {
        Default::default()
    }

    /// Presets a register without recording it as a write
    pub fn preset(&mut self, addr: u32, value: u32) {
        self.values.insert(addr, value);
    }

    /// Every write performed so far, in order, as `(addr, value)`
    pub fn writes(&self) -> &[(u32, u32)] {
        &self.writes
    }

    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }
}

impl RegisterBus for MemoryRegisters {
    fn read(&self, addr: u32) -> u32 {
        self.values.get(&addr).copied().unwrap_or(0)
    }

    fn write(&mut self, addr: u32, value: u32) {
        self.values.insert(addr, value);
        self.writes.push((addr, value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritten_registers_read_zero() {
        let regs = MemoryRegisters::new();
        assert_eq!(regs.read(0x3ff4_8070), 0);
    }

    #[test]
    fn records_writes_but_not_presets() {
        let mut regs = MemoryRegisters::new();
        regs.preset(0x10, 7);
        regs.write(0x20, 1);
        regs.write(0x20, 2);

        assert_eq!(regs.read(0x10), 7);
        assert_eq!(regs.read(0x20), 2);
        assert_eq!(regs.writes(), &[(0x20, 1), (0x20, 2)]);

        regs.clear_writes();
        assert_eq!(regs.write_count(), 0);
        assert_eq!(regs.read(0x20), 2);
    }
}
