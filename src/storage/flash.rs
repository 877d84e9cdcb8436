use super::{BlockDevice, BlockDeviceError, Flash, Geometry};

/// Block device on a region of SPI flash starting at `base`
pub struct FlashBlockDevice<F: Flash> {
    flash: F,
    base: u32,
    geometry: Geometry,
}

impl<F: Flash> FlashBlockDevice<F> {
    /// Only whole blocks of `size` are used
    pub fn new(flash: F, base: u32, size: u32) -> Self {
        let geometry = Geometry::flash(0);
        Self {
            flash,
            base,
            geometry: Geometry {
                block_count: size / geometry.block_size,
                ..geometry
            },
        }
    }

    fn address(&self, block: u32, off: u32, len: usize) -> Result<u32, BlockDeviceError> {
        let len = len as u64;
        let size = self.geometry.total_bytes();
        let offset = self.geometry.offset_of(block, off, len, size)?;
        u32::try_from(self.base as u64 + offset).map_err(|_| BlockDeviceError::OutOfBounds { offset, len, size })
    }
}

impl<F: Flash> BlockDevice for FlashBlockDevice<F> {
    fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    fn read(&self, block: u32, off: u32, buf: &mut [u8]) -> Result<(), BlockDeviceError> {
        let addr = self.address(block, off, buf.len())?;
        self.flash.read(addr, buf)
    }

    fn prog(&mut self, block: u32, off: u32, data: &[u8]) -> Result<(), BlockDeviceError> {
        let addr = self.address(block, off, data.len())?;
        self.flash.write(addr, data)
    }

    fn erase(&mut self, block: u32) -> Result<(), BlockDeviceError> {
        let addr = self.address(block, 0, self.geometry.block_size as usize)?;
        self.flash.erase_range(addr, self.geometry.block_size)
    }

    /// Flash writes are not buffered
    fn sync(&mut self) -> Result<(), BlockDeviceError> {
        Ok(())
    }

    fn base_address(&self) -> Option<u32> {
        Some(self.base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MockFlash;
    use mockall::predicate::*;

    const BASE: u32 = 0x0011_0000;

    #[test]
    fn uses_whole_blocks_of_the_partition() {
        let dev = FlashBlockDevice::new(MockFlash::new(), BASE, 4096 * 10 + 100);
        assert_eq!(dev.geometry().block_count, 10);
    }

    #[test]
    fn translates_block_offsets_to_flash_addresses() {
        let mut flash = MockFlash::new();
        flash
            .expect_read()
            .with(eq(BASE + 2 * 4096 + 256), always())
            .once()
            .returning(|_, buf| {
                buf.fill(0xAB);
                Ok(())
            });
        flash
            .expect_write()
            .with(eq(BASE + 3 * 4096), function(|data: &[u8]| data == [1u8, 2, 3]))
            .once()
            .returning(|_, _| Ok(()));
        flash
            .expect_erase_range()
            .with(eq(BASE + 4096), eq(4096))
            .once()
            .returning(|_, _| Ok(()));

        let mut dev = FlashBlockDevice::new(flash, BASE, 16 * 4096);
        let mut buf = [0u8; 4];
        dev.read(2, 256, &mut buf).unwrap();
        assert_eq!(buf, [0xAB; 4]);
        dev.prog(3, 0, &[1, 2, 3]).unwrap();
        dev.erase(1).unwrap();
        dev.sync().unwrap();
    }

    #[test]
    fn rejects_accesses_past_the_partition() {
        // No expectations: any flash access would panic
        let mut dev = FlashBlockDevice::new(MockFlash::new(), BASE, 4 * 4096);
        let mut buf = [0u8; 256];
        assert!(matches!(
            dev.read(3, 4000, &mut buf),
            Err(BlockDeviceError::OutOfBounds { .. })
        ));
        assert!(dev.prog(4, 0, &buf).is_err());
        assert!(dev.erase(4).is_err());
    }

    #[test]
    fn reports_flash_errors() {
        let mut flash = MockFlash::new();
        flash
            .expect_erase_range()
            .returning(|_, _| Err(BlockDeviceError::Flash(0x103)));

        let mut dev = FlashBlockDevice::new(flash, BASE, 4 * 4096);
        assert_eq!(dev.erase(0), Err(BlockDeviceError::Flash(0x103)));
    }

    #[test]
    fn address_overflow_is_out_of_bounds() {
        let dev = FlashBlockDevice::new(MockFlash::new(), u32::MAX - 4095, 2 * 4096);
        let mut buf = [0u8; 4];
        assert!(matches!(
            dev.read(1, 0, &mut buf),
            Err(BlockDeviceError::OutOfBounds { .. })
        ));
    }
}
