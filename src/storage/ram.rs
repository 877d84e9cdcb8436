use super::{BlockDevice, BlockDeviceError, Geometry};

/// Size of the RAM disk
pub const RAM_BUF_SIZE: usize = 22 * 1024;

const ERASED: u8 = 0xFF;

/// Block device kept entirely in RAM. Contents are lost on reset.
pub struct RamBlockDevice {
    geometry: Geometry,
    data: Vec<u8>,
}

impl Default for RamBlockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl RamBlockDevice {
    pub fn new() -> Self {
        let geometry = Geometry::ram(0);
        Self {
            geometry: Geometry {
                block_count: RAM_BUF_SIZE as u32 / geometry.block_size,
                ..geometry
            },
            data: vec![ERASED; RAM_BUF_SIZE],
        }
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

impl BlockDevice for RamBlockDevice {
    fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    fn read(&self, block: u32, off: u32, buf: &mut [u8]) -> Result<(), BlockDeviceError> {
        let start = self.geometry.offset_of(block, off, buf.len() as u64, self.size())? as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    fn prog(&mut self, block: u32, off: u32, data: &[u8]) -> Result<(), BlockDeviceError> {
        let start = self.geometry.offset_of(block, off, data.len() as u64, self.size())? as usize;
        self.data[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn erase(&mut self, block: u32) -> Result<(), BlockDeviceError> {
        let len = self.geometry.block_size as usize;
        let start = self.geometry.offset_of(block, 0, len as u64, self.size())? as usize;
        self.data[start..start + len].fill(ERASED);
        Ok(())
    }

    fn sync(&mut self) -> Result<(), BlockDeviceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_erased() {
        let dev = RamBlockDevice::new();
        assert_eq!(dev.geometry().block_count, 176);

        let mut buf = [0u8; 32];
        dev.read(3, 32, &mut buf).unwrap();
        assert_eq!(buf, [0xFF; 32]);
    }

    #[test]
    fn programs_and_reads_back() {
        let mut dev = RamBlockDevice::new();
        dev.prog(2, 64, b"littlefs").unwrap();

        let mut buf = [0u8; 8];
        dev.read(2, 64, &mut buf).unwrap();
        assert_eq!(&buf, b"littlefs");

        // Offsets are allowed to run past the block boundary
        let mut buf = [0u8; 8];
        dev.read(0, 2 * 128 + 64, &mut buf).unwrap();
        assert_eq!(&buf, b"littlefs");
    }

    #[test]
    fn erase_only_touches_one_block() {
        let mut dev = RamBlockDevice::new();
        dev.prog(4, 120, &[0u8; 16]).unwrap(); // straddles blocks 4 and 5
        dev.erase(4).unwrap();

        let mut buf = [0u8; 16];
        dev.read(4, 120, &mut buf).unwrap();
        assert_eq!(&buf[..8], &[0xFF; 8]);
        assert_eq!(&buf[8..], &[0x00; 8]);
    }

    #[test]
    fn rejects_accesses_past_the_end() {
        let mut dev = RamBlockDevice::new();
        let mut buf = [0u8; 32];

        assert_eq!(
            dev.read(175, 100, &mut buf),
            Err(BlockDeviceError::OutOfBounds {
                offset: 175 * 128 + 100,
                len: 32,
                size: RAM_BUF_SIZE as u64,
            })
        );
        assert!(dev.prog(176, 0, &buf).is_err());
        assert!(dev.erase(176).is_err());
        assert!(dev.erase(u32::MAX).is_err());

        // Last full block is fine
        dev.read(175, 96, &mut buf).unwrap();
        dev.erase(175).unwrap();
    }

    #[test]
    fn sync_succeeds() {
        assert!(RamBlockDevice::new().sync().is_ok());
    }
}
