//! Block devices backing the littlefs volumes.
//!
//! littlefs itself is linked from ESP-IDF; this module only provides the
//! read / prog / erase / sync callbacks and the geometry it is configured with.

use serde::Deserialize;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

pub mod flash;
pub mod lfs;
pub mod ram;

pub use flash::FlashBlockDevice;
pub use lfs::{BoxedDevice, LfsConfig};
pub use ram::RamBlockDevice;

pub const FLASH_MOUNT_POINT: &str = "/Talkweb";
pub const RAM_MOUNT_POINT: &str = "/Openvalley";

#[derive(Debug, Error, PartialEq)]
pub enum BlockDeviceError {
    #[error("access of {len} bytes at offset {offset} exceeds device size {size}")]
    OutOfBounds { offset: u64, len: u64, size: u64 },
    #[error("flash operation failed with code {0}")]
    Flash(i32),
    #[error("invalid geometry: {0}")]
    Geometry(&'static str),
    #[error("littlefs callback returned {0}")]
    Callback(i32),
}

/// Which backing store the board mounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Flash,
    Ram,
}

/// littlefs configuration values. Sizes are in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Minimum read size, every read is a multiple of it
    pub read_size: u32,
    /// Minimum program size, every write is a multiple of it
    pub prog_size: u32,
    /// Erase unit
    pub block_size: u32,
    pub block_count: u32,
    pub cache_size: u32,
    pub lookahead_size: u32,
    /// Erase cycles before metadata is moved, -1 disables wear levelling
    pub block_cycles: i32,
}

impl Geometry {
    pub const fn flash(block_count: u32) -> Self {
        Self {
            read_size: 256,
            prog_size: 256,
            block_size: 4096,
            block_count,
            cache_size: 256,
            lookahead_size: 16,
            block_cycles: 16,
        }
    }

    pub const fn ram(block_count: u32) -> Self {
        Self {
            read_size: 32,
            prog_size: 32,
            block_size: 128,
            block_count,
            cache_size: 32,
            lookahead_size: 16,
            block_cycles: -1,
        }
    }

    pub fn validate(&self) -> Result<(), BlockDeviceError> {
        if self.read_size == 0 || self.prog_size == 0 || self.block_size == 0 || self.cache_size == 0 {
            return Err(BlockDeviceError::Geometry("sizes must be non-zero"));
        }
        if self.block_size % self.read_size != 0 || self.block_size % self.prog_size != 0 {
            return Err(BlockDeviceError::Geometry(
                "block size must be a multiple of read and prog size",
            ));
        }
        if self.cache_size % self.read_size != 0 || self.cache_size % self.prog_size != 0 {
            return Err(BlockDeviceError::Geometry(
                "cache size must be a multiple of read and prog size",
            ));
        }
        if self.block_size % self.cache_size != 0 {
            return Err(BlockDeviceError::Geometry("cache size must divide block size"));
        }
        if self.lookahead_size == 0 || self.lookahead_size % 8 != 0 {
            return Err(BlockDeviceError::Geometry(
                "lookahead size must be a non-zero multiple of 8",
            ));
        }
        if self.block_count == 0 {
            return Err(BlockDeviceError::Geometry("no blocks"));
        }
        Ok(())
    }

    pub fn total_bytes(&self) -> u64 {
        self.block_count as u64 * self.block_size as u64
    }

    pub fn size_kib(&self) -> u64 {
        self.total_bytes() >> 10
    }

    /// Byte offset of `off` within `block`, checking that `len` bytes fit in `size`
    pub(crate) fn offset_of(&self, block: u32, off: u32, len: u64, size: u64) -> Result<u64, BlockDeviceError> {
        let offset = block as u64 * self.block_size as u64 + off as u64;
        if offset + len > size {
            return Err(BlockDeviceError::OutOfBounds { offset, len, size });
        }
        Ok(offset)
    }
}

/// Callbacks littlefs uses to reach the backing store
pub trait BlockDevice {
    fn geometry(&self) -> &Geometry;

    fn read(&self, block: u32, off: u32, buf: &mut [u8]) -> Result<(), BlockDeviceError>;
    fn prog(&mut self, block: u32, off: u32, data: &[u8]) -> Result<(), BlockDeviceError>;
    fn erase(&mut self, block: u32) -> Result<(), BlockDeviceError>;
    fn sync(&mut self) -> Result<(), BlockDeviceError>;

    /// Physical address of block 0, when the device is memory mapped
    fn base_address(&self) -> Option<u32> {
        None
    }
}

/// Raw SPI flash access with absolute addresses
#[cfg_attr(test, automock)]
pub trait Flash {
    fn read(&self, addr: u32, buf: &mut [u8]) -> Result<(), BlockDeviceError>;
    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), BlockDeviceError>;
    fn erase_range(&mut self, addr: u32, len: u32) -> Result<(), BlockDeviceError>;
}

/// A block device together with the path it is mounted on and the
/// `lfs_config` littlefs reaches it through
pub struct Volume {
    mount_point: &'static str,
    device: *mut BoxedDevice,
    config: Box<LfsConfig>,
}

// The device behind the pointer is `Send` and owned by the volume alone
unsafe impl Send for Volume {}

impl Volume {
    pub fn new(mount_point: &'static str, device: BoxedDevice) -> Result<Self, BlockDeviceError> {
        let geometry = *device.geometry();
        geometry.validate()?;
        let device = Box::into_raw(Box::new(device));
        Ok(Self {
            mount_point,
            device,
            config: Box::new(LfsConfig::new(device, &geometry)),
        })
    }

    pub fn ram() -> Result<Self, BlockDeviceError> {
        Self::new(RAM_MOUNT_POINT, Box::new(RamBlockDevice::new()))
    }

    pub fn flash(flash: impl Flash + Send + 'static, base: u32, size: u32) -> Result<Self, BlockDeviceError> {
        Self::new(FLASH_MOUNT_POINT, Box::new(FlashBlockDevice::new(flash, base, size)))
    }

    pub fn mount_point(&self) -> &'static str {
        self.mount_point
    }

    /// Callback table for `lfs_mount`. Valid for as long as the volume lives.
    pub fn lfs_config(&self) -> &LfsConfig {
        &self.config
    }

    /// Reads the first read unit of block 0 and syncs, going through the
    /// same callbacks littlefs uses
    pub fn verify(&self) -> Result<(), BlockDeviceError> {
        let cfg: *const LfsConfig = self.lfs_config();
        let read = self.config.read.ok_or(BlockDeviceError::Geometry("no read callback"))?;
        let sync = self.config.sync.ok_or(BlockDeviceError::Geometry("no sync callback"))?;

        let mut buf = vec![0u8; self.config.read_size as usize];
        let code = unsafe { read(cfg, 0, 0, buf.as_mut_ptr().cast(), self.config.read_size) };
        if code != lfs::LFS_ERR_OK {
            return Err(BlockDeviceError::Callback(code));
        }
        match unsafe { sync(cfg) } {
            lfs::LFS_ERR_OK => Ok(()),
            code => Err(BlockDeviceError::Callback(code)),
        }
    }

    pub fn describe(&self) -> String {
        // No callback can be running while `&self` is held
        let device = unsafe { &*self.device };
        let size = device.geometry().size_kib();
        match device.base_address() {
            Some(addr) => format!("{} addr=0x{:X} size={}K", self.mount_point, addr, size),
            None => format!("{} size={}K", self.mount_point, size),
        }
    }
}

impl Drop for Volume {
    fn drop(&mut self) {
        drop(unsafe { Box::from_raw(self.device) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;

    #[test]
    fn profiles_are_valid() {
        Geometry::flash(16).validate().unwrap();
        Geometry::ram(176).validate().unwrap();
    }

    #[test]
    fn rejects_inconsistent_geometry() {
        let mut g = Geometry::ram(10);
        g.block_size = 100;
        assert!(g.validate().is_err());

        let mut g = Geometry::ram(10);
        g.lookahead_size = 12;
        assert!(g.validate().is_err());

        let mut g = Geometry::flash(10);
        g.cache_size = 768;
        assert!(g.validate().is_err());

        assert_eq!(
            Geometry::flash(0).validate(),
            Err(BlockDeviceError::Geometry("no blocks"))
        );
    }

    #[test]
    fn size_in_kib() {
        assert_eq!(Geometry::flash(256).size_kib(), 1024);
        assert_eq!(Geometry::ram(176).size_kib(), 22);
    }

    #[test]
    fn describes_volumes() {
        let volume = Volume::ram().unwrap();
        assert_eq!(volume.describe(), "/Openvalley size=22K");

        let volume = Volume::flash(MockFlash::new(), 0x11_0000, 0x10_0000).unwrap();
        assert_eq!(volume.describe(), "/Talkweb addr=0x110000 size=1024K");
    }

    #[test]
    fn verify_reads_block_zero_through_the_callbacks() {
        Volume::ram().unwrap().verify().unwrap();

        let mut flash = MockFlash::new();
        flash
            .expect_read()
            .with(eq(0x11_0000), always())
            .once()
            .returning(|_, _| Ok(()));
        Volume::flash(flash, 0x11_0000, 0x10_0000).unwrap().verify().unwrap();
    }

    #[test]
    fn verify_reports_the_littlefs_error_code() {
        let mut flash = MockFlash::new();
        flash
            .expect_read()
            .returning(|_, _| Err(BlockDeviceError::Flash(0x107)));
        let volume = Volume::flash(flash, 0x11_0000, 0x10_0000).unwrap();
        assert_eq!(volume.verify(), Err(BlockDeviceError::Callback(lfs::LFS_ERR_IO)));
    }

    #[test]
    fn storage_kind_from_json() {
        let kind: StorageKind = serde_json::from_str(r#""ram""#).unwrap();
        assert_eq!(kind, StorageKind::Ram);
        assert_eq!(StorageKind::default(), StorageKind::Flash);
    }
}
