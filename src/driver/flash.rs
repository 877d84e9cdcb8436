use esp_idf_sys::*;

use crate::storage::{BlockDeviceError, Flash};

/// The data partition littlefs lives in, accessed through the default SPI
/// flash chip with absolute addresses.
pub struct EspPartition {
    address: u32,
    size: u32,
}

impl EspPartition {
    /// First data partition with the SPIFFS subtype, if the partition table has one
    pub fn find_littlefs() -> Option<Self> {
        let part = unsafe {
            esp_partition_find_first(
                esp_partition_type_t_ESP_PARTITION_TYPE_DATA,
                esp_partition_subtype_t_ESP_PARTITION_SUBTYPE_DATA_SPIFFS,
                std::ptr::null(),
            )
        };
        if part.is_null() {
            return None;
        }
        let part = unsafe { &*part };
        Some(Self {
            address: part.address,
            size: part.size,
        })
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn size(&self) -> u32 {
        self.size
    }
}

fn to_flash_error(e: EspError) -> BlockDeviceError {
    BlockDeviceError::Flash(e.code())
}

impl Flash for EspPartition {
    fn read(&self, addr: u32, buf: &mut [u8]) -> Result<(), BlockDeviceError> {
        esp!(unsafe {
            esp_flash_read(
                std::ptr::null_mut(),
                buf.as_mut_ptr() as *mut _,
                addr,
                buf.len() as u32,
            )
        })
        .map_err(to_flash_error)
    }

    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), BlockDeviceError> {
        esp!(unsafe {
            esp_flash_write(
                std::ptr::null_mut(),
                data.as_ptr() as *const _,
                addr,
                data.len() as u32,
            )
        })
        .map_err(to_flash_error)
    }

    fn erase_range(&mut self, addr: u32, len: u32) -> Result<(), BlockDeviceError> {
        esp!(unsafe { esp_flash_erase_region(std::ptr::null_mut(), addr, len) }).map_err(to_flash_error)
    }
}
