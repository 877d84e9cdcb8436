//! C callback table handed to littlefs. The trampolines recover the block
//! device from `context` and translate errors into littlefs error codes.

use std::ffi::c_void;

use super::{BlockDevice, BlockDeviceError, Geometry};

pub const LFS_ERR_OK: i32 = 0;
pub const LFS_ERR_IO: i32 = -5;
pub const LFS_ERR_INVAL: i32 = -22;

/// What `context` points at
pub type BoxedDevice = Box<dyn BlockDevice + Send>;

pub type ReadFn = unsafe extern "C" fn(*const LfsConfig, u32, u32, *mut c_void, u32) -> i32;
pub type ProgFn = unsafe extern "C" fn(*const LfsConfig, u32, u32, *const c_void, u32) -> i32;
pub type EraseFn = unsafe extern "C" fn(*const LfsConfig, u32) -> i32;
pub type SyncFn = unsafe extern "C" fn(*const LfsConfig) -> i32;

/// Layout of littlefs' `struct lfs_config` (built without `LFS_THREADSAFE`)
#[repr(C)]
#[derive(Debug)]
pub struct LfsConfig {
    pub context: *mut c_void,
    pub read: Option<ReadFn>,
    pub prog: Option<ProgFn>,
    pub erase: Option<EraseFn>,
    pub sync: Option<SyncFn>,
    pub read_size: u32,
    pub prog_size: u32,
    pub block_size: u32,
    pub block_count: u32,
    pub block_cycles: i32,
    pub cache_size: u32,
    pub lookahead_size: u32,
    pub read_buffer: *mut c_void,
    pub prog_buffer: *mut c_void,
    pub lookahead_buffer: *mut c_void,
    pub name_max: u32,
    pub file_max: u32,
    pub attr_max: u32,
    pub metadata_max: u32,
}

impl LfsConfig {
    /// Buffers are left null so littlefs allocates them, limits at 0 use its defaults.
    pub fn new(context: *mut BoxedDevice, geometry: &Geometry) -> Self {
        Self {
            context: context as *mut c_void,
            read: Some(lfs_read),
            prog: Some(lfs_prog),
            erase: Some(lfs_erase),
            sync: Some(lfs_sync),
            read_size: geometry.read_size,
            prog_size: geometry.prog_size,
            block_size: geometry.block_size,
            block_count: geometry.block_count,
            block_cycles: geometry.block_cycles,
            cache_size: geometry.cache_size,
            lookahead_size: geometry.lookahead_size,
            read_buffer: std::ptr::null_mut(),
            prog_buffer: std::ptr::null_mut(),
            lookahead_buffer: std::ptr::null_mut(),
            name_max: 0,
            file_max: 0,
            attr_max: 0,
            metadata_max: 0,
        }
    }
}

pub fn error_code(e: &BlockDeviceError) -> i32 {
    match e {
        BlockDeviceError::OutOfBounds { .. } | BlockDeviceError::Geometry(_) => LFS_ERR_INVAL,
        BlockDeviceError::Flash(_) => LFS_ERR_IO,
        BlockDeviceError::Callback(code) => *code,
    }
}

fn to_code(result: Result<(), BlockDeviceError>) -> i32 {
    match result {
        Ok(()) => LFS_ERR_OK,
        Err(e) => {
            log::error!("littlefs block device: {}", e);
            error_code(&e)
        }
    }
}

/// # Safety
/// `cfg` is null or points at a config whose `context` is null or a live `BoxedDevice`.
unsafe fn device<'a>(cfg: *const LfsConfig) -> Option<&'a mut BoxedDevice> {
    unsafe { cfg.as_ref().and_then(|cfg| (cfg.context as *mut BoxedDevice).as_mut()) }
}

unsafe extern "C" fn lfs_read(cfg: *const LfsConfig, block: u32, off: u32, buffer: *mut c_void, size: u32) -> i32 {
    unsafe {
        let Some(device) = device(cfg) else {
            return LFS_ERR_INVAL;
        };
        if buffer.is_null() {
            return LFS_ERR_INVAL;
        }
        let buf = std::slice::from_raw_parts_mut(buffer as *mut u8, size as usize);
        to_code(device.read(block, off, buf))
    }
}

unsafe extern "C" fn lfs_prog(cfg: *const LfsConfig, block: u32, off: u32, buffer: *const c_void, size: u32) -> i32 {
    unsafe {
        let Some(device) = device(cfg) else {
            return LFS_ERR_INVAL;
        };
        if buffer.is_null() {
            return LFS_ERR_INVAL;
        }
        let data = std::slice::from_raw_parts(buffer as *const u8, size as usize);
        to_code(device.prog(block, off, data))
    }
}

unsafe extern "C" fn lfs_erase(cfg: *const LfsConfig, block: u32) -> i32 {
    unsafe {
        match device(cfg) {
            Some(device) => to_code(device.erase(block)),
            None => LFS_ERR_INVAL,
        }
    }
}

unsafe extern "C" fn lfs_sync(cfg: *const LfsConfig) -> i32 {
    unsafe {
        match device(cfg) {
            Some(device) => to_code(device.sync()),
            None => LFS_ERR_INVAL,
        }
    }
}
