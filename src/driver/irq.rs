use esp_idf_sys::*;

use crate::irq::{InterruptAllocator, IrqError, IrqHandler};

unsafe extern "C" fn irq_trampoline(data: *mut core::ffi::c_void) {
    unsafe {
        let handler = &*(data as *const IrqHandler);
        handler.call();
    }
}

/// An allocated interrupt. The handler is boxed so its address stays valid
/// for as long as the interrupt can fire.
pub struct EspIrqHandle {
    handle: intr_handle_t,
    _handler: Box<IrqHandler>,
}

/// Interrupt allocation through `esp_intr_alloc`
#[derive(Default)]
pub struct EspInterruptAllocator;

fn to_irq_error(e: EspError) -> IrqError {
    IrqError::Allocator(e.code())
}

impl InterruptAllocator for EspInterruptAllocator {
    type Handle = EspIrqHandle;

    fn allocate(&mut self, irq: u32, flags: i32, handler: IrqHandler) -> Result<EspIrqHandle, IrqError> {
        let handler = Box::new(handler);
        let mut handle: intr_handle_t = std::ptr::null_mut();
        esp!(unsafe {
            esp_intr_alloc(
                irq as i32,
                flags,
                Some(irq_trampoline),
                &*handler as *const IrqHandler as *mut _,
                &mut handle,
            )
        })
        .map_err(to_irq_error)?;

        Ok(EspIrqHandle {
            handle,
            _handler: handler,
        })
    }

    fn free(&mut self, handle: EspIrqHandle) -> Result<(), IrqError> {
        // The boxed handler is dropped after the interrupt is gone
        esp!(unsafe { esp_intr_free(handle.handle) }).map_err(to_irq_error)
    }

    fn enable(&mut self, handle: &EspIrqHandle) -> Result<(), IrqError> {
        esp!(unsafe { esp_intr_enable(handle.handle) }).map_err(to_irq_error)
    }

    fn disable(&mut self, handle: &EspIrqHandle) -> Result<(), IrqError> {
        esp!(unsafe { esp_intr_disable(handle.handle) }).map_err(to_irq_error)
    }
}
