//! Interrupt handle registry.
//!
//! Keeps track of which interrupt lines have a handler allocated so they can
//! be enabled, disabled or freed by id. The registry is owned by the driver
//! context and frees everything it still holds when dropped.

use thiserror::Error;

#[cfg(test)]
use mockall::automock;

/// Number of interrupt sources on the chip
pub const MAX_IRQ_ID: u32 = 71;

/// Callback run when an interrupt fires
pub struct IrqHandler(pub Box<dyn Fn() + Send>);

impl IrqHandler {
    pub fn new(f: impl Fn() + Send + 'static) -> Self {
        Self(Box::new(f))
    }

    pub fn call(&self) {
        self.0()
    }
}

impl std::fmt::Debug for IrqHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("IrqHandler")
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum IrqError {
    #[error("interrupt {0} is out of range")]
    OutOfRange(u32),
    #[error("no handler registered for interrupt {0}")]
    NotRegistered(u32),
    #[error("interrupt allocator failed with code {0}")]
    Allocator(i32),
}

/// Vendor interrupt allocator
#[cfg_attr(test, automock(type Handle = u32;))]
pub trait InterruptAllocator {
    type Handle;

    fn allocate(&mut self, irq: u32, flags: i32, handler: IrqHandler) -> Result<Self::Handle, IrqError>;
    fn free(&mut self, handle: Self::Handle) -> Result<(), IrqError>;
    fn enable(&mut self, handle: &Self::Handle) -> Result<(), IrqError>;
    fn disable(&mut self, handle: &Self::Handle) -> Result<(), IrqError>;
}

pub struct IrqRegistry<A: InterruptAllocator> {
    allocator: A,
    handles: Vec<Option<A::Handle>>,
}

impl<A: InterruptAllocator> IrqRegistry<A> {
    pub fn new(allocator: A) -> Self {
        Self {
            allocator,
            handles: (0..MAX_IRQ_ID).map(|_| None).collect(),
        }
    }

    fn slot(&mut self, irq: u32) -> Result<&mut Option<A::Handle>, IrqError> {
        self.handles
            .get_mut(irq as usize)
            .ok_or(IrqError::OutOfRange(irq))
    }

    pub fn is_registered(&self, irq: u32) -> bool {
        matches!(self.handles.get(irq as usize), Some(Some(_)))
    }

    /// Allocates `handler` on `irq`, replacing any handler already there
    pub fn register(&mut self, irq: u32, flags: i32, handler: IrqHandler) -> Result<(), IrqError> {
        if self.slot(irq)?.is_some() {
            if let Err(e) = self.unregister(irq) {
                log::warn!("Could not free previous handler for irq {}: {}", irq, e);
            }
        }

        let handle = self.allocator.allocate(irq, flags, handler)?;
        *self.slot(irq)? = Some(handle);
        log::info!("Registered handler for irq {}", irq);
        Ok(())
    }

    /// The slot is cleared even if the allocator fails to free the handle
    pub fn unregister(&mut self, irq: u32) -> Result<(), IrqError> {
        let handle = self.slot(irq)?.take().ok_or(IrqError::NotRegistered(irq))?;
        self.allocator.free(handle)
    }

    pub fn enable(&mut self, irq: u32) -> Result<(), IrqError> {
        let IrqRegistry { allocator, handles } = self;
        match handles.get(irq as usize) {
            None => Err(IrqError::OutOfRange(irq)),
            Some(None) => Err(IrqError::NotRegistered(irq)),
            Some(Some(handle)) => allocator.enable(handle),
        }
    }

    pub fn disable(&mut self, irq: u32) -> Result<(), IrqError> {
        let IrqRegistry { allocator, handles } = self;
        match handles.get(irq as usize) {
            None => Err(IrqError::OutOfRange(irq)),
            Some(None) => Err(IrqError::NotRegistered(irq)),
            Some(Some(handle)) => allocator.disable(handle),
        }
    }
}

impl<A: InterruptAllocator> Drop for IrqRegistry<A> {
    fn drop(&mut self) {
        for irq in 0..MAX_IRQ_ID {
            if self.is_registered(irq) {
                if let Err(e) = self.unregister(irq) {
                    log::error!("Could not free irq {}: {}", irq, e);
                }
            }
        }
    }
}
