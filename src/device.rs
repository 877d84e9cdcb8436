//! Device framework binding: device objects with a private-data slot and the
//! bind/init/release lifecycle drivers implement.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum DeviceError {
    #[error("{0} is already initialized")]
    AlreadyInitialized(&'static str),
    #[error("{0} has no hardware resource left to attach")]
    Unavailable(&'static str),
}

/// A device object as seen by a driver. The private slot holds whatever the
/// driver attaches during `init` and is emptied on `release`.
#[derive(Debug)]
pub struct DeviceObject<P> {
    name: &'static str,
    private: Option<P>,
}

impl<P> DeviceObject<P> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            private: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn attach(&mut self, private: P) -> Result<(), DeviceError> {
        if self.private.is_some() {
            return Err(DeviceError::AlreadyInitialized(self.name));
        }
        self.private = Some(private);
        Ok(())
    }

    pub fn detach(&mut self) -> Option<P> {
        self.private.take()
    }

    pub fn is_attached(&self) -> bool {
        self.private.is_some()
    }

    pub fn private(&self) -> Option<&P> {
        self.private.as_ref()
    }

    pub fn private_mut(&mut self) -> Option<&mut P> {
        self.private.as_mut()
    }
}

/// Driver lifecycle hooks, called by the framework in bind → init → release order.
pub trait DriverEntry {
    type Private;

    const MODULE_NAME: &'static str;

    fn bind(&mut self, _object: &mut DeviceObject<Self::Private>) -> Result<(), DeviceError> {
        Ok(())
    }

    fn init(&mut self, object: &mut DeviceObject<Self::Private>) -> Result<(), DeviceError>;

    /// Must leave the private slot empty. Releasing an object that was never
    /// initialized is a no-op.
    fn release(&mut self, object: &mut DeviceObject<Self::Private>);
}
