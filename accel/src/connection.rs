use log::{debug, warn};

use crate::{
    ACC_PRODUCT_ID, ACC_VENDOR_ID, AccError, Compression, Direction, Endpoint,
    NusbBus, UsbBus, UsbLink,
};

/// Lifecycle of an [AccConnection]
///
/// A dropped connection is destroyed; the C interface represents the
/// uninitialized and destroyed states with a null handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Created,
    Connected,
}

/// One USB session to one accelerator
///
/// The interface claim is held from a successful [AccConnection::connect]
/// until the connection is dropped. Calls take `&mut self`, so a connection
/// serves one operation at a time.
pub struct AccConnection {
    bus: Box<dyn UsbBus>,
    link: Option<Box<dyn UsbLink>>,
    compression: Compression,
}

impl AccConnection {
    /// Unconnected handle using the system USB stack
    pub fn new() -> Self {
        Self::with_bus(NusbBus::default())
    }

    pub fn with_bus(bus: impl UsbBus + 'static) -> Self {
        AccConnection {
            bus: Box::new(bus),
            link: None,
            compression: Compression::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        if self.link.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Created
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Bind to the first device matching the ids and claim its interface
    pub fn connect(
        &mut self,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<(), AccError> {
        if self.link.is_some() {
            return Err(AccError::Already);
        }

        let link = self.bus.open(vendor_id, product_id).inspect_err(|err| {
            warn!("Connecting to {:04x}:{:04x}: {}", vendor_id, product_id, err)
        })?;
        debug!(
            "Connected to {:04x}:{:04x} (transfer size {})",
            vendor_id,
            product_id,
            link.transfer_size()
        );
        self.link = Some(link);
        Ok(())
    }

    /// [AccConnection::connect] with the accelerator's own ids
    pub fn connect_accelerator(&mut self) -> Result<(), AccError> {
        self.connect(ACC_VENDOR_ID, ACC_PRODUCT_ID)
    }

    /// Send all of `data` to a host-to-device endpoint
    pub fn bulk_out(
        &mut self,
        endpoint: impl Into<Endpoint>,
        data: &[u8],
    ) -> Result<(), AccError> {
        let address = endpoint.into().checked(Direction::Out)?;
        self.link()?.bulk_out(address, data)
    }

    /// Fill all of `data` from a device-to-host endpoint
    pub fn bulk_in(
        &mut self,
        endpoint: impl Into<Endpoint>,
        data: &mut [u8],
    ) -> Result<(), AccError> {
        let address = endpoint.into().checked(Direction::In)?;
        self.link()?.bulk_in(address, data)
    }

    /// Bulk-out transfer unit of the connected device
    pub fn transfer_size(&self) -> Result<usize, AccError> {
        match &self.link {
            Some(link) => Ok(link.transfer_size().max(1)),
            None => Err(AccError::InvalidParameter("handle is not connected")),
        }
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Scheme tried by the bitmap command; switch to [Compression::None]
    /// after the device reports unsupported compression
    pub fn set_compression(&mut self, compression: Compression) {
        self.compression = compression;
    }

    fn link(&mut self) -> Result<&mut (dyn UsbLink + 'static), AccError> {
        match self.link.as_deref_mut() {
            Some(link) => Ok(link),
            None => Err(AccError::InvalidParameter("handle is not connected")),
        }
    }
}

impl Default for AccConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AccConnection {
    fn drop(&mut self) {
        if self.link.take().is_some() {
            debug!("Releasing accelerator interface");
        }
    }
}
