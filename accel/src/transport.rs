use std::time::Duration;

use log::trace;
use nusb::transfer::{Buffer, Bulk, In, Out};

use crate::{AccError, MAX_PACKET_SIZE};

/// Something that can find a device and claim its interface
pub trait UsbBus: Send {
    /// Open the first device matching the ids and claim interface 0
    fn open(
        &self,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<Box<dyn UsbLink>, AccError>;
}

/// Raw bulk transfers on a claimed interface
///
/// Implementations block until the transfer completes, fails or times out.
/// The endpoint direction has already been checked by the caller.
pub trait UsbLink: Send {
    /// Send all of `data`; a short write is an error
    fn bulk_out(&mut self, endpoint: u8, data: &[u8]) -> Result<(), AccError>;

    /// Fill all of `data`; any other received length is an error
    fn bulk_in(&mut self, endpoint: u8, data: &mut [u8])
    -> Result<(), AccError>;

    /// Largest chunk the bitmap command puts in one bulk-out transfer
    fn transfer_size(&self) -> usize {
        MAX_PACKET_SIZE
    }
}

/// [UsbLink] over a claimed [`nusb::Interface`]
pub(crate) struct NusbLink {
    interface: nusb::Interface,
    out_endpoints: Vec<nusb::Endpoint<Bulk, Out>>,
    in_endpoints: Vec<nusb::Endpoint<Bulk, In>>,
    timeout: Duration,
}

impl NusbLink {
    pub(crate) fn new(interface: nusb::Interface, timeout: Duration) -> Self {
        NusbLink {
            interface,
            out_endpoints: Vec::new(),
            in_endpoints: Vec::new(),
            timeout,
        }
    }

    fn out_endpoint(
        &mut self,
        address: u8,
    ) -> Result<&mut nusb::Endpoint<Bulk, Out>, AccError> {
        let pos = match self
            .out_endpoints
            .iter()
            .position(|ep| ep.endpoint_address() == address)
        {
            Some(pos) => pos,
            None => {
                let ep = self.interface.endpoint::<Bulk, Out>(address)?;
                self.out_endpoints.push(ep);
                self.out_endpoints.len() - 1
            }
        };
        Ok(&mut self.out_endpoints[pos])
    }

    fn in_endpoint(
        &mut self,
        address: u8,
    ) -> Result<&mut nusb::Endpoint<Bulk, In>, AccError> {
        let pos = match self
            .in_endpoints
            .iter()
            .position(|ep| ep.endpoint_address() == address)
        {
            Some(pos) => pos,
            None => {
                let ep = self.interface.endpoint::<Bulk, In>(address)?;
                self.in_endpoints.push(ep);
                self.in_endpoints.len() - 1
            }
        };
        Ok(&mut self.in_endpoints[pos])
    }
}

impl UsbLink for NusbLink {
    fn bulk_out(&mut self, endpoint: u8, data: &[u8]) -> Result<(), AccError> {
        let timeout = self.timeout;
        let ep = self.out_endpoint(endpoint)?;
        let completion =
            ep.transfer_blocking(Buffer::from(data.to_vec()), timeout);
        completion.status?;
        trace!("bulk out 0x{:02x}: {} bytes", endpoint, completion.actual_len);
        if completion.actual_len != data.len() {
            return Err(AccError::LengthMismatch {
                expected: data.len(),
                actual: completion.actual_len,
            });
        }
        Ok(())
    }

    fn bulk_in(
        &mut self,
        endpoint: u8,
        data: &mut [u8],
    ) -> Result<(), AccError> {
        let timeout = self.timeout;
        let ep = self.in_endpoint(endpoint)?;

        // IN requests are whole packets; anything beyond `data` is a mismatch
        let packet_size = ep.max_packet_size().max(1);
        let requested = data.len().max(1).next_multiple_of(packet_size);
        let mut buffer = Buffer::new(requested);
        buffer.set_requested_len(requested);

        let completion = ep.transfer_blocking(buffer, timeout);
        completion.status?;
        trace!("bulk in 0x{:02x}: {} bytes", endpoint, completion.actual_len);
        if completion.actual_len != data.len() {
            return Err(AccError::LengthMismatch {
                expected: data.len(),
                actual: completion.actual_len,
            });
        }
        data.copy_from_slice(&completion.buffer[..data.len()]);
        Ok(())
    }
}
