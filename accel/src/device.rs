use std::time::Duration;

use log::debug;
use nusb::{self, MaybeFuture};

use crate::{AccError, DEFAULT_TIMEOUT, UsbBus, UsbLink, transport::NusbLink};

/// Accelerator as seen during enumeration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcceleratorInfo {
    pub bus_id: String,
    pub device_address: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub product_string: Option<String>,
}

impl AcceleratorInfo {
    fn from_device_info(dev: &nusb::DeviceInfo) -> Self {
        AcceleratorInfo {
            bus_id: dev.bus_id().into(),
            device_address: dev.device_address(),
            vendor_id: dev.vendor_id(),
            product_id: dev.product_id(),
            product_string: dev.product_string().map(String::from),
        }
    }
}

/// The system USB stack
pub struct NusbBus {
    timeout: Duration,
}

impl NusbBus {
    /// Use a transfer timeout other than the default of 5 seconds
    pub fn with_timeout(timeout: Duration) -> Self {
        NusbBus { timeout }
    }
}

impl Default for NusbBus {
    fn default() -> Self {
        NusbBus {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl UsbBus for NusbBus {
    fn open(
        &self,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<Box<dyn UsbLink>, AccError> {
        let device_info = nusb::list_devices()
            .wait()?
            .find(|dev| {
                dev.vendor_id() == vendor_id && dev.product_id() == product_id
            })
            .ok_or(AccError::NotPresent {
                vendor_id,
                product_id,
            })?;

        debug!(
            "Opening {:04x}:{:04x} on bus {} address {}",
            vendor_id,
            product_id,
            device_info.bus_id(),
            device_info.device_address()
        );
        let device = device_info.open().wait()?;
        let interface = device.claim_interface(0).wait()?;
        Ok(Box::new(NusbLink::new(interface, self.timeout)))
    }
}

/// List attached devices, optionally filtered by vendor and product id
pub fn find_accelerators(
    vid: Option<u16>,
    pid: Option<u16>,
) -> Result<Vec<AcceleratorInfo>, AccError> {
    Ok(nusb::list_devices()
        .wait()?
        .filter(|dev| {
            vid.is_none_or(|id| dev.vendor_id() == id)
                && pid.is_none_or(|id| dev.product_id() == id)
        })
        .map(|dev| AcceleratorInfo::from_device_info(&dev))
        .collect())
}
