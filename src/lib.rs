//! Main crate

use accel::{AccConnection, AccError, Compression};

mod capi;

pub use capi::*;

#[cxx::bridge]
mod ffi {

    struct DeviceInfo {
        vendor_id: u16,
        product_id: u16,
        bus_id: String,
        device_address: u8,
        product_string: String,
    }

    extern "Rust" {
        type AcceleratorFilter;

        #[Self = "AcceleratorFilter"]
        fn empty_filter() -> Box<AcceleratorFilter>;
        #[Self = "AcceleratorFilter"]
        fn accelerator_filter() -> Box<AcceleratorFilter>;

        fn with_vendor_id(&mut self, vid: u16);
        fn with_product_id(&mut self, pid: u16);
        fn find_devices(&self) -> Result<Vec<DeviceInfo>>;
    }

    extern "Rust" {
        type AccUsb;

        #[Self = "AccUsb"]
        fn create() -> Box<AccUsb>;

        fn is_connected(&self) -> bool;
        fn last_error(&self) -> i32;
        fn connect(&mut self, vendor_id: u16, product_id: u16) -> Result<()>;
        fn bulk_out(&mut self, ep: u8, data: &[u8]) -> Result<()>;
        fn bulk_in(&mut self, ep: u8, data: &mut [u8]) -> Result<()>;
        fn set_compression(&mut self, scheme: u8) -> Result<()>;
        fn send_bitmap(&mut self, bitmap: &[u8]) -> Result<()>;
        fn process_bitmap(&mut self, bitmap: &mut [u8]) -> Result<usize>;
    }
}

#[derive(Default)]
pub struct AcceleratorFilter {
    vid: Option<u16>,
    pid: Option<u16>,
}

/// Connection handle shared by the C and C++ interfaces
///
/// Remembers the code of the last call so C++ callers can tell error kinds
/// apart after catching the exception.
pub struct AccUsb {
    connection: AccConnection,
    last_error: i32,
}

impl AcceleratorFilter {
    fn empty_filter() -> Box<AcceleratorFilter> {
        Box::new(AcceleratorFilter::default())
    }

    fn accelerator_filter() -> Box<AcceleratorFilter> {
        Box::new(AcceleratorFilter {
            vid: Some(accel::ACC_VENDOR_ID),
            pid: Some(accel::ACC_PRODUCT_ID),
        })
    }

    fn with_vendor_id(&mut self, vid: u16) {
        self.vid.replace(vid);
    }

    fn with_product_id(&mut self, pid: u16) {
        self.pid.replace(pid);
    }

    fn find_devices(&self) -> Result<Vec<ffi::DeviceInfo>, AccError> {
        accel::find_accelerators(self.vid, self.pid).map(|devices| {
            devices
                .into_iter()
                .map(ffi::DeviceInfo::from_accelerator)
                .collect()
        })
    }
}

impl AccUsb {
    pub(crate) fn new(connection: AccConnection) -> Self {
        AccUsb {
            connection,
            last_error: capi::ACC_EOK,
        }
    }

    fn create() -> Box<AccUsb> {
        Box::new(AccUsb::new(AccConnection::new()))
    }

    fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    fn last_error(&self) -> i32 {
        self.last_error
    }

    pub(crate) fn track<T>(
        &mut self,
        result: Result<T, AccError>,
    ) -> Result<T, AccError> {
        self.last_error = match &result {
            Ok(_) => capi::ACC_EOK,
            Err(err) => err.code(),
        };
        result
    }

    fn connect(
        &mut self,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<(), AccError> {
        let result = self.connection.connect(vendor_id, product_id);
        self.track(result)
    }

    fn bulk_out(&mut self, ep: u8, data: &[u8]) -> Result<(), AccError> {
        let result = self.connection.bulk_out(ep, data);
        self.track(result)
    }

    fn bulk_in(&mut self, ep: u8, data: &mut [u8]) -> Result<(), AccError> {
        let result = self.connection.bulk_in(ep, data);
        self.track(result)
    }

    fn set_compression(&mut self, scheme: u8) -> Result<(), AccError> {
        let result = match Compression::from_scheme_id(scheme) {
            Some(compression) => {
                self.connection.set_compression(compression);
                Ok(())
            }
            None => Err(AccError::InvalidParameter("unknown compression")),
        };
        self.track(result)
    }

    fn send_bitmap(&mut self, bitmap: &[u8]) -> Result<(), AccError> {
        let result = self.connection.send_bitmap(bitmap);
        self.track(result)
    }

    fn process_bitmap(
        &mut self,
        bitmap: &mut [u8],
    ) -> Result<usize, AccError> {
        let result = self.connection.process_bitmap(bitmap);
        self.track(result)
    }
}

impl ffi::DeviceInfo {
    fn from_accelerator(info: accel::AcceleratorInfo) -> Self {
        ffi::DeviceInfo {
            vendor_id: info.vendor_id,
            product_id: info.product_id,
            bus_id: info.bus_id,
            device_address: info.device_address,
            product_string: info.product_string.unwrap_or_default(),
        }
    }
}
