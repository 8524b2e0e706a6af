//! C interface
//!
//! Every function returns [ACC_EOK] or one of the negative `ACC_E*` codes.
//! A handle must only be used by one thread at a time; transfers block until
//! the USB stack completes them or its timeout expires.

use std::{ffi::c_int, ptr::null_mut, slice};

use accel::{AccError, ErrorKind};
use log::debug;

use crate::AccUsb;

/// Operation went ok
pub const ACC_EOK: c_int = 0;
/// Operation has already happened so this call is invalid
pub const ACC_EALREADY: c_int = ErrorKind::Already.code();
/// Some parameter is invalid
pub const ACC_EINVAL: c_int = ErrorKind::InvalidParameter.code();
/// The search yielded no valid result
pub const ACC_ENOTPRESENT: c_int = ErrorKind::NotPresent.code();
/// There was an error interacting with the USB
pub const ACC_EUSB: c_int = ErrorKind::Usb.code();
/// Unknown accelerator error
pub const ACC_EACC_UNKNOWN: c_int = ErrorKind::AcceleratorUnknown.code();
/// Unsupported compression
pub const ACC_EACC_UNSUP_COMP: c_int =
    ErrorKind::UnsupportedCompression.code();
/// Parse failure
pub const ACC_EACC_PARSE: c_int = ErrorKind::Parse.code();

pub const ACC_VID: u16 = accel::ACC_VENDOR_ID;
pub const ACC_PID: u16 = accel::ACC_PRODUCT_ID;
pub const ACC_BOUT_EP: u8 = 0x01;
pub const ACC_BIN_EP: u8 = 0x81;

fn to_code<T>(result: Result<T, AccError>) -> c_int {
    match result {
        Ok(_) => ACC_EOK,
        Err(err) => err.code(),
    }
}

/// View a caller buffer; null is only allowed for empty buffers
///
/// # Safety
///
/// A non-null `data` must be valid for reads of `len` bytes.
unsafe fn in_buffer<'a>(data: *const u8, len: usize) -> Option<&'a [u8]> {
    if len == 0 {
        Some(&[])
    } else if data.is_null() {
        None
    } else {
        Some(unsafe { slice::from_raw_parts(data, len) })
    }
}

/// # Safety
///
/// A non-null `data` must be valid for writes of `len` bytes.
unsafe fn out_buffer<'a>(data: *mut u8, len: usize) -> Option<&'a mut [u8]> {
    if len == 0 {
        Some(&mut [])
    } else if data.is_null() {
        None
    } else {
        Some(unsafe { slice::from_raw_parts_mut(data, len) })
    }
}

/// Create an unconnected handle in `*usb`
///
/// `*usb` must be null on entry, otherwise [ACC_EALREADY] is returned and
/// the existing handle is left alone.
///
/// # Safety
///
/// `usb` must be null or point to a writable handle pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn acc_usb_create(usb: *mut *mut AccUsb) -> c_int {
    let Some(slot) = (unsafe { usb.as_mut() }) else {
        return ACC_EINVAL;
    };
    if !slot.is_null() {
        return ACC_EALREADY;
    }

    *slot = Box::into_raw(AccUsb::create());
    debug!("Created handle {:p}", *slot);
    ACC_EOK
}

/// Free the handle in `*usb` and set `*usb` to null
///
/// Freeing a null handle is a no-op.
///
/// # Safety
///
/// `usb` must be null or point to a handle pointer that is either null or
/// was produced by [acc_usb_create].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn acc_usb_free(usb: *mut *mut AccUsb) -> c_int {
    let Some(slot) = (unsafe { usb.as_mut() }) else {
        return ACC_EINVAL;
    };
    if !slot.is_null() {
        debug!("Freeing handle {:p}", *slot);
        drop(unsafe { Box::from_raw(*slot) });
        *slot = null_mut();
    }
    ACC_EOK
}

/// Connect to the first device matching the ids and claim interface 0
///
/// # Safety
///
/// `usb` must be null or a live handle from [acc_usb_create].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn acc_usb_connect(
    usb: *mut AccUsb,
    vendor_id: u16,
    product_id: u16,
) -> c_int {
    let Some(usb) = (unsafe { usb.as_mut() }) else {
        return ACC_EINVAL;
    };
    to_code(usb.connect(vendor_id, product_id))
}

/// Send `len` bytes. The endpoint must *not* have its top bit (`0x80`) set.
///
/// # Safety
///
/// `usb` must be null or a live handle; `data` must be null or valid for
/// reads of `len` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn acc_usb_bulk_out(
    usb: *mut AccUsb,
    ep: u8,
    data: *const u8,
    len: usize,
) -> c_int {
    let Some(usb) = (unsafe { usb.as_mut() }) else {
        return ACC_EINVAL;
    };
    let result = match unsafe { in_buffer(data, len) } {
        Some(data) => usb.bulk_out(ep, data),
        None => usb.track(Err(AccError::InvalidParameter("null buffer"))),
    };
    to_code(result)
}

/// Receive exactly `len` bytes. The endpoint must have its top bit (`0x80`)
/// set.
///
/// # Safety
///
/// `usb` must be null or a live handle; `data` must be null or valid for
/// writes of `len` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn acc_usb_bulk_in(
    usb: *mut AccUsb,
    ep: u8,
    data: *mut u8,
    len: usize,
) -> c_int {
    let Some(usb) = (unsafe { usb.as_mut() }) else {
        return ACC_EINVAL;
    };
    let result = match unsafe { out_buffer(data, len) } {
        Some(data) => usb.bulk_in(ep, data),
        None => usb.track(Err(AccError::InvalidParameter("null buffer"))),
    };
    to_code(result)
}

/// Select the compression scheme for bitmaps: 0 for none, 1 for RLE
///
/// # Safety
///
/// `usb` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn acc_usb_set_compression(
    usb: *mut AccUsb,
    scheme: u8,
) -> c_int {
    let Some(usb) = (unsafe { usb.as_mut() }) else {
        return ACC_EINVAL;
    };
    to_code(usb.set_compression(scheme))
}

/// Send a bitmap and wait for the accelerator to accept it
///
/// # Safety
///
/// `usb` must be null or a live handle; `bmp_data` must be null or valid for
/// reads of `bmp_len` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn acc_send_bmp(
    usb: *mut AccUsb,
    bmp_data: *const u8,
    bmp_len: usize,
) -> c_int {
    let Some(usb) = (unsafe { usb.as_mut() }) else {
        return ACC_EINVAL;
    };
    let result = match unsafe { in_buffer(bmp_data, bmp_len) } {
        Some(bitmap) => usb.send_bitmap(bitmap),
        None => usb.track(Err(AccError::InvalidParameter("null bitmap"))),
    };
    to_code(result)
}

/// Send a bitmap and overwrite it with the image the accelerator returns
///
/// # Safety
///
/// `usb` must be null or a live handle; `bmp_data` must be null or valid for
/// reads and writes of `bmp_len` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn acc_process_bmp(
    usb: *mut AccUsb,
    bmp_data: *mut u8,
    bmp_len: usize,
) -> c_int {
    let Some(usb) = (unsafe { usb.as_mut() }) else {
        return ACC_EINVAL;
    };
    let result = match unsafe { out_buffer(bmp_data, bmp_len) } {
        Some(bitmap) => usb.process_bitmap(bitmap),
        None => usb.track(Err(AccError::InvalidParameter("null bitmap"))),
    };
    to_code(result)
}

#[cfg(test)]
mod tests {
    use std::ptr::{null, null_mut};

    use accel::{
        AccConnection,
        sim::{SimBus, SimDevice, SimMode},
    };

    use super::*;

    fn sim_handle(mode: SimMode) -> (*mut AccUsb, SimDevice) {
        let device = SimDevice::new(ACC_VID, ACC_PID, mode);
        let connection =
            AccConnection::with_bus(SimBus::new().with_device(device.clone()));
        (Box::into_raw(Box::new(AccUsb::new(connection))), device)
    }

    #[test]
    fn test_codes() {
        assert_eq!(ACC_EALREADY, -1);
        assert_eq!(ACC_EINVAL, -2);
        assert_eq!(ACC_ENOTPRESENT, -3);
        assert_eq!(ACC_EUSB, -4);
        assert_eq!(ACC_EACC_UNKNOWN, -100);
        assert_eq!(ACC_EACC_UNSUP_COMP, -101);
        assert_eq!(ACC_EACC_PARSE, -102);
    }

    #[test]
    fn test_create_free() {
        unsafe {
            assert_eq!(acc_usb_create(null_mut()), ACC_EINVAL);
            assert_eq!(acc_usb_free(null_mut()), ACC_EINVAL);

            let mut usb = null_mut();
            assert_eq!(acc_usb_create(&mut usb), ACC_EOK);
            assert!(!usb.is_null());

            let first = usb;
            assert_eq!(acc_usb_create(&mut usb), ACC_EALREADY);
            assert_eq!(usb, first);

            assert_eq!(acc_usb_free(&mut usb), ACC_EOK);
            assert!(usb.is_null());
            assert_eq!(acc_usb_free(&mut usb), ACC_EOK);
        }
    }

    #[test]
    fn test_transfer_after_free() {
        unsafe {
            let mut usb = null_mut();
            assert_eq!(acc_usb_create(&mut usb), ACC_EOK);
            assert_eq!(acc_usb_free(&mut usb), ACC_EOK);

            let mut buf = [0u8; 4];
            assert_eq!(
                acc_usb_bulk_out(usb, ACC_BOUT_EP, buf.as_ptr(), buf.len()),
                ACC_EINVAL
            );
            assert_eq!(
                acc_usb_bulk_in(usb, ACC_BIN_EP, buf.as_mut_ptr(), buf.len()),
                ACC_EINVAL
            );
            assert_eq!(acc_usb_connect(usb, ACC_VID, ACC_PID), ACC_EINVAL);
            assert_eq!(
                acc_send_bmp(usb, buf.as_ptr(), buf.len()),
                ACC_EINVAL
            );
        }
    }

    #[test]
    fn test_unconnected_handle() {
        unsafe {
            let mut usb = null_mut();
            assert_eq!(acc_usb_create(&mut usb), ACC_EOK);

            let mut buf = [0u8; 4];
            assert_eq!(
                acc_usb_bulk_out(usb, ACC_BOUT_EP, buf.as_ptr(), buf.len()),
                ACC_EINVAL
            );
            assert_eq!(
                acc_usb_bulk_in(usb, ACC_BIN_EP, buf.as_mut_ptr(), buf.len()),
                ACC_EINVAL
            );
            assert_eq!((*usb).last_error(), ACC_EINVAL);

            assert_eq!(acc_usb_free(&mut usb), ACC_EOK);
        }
    }

    #[test]
    fn test_round_trip() {
        let (mut usb, device) = sim_handle(SimMode::Echo);
        unsafe {
            assert_eq!(acc_usb_connect(usb, 0x0001, 0x0002), ACC_ENOTPRESENT);
            assert_eq!(acc_usb_connect(usb, ACC_VID, ACC_PID), ACC_EOK);
            assert_eq!(acc_usb_connect(usb, ACC_VID, ACC_PID), ACC_EALREADY);

            let data: Vec<u8> = (0..100).collect();
            assert_eq!(
                acc_usb_bulk_out(usb, ACC_BOUT_EP, data.as_ptr(), data.len()),
                ACC_EOK
            );
            let mut echo = vec![0u8; data.len()];
            assert_eq!(
                acc_usb_bulk_in(usb, ACC_BIN_EP, echo.as_mut_ptr(), echo.len()),
                ACC_EOK
            );
            assert_eq!(echo, data);

            assert_eq!(
                acc_usb_bulk_out(usb, ACC_BOUT_EP, null(), 4),
                ACC_EINVAL
            );
            assert_eq!(
                acc_usb_bulk_out(usb, ACC_BIN_EP, data.as_ptr(), data.len()),
                ACC_EINVAL
            );
            assert_eq!(
                acc_usb_bulk_in(usb, ACC_BOUT_EP, echo.as_mut_ptr(), 4),
                ACC_EINVAL
            );
            assert_eq!(device.out_transfers().len(), 1);

            assert_eq!(acc_usb_free(&mut usb), ACC_EOK);
            assert!(usb.is_null());
        }
    }

    #[test]
    fn test_bitmap() {
        let (mut usb, device) = sim_handle(SimMode::Accelerator);
        let original: Vec<u8> = (0..400u32).map(|i| (i / 50) as u8).collect();
        let mut bitmap = original.clone();
        unsafe {
            assert_eq!(acc_usb_connect(usb, ACC_VID, ACC_PID), ACC_EOK);
            assert_eq!(acc_send_bmp(usb, null(), 10), ACC_EINVAL);
            assert_eq!(acc_send_bmp(usb, bitmap.as_ptr(), 0), ACC_EINVAL);
            assert_eq!(acc_usb_set_compression(usb, 7), ACC_EINVAL);

            assert_eq!(
                acc_send_bmp(usb, bitmap.as_ptr(), bitmap.len()),
                ACC_EOK
            );
            assert_eq!(
                acc_process_bmp(usb, bitmap.as_mut_ptr(), bitmap.len()),
                ACC_EOK
            );
            assert_eq!((*usb).last_error(), ACC_EOK);
            assert_eq!(acc_usb_free(&mut usb), ACC_EOK);
        }
        let inverted: Vec<u8> = original.iter().map(|b| !b).collect();
        assert_eq!(bitmap, inverted);
        assert_eq!(device.frames().len(), 2);
    }

    #[test]
    fn test_unsupported_compression_retry() {
        let device =
            SimDevice::new(ACC_VID, ACC_PID, SimMode::Accelerator)
                .without_compression();
        let connection =
            AccConnection::with_bus(SimBus::new().with_device(device));
        let mut usb = Box::into_raw(Box::new(AccUsb::new(connection)));
        let bitmap = [0u8; 256];
        unsafe {
            assert_eq!(acc_usb_connect(usb, ACC_VID, ACC_PID), ACC_EOK);
            assert_eq!(
                acc_send_bmp(usb, bitmap.as_ptr(), bitmap.len()),
                ACC_EACC_UNSUP_COMP
            );
            assert_eq!(acc_usb_set_compression(usb, 0), ACC_EOK);
            assert_eq!(
                acc_send_bmp(usb, bitmap.as_ptr(), bitmap.len()),
                ACC_EOK
            );
            assert_eq!(acc_usb_free(&mut usb), ACC_EOK);
        }
    }
}
