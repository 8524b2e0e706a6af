//! USB session and bulk transfer layer for the video accelerator, based on
//! [`nusb`]
//!
//! A [AccConnection] owns one claimed interface of one device. Raw
//! transfers go through [AccConnection::bulk_out] and
//! [AccConnection::bulk_in]; the bitmap command
//! ([AccConnection::send_bitmap]) frames, compresses and chunks an image and
//! waits for the device's status byte.
//!
//! Every failure is an [AccError], which collapses into one of the seven
//! [ErrorKind]s shared with the C interface.
//!
//! # Example
//!
//! ```no_run
//! use accel::{AccConnection, Endpoint};
//!
//! let mut connection = AccConnection::new();
//! connection.connect_accelerator()?;
//! connection.bulk_out(Endpoint::BULK_OUT, &[0x01, 0x02, 0x03])?;
//!
//! let mut echo = [0u8; 3];
//! connection.bulk_in(Endpoint::BULK_IN, &mut echo)?;
//! # Ok::<(), accel::AccError>(())
//! ```
//!
//! [`nusb`]: https://docs.rs/nusb

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000u64);

/// Vendor id of the accelerator
pub const ACC_VENDOR_ID: u16 = 0xC0DE;
/// Product id of the accelerator
pub const ACC_PRODUCT_ID: u16 = 0xCAFE;
/// Bulk endpoint size of the accelerator firmware, also the default
/// bulk-out transfer unit
pub const MAX_PACKET_SIZE: usize = 64;

mod bitmap;
mod connection;
mod device;
mod endpoint;
mod error;
pub mod sim;
mod transport;

use std::time::Duration;

// Re-exports
pub use bitmap::{
    Compression, FLAG_REPLY, FRAME_HEADER_LEN, FrameHeader, MAX_FRAME_LEN,
    encode_frame,
};
pub use connection::{AccConnection, ConnectionState};
pub use device::{AcceleratorInfo, NusbBus, find_accelerators};
pub use endpoint::{Direction, Endpoint};
pub use error::{AccError, ErrorKind};
pub use transport::{UsbBus, UsbLink};
