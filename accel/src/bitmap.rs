//! Bitmap command
//!
//! A bitmap travels as one frame: a [FrameHeader] followed by the (possibly
//! compressed) body. The frame is written to [Endpoint::BULK_OUT] in
//! transfers of at most [AccConnection::transfer_size] bytes and closed by a
//! zero length transfer. The device then answers with a single status byte
//! on [Endpoint::BULK_IN]. If [FLAG_REPLY] was set and the status is ok, a
//! reply frame follows: one header transfer, then the body in transfers of
//! at most the transfer size.

use std::borrow::Cow;

use log::{debug, trace, warn};

use crate::{AccConnection, AccError, Endpoint};

pub const FRAME_HEADER_LEN: usize = 6;
/// Ask the device to send back the processed image
pub const FLAG_REPLY: u8 = 0x01;
/// Largest frame body accepted in either direction
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const SCHEME_NONE: u8 = 0;
const SCHEME_RLE: u8 = 1;

/// Payload compression scheme
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Compression {
    None,
    #[default]
    Rle,
}

impl Compression {
    /// Identifier carried in the frame header
    pub fn scheme_id(self) -> u8 {
        match self {
            Compression::None => SCHEME_NONE,
            Compression::Rle => SCHEME_RLE,
        }
    }

    pub fn from_scheme_id(id: u8) -> Option<Self> {
        match id {
            SCHEME_NONE => Some(Compression::None),
            SCHEME_RLE => Some(Compression::Rle),
            _ => None,
        }
    }

    pub fn compress(self, raw: &[u8]) -> Cow<'_, [u8]> {
        match self {
            Compression::None => Cow::Borrowed(raw),
            Compression::Rle => Cow::Owned(rle::encode(raw)),
        }
    }

    pub fn decompress(
        self,
        data: &[u8],
    ) -> Result<Cow<'_, [u8]>, rle::RleError> {
        match self {
            Compression::None => Ok(Cow::Borrowed(data)),
            Compression::Rle => rle::decode(data).map(Cow::Owned),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub compression: Compression,
    pub flags: u8,
    /// Body length in bytes, little endian on the wire
    pub length: u32,
}

impl FrameHeader {
    pub fn to_bytes(&self) -> [u8; FRAME_HEADER_LEN] {
        let mut raw = [0u8; FRAME_HEADER_LEN];
        raw[0] = self.compression.scheme_id();
        raw[1] = self.flags;
        raw[2..].copy_from_slice(&self.length.to_le_bytes());
        raw
    }

    /// Parse the header at the start of `raw`. Unknown schemes yield `None`.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        let raw = raw.get(..FRAME_HEADER_LEN)?;
        Some(FrameHeader {
            compression: Compression::from_scheme_id(raw[0])?,
            flags: raw[1],
            length: u32::from_le_bytes(raw[2..].try_into().ok()?),
        })
    }

    pub fn reply_requested(&self) -> bool {
        self.flags & FLAG_REPLY != 0
    }
}

/// Build the frame for `bitmap`
///
/// The body is only compressed if that makes it smaller; otherwise the frame
/// says [Compression::None].
pub fn encode_frame(
    bitmap: &[u8],
    compression: Compression,
    flags: u8,
) -> Result<Vec<u8>, AccError> {
    if bitmap.is_empty() {
        return Err(AccError::InvalidParameter("empty bitmap"));
    }

    let compressed = compression.compress(bitmap);
    let (compression, body) = if compressed.len() < bitmap.len() {
        (compression, compressed)
    } else {
        (Compression::None, Cow::Borrowed(bitmap))
    };
    if body.len() > MAX_FRAME_LEN {
        return Err(AccError::InvalidParameter("bitmap too large"));
    }

    let header = FrameHeader {
        compression,
        flags,
        length: body.len() as u32,
    };
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
    frame.extend_from_slice(&header.to_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

impl AccConnection {
    /// Send a bitmap and wait for the device to accept it
    ///
    /// Fails with the first transfer error, or with the error the device's
    /// status byte maps to. Nothing is retried.
    pub fn send_bitmap(&mut self, bitmap: &[u8]) -> Result<(), AccError> {
        self.transmit_frame(bitmap, 0)
    }

    /// Send a bitmap and replace it with the image the device returns
    ///
    /// Returns the number of bytes written to `bitmap`, which is the shorter
    /// of the two images.
    pub fn process_bitmap(
        &mut self,
        bitmap: &mut [u8],
    ) -> Result<usize, AccError> {
        self.transmit_frame(bitmap, FLAG_REPLY)?;
        let processed = self.receive_reply()?;
        let len = processed.len().min(bitmap.len());
        bitmap[..len].copy_from_slice(&processed[..len]);
        Ok(len)
    }

    fn transmit_frame(
        &mut self,
        bitmap: &[u8],
        flags: u8,
    ) -> Result<(), AccError> {
        let transfer_size = self.transfer_size()?;
        let frame = encode_frame(bitmap, self.compression(), flags)?;
        debug!(
            "Sending bitmap of {} bytes as {} byte frame ({} transfers)",
            bitmap.len(),
            frame.len(),
            frame.len().div_ceil(transfer_size)
        );

        for chunk in frame.chunks(transfer_size) {
            self.bulk_out(Endpoint::BULK_OUT, chunk)?;
        }
        // end of frame
        self.bulk_out(Endpoint::BULK_OUT, &[])?;

        let mut status = [0u8; 1];
        self.bulk_in(Endpoint::BULK_IN, &mut status)?;
        trace!("Device status {}", status[0]);
        AccError::from_device_status(status[0])
            .inspect_err(|err| warn!("Bitmap rejected: {}", err))
    }

    fn receive_reply(&mut self) -> Result<Vec<u8>, AccError> {
        let transfer_size = self.transfer_size()?;

        let mut raw = [0u8; FRAME_HEADER_LEN];
        self.bulk_in(Endpoint::BULK_IN, &mut raw)?;
        let header =
            FrameHeader::parse(&raw).ok_or(AccError::MalformedReply)?;
        let length = header.length as usize;
        if length > MAX_FRAME_LEN {
            return Err(AccError::MalformedReply);
        }

        let mut body = vec![0u8; length];
        for chunk in body.chunks_mut(transfer_size) {
            self.bulk_in(Endpoint::BULK_IN, chunk)?;
        }
        debug!(
            "Received {} byte reply ({:?})",
            body.len(),
            header.compression
        );

        match header.compression.decompress(&body) {
            Ok(image) => Ok(image.into_owned()),
            Err(err) => {
                warn!("Reply does not decode: {}", err);
                Err(AccError::MalformedReply)
            }
        }
    }
}
