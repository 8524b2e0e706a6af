//! Simulated bus and accelerator
//!
//! [SimBus] stands in for the system USB stack. Each [SimDevice] either
//! echoes every bulk-out transfer back on the in endpoint, like the plain
//! firmware does, or behaves like the accelerator: it collects a frame until
//! the zero length transfer, answers with a status byte and, when asked for,
//! a reply frame holding the inverted image.
//!
//! Devices share their state with every link opened on them, so a test can
//! keep a [SimDevice] around to inspect transfers and inject faults.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

use log::trace;
use nusb::transfer::TransferError;

use crate::{
    AccError, Compression, FLAG_REPLY, FRAME_HEADER_LEN, FrameHeader,
    MAX_PACKET_SIZE, UsbBus, UsbLink,
};

const STATUS_OK: u8 = 0;
const STATUS_UNSUPPORTED_COMPRESSION: u8 = 1;
const STATUS_PARSE: u8 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimMode {
    /// Every non-empty bulk-out transfer is queued on the in endpoint
    Echo,
    /// Frames are answered with a status byte and an optional reply
    Accelerator,
}

/// One recorded transfer call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimTransfer {
    pub endpoint: u8,
    pub data: Vec<u8>,
}

struct SimState {
    mode: SimMode,
    transfer_size: usize,
    supports_compression: bool,
    forced_status: Option<u8>,
    fail_out_at: Option<usize>,
    claim_fails: bool,
    disconnected: bool,
    opened: usize,
    out_transfers: Vec<SimTransfer>,
    in_transfers: Vec<SimTransfer>,
    in_queue: VecDeque<Vec<u8>>,
    frame: Vec<u8>,
    frames: Vec<Vec<u8>>,
}

#[derive(Clone)]
pub struct SimDevice {
    vendor_id: u16,
    product_id: u16,
    state: Arc<Mutex<SimState>>,
}

impl SimDevice {
    pub fn new(vendor_id: u16, product_id: u16, mode: SimMode) -> Self {
        SimDevice {
            vendor_id,
            product_id,
            state: Arc::new(Mutex::new(SimState {
                mode,
                transfer_size: MAX_PACKET_SIZE,
                supports_compression: true,
                forced_status: None,
                fail_out_at: None,
                claim_fails: false,
                disconnected: false,
                opened: 0,
                out_transfers: Vec::new(),
                in_transfers: Vec::new(),
                in_queue: VecDeque::new(),
                frame: Vec::new(),
                frames: Vec::new(),
            })),
        }
    }

    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    pub fn product_id(&self) -> u16 {
        self.product_id
    }

    /// Bulk-out transfer unit reported by links to this device
    pub fn with_transfer_size(self, transfer_size: usize) -> Self {
        self.state().transfer_size = transfer_size;
        self
    }

    /// Reject RLE frames with the unsupported compression status
    pub fn without_compression(self) -> Self {
        self.state().supports_compression = false;
        self
    }

    /// Answer every frame with `status` instead of evaluating it
    pub fn with_forced_status(self, status: u8) -> Self {
        self.state().forced_status = Some(status);
        self
    }

    /// Stall the bulk-out transfer with the given zero based index
    pub fn fail_out_transfer(&self, index: usize) {
        self.state().fail_out_at = Some(index);
    }

    pub fn fail_claim(&self) {
        self.state().claim_fails = true;
    }

    /// Every later transfer fails as if the device was unplugged
    pub fn disconnect(&self) {
        self.state().disconnected = true;
    }

    /// Queue data for the in endpoint
    pub fn queue_in(&self, data: &[u8]) {
        self.state().in_queue.push_back(data.to_vec());
    }

    /// Transfers still waiting to be read by the host
    pub fn pending_in(&self) -> usize {
        self.state().in_queue.len()
    }

    pub fn out_transfers(&self) -> Vec<SimTransfer> {
        self.state().out_transfers.clone()
    }

    pub fn in_transfers(&self) -> Vec<SimTransfer> {
        self.state().in_transfers.clone()
    }

    /// Bulk-in plus bulk-out calls that reached the device
    pub fn transfer_count(&self) -> usize {
        let state = self.state();
        state.out_transfers.len() + state.in_transfers.len()
    }

    /// Complete frames received in accelerator mode
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.state().frames.clone()
    }

    /// Number of successful interface claims
    pub fn opened(&self) -> usize {
        self.state().opened
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        // a test that panicked while holding the lock has already failed
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }
}

#[derive(Clone, Default)]
pub struct SimBus {
    devices: Vec<SimDevice>,
}

impl SimBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, device: SimDevice) -> Self {
        self.devices.push(device);
        self
    }
}

impl UsbBus for SimBus {
    fn open(
        &self,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<Box<dyn UsbLink>, AccError> {
        let device = self
            .devices
            .iter()
            .find(|dev| {
                dev.vendor_id == vendor_id && dev.product_id == product_id
            })
            .ok_or(AccError::NotPresent {
                vendor_id,
                product_id,
            })?;

        let mut state = device.state();
        if state.claim_fails || state.disconnected {
            return Err(AccError::Transfer(TransferError::Disconnected));
        }
        state.opened += 1;
        Ok(Box::new(SimLink {
            device: device.clone(),
        }))
    }
}

struct SimLink {
    device: SimDevice,
}

impl UsbLink for SimLink {
    fn bulk_out(&mut self, endpoint: u8, data: &[u8]) -> Result<(), AccError> {
        let mut state = self.device.state();
        if state.disconnected {
            return Err(AccError::Transfer(TransferError::Disconnected));
        }
        let index = state.out_transfers.len();
        state.out_transfers.push(SimTransfer {
            endpoint,
            data: data.to_vec(),
        });
        if state.fail_out_at == Some(index) {
            return Err(AccError::Transfer(TransferError::Stall));
        }
        trace!("sim out 0x{:02x}: {:02x?}", endpoint, data);

        match state.mode {
            SimMode::Echo => {
                if !data.is_empty() {
                    state.in_queue.push_back(data.to_vec());
                }
            }
            SimMode::Accelerator => {
                if data.is_empty() {
                    let frame = std::mem::take(&mut state.frame);
                    state.answer_frame(&frame);
                    state.frames.push(frame);
                } else {
                    state.frame.extend_from_slice(data);
                }
            }
        }
        Ok(())
    }

    fn bulk_in(
        &mut self,
        endpoint: u8,
        data: &mut [u8],
    ) -> Result<(), AccError> {
        let mut state = self.device.state();
        if state.disconnected {
            return Err(AccError::Transfer(TransferError::Disconnected));
        }
        // an empty queue is what a timed out read looks like
        let Some(next) = state.in_queue.pop_front() else {
            return Err(AccError::Transfer(TransferError::Cancelled));
        };
        state.in_transfers.push(SimTransfer {
            endpoint,
            data: next.clone(),
        });
        if next.len() != data.len() {
            return Err(AccError::LengthMismatch {
                expected: data.len(),
                actual: next.len(),
            });
        }
        data.copy_from_slice(&next);
        Ok(())
    }

    fn transfer_size(&self) -> usize {
        self.device.state().transfer_size
    }
}

impl SimState {
    fn answer_frame(&mut self, frame: &[u8]) {
        let decoded = self.decode_frame(frame);
        let status = match (self.forced_status, &decoded) {
            (Some(status), _) => status,
            (None, Ok(_)) => STATUS_OK,
            (None, Err(status)) => *status,
        };
        self.in_queue.push_back(vec![status]);

        let Ok((header, image)) = decoded else {
            return;
        };
        if status != STATUS_OK || !header.reply_requested() {
            return;
        }

        let inverted: Vec<u8> = image.iter().map(|b| !b).collect();
        let body = header.compression.compress(&inverted).into_owned();
        let reply = FrameHeader {
            compression: header.compression,
            flags: 0,
            length: body.len() as u32,
        };
        self.in_queue.push_back(reply.to_bytes().to_vec());
        for chunk in body.chunks(self.transfer_size.max(1)) {
            self.in_queue.push_back(chunk.to_vec());
        }
    }

    /// Header and decoded image, or the status byte rejecting the frame
    fn decode_frame(
        &self,
        frame: &[u8],
    ) -> Result<(FrameHeader, Vec<u8>), u8> {
        if frame.len() < FRAME_HEADER_LEN {
            return Err(STATUS_PARSE);
        }
        let header = match FrameHeader::parse(frame) {
            Some(header) => header,
            None => return Err(STATUS_UNSUPPORTED_COMPRESSION),
        };
        if header.compression != Compression::None
            && !self.supports_compression
        {
            return Err(STATUS_UNSUPPORTED_COMPRESSION);
        }
        if header.flags & !FLAG_REPLY != 0 {
            return Err(STATUS_PARSE);
        }

        let body = &frame[FRAME_HEADER_LEN..];
        if body.len() != header.length as usize {
            return Err(STATUS_PARSE);
        }
        let image = header
            .compression
            .decompress(body)
            .map_err(|_| STATUS_PARSE)?;
        Ok((header, image.into_owned()))
    }
}
