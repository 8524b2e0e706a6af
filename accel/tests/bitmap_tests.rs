use accel::{
    ACC_PRODUCT_ID, ACC_VENDOR_ID, AccConnection, Compression, ErrorKind,
    FLAG_REPLY, FRAME_HEADER_LEN, FrameHeader, encode_frame,
    sim::{SimBus, SimDevice, SimMode},
};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn accelerator() -> SimDevice {
    SimDevice::new(ACC_VENDOR_ID, ACC_PRODUCT_ID, SimMode::Accelerator)
}

fn connected(device: &SimDevice) -> AccConnection {
    let mut connection =
        AccConnection::with_bus(SimBus::new().with_device(device.clone()));
    connection.connect_accelerator().unwrap();
    connection
}

/// Incompressible image of `len` bytes
fn noise(len: usize) -> Vec<u8> {
    let mut x: u32 = 0x1234_5678;
    (0..len)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            x as u8
        })
        .collect()
}

/// Monochrome image with long blank runs
fn drawing(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| if i % 97 < 90 { 0xff } else { i as u8 })
        .collect()
}

#[test]
fn test_send_is_chunked() {
    init();
    let device = accelerator().with_transfer_size(16);
    let mut connection = connected(&device);
    connection.set_compression(Compression::None);

    let bitmap = noise(100);
    connection.send_bitmap(&bitmap).unwrap();

    let expected = encode_frame(&bitmap, Compression::None, 0).unwrap();
    assert_eq!(expected.len(), FRAME_HEADER_LEN + 100);

    let out = device.out_transfers();
    // 106 bytes in 16 byte transfers, then the terminator
    assert_eq!(out.len(), 7 + 1);
    assert!(out.iter().all(|t| t.endpoint == 0x01));
    assert!(
        out[..7]
            .iter()
            .all(|t| !t.data.is_empty() && t.data.len() <= 16)
    );
    assert!(out[7].data.is_empty());

    let sent: Vec<u8> =
        out.iter().flat_map(|t| t.data.iter().copied()).collect();
    assert_eq!(sent, expected);
    assert_eq!(device.frames(), vec![expected]);

    // the status byte was consumed and nothing else is waiting
    assert_eq!(device.in_transfers().len(), 1);
    assert_eq!(device.pending_in(), 0);
}

#[test]
fn test_send_compressed() {
    init();
    let device = accelerator();
    let mut connection = connected(&device);
    assert_eq!(connection.compression(), Compression::Rle);

    let bitmap = drawing(2000);
    connection.send_bitmap(&bitmap).unwrap();

    let frames = device.frames();
    let frame = &frames[0];
    let header = FrameHeader::parse(frame).unwrap();
    assert_eq!(header.compression, Compression::Rle);
    assert!(!header.reply_requested());
    assert!(frame.len() < bitmap.len());
    assert_eq!(rle::decode(&frame[FRAME_HEADER_LEN..]).unwrap(), bitmap);
}

#[test]
fn test_parse_failure_is_not_retried() {
    init();
    let device = accelerator().with_forced_status(2);
    let mut connection = connected(&device);

    let err = connection.send_bitmap(&drawing(300)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
    assert_eq!(err.code(), -102);
    assert_eq!(device.frames().len(), 1);
    let terminators = device
        .out_transfers()
        .iter()
        .filter(|t| t.data.is_empty())
        .count();
    assert_eq!(terminators, 1);
}

#[test]
fn test_unsupported_compression_then_retry_raw() {
    init();
    let device = accelerator().without_compression();
    let mut connection = connected(&device);

    let bitmap = drawing(500);
    let err = connection.send_bitmap(&bitmap).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedCompression);

    connection.set_compression(Compression::None);
    connection.send_bitmap(&bitmap).unwrap();

    let frames = device.frames();
    assert_eq!(frames.len(), 2);
    let header = FrameHeader::parse(&frames[1]).unwrap();
    assert_eq!(header.compression, Compression::None);
    assert_eq!(&frames[1][FRAME_HEADER_LEN..], &bitmap[..]);
}

#[test]
fn test_unknown_device_status() {
    init();
    let device = accelerator().with_forced_status(0x42);
    let mut connection = connected(&device);

    let err = connection.send_bitmap(&[1, 2, 3]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AcceleratorUnknown);
    assert_eq!(err.code(), -100);
}

#[test]
fn test_transfer_failure_aborts() {
    init();
    let device = accelerator().with_transfer_size(8);
    let mut connection = connected(&device);
    connection.set_compression(Compression::None);
    device.fail_out_transfer(2);

    let err = connection.send_bitmap(&noise(64)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usb);
    // the failing transfer was the last one attempted
    assert_eq!(device.out_transfers().len(), 3);
    assert!(device.in_transfers().is_empty());
    assert!(device.frames().is_empty());
}

#[test]
fn test_missing_status_is_usb_error() {
    init();
    let device = SimDevice::new(ACC_VENDOR_ID, ACC_PRODUCT_ID, SimMode::Echo);
    let mut connection = connected(&device);

    // the echo firmware returns the frame instead of a status byte
    let err = connection.send_bitmap(&noise(10)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usb);
}

#[test]
fn test_empty_bitmap() {
    init();
    let device = accelerator();
    let mut connection = connected(&device);
    let err = connection.send_bitmap(&[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    assert_eq!(device.transfer_count(), 0);
}

#[test]
fn test_process_bitmap() {
    init();
    let device = accelerator().with_transfer_size(32);
    let mut connection = connected(&device);

    let original = drawing(1000);
    let mut bitmap = original.clone();
    let written = connection.process_bitmap(&mut bitmap).unwrap();

    assert_eq!(written, original.len());
    let inverted: Vec<u8> = original.iter().map(|b| !b).collect();
    assert_eq!(bitmap, inverted);

    let header = FrameHeader::parse(&device.frames()[0]).unwrap();
    assert_eq!(header.flags, FLAG_REPLY);
    assert_eq!(device.pending_in(), 0);
}

#[test]
fn test_process_bitmap_raw() {
    init();
    let device = accelerator();
    let mut connection = connected(&device);
    connection.set_compression(Compression::None);

    let mut bitmap = noise(300);
    let inverted: Vec<u8> = bitmap.iter().map(|b| !b).collect();
    connection.process_bitmap(&mut bitmap).unwrap();
    assert_eq!(bitmap, inverted);
}

#[test]
fn test_process_bitmap_rejected_leaves_buffer() {
    init();
    let device = accelerator().with_forced_status(2);
    let mut connection = connected(&device);

    let original = drawing(200);
    let mut bitmap = original.clone();
    let err = connection.process_bitmap(&mut bitmap).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
    assert_eq!(bitmap, original);
}

#[test]
fn test_malformed_reply() {
    init();
    let device = SimDevice::new(ACC_VENDOR_ID, ACC_PRODUCT_ID, SimMode::Echo);
    let mut connection = connected(&device);

    // status ok, then a reply header with an unknown scheme
    device.queue_in(&[0]);
    device.queue_in(&[9, 0, 4, 0, 0, 0]);
    let mut bitmap = noise(4);
    let err = connection.process_bitmap(&mut bitmap).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AcceleratorUnknown);
}

#[test]
fn test_truncated_reply_body() {
    init();
    let device = SimDevice::new(ACC_VENDOR_ID, ACC_PRODUCT_ID, SimMode::Echo);
    let mut connection = connected(&device);

    // an RLE literal announcing five bytes but carrying one
    device.queue_in(&[0]);
    device.queue_in(&[1, 0, 2, 0, 0, 0]);
    device.queue_in(&[4 << 2, 1]);
    let original = noise(4);
    let mut bitmap = original.clone();
    let err = connection.process_bitmap(&mut bitmap).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AcceleratorUnknown);
    assert_eq!(bitmap, original);
}
