//! Fuzz target for frame header boundary conditions
//!
//! # Strategy
//!
//! - Magic bytes: valid, off-by-one, all-zeros, all-ones, random
//! - Payload size: zero, small, at-max, just-over-max, `u32::MAX`, random,
//!   with the buffer sometimes shorter than the claim
//! - Version: valid, zero, max, random
//! - Room id: 0 (global), 1, `u64::MAX`, random
//!
//! # Invariants
//!
//! - `payload_size > MAX_PAYLOAD_SIZE` MUST return `PayloadTooLarge`
//! - Invalid magic MUST return `InvalidMagic`
//! - A buffer shorter than header + claimed payload MUST return
//!   `FrameTruncated`
//! - Unknown event codes decode at the framing layer (rejected later)
//! - Encoded size MUST equal `FrameHeader::SIZE + payload_size`

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parley_proto::{EventKind, Frame, FrameHeader, ProtocolError};

const MAX: u32 = FrameHeader::MAX_PAYLOAD_SIZE;

#[derive(Debug, Clone, Arbitrary)]
struct BoundaryFrame {
    magic: MagicBytes,
    version: VersionByte,
    flags: u8,
    event: u16,
    payload_size: PayloadSize,
    truncate_by: u8,
    room_id: RoomId,
}

#[derive(Debug, Clone, Arbitrary)]
enum MagicBytes {
    Valid,
    OffByOne(u8),
    AllZeros,
    AllOnes,
    Random([u8; 4]),
}

#[derive(Debug, Clone, Arbitrary)]
enum VersionByte {
    Valid,
    Zero,
    Max,
    Random(u8),
}

#[derive(Debug, Clone, Arbitrary)]
enum PayloadSize {
    Zero,
    Small(u8),
    AtMax,
    JustOverMax,
    MaxU32,
    Random(u32),
}

#[derive(Debug, Clone, Arbitrary)]
enum RoomId {
    Global,
    One,
    Max,
    Random(u64),
}

fuzz_target!(|boundary: BoundaryFrame| {
    let claimed = match boundary.payload_size {
        PayloadSize::Zero => 0,
        PayloadSize::Small(s) => u32::from(s),
        PayloadSize::AtMax => MAX,
        PayloadSize::JustOverMax => MAX + 1,
        PayloadSize::MaxU32 => u32::MAX,
        PayloadSize::Random(r) => r,
    };
    let room_id = match boundary.room_id {
        RoomId::Global => 0,
        RoomId::One => 1,
        RoomId::Max => u64::MAX,
        RoomId::Random(r) => r,
    };

    // Never allocate more than the protocol allows.
    let present = (claimed.min(MAX) as usize).saturating_sub(usize::from(boundary.truncate_by));
    let mut buffer = vec![0u8; FrameHeader::SIZE + present];

    let magic = FrameHeader::MAGIC.to_be_bytes();
    let magic_valid = match boundary.magic {
        MagicBytes::Valid => {
            buffer[0..4].copy_from_slice(&magic);
            true
        },
        MagicBytes::OffByOne(offset) => {
            buffer[0..4].copy_from_slice(&magic);
            let idx = usize::from(offset % 4);
            buffer[idx] = buffer[idx].wrapping_add(1);
            false
        },
        MagicBytes::AllZeros => false,
        MagicBytes::AllOnes => {
            buffer[0..4].fill(0xFF);
            false
        },
        MagicBytes::Random(bytes) => {
            buffer[0..4].copy_from_slice(&bytes);
            bytes == magic
        },
    };

    buffer[4] = match boundary.version {
        VersionByte::Valid => FrameHeader::VERSION,
        VersionByte::Zero => 0,
        VersionByte::Max => u8::MAX,
        VersionByte::Random(v) => v,
    };
    buffer[5] = boundary.flags;
    buffer[6..8].copy_from_slice(&boundary.event.to_be_bytes());
    buffer[8..12].copy_from_slice(&claimed.to_be_bytes());
    buffer[12..20].copy_from_slice(&room_id.to_be_bytes());

    match Frame::decode(&buffer) {
        Ok(frame) => {
            assert!(magic_valid);
            assert_eq!(buffer[4], FrameHeader::VERSION);
            assert!(claimed <= MAX);
            assert_eq!(frame.payload.len(), claimed as usize);
            assert_eq!(frame.header.event_code(), boundary.event);
            assert_eq!(frame.room_id(), (room_id != 0).then_some(room_id));
        },
        Err(ProtocolError::InvalidMagic(_)) => assert!(!magic_valid),
        Err(ProtocolError::UnsupportedVersion(v)) => assert_ne!(v, FrameHeader::VERSION),
        Err(ProtocolError::PayloadTooLarge { size, .. }) => assert!(size > MAX as usize),
        Err(ProtocolError::FrameTruncated { expected, actual }) => {
            assert!(actual < expected);
            assert_eq!(expected, claimed as usize);
        },
        Err(e) => panic!("unexpected decode error: {e}"),
    }

    // Frames built through the API always encode to header + payload.
    if let Some(kind) = EventKind::from_u16(boundary.event) {
        let mut header = FrameHeader::new(kind);
        header.set_room_id(room_id);
        let frame = Frame::new(header, vec![0xAA; present.min(1024)]);

        let encoded = frame.to_vec().expect("small payload encodes");
        assert_eq!(encoded.len(), FrameHeader::SIZE + frame.payload.len());

        let decoded = Frame::decode(&encoded).expect("encoded frame decodes");
        assert_eq!(decoded, frame);
    }
});
