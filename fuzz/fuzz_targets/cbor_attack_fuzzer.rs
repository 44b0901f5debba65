//! Fuzz target for hostile CBOR event bodies
//!
//! # Strategy
//!
//! - Deep nesting: arrays and maps nested up to 64 levels
//! - Huge lengths: strings, byte strings and arrays claiming up to 4 GiB
//! - Huge fields: a well-formed message map whose `content` claims a huge
//!   length
//! - Random bytes under a chosen event kind
//! - Duplicate keys: `room_id` repeated inside a `SendMessage` map
//!
//! # Invariants
//!
//! - Decoding NEVER panics and never allocates the claimed length
//! - Bodies claiming more bytes than present are rejected
//! - Duplicate struct fields are rejected

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parley_proto::{EventKind, Frame, FrameHeader, Payload};

#[derive(Debug, Clone, Arbitrary)]
enum CborAttack {
    Nested { depth: u8, shape: Shape },
    HugeLength { exponent: u8 },
    HugeField { exponent: u8, room_id: u64 },
    RandomBytes { kind: u8, bytes: Vec<u8> },
    DuplicateKeys { count: u8, room_id: u8 },
}

#[derive(Debug, Clone, Arbitrary)]
enum Shape {
    Array,
    Map,
    Text,
}

/// Kinds whose bodies carry strings or collections.
const TARGETS: [EventKind; 6] = [
    EventKind::Hello,
    EventKind::SendMessage,
    EventKind::ReceiveMessage,
    EventKind::MessageEdited,
    EventKind::MessageRead,
    EventKind::OnlineUsers,
];

fuzz_target!(|attack: CborAttack| {
    match attack {
        CborAttack::Nested { depth, shape } => {
            let body = nested(usize::from(depth % 64), &shape);
            for kind in TARGETS {
                let _ = decode(kind, body.clone());
            }
        },

        CborAttack::HugeLength { exponent } => {
            let claimed = claimed_length(exponent);
            for body in [huge_header(0x5A, claimed), huge_header(0x7A, claimed), huge_header(0x9A, claimed)] {
                for kind in TARGETS {
                    assert!(decode(kind, body.clone()).is_err(), "{kind:?} accepted a truncated body");
                }
            }
        },

        CborAttack::HugeField { exponent, room_id } => {
            let claimed = claimed_length(exponent);

            // {"room_id": room_id, "content": <text claiming `claimed` bytes>}
            let mut body = vec![0xA2];
            text(&mut body, "room_id");
            body.push(0x1B);
            body.extend_from_slice(&room_id.to_be_bytes());
            text(&mut body, "content");
            body.extend(huge_header(0x7A, claimed));

            assert!(decode(EventKind::SendMessage, body).is_err());
        },

        CborAttack::RandomBytes { kind, bytes } => {
            let kind = EventKind::ALL[usize::from(kind) % EventKind::ALL.len()];
            if let Ok(payload) = decode(kind, bytes) {
                assert_eq!(payload.kind(), kind);
            }
        },

        CborAttack::DuplicateKeys { count, room_id } => {
            let count = (count % 8).max(2);

            // {"content": "hi", "room_id": n, "room_id": n, ...}
            let mut body = vec![0xA0 | (count + 1)];
            text(&mut body, "content");
            text(&mut body, "hi");
            for _ in 0..count {
                text(&mut body, "room_id");
                body.push(0x18);
                body.push(room_id);
            }

            assert!(decode(EventKind::SendMessage, body).is_err());
        },
    }
});

fn decode(kind: EventKind, body: Vec<u8>) -> Result<Payload, parley_proto::ProtocolError> {
    let mut header = FrameHeader::new(kind);
    if kind.is_room_scoped() {
        header.set_room_id(1);
    }
    Payload::from_frame(&Frame::new(header, body))
}

fn claimed_length(exponent: u8) -> u32 {
    match exponent % 33 {
        32 => u32::MAX,
        e => (1u32 << e).max(16),
    }
}

/// Major-type header with a 4-byte length, followed by a short prefix of the
/// claimed content.
fn huge_header(initial: u8, claimed: u32) -> Vec<u8> {
    let mut bytes = vec![initial];
    bytes.extend_from_slice(&claimed.to_be_bytes());
    bytes.extend(std::iter::repeat_n(0x01, 8));
    bytes
}

fn text(out: &mut Vec<u8>, s: &str) {
    debug_assert!(s.len() < 24);
    out.push(0x60 | s.len() as u8);
    out.extend_from_slice(s.as_bytes());
}

fn nested(depth: usize, shape: &Shape) -> Vec<u8> {
    let mut bytes = Vec::new();
    for _ in 0..depth {
        match shape {
            Shape::Array => bytes.push(0x81),
            Shape::Map | Shape::Text => {
                bytes.push(0xA1);
                text(&mut bytes, "id");
            },
        }
    }
    match shape {
        Shape::Text => text(&mut bytes, "x"),
        Shape::Array | Shape::Map => bytes.push(0x01),
    }
    bytes
}
