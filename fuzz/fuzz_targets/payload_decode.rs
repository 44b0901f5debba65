//! Fuzz target for Payload::from_frame
//!
//! Arbitrary payload bytes under every event kind, so CBOR decoding sees:
//! - Malformed CBOR
//! - Type confusion (a valid body for a different event)
//! - Oversized strings and collections
//!
//! Decoding must NEVER panic. A body that decodes must survive a round trip
//! through its own frame.

#![no_main]

use libfuzzer_sys::fuzz_target;
use parley_proto::{EventKind, Frame, FrameHeader, Payload};

fuzz_target!(|data: &[u8]| {
    for kind in EventKind::ALL {
        let mut header = FrameHeader::new(kind);
        if kind.is_room_scoped() {
            header.set_room_id(1);
        }
        let frame = Frame::new(header, data.to_vec());

        let Ok(payload) = Payload::from_frame(&frame) else {
            continue;
        };
        assert_eq!(payload.kind(), kind);

        let again = payload.clone().into_frame(frame.room_id()).expect("decoded payload re-encodes");
        assert_eq!(Payload::from_frame(&again).ok(), Some(payload));
    }
});
