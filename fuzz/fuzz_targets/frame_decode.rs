//! Fuzz target for Frame::decode
//!
//! Arbitrary bytes through the frame decoder, looking for:
//! - Parser panics
//! - Integer overflows in size calculations
//! - Buffer over-reads
//!
//! The decoder must NEVER panic. Accepted frames must re-encode to the bytes
//! they were decoded from.

#![no_main]

use libfuzzer_sys::fuzz_target;
use parley_proto::{Frame, FrameHeader};

fuzz_target!(|data: &[u8]| {
    let Ok(frame) = Frame::decode(data) else {
        return;
    };

    let consumed = FrameHeader::SIZE + frame.payload.len();
    let encoded = frame.to_vec().expect("decoded frame re-encodes");
    assert_eq!(encoded.as_slice(), &data[..consumed]);
});
