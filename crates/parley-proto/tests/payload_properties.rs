//! Property-based tests for payload decoding.
//!
//! Frames come from an untrusted server, so decoding must be total: any byte
//! string under any event kind yields a value or an error, never a panic.

use parley_proto::{
    EventKind, Frame, FrameHeader, Payload,
    payloads::{message, typing},
};
use proptest::prelude::*;

fn any_kind() -> impl Strategy<Value = EventKind> {
    prop::sample::select(EventKind::ALL.to_vec())
}

fn any_receive() -> impl Strategy<Value = Payload> {
    (any::<u64>(), any::<u64>(), any::<u64>(), ".{0,16}", ".{0,64}", any::<u64>()).prop_map(
        |(id, room_id, author_id, author_name, content, created_at)| {
            Payload::ReceiveMessage(message::ReceiveMessage {
                id,
                room_id,
                author_id,
                author_name,
                content,
                created_at,
            })
        },
    )
}

fn any_read() -> impl Strategy<Value = Payload> {
    (any::<u64>(), proptest::option::of(any::<u64>()), prop::collection::vec(any::<u64>(), 0..8))
        .prop_map(|(message_id, room_id, readers)| {
            Payload::MessageRead(message::MessageRead { message_id, room_id, readers })
        })
}

fn any_typing() -> impl Strategy<Value = Payload> {
    (any::<u64>(), ".{0,16}").prop_map(|(user_id, username)| {
        Payload::UserTyping(typing::UserTyping { user_id, username })
    })
}

proptest! {
    #[test]
    fn decode_is_total(kind in any_kind(), bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = Payload::decode(kind, &bytes);
    }

    #[test]
    fn payload_survives_the_wire(
        payload in prop_oneof![any_receive(), any_read(), any_typing()],
        room_id in proptest::option::of(1u64..),
    ) {
        let kind = payload.kind();
        let frame = payload.clone().into_frame(room_id).expect("should encode");
        let wire = frame.to_vec().expect("should frame");

        let parsed = Frame::decode(&wire).expect("should decode frame");
        prop_assert_eq!(parsed.event(), Some(kind));
        prop_assert_eq!(parsed.room_id(), room_id);
        prop_assert_eq!(Payload::from_frame(&parsed).expect("should decode payload"), payload);
    }

    #[test]
    fn header_decode_is_total(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        if let Ok(header) = FrameHeader::from_bytes(&bytes) {
            prop_assert!(header.payload_size() <= FrameHeader::MAX_PAYLOAD_SIZE);
        }
    }
}
