//! Fuzz target for an authenticated client fed hostile server traffic
//!
//! # Strategy
//!
//! The client connects, authenticates and joins room 1. It then receives a
//! sequence of:
//! - Raw frames: arbitrary event code, room and payload bytes
//! - Well-formed message events with colliding ids and rooms
//! - Local sends, so echoes race with optimistic entries
//! - Time advances, so typing and echo timers fire
//!
//! # Invariants
//!
//! - Wire events never return `Err`
//! - No panics
//! - The standard invariants hold while the session stays up

#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parley_client::{
    Client, ClientConfig, ClientEvent, ConnectionStatus, Environment, TransportEvent, TransportId,
};
use parley_harness::{ClientSnapshot, InvariantRegistry, SimEnv, SnapshotHistory, SystemSnapshot};
use parley_proto::{
    Frame, FrameHeader, Payload,
    payloads::{
        message::{MessageDeleted, MessageEdited, MessageRead, ReceiveMessage},
        session::HelloReply,
    },
};

const ROOM: u64 = 1;

#[derive(Debug, Clone, Arbitrary)]
enum Step {
    Raw { event: u16, room_id: u8, bytes: Vec<u8> },
    Receive { id: u8, room_id: u8, author_id: u8, content: String },
    Edit { id: u8, content: String, edited_at: u16 },
    Delete { id: u8 },
    Read { id: u8, readers: Vec<u8> },
    Send { content: String },
    Keystroke,
    Advance { millis: u16 },
}

fuzz_target!(|steps: Vec<Step>| {
    let env = SimEnv::new();
    let mut client = Client::new(env.clone(), ClientConfig::default());

    client.handle(ClientEvent::Connect { token: "fuzz".into() }).expect("connect");
    let Some(transport) = client.connection().transport() else {
        panic!("connect did not request a transport");
    };
    client.handle(ClientEvent::Transport(TransportEvent::Opened { transport })).expect("opened");

    let reply = Payload::HelloReply(HelloReply { user_id: 1, username: "ada".into(), session_id: 1 });
    deliver(&mut client, transport, reply.into_frame(None).expect("reply encodes"));
    assert_eq!(client.status(), ConnectionStatus::Connected);
    client.handle(ClientEvent::SelectRoom(Some(ROOM))).expect("select");

    let registry = InvariantRegistry::standard();
    let mut history = SnapshotHistory::new();

    for step in steps.into_iter().take(256) {
        match step {
            Step::Raw { event, room_id, bytes } => {
                let mut header = FrameHeader::from_bytes(&raw_header(event)).expect("valid header");
                header.set_room_id(u64::from(room_id % 3));
                deliver(&mut client, transport, Frame::new(header, bytes));
            },
            Step::Receive { id, room_id, author_id, content } => {
                let room_id = u64::from(room_id % 2) + ROOM;
                let payload = Payload::ReceiveMessage(ReceiveMessage {
                    id: u64::from(id % 16),
                    room_id,
                    author_id: u64::from(author_id % 3),
                    author_name: "someone".into(),
                    content,
                    created_at: env.wall_clock_millis(),
                });
                send_payload(&mut client, transport, payload, room_id);
            },
            Step::Edit { id, content, edited_at } => {
                let payload = Payload::MessageEdited(MessageEdited {
                    id: u64::from(id % 16),
                    room_id: Some(ROOM),
                    content,
                    edited_at: u64::from(edited_at),
                });
                send_payload(&mut client, transport, payload, ROOM);
            },
            Step::Delete { id } => {
                let payload = Payload::MessageDeleted(MessageDeleted {
                    id: u64::from(id % 16),
                    room_id: Some(ROOM),
                    content: None,
                    deleted_at: None,
                });
                send_payload(&mut client, transport, payload, ROOM);
            },
            Step::Read { id, readers } => {
                let payload = Payload::MessageRead(MessageRead {
                    message_id: u64::from(id % 16),
                    room_id: Some(ROOM),
                    readers: readers.into_iter().map(|r| u64::from(r % 4)).collect(),
                });
                send_payload(&mut client, transport, payload, ROOM);
            },
            Step::Send { content } => {
                // Empty content is a user error, not a wire event.
                let _ = client.handle(ClientEvent::SendMessage { content });
            },
            Step::Keystroke => {
                let _ = client.handle(ClientEvent::Keystroke);
            },
            Step::Advance { millis } => {
                env.advance(Duration::from_millis(u64::from(millis)));
                client.handle(ClientEvent::Tick { now: env.now() }).expect("tick never fails");
            },
        }

        // A ConnectError or close ends the session; reconnects are covered
        // by the model-based tests.
        if client.status() != ConnectionStatus::Connected {
            return;
        }

        let mut snapshot = ClientSnapshot::from_client(0, &client);
        history.record(&mut snapshot);
        registry.assert_all(&SystemSnapshot::single(snapshot), "after fuzz step");
    }
});

fn deliver(client: &mut Client<SimEnv>, transport: TransportId, frame: Frame) {
    let event = ClientEvent::Transport(TransportEvent::Frame { transport, frame });
    client.handle(event).expect("wire events never fail");
}

fn send_payload(
    client: &mut Client<SimEnv>,
    transport: TransportId,
    payload: Payload,
    room_id: u64,
) {
    let frame = payload.into_frame(Some(room_id)).expect("small payload encodes");
    deliver(client, transport, frame);
}

/// A valid header for `event` with an empty payload.
fn raw_header(event: u16) -> [u8; FrameHeader::SIZE] {
    let mut raw = [0u8; FrameHeader::SIZE];
    raw[0..4].copy_from_slice(&FrameHeader::MAGIC.to_be_bytes());
    raw[4] = FrameHeader::VERSION;
    raw[6..8].copy_from_slice(&event.to_be_bytes());
    raw
}
