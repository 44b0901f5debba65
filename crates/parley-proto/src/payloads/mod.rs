//! CBOR-encoded event bodies.
//!
//! The frame header already names the event, so only the inner struct is
//! serialized: there is no variant tag in the CBOR. Decoding is driven by the
//! header's [`EventKind`].
//!
//! # Invariants
//!
//! Each payload variant maps to exactly one [`EventKind`] (enforced by match
//! exhaustiveness). Encoding then decoding with the same kind yields an equal
//! value.

pub mod message;
pub mod presence;
pub mod room;
pub mod session;
pub mod typing;

use bytes::BufMut;
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    EventKind, Frame, FrameHeader, RoomId,
    errors::{ProtocolError, Result},
};

/// Every event body, one variant per [`EventKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    // Session
    /// Client handshake
    Hello(session::Hello),
    /// Handshake accepted
    HelloReply(session::HelloReply),
    /// Handshake rejected
    ConnectError(session::ConnectError),
    /// Server error notice
    ServerError(session::ServerError),

    // Rooms
    /// Join a room
    JoinRoom(room::JoinRoom),
    /// Leave a room
    LeaveRoom(room::LeaveRoom),
    /// Someone joined
    UserJoined(room::UserJoined),
    /// Someone left
    UserLeft(room::UserLeft),

    // Messages
    /// Post a message
    SendMessage(message::SendMessage),
    /// Message created
    ReceiveMessage(message::ReceiveMessage),
    /// Edit a message
    EditMessage(message::EditMessage),
    /// Message edited
    MessageEdited(message::MessageEdited),
    /// Delete a message
    DeleteMessage(message::DeleteMessage),
    /// Message tombstoned
    MessageDeleted(message::MessageDeleted),
    /// Acknowledge a message
    ReadMessage(message::ReadMessage),
    /// Readers changed
    MessageRead(message::MessageRead),

    // Presence
    /// Online seed
    OnlineUsers(presence::OnlineUsers),
    /// User online
    UserOnline(presence::UserOnline),
    /// User offline
    UserOffline(presence::UserOffline),

    // Typing
    /// Local start
    Typing(typing::Typing),
    /// Local stop
    StopTyping(typing::StopTyping),
    /// Remote start
    UserTyping(typing::UserTyping),
    /// Remote stop
    UserStopTyping(typing::UserStopTyping),
}

impl Payload {
    /// Event kind corresponding to this payload.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Hello(_) => EventKind::Hello,
            Self::HelloReply(_) => EventKind::HelloReply,
            Self::ConnectError(_) => EventKind::ConnectError,
            Self::ServerError(_) => EventKind::ServerError,
            Self::JoinRoom(_) => EventKind::JoinRoom,
            Self::LeaveRoom(_) => EventKind::LeaveRoom,
            Self::UserJoined(_) => EventKind::UserJoined,
            Self::UserLeft(_) => EventKind::UserLeft,
            Self::SendMessage(_) => EventKind::SendMessage,
            Self::ReceiveMessage(_) => EventKind::ReceiveMessage,
            Self::EditMessage(_) => EventKind::EditMessage,
            Self::MessageEdited(_) => EventKind::MessageEdited,
            Self::DeleteMessage(_) => EventKind::DeleteMessage,
            Self::MessageDeleted(_) => EventKind::MessageDeleted,
            Self::ReadMessage(_) => EventKind::ReadMessage,
            Self::MessageRead(_) => EventKind::MessageRead,
            Self::OnlineUsers(_) => EventKind::OnlineUsers,
            Self::UserOnline(_) => EventKind::UserOnline,
            Self::UserOffline(_) => EventKind::UserOffline,
            Self::Typing(_) => EventKind::Typing,
            Self::StopTyping(_) => EventKind::StopTyping,
            Self::UserTyping(_) => EventKind::UserTyping,
            Self::UserStopTyping(_) => EventKind::UserStopTyping,
        }
    }

    /// Encode the inner struct to CBOR.
    ///
    /// Does not enforce [`FrameHeader::MAX_PAYLOAD_SIZE`]; that happens in
    /// [`Frame::encode`].
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let mut writer = dst.writer();

        match self {
            Self::Hello(inner) => write(inner, &mut writer),
            Self::HelloReply(inner) => write(inner, &mut writer),
            Self::ConnectError(inner) => write(inner, &mut writer),
            Self::ServerError(inner) => write(inner, &mut writer),
            Self::JoinRoom(inner) => write(inner, &mut writer),
            Self::LeaveRoom(inner) => write(inner, &mut writer),
            Self::UserJoined(inner) => write(inner, &mut writer),
            Self::UserLeft(inner) => write(inner, &mut writer),
            Self::SendMessage(inner) => write(inner, &mut writer),
            Self::ReceiveMessage(inner) => write(inner, &mut writer),
            Self::EditMessage(inner) => write(inner, &mut writer),
            Self::MessageEdited(inner) => write(inner, &mut writer),
            Self::DeleteMessage(inner) => write(inner, &mut writer),
            Self::MessageDeleted(inner) => write(inner, &mut writer),
            Self::ReadMessage(inner) => write(inner, &mut writer),
            Self::MessageRead(inner) => write(inner, &mut writer),
            Self::OnlineUsers(inner) => write(inner, &mut writer),
            Self::UserOnline(inner) => write(inner, &mut writer),
            Self::UserOffline(inner) => write(inner, &mut writer),
            Self::Typing(inner) => write(inner, &mut writer),
            Self::StopTyping(inner) => write(inner, &mut writer),
            Self::UserTyping(inner) => write(inner, &mut writer),
            Self::UserStopTyping(inner) => write(inner, &mut writer),
        }
    }

    /// Decode a body for the given event kind.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` if `bytes` exceed the frame limit
    /// - `ProtocolError::CborDecode` if the body does not match the kind
    pub fn decode(kind: EventKind, bytes: &[u8]) -> Result<Self> {
        if bytes.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        let payload = match kind {
            EventKind::Hello => Self::Hello(read(bytes)?),
            EventKind::HelloReply => Self::HelloReply(read(bytes)?),
            EventKind::ConnectError => Self::ConnectError(read(bytes)?),
            EventKind::ServerError => Self::ServerError(read(bytes)?),
            EventKind::JoinRoom => Self::JoinRoom(read(bytes)?),
            EventKind::LeaveRoom => Self::LeaveRoom(read(bytes)?),
            EventKind::UserJoined => Self::UserJoined(read(bytes)?),
            EventKind::UserLeft => Self::UserLeft(read(bytes)?),
            EventKind::SendMessage => Self::SendMessage(read(bytes)?),
            EventKind::ReceiveMessage => Self::ReceiveMessage(read(bytes)?),
            EventKind::EditMessage => Self::EditMessage(read(bytes)?),
            EventKind::MessageEdited => Self::MessageEdited(read(bytes)?),
            EventKind::DeleteMessage => Self::DeleteMessage(read(bytes)?),
            EventKind::MessageDeleted => Self::MessageDeleted(read(bytes)?),
            EventKind::ReadMessage => Self::ReadMessage(read(bytes)?),
            EventKind::MessageRead => Self::MessageRead(read(bytes)?),
            EventKind::OnlineUsers => Self::OnlineUsers(read(bytes)?),
            EventKind::UserOnline => Self::UserOnline(read(bytes)?),
            EventKind::UserOffline => Self::UserOffline(read(bytes)?),
            EventKind::Typing => Self::Typing(read(bytes)?),
            EventKind::StopTyping => Self::StopTyping(read(bytes)?),
            EventKind::UserTyping => Self::UserTyping(read(bytes)?),
            EventKind::UserStopTyping => Self::UserStopTyping(read(bytes)?),
        };

        Ok(payload)
    }

    /// Convert into a transport frame.
    ///
    /// `room_id` scopes the frame; pass `None` for session and presence
    /// events.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn into_frame(self, room_id: Option<RoomId>) -> Result<Frame> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;

        let mut header = FrameHeader::new(self.kind());
        if let Some(room_id) = room_id {
            header.set_room_id(room_id);
        }

        Ok(Frame::new(header, buf))
    }

    /// Parse the body of a transport frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownEvent` if the header's event code is unknown
    /// - Any error from [`Payload::decode`]
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let kind = frame
            .header
            .event()
            .ok_or_else(|| ProtocolError::UnknownEvent(frame.header.event_code()))?;
        Self::decode(kind, &frame.payload)
    }
}

fn write<T: Serialize, W: std::io::Write>(value: &T, writer: W) -> Result<()> {
    ciborium::ser::into_writer(value, writer).map_err(|e| ProtocolError::CborEncode(e.to_string()))
}

fn read<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receive_message_round_trip() {
        let payload = Payload::ReceiveMessage(message::ReceiveMessage {
            id: 7,
            room_id: 10,
            author_id: 3,
            author_name: "ada".to_string(),
            content: "hello".to_string(),
            created_at: 1_700_000_000_000,
        });

        let frame = payload.clone().into_frame(Some(10)).expect("should create frame");
        assert_eq!(frame.event(), Some(EventKind::ReceiveMessage));
        assert_eq!(frame.room_id(), Some(10));

        let decoded = Payload::from_frame(&frame).expect("should parse payload");
        assert_eq!(payload, decoded);
    }

    #[test]
    fn optional_tombstone_fields_may_be_absent() {
        let payload = Payload::MessageDeleted(message::MessageDeleted {
            id: 1,
            room_id: None,
            content: None,
            deleted_at: None,
        });

        let frame = payload.clone().into_frame(None).expect("should create frame");
        assert_eq!(frame.room_id(), None);
        assert_eq!(Payload::from_frame(&frame).unwrap(), payload);
    }

    #[test]
    fn mismatched_kind_fails_to_decode() {
        let payload = Payload::UserOnline(presence::UserOnline { user_id: 5 });
        let frame = payload.into_frame(None).unwrap();

        let result = Payload::decode(EventKind::ReceiveMessage, &frame.payload);
        assert!(matches!(result, Err(ProtocolError::CborDecode(_))));
    }

    #[test]
    fn unknown_event_code_rejected() {
        let mut frame = Payload::UserOnline(presence::UserOnline { user_id: 5 })
            .into_frame(None)
            .unwrap();
        frame.header.event = 0xBEEFu16.to_be_bytes();

        assert_eq!(Payload::from_frame(&frame), Err(ProtocolError::UnknownEvent(0xBEEF)));
    }
}
