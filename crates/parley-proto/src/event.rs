//! Named wire events.
//!
//! The server speaks in named events ("receive-message", "user_typing", ...).
//! On the wire each name is carried as a stable `u16` code in the frame
//! header so routing never needs to look at strings.
//!
//! Codes are grouped by concern in the high byte:
//!
//! ```text
//! 0x00xx  session    0x02xx  messages   0x04xx  typing
//! 0x01xx  rooms      0x03xx  presence
//! ```

/// Every event the client and server exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum EventKind {
    /// Client authentication handshake (client → server).
    Hello = 0x0001,
    /// Handshake accepted (server → client).
    HelloReply = 0x0002,
    /// Handshake or transport rejected (server → client).
    ConnectError = 0x0003,
    /// Generic server-side error notice (server → client).
    ServerError = 0x0004,

    /// Enter a room (client → server).
    JoinRoom = 0x0101,
    /// Leave a room (client → server).
    LeaveRoom = 0x0102,
    /// Another user entered the room (server → client).
    UserJoined = 0x0103,
    /// Another user left the room (server → client).
    UserLeft = 0x0104,

    /// Post a message (client → server).
    SendMessage = 0x0201,
    /// Message created (server → client).
    ReceiveMessage = 0x0202,
    /// Edit own message (client → server).
    EditMessage = 0x0203,
    /// Message edited (server → client).
    MessageEdited = 0x0204,
    /// Delete own message (client → server).
    DeleteMessage = 0x0205,
    /// Message tombstoned (server → client).
    MessageDeleted = 0x0206,
    /// Acknowledge a message (client → server).
    ReadMessage = 0x0207,
    /// Readers of a message changed (server → client).
    MessageRead = 0x0208,

    /// Full online set, sent once per connection (server → client).
    OnlineUsers = 0x0301,
    /// A user came online (server → client).
    UserOnline = 0x0302,
    /// A user went offline (server → client).
    UserOffline = 0x0303,

    /// Local user started typing (client → server).
    Typing = 0x0401,
    /// Local user stopped typing (client → server).
    StopTyping = 0x0402,
    /// Remote user started typing (server → client).
    UserTyping = 0x0403,
    /// Remote user stopped typing (server → client).
    UserStopTyping = 0x0404,
}

impl EventKind {
    /// All event kinds, in code order.
    pub const ALL: [Self; 23] = [
        Self::Hello,
        Self::HelloReply,
        Self::ConnectError,
        Self::ServerError,
        Self::JoinRoom,
        Self::LeaveRoom,
        Self::UserJoined,
        Self::UserLeft,
        Self::SendMessage,
        Self::ReceiveMessage,
        Self::EditMessage,
        Self::MessageEdited,
        Self::DeleteMessage,
        Self::MessageDeleted,
        Self::ReadMessage,
        Self::MessageRead,
        Self::OnlineUsers,
        Self::UserOnline,
        Self::UserOffline,
        Self::Typing,
        Self::StopTyping,
        Self::UserTyping,
        Self::UserStopTyping,
    ];

    /// Wire code for this event.
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Parse a wire code. `None` if the code is unknown.
    #[must_use]
    pub fn from_u16(code: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.to_u16() == code)
    }

    /// Event name as used by the chat server.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Hello => "hello",
            Self::HelloReply => "connect",
            Self::ConnectError => "connect_error",
            Self::ServerError => "error",
            Self::JoinRoom => "join-room",
            Self::LeaveRoom => "leave-room",
            Self::UserJoined => "user-joined",
            Self::UserLeft => "user-left",
            Self::SendMessage => "send-message",
            Self::ReceiveMessage => "receive-message",
            Self::EditMessage => "edit-message",
            Self::MessageEdited => "message-edited",
            Self::DeleteMessage => "delete-message",
            Self::MessageDeleted => "message-deleted",
            Self::ReadMessage => "read-message",
            Self::MessageRead => "message-read",
            Self::OnlineUsers => "online-users",
            Self::UserOnline => "user-online",
            Self::UserOffline => "user-offline",
            Self::Typing => "typing",
            Self::StopTyping => "stop-typing",
            Self::UserTyping => "user_typing",
            Self::UserStopTyping => "user_stop_typing",
        }
    }

    /// Look up an event by its server name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }

    /// True for events the client emits; false for events it consumes.
    #[must_use]
    pub const fn is_client_emitted(self) -> bool {
        matches!(
            self,
            Self::Hello
                | Self::JoinRoom
                | Self::LeaveRoom
                | Self::SendMessage
                | Self::EditMessage
                | Self::DeleteMessage
                | Self::ReadMessage
                | Self::Typing
                | Self::StopTyping
        )
    }

    /// True for events that only make sense inside the active room.
    ///
    /// Presence and session events are global.
    #[must_use]
    pub const fn is_room_scoped(self) -> bool {
        matches!(self.to_u16() >> 8, 0x01 | 0x02 | 0x04)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn codes_and_names_are_unique() {
        let codes: HashSet<_> = EventKind::ALL.iter().map(|k| k.to_u16()).collect();
        let names: HashSet<_> = EventKind::ALL.iter().map(|k| k.name()).collect();

        assert_eq!(codes.len(), EventKind::ALL.len());
        assert_eq!(names.len(), EventKind::ALL.len());
    }

    #[test]
    fn lookup_by_code_and_name() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_u16(kind.to_u16()), Some(kind));
            assert_eq!(EventKind::from_name(kind.name()), Some(kind));
        }

        assert_eq!(EventKind::from_u16(0xFFFF), None);
        assert_eq!(EventKind::from_name("nope"), None);
    }

    #[test]
    fn presence_is_global() {
        assert!(!EventKind::OnlineUsers.is_room_scoped());
        assert!(!EventKind::UserOffline.is_room_scoped());
        assert!(!EventKind::HelloReply.is_room_scoped());
        assert!(EventKind::MessageEdited.is_room_scoped());
        assert!(EventKind::UserTyping.is_room_scoped());
    }
}
