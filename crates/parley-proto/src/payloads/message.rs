//! Message payloads.
//!
//! Creates, edits, deletes and read receipts. Server → client events that
//! patch an existing message (`MessageEdited`, `MessageDeleted`,
//! `MessageRead`) may omit the room id in the body. The frame header must
//! still name the room: clients drop room events that arrive without one.

use serde::{Deserialize, Serialize};

use crate::{MessageId, RoomId, Timestamp, UserId};

/// Post a message to a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessage {
    /// Target room
    pub room_id: RoomId,
    /// Message text (already trimmed)
    pub content: String,
}

/// A message was created. Also the echo of the client's own sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveMessage {
    /// Server-assigned id
    pub id: MessageId,
    /// Room the message belongs to
    pub room_id: RoomId,
    /// Author
    pub author_id: UserId,
    /// Author display name
    pub author_name: String,
    /// Message text
    pub content: String,
    /// Creation time (Unix millis, UTC)
    pub created_at: Timestamp,
}

/// Edit one of the local user's messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditMessage {
    /// Message to edit
    pub message_id: MessageId,
    /// Replacement text
    pub content: String,
}

/// A message was edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEdited {
    /// Edited message
    pub id: MessageId,
    /// Room, when the server includes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    /// New text
    pub content: String,
    /// Edit time (Unix millis, UTC)
    pub edited_at: Timestamp,
}

/// Delete one of the local user's messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteMessage {
    /// Message to delete
    pub message_id: MessageId,
}

/// A message was tombstoned.
///
/// The optional fields are merged into the retained entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDeleted {
    /// Deleted message
    pub id: MessageId,
    /// Room, when the server includes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    /// Replacement text shown in place of the original
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Deletion time (Unix millis, UTC)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<Timestamp>,
}

/// Acknowledge a message as read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadMessage {
    /// Message being acknowledged
    pub message_id: MessageId,
}

/// Readers of a message. Additive: merged, never replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRead {
    /// Message that was read
    pub message_id: MessageId,
    /// Room, when the server includes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    /// Users known to have read it
    pub readers: Vec<UserId>,
}

/// A message as returned by the history collaborator.
///
/// Not a wire event: history arrives out of band, already carrying whatever
/// edits, tombstones and receipts the server has recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Server-assigned id
    pub id: MessageId,
    /// Author
    pub author_id: UserId,
    /// Author display name
    pub author_name: String,
    /// Message text
    pub content: String,
    /// Creation time (Unix millis, UTC)
    pub created_at: Timestamp,
    /// Last edit time, if edited
    #[serde(default)]
    pub edited_at: Option<Timestamp>,
    /// Tombstone flag
    #[serde(default)]
    pub is_deleted: bool,
    /// Users known to have read it
    #[serde(default)]
    pub readers: Vec<UserId>,
}

impl From<ReceiveMessage> for MessageRecord {
    fn from(msg: ReceiveMessage) -> Self {
        Self {
            id: msg.id,
            author_id: msg.author_id,
            author_name: msg.author_name,
            content: msg.content,
            created_at: msg.created_at,
            edited_at: None,
            is_deleted: false,
            readers: Vec::new(),
        }
    }
}
