//! Room membership payloads.

use serde::{Deserialize, Serialize};

use crate::RoomId;

/// Enter a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRoom {
    /// Room to join
    pub room_id: RoomId,
}

/// Leave a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveRoom {
    /// Room to leave
    pub room_id: RoomId,
}

/// Another user joined the active room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserJoined {
    /// Display name of the user
    pub username: String,
}

/// Another user left the active room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLeft {
    /// Display name of the user
    pub username: String,
}
