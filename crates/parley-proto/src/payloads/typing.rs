//! Typing indicator payloads.
//!
//! The client announces start/stop for the room it is in; the server relays
//! them to the other members as [`UserTyping`] / [`UserStopTyping`].

use serde::{Deserialize, Serialize};

use crate::{RoomId, UserId};

/// Local user started typing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Typing {
    /// Room the user is typing in
    pub room_id: RoomId,
}

/// Local user stopped typing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopTyping {
    /// Room the user was typing in
    pub room_id: RoomId,
}

/// A remote user started typing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTyping {
    /// Who is typing
    pub user_id: UserId,
    /// Their display name
    pub username: String,
}

/// A remote user stopped typing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStopTyping {
    /// Who stopped typing
    pub user_id: UserId,
    /// Their display name
    pub username: String,
}
