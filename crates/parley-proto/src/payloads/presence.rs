//! Global presence payloads. Never room-scoped.

use serde::{Deserialize, Serialize};

use crate::UserId;

/// Complete online set, sent once right after the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineUsers {
    /// Every user currently online
    pub user_ids: Vec<UserId>,
}

/// A user came online.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserOnline {
    /// User that came online
    pub user_id: UserId,
}

/// A user went offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserOffline {
    /// User that went offline
    pub user_id: UserId,
}
