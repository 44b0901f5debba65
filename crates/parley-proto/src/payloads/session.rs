//! Session handshake payloads.
//!
//! A connection is authenticated by the first frame the client sends after
//! the transport opens. The server answers with either a [`HelloReply`]
//! carrying the authenticated identity or a [`ConnectError`].

use serde::{Deserialize, Serialize};

use crate::UserId;

/// Client handshake (first frame on a new transport).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Protocol version the client speaks.
    pub version: u8,

    /// Bearer token obtained out of band.
    pub token: String,
}

/// Handshake accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloReply {
    /// Identity the token authenticated as.
    pub user_id: UserId,

    /// Display name of that identity.
    pub username: String,

    /// Server-assigned session identifier.
    pub session_id: u64,
}

/// Handshake or transport rejected by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectError {
    /// Human-readable reason.
    pub reason: String,
}

/// Server-side error notice. Informational; does not end the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Human-readable message.
    pub message: String,
}
