//! Client error types.

use parley_core::ConnectionError;
use parley_proto::{EventKind, MessageId};
use thiserror::Error;

use crate::store::LocalId;

/// Errors produced by the client.
///
/// Wire events never produce an `Err` from [`Client::handle`](crate::Client::handle):
/// `StaleReference` and `DuplicateSuppressed` are absorbed and only logged,
/// `ConnectionFailure` and `SendTimeout` are surfaced as actions. Intent
/// validation errors are returned to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Authentication was rejected or the transport is unreachable.
    #[error("connection failure: {0}")]
    ConnectionFailure(#[from] ConnectionError),

    /// Edit, delete or read receipt for a message the store does not hold.
    #[error("{event} references unknown message {message_id}")]
    StaleReference {
        /// Event that carried the reference
        event: EventKind,
        /// Referenced id
        message_id: MessageId,
    },

    /// Optimistic message was never echoed by the server.
    #[error("message {local_id} was not confirmed in time")]
    SendTimeout {
        /// The unconfirmed message
        local_id: LocalId,
    },

    /// Create event for an id already in the store.
    #[error("duplicate message {message_id} suppressed")]
    DuplicateSuppressed {
        /// Repeated id
        message_id: MessageId,
    },

    /// Intent needs an active room.
    #[error("no active room")]
    NoActiveRoom,

    /// Intent needs an authenticated identity.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Intent needs a live connection.
    #[error("not connected")]
    NotConnected,

    /// Message content is empty after trimming.
    #[error("message content is empty")]
    EmptyContent,

    /// Edit or delete target is not an editable message.
    #[error("cannot modify message {message_id}: {reason}")]
    InvalidTarget {
        /// Target id
        message_id: MessageId,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Retry target is not a failed local message.
    #[error("no failed message {local_id}")]
    NotRetryable {
        /// Target local id
        local_id: LocalId,
    },
}

impl ClientError {
    /// True if the error should be shown to the user.
    ///
    /// Stale references and suppressed duplicates are expected races and are
    /// never surfaced.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, Self::StaleReference { .. } | Self::DuplicateSuppressed { .. })
    }
}
