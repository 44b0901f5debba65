//! Client events and actions.

use parley_core::{ConnectionStatus, TransportEvent, TransportId};
use parley_proto::{Frame, MessageId, RoomId, payloads::message::MessageRecord};

use crate::{error::ClientError, store::LocalId};

/// Events the caller feeds into the client.
///
/// The caller is responsible for:
/// - Reporting transport activity for the transports the client asked for
/// - Driving time forward via ticks
/// - Delivering history fetched out of band
/// - Forwarding user intents
///
/// Generic over `I` (Instant type) so simulations can use virtual time.
#[derive(Debug, Clone)]
pub enum ClientEvent<I = std::time::Instant> {
    /// Connect with a bearer token. No-op while already connected.
    Connect {
        /// Credential for the handshake
        token: String,
    },

    /// Tear down the connection.
    Disconnect,

    /// Something happened on a transport.
    Transport(TransportEvent),

    /// Time tick for timers (typing debounce, echo timeout, handshake).
    Tick {
        /// Current time from the environment
        now: I,
    },

    /// Make a room active, or leave the active room with `None`.
    SelectRoom(Option<RoomId>),

    /// History fetched for a `FetchHistory` request.
    HistoryLoaded {
        /// Room the history belongs to
        room_id: RoomId,
        /// Epoch from the request
        epoch: u64,
        /// Messages in server order
        messages: Vec<MessageRecord>,
    },

    /// History fetch failed.
    HistoryFailed {
        /// Room the request was for
        room_id: RoomId,
        /// Epoch from the request
        epoch: u64,
        /// Failure description
        reason: String,
    },

    /// Post a message to the active room.
    SendMessage {
        /// Message text, trimmed before sending
        content: String,
    },

    /// Resend a message that failed to confirm.
    RetryMessage {
        /// The failed message
        local_id: LocalId,
    },

    /// Edit one of the local user's messages.
    EditMessage {
        /// Message to edit
        message_id: MessageId,
        /// Replacement text
        content: String,
    },

    /// Delete one of the local user's messages.
    DeleteMessage {
        /// Message to delete
        message_id: MessageId,
    },

    /// A key was pressed in the message input.
    Keystroke,

    /// The message input went away.
    InputClosed,
}

/// Actions the client produces for the caller to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Open a transport to the server and report its events under this id.
    OpenTransport {
        /// Id for the new transport
        transport: TransportId,
    },

    /// Close and release a transport.
    DisposeTransport {
        /// Transport to dispose
        transport: TransportId,
    },

    /// Write a frame to the current transport.
    Send(Frame),

    /// Fetch history for a room and report it back tagged with `epoch`.
    FetchHistory {
        /// Room to fetch
        room_id: RoomId,
        /// Epoch to echo back in `HistoryLoaded` / `HistoryFailed`
        epoch: u64,
    },

    /// Connection status changed.
    ConnectionChanged(ConnectionStatus),

    /// Connection failed; reconnecting is up to the caller.
    ConnectionFailed {
        /// What went wrong
        error: ClientError,
    },

    /// An optimistic message was not confirmed in time.
    MessageFailed {
        /// The failed message
        local_id: LocalId,
    },

    /// Observable state changed; re-render.
    StateChanged,

    /// Informational message for the user or the log.
    Log {
        /// Message text
        message: String,
    },
}
