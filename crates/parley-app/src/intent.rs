//! User intents.
//!
//! Intents are what a user asks for; the runtime turns them into client
//! events. Line-oriented frontends type them as text: plain lines are
//! messages, lines starting with `/` are commands.

use parley_proto::{MessageId, RoomId};
use thiserror::Error;

/// Something the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Connect with a token.
    Connect {
        /// Credential for the handshake
        token: String,
    },
    /// Connect again with the last token.
    Reconnect,
    /// Drop the connection.
    Disconnect,
    /// Switch rooms, or leave with `None`.
    SelectRoom(Option<RoomId>),
    /// Post a message to the active room.
    Send(String),
    /// Resend every failed message in the active room.
    RetryFailed,
    /// Edit one of the user's messages.
    Edit {
        /// Message to edit
        message_id: MessageId,
        /// Replacement text
        content: String,
    },
    /// Delete one of the user's messages.
    Delete {
        /// Message to delete
        message_id: MessageId,
    },
    /// A key was pressed in the message input.
    Keystroke,
    /// The message input went away.
    InputClosed,
    /// Exit the application.
    Quit,
}

/// Malformed command line.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Known command, wrong arguments.
    #[error("usage: {0}")]
    Usage(&'static str),
    /// Unknown command.
    #[error("unknown command: /{0}")]
    Unknown(String),
}

impl Intent {
    /// Parse one line of input.
    ///
    /// Returns `Ok(None)` for blank lines.
    pub fn parse_line(line: &str) -> Result<Option<Self>, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let Some(command) = line.strip_prefix('/') else {
            return Ok(Some(Self::Send(line.to_string())));
        };

        let (name, rest) = command.split_once(char::is_whitespace).unwrap_or((command, ""));
        let rest = rest.trim();

        let intent = match name {
            "join" => {
                let room_id = rest.parse().map_err(|_| ParseError::Usage("/join <room-id>"))?;
                Self::SelectRoom(Some(room_id))
            },
            "leave" => Self::SelectRoom(None),
            "edit" => {
                let (id, content) =
                    rest.split_once(char::is_whitespace).ok_or(ParseError::Usage("/edit <id> <text>"))?;
                let message_id = id.parse().map_err(|_| ParseError::Usage("/edit <id> <text>"))?;
                Self::Edit { message_id, content: content.trim().to_string() }
            },
            "delete" => {
                let message_id = rest.parse().map_err(|_| ParseError::Usage("/delete <id>"))?;
                Self::Delete { message_id }
            },
            "retry" => Self::RetryFailed,
            "connect" if !rest.is_empty() => Self::Connect { token: rest.to_string() },
            "connect" | "reconnect" => Self::Reconnect,
            "disconnect" => Self::Disconnect,
            "quit" | "exit" => Self::Quit,
            other => return Err(ParseError::Unknown(other.to_string())),
        };

        Ok(Some(intent))
    }
}
