//! Error types for the connection layer.

use std::time::Duration;

use parley_proto::{EventKind, ProtocolError};
use thiserror::Error;

use crate::connection::ConnectionStatus;

/// Errors raised by the connection manager.
///
/// Every variant except `NotConnected` and `NotClientEvent` ends the
/// connection in [`ConnectionStatus::Errored`]; the manager never retries on
/// its own.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The server rejected the credentials.
    #[error("authentication rejected: {reason}")]
    AuthRejected {
        /// Reason given by the server
        reason: String,
    },

    /// Handshake did not complete within the configured timeout.
    #[error("handshake timeout after {elapsed:?}")]
    HandshakeTimeout {
        /// How long we waited
        elapsed: Duration,
    },

    /// The transport could not be established or broke.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The transport was closed by the peer.
    #[error("transport closed: {reason}")]
    TransportClosed {
        /// Close reason, if the peer gave one
        reason: String,
    },

    /// Frame could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Operation requires an authenticated connection.
    #[error("not connected (status: {status:?})")]
    NotConnected {
        /// Status at the time of the attempt
        status: ConnectionStatus,
    },

    /// Only the server emits this event.
    #[error("{0} is not a client event")]
    NotClientEvent(EventKind),
}

impl ConnectionError {
    /// Returns true if reconnecting may succeed without user intervention.
    ///
    /// Credential rejection and protocol violations are not transient.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::HandshakeTimeout { .. } | Self::Transport(_) | Self::TransportClosed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ConnectionError::HandshakeTimeout { elapsed: Duration::from_secs(10) }.is_transient());
        assert!(ConnectionError::Transport("refused".into()).is_transient());
        assert!(!ConnectionError::AuthRejected { reason: "bad token".into() }.is_transient());
        assert!(!ConnectionError::Protocol(ProtocolError::UnknownEvent(1)).is_transient());
    }
}
