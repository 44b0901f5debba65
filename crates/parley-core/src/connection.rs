//! Connection manager state machine.
//!
//! Owns the one logical connection to the chat server: authentication, the
//! transport handle, status, and routing of incoming frames to subscribed
//! components. Uses the action pattern: methods take time as input and
//! return actions for the driver to execute. The manager never performs I/O
//! and never retries on its own.
//!
//! # State Machine
//!
//! ```text
//!                connect               HelloReply
//! ┌──────────────┐      ┌────────────┐           ┌───────────┐
//! │ Disconnected │─────>│ Connecting │──────────>│ Connected │
//! └──────────────┘      └────────────┘           └───────────┘
//!        ^                    │ ConnectError / timeout │
//!        │ disconnect         │ closed / failed        │
//!        │                    v                        │
//!        │              ┌─────────┐                    │
//!        └──────────────│ Errored │<───────────────────┘
//!                       └─────────┘
//! ```
//!
//! # Transport ownership
//!
//! Each transport the manager asks the driver to open gets a fresh
//! [`TransportId`]. Events tagged with any other id are stale and ignored, so
//! a late `Closed` from a disposed socket can never tear down its
//! replacement. A new transport is only requested after the previous one has
//! been disposed.

use std::{
    ops::Sub,
    time::{Duration, Instant},
};

use parley_proto::{
    EventKind, Frame, Payload, RoomId, UserId,
    payloads::session::{ConnectError, Hello, HelloReply, ServerError},
};

use crate::{
    error::ConnectionError,
    listeners::{ListenerId, ListenerOwner, Listeners},
};

/// Time allowed to complete the Hello/HelloReply handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Protocol version sent in `Hello`.
pub const PROTOCOL_VERSION: u8 = 1;

/// Session events handled by the manager itself.
const SESSION_EVENTS: [EventKind; 3] =
    [EventKind::HelloReply, EventKind::ConnectError, EventKind::ServerError];

/// Connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// No connection requested, or explicitly disconnected.
    #[default]
    Disconnected,
    /// Transport requested, handshake not yet complete.
    Connecting,
    /// Authenticated and usable.
    Connected,
    /// Authentication or transport failed. Terminal until the next connect.
    Errored,
}

/// Handle for one transport instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransportId(u64);

impl TransportId {
    /// Raw value, for logging.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Identity established by the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Authenticated user
    pub user_id: UserId,
    /// Display name
    pub username: String,
    /// Server-assigned session id
    pub session_id: u64,
}

/// Events the driver reports about a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Transport is open and writable.
    Opened {
        /// Which transport
        transport: TransportId,
    },
    /// A frame arrived.
    Frame {
        /// Which transport
        transport: TransportId,
        /// The frame
        frame: Frame,
    },
    /// Peer closed the transport.
    Closed {
        /// Which transport
        transport: TransportId,
        /// Close reason
        reason: String,
    },
    /// Transport could not be opened or broke.
    Failed {
        /// Which transport
        transport: TransportId,
        /// Failure description
        reason: String,
    },
}

impl TransportEvent {
    /// Transport the event refers to.
    #[must_use]
    pub fn transport(&self) -> TransportId {
        match self {
            Self::Opened { transport }
            | Self::Frame { transport, .. }
            | Self::Closed { transport, .. }
            | Self::Failed { transport, .. } => *transport,
        }
    }
}

/// Actions returned by the connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Open a new transport and report its events under this id.
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
    SendFrame(Frame),
    /// Status changed.
    StatusChanged(ConnectionStatus),
    /// Handshake completed.
    Authenticated(Identity),
    /// Connection failed. Status is now [`ConnectionStatus::Errored`].
    Failed(ConnectionError),
    /// Informational error notice from the server.
    ServerNotice {
        /// Message text
        message: String,
    },
    /// Frame for other components.
    Deliver {
        /// Owners subscribed to the frame's event kind
        owners: Vec<ListenerOwner>,
        /// The frame
        frame: Frame,
    },
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for completing the handshake
    pub handshake_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self { handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT }
    }
}

/// Connection manager.
///
/// Pure state machine, generic over `Instant` so simulations can drive it
/// with virtual time.
#[derive(Debug, Clone)]
pub struct ConnectionManager<I = Instant>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    config: ConnectionConfig,
    status: ConnectionStatus,
    token: Option<String>,
    transport: Option<TransportId>,
    next_transport: u64,
    connecting_since: Option<I>,
    identity: Option<Identity>,
    listeners: Listeners,
}

impl<I> ConnectionManager<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Create a manager in [`ConnectionStatus::Disconnected`].
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            status: ConnectionStatus::Disconnected,
            token: None,
            transport: None,
            next_transport: 0,
            connecting_since: None,
            identity: None,
            listeners: Listeners::new(),
        }
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Authenticated identity. `None` unless connected.
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Current transport handle, if one is held.
    #[must_use]
    pub fn transport(&self) -> Option<TransportId> {
        self.transport
    }

    /// Subscription registry.
    #[must_use]
    pub fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    /// Subscribe `owner` to incoming frames of the given kinds.
    pub fn subscribe(&mut self, owner: ListenerOwner, kinds: &[EventKind]) -> ListenerId {
        self.listeners.subscribe(owner, kinds)
    }

    /// Remove one subscription.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// Remove every subscription held by `owner`.
    pub fn unsubscribe_owner(&mut self, owner: ListenerOwner) -> usize {
        self.listeners.unsubscribe_owner(owner)
    }

    /// Establish the connection.
    ///
    /// Idempotent: while connecting or connected this returns no actions.
    /// Otherwise any transport still held is disposed before a new one is
    /// requested.
    pub fn connect(&mut self, token: impl Into<String>, now: I) -> Vec<ConnectionAction> {
        let token = token.into();

        if matches!(self.status, ConnectionStatus::Connecting | ConnectionStatus::Connected) {
            if self.token.as_deref() != Some(token.as_str()) {
                tracing::debug!("connect with a different token ignored while connection is live");
            }
            return Vec::new();
        }

        let mut actions = Vec::new();
        if let Some(old) = self.transport.take() {
            actions.push(ConnectionAction::DisposeTransport { transport: old });
        }

        let transport = TransportId(self.next_transport);
        self.next_transport += 1;
        self.transport = Some(transport);
        self.token = Some(token);
        self.identity = None;
        self.connecting_since = Some(now);

        self.listeners.unsubscribe_owner(ListenerOwner::Connection);
        self.listeners.subscribe(ListenerOwner::Connection, &SESSION_EVENTS);

        tracing::info!(transport = transport.get(), "connecting");
        actions.push(ConnectionAction::OpenTransport { transport });
        actions.extend(self.set_status(ConnectionStatus::Connecting));
        actions
    }

    /// Tear down the connection.
    ///
    /// Clears only the manager's own subscriptions; other components keep
    /// theirs and re-subscribe as they see fit on the next connect.
    pub fn disconnect(&mut self) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();
        if let Some(transport) = self.transport.take() {
            actions.push(ConnectionAction::DisposeTransport { transport });
        }

        self.listeners.unsubscribe_owner(ListenerOwner::Connection);
        self.identity = None;
        self.connecting_since = None;
        self.token = None;

        if self.status != ConnectionStatus::Disconnected {
            tracing::info!("disconnected");
        }
        actions.extend(self.set_status(ConnectionStatus::Disconnected));
        actions
    }

    /// Process a transport event.
    ///
    /// Events for any transport other than the current one, or arriving
    /// after the connection ended, are ignored.
    pub fn handle_transport(&mut self, event: TransportEvent, now: I) -> Vec<ConnectionAction> {
        if Some(event.transport()) != self.transport
            || !matches!(self.status, ConnectionStatus::Connecting | ConnectionStatus::Connected)
        {
            tracing::debug!(transport = event.transport().get(), "ignoring stale transport event");
            return Vec::new();
        }

        match event {
            TransportEvent::Opened { .. } => self.send_hello(),
            TransportEvent::Frame { frame, .. } => self.handle_frame(frame, now),
            TransportEvent::Closed { reason, .. } => {
                self.fail(ConnectionError::TransportClosed { reason })
            },
            TransportEvent::Failed { reason, .. } => self.fail(ConnectionError::Transport(reason)),
        }
    }

    /// Encode a payload for the current transport.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::NotConnected` unless connected
    /// - `ConnectionError::NotClientEvent` for server-to-client events
    /// - `ConnectionError::Protocol` if encoding fails
    pub fn send(
        &self,
        payload: Payload,
        room_id: Option<RoomId>,
    ) -> Result<ConnectionAction, ConnectionError> {
        if self.status != ConnectionStatus::Connected {
            return Err(ConnectionError::NotConnected { status: self.status });
        }
        if !payload.kind().is_client_emitted() {
            return Err(ConnectionError::NotClientEvent(payload.kind()));
        }

        let frame = payload.into_frame(room_id)?;
        Ok(ConnectionAction::SendFrame(frame))
    }

    /// Fail a handshake that exceeded the timeout.
    pub fn tick(&mut self, now: I) -> Vec<ConnectionAction> {
        let Some(since) = self.connecting_since else {
            return Vec::new();
        };

        let elapsed = now - since;
        if self.status == ConnectionStatus::Connecting && elapsed > self.config.handshake_timeout {
            return self.fail(ConnectionError::HandshakeTimeout { elapsed });
        }

        Vec::new()
    }

    fn send_hello(&mut self) -> Vec<ConnectionAction> {
        let Some(token) = self.token.clone() else {
            return Vec::new();
        };

        let hello = Payload::Hello(Hello { version: PROTOCOL_VERSION, token });
        match hello.into_frame(None) {
            Ok(frame) => vec![ConnectionAction::SendFrame(frame)],
            Err(e) => self.fail(e.into()),
        }
    }

    fn handle_frame(&mut self, frame: Frame, _now: I) -> Vec<ConnectionAction> {
        let Some(kind) = frame.event() else {
            tracing::debug!(code = frame.header.event_code(), "dropping frame with unknown event");
            return Vec::new();
        };

        let owners = self.listeners.route(kind);
        if owners.contains(&ListenerOwner::Connection) {
            return self.handle_session_frame(kind, &frame);
        }

        if self.status != ConnectionStatus::Connected {
            tracing::debug!(event = %kind, "dropping frame received before handshake");
            return Vec::new();
        }

        if owners.is_empty() {
            tracing::debug!(event = %kind, "no listener for frame");
            return Vec::new();
        }

        vec![ConnectionAction::Deliver { owners, frame }]
    }

    fn handle_session_frame(&mut self, kind: EventKind, frame: &Frame) -> Vec<ConnectionAction> {
        let payload = match Payload::from_frame(frame) {
            Ok(payload) => payload,
            Err(e) if self.status == ConnectionStatus::Connecting => return self.fail(e.into()),
            Err(e) => {
                tracing::warn!(event = %kind, error = %e, "malformed session frame");
                return Vec::new();
            },
        };

        match payload {
            Payload::HelloReply(HelloReply { user_id, username, session_id }) => {
                if self.status != ConnectionStatus::Connecting {
                    tracing::debug!("duplicate handshake reply ignored");
                    return Vec::new();
                }

                let identity = Identity { user_id, username, session_id };
                self.identity = Some(identity.clone());
                self.connecting_since = None;

                tracing::info!(user_id, session_id, "connected");
                let mut actions = self.set_status(ConnectionStatus::Connected);
                actions.push(ConnectionAction::Authenticated(identity));
                actions
            },
            Payload::ConnectError(ConnectError { reason }) => {
                self.fail(ConnectionError::AuthRejected { reason })
            },
            Payload::ServerError(ServerError { message }) => {
                vec![ConnectionAction::ServerNotice { message }]
            },
            other => {
                tracing::debug!(event = %other.kind(), "unexpected session payload");
                Vec::new()
            },
        }
    }

    fn fail(&mut self, error: ConnectionError) -> Vec<ConnectionAction> {
        tracing::warn!(error = %error, "connection failed");

        // The transport handle is kept so the next connect disposes it.
        self.identity = None;
        self.connecting_since = None;

        let mut actions = self.set_status(ConnectionStatus::Errored);
        actions.push(ConnectionAction::Failed(error));
        actions
    }

    fn set_status(&mut self, status: ConnectionStatus) -> Vec<ConnectionAction> {
        if self.status == status {
            return Vec::new();
        }
        self.status = status;
        vec![ConnectionAction::StatusChanged(status)]
    }
}

#[cfg(test)]
mod tests {
    use parley_proto::payloads::{presence::UserOnline, room::JoinRoom};

    use super::*;

    fn reply_frame(user_id: UserId) -> Frame {
        Payload::HelloReply(HelloReply { user_id, username: "me".into(), session_id: 99 }).into_frame(None).unwrap()
    }

    fn opened(manager: &ConnectionManager) -> TransportEvent {
        TransportEvent::Opened { transport: manager.transport().unwrap() }
    }

    fn connected_manager(now: Instant) -> ConnectionManager {
        let mut manager = ConnectionManager::new(ConnectionConfig::default());
        manager.connect("token", now);
        manager.handle_transport(opened(&manager), now);
        let transport = manager.transport().unwrap();
        manager.handle_transport(TransportEvent::Frame { transport, frame: reply_frame(3) }, now);
        manager
    }

    #[test]
    fn handshake_flow() {
        let now = Instant::now();
        let mut manager = ConnectionManager::new(ConnectionConfig::default());

        let actions = manager.connect("token", now);
        assert!(matches!(actions[0], ConnectionAction::OpenTransport { .. }));
        assert_eq!(manager.status(), ConnectionStatus::Connecting);

        let actions = manager.handle_transport(opened(&manager), now);
        assert!(matches!(
            actions.as_slice(),
            [ConnectionAction::SendFrame(hello)] if hello.event() == Some(EventKind::Hello)
        ));

        let transport = manager.transport().unwrap();
        let actions = manager
            .handle_transport(TransportEvent::Frame { transport, frame: reply_frame(3) }, now);
        assert!(actions.contains(&ConnectionAction::StatusChanged(ConnectionStatus::Connected)));
        assert_eq!(manager.identity().map(|i| i.user_id), Some(3));
    }

    #[test]
    fn connect_is_idempotent_while_live() {
        let now = Instant::now();
        let mut manager = connected_manager(now);
        let transport = manager.transport();

        assert!(manager.connect("token", now).is_empty());
        assert_eq!(manager.transport(), transport);
        assert_eq!(manager.status(), ConnectionStatus::Connected);
    }

    #[test]
    fn reconnect_disposes_prior_transport_first() {
        let now = Instant::now();
        let mut manager = ConnectionManager::new(ConnectionConfig::default());
        manager.connect("token", now);
        let first = manager.transport().unwrap();

        manager.handle_transport(TransportEvent::Failed { transport: first, reason: "x".into() }, now);
        assert_eq!(manager.status(), ConnectionStatus::Errored);

        let actions = manager.connect("token", now);
        assert_eq!(actions[0], ConnectionAction::DisposeTransport { transport: first });
        assert!(matches!(actions[1], ConnectionAction::OpenTransport { transport } if transport != first));
    }

    #[test]
    fn stale_transport_events_ignored() {
        let now = Instant::now();
        let mut manager = ConnectionManager::new(ConnectionConfig::default());
        manager.connect("token", now);
        let first = manager.transport().unwrap();
        manager.disconnect();
        manager.connect("token", now);

        let actions =
            manager.handle_transport(TransportEvent::Closed { transport: first, reason: "late".into() }, now);
        assert!(actions.is_empty());
        assert_eq!(manager.status(), ConnectionStatus::Connecting);
    }

    #[test]
    fn auth_rejection_is_terminal() {
        let now = Instant::now();
        let mut manager = ConnectionManager::new(ConnectionConfig::default());
        manager.connect("bad", now);
        manager.handle_transport(opened(&manager), now);

        let transport = manager.transport().unwrap();
        let frame =
            Payload::ConnectError(ConnectError { reason: "invalid token".into() }).into_frame(None).unwrap();
        let actions = manager.handle_transport(TransportEvent::Frame { transport, frame }, now);

        assert_eq!(manager.status(), ConnectionStatus::Errored);
        assert!(actions.iter().any(|a| matches!(
            a,
            ConnectionAction::Failed(ConnectionError::AuthRejected { .. })
        )));

        assert!(manager.tick(now + Duration::from_secs(60)).is_empty());
    }

    #[test]
    fn handshake_timeout() {
        let now = Instant::now();
        let mut manager = ConnectionManager::new(ConnectionConfig::default());
        manager.connect("token", now);

        assert!(manager.tick(now + Duration::from_secs(5)).is_empty());

        let actions = manager.tick(now + Duration::from_secs(11));
        assert!(actions.iter().any(|a| matches!(
            a,
            ConnectionAction::Failed(ConnectionError::HandshakeTimeout { .. })
        )));
    }

    #[test]
    fn disconnect_keeps_other_owners_subscriptions() {
        let now = Instant::now();
        let mut manager = connected_manager(now);
        manager.subscribe(ListenerOwner::Presence, &[EventKind::UserOnline]);

        manager.disconnect();

        assert!(!manager.listeners().has_owner(ListenerOwner::Connection));
        assert!(manager.listeners().has_owner(ListenerOwner::Presence));
    }

    #[test]
    fn delivers_frames_to_subscribers() {
        let now = Instant::now();
        let mut manager = connected_manager(now);
        manager.subscribe(ListenerOwner::Presence, &[EventKind::UserOnline]);

        let transport = manager.transport().unwrap();
        let frame = Payload::UserOnline(UserOnline { user_id: 8 }).into_frame(None).unwrap();
        let actions = manager.handle_transport(TransportEvent::Frame { transport, frame: frame.clone() }, now);

        assert_eq!(actions, vec![ConnectionAction::Deliver {
            owners: vec![ListenerOwner::Presence],
            frame
        }]);
    }

    #[test]
    fn send_requires_connection() {
        let manager: ConnectionManager = ConnectionManager::new(ConnectionConfig::default());
        let result = manager.send(Payload::UserOnline(UserOnline { user_id: 1 }), None);
        assert_eq!(result, Err(ConnectionError::NotConnected {
            status: ConnectionStatus::Disconnected
        }));
    }

    #[test]
    fn send_rejects_server_events() {
        let manager = connected_manager(Instant::now());

        let result = manager.send(Payload::UserOnline(UserOnline { user_id: 1 }), None);
        assert_eq!(result, Err(ConnectionError::NotClientEvent(EventKind::UserOnline)));

        let join = Payload::JoinRoom(JoinRoom { room_id: 10 });
        assert!(matches!(
            manager.send(join, Some(10)),
            Ok(ConnectionAction::SendFrame(frame)) if frame.room_id() == Some(10)
        ));
    }
}
