//! Client state machine.
//!
//! The `Client` is the synchronization engine. It owns the single connection
//! and the state derived from it (active room, message sequence, presence,
//! typing) and turns wire events and user intents into actions.
//!
//! # Room switches
//!
//! Selecting a room applies, in order: stop-typing for the old room, leave
//! the old room, drop its listeners and messages, join the new room, request
//! its history. Every step for the new room is tagged with a fresh epoch so
//! anything still in flight for an earlier activation is discarded.

use std::time::Duration;

use chrono::FixedOffset;
use parley_core::{
    ConnectionAction, ConnectionConfig, ConnectionManager, ConnectionStatus, Environment,
    Identity, ListenerOwner, TransportEvent,
};
use parley_proto::{
    EventKind, Frame, MessageId, Payload, RoomId, UserId,
    payloads::{
        message::{DeleteMessage, EditMessage, MessageRecord, ReadMessage, SendMessage},
        room::{JoinRoom, LeaveRoom},
        typing::{StopTyping, Typing},
    },
};

use crate::{
    error::ClientError,
    event::{ClientAction, ClientEvent},
    grouping::{DayGroup, group_messages},
    presence::PresenceTracker,
    room::{RoomController, RoomSession},
    store::{CreateOutcome, LocalId, Message, MessageStore, PatchOutcome},
    typing::{DEFAULT_DEBOUNCE, DEFAULT_REMOTE_TTL, TypingCoordinator, TypingSignal},
};

/// How long an optimistic message may wait for its echo.
pub const DEFAULT_ECHO_TIMEOUT: Duration = Duration::from_secs(10);

/// Events delivered to the active room session.
const ROOM_EVENTS: [EventKind; 8] = [
    EventKind::UserJoined,
    EventKind::UserLeft,
    EventKind::ReceiveMessage,
    EventKind::MessageEdited,
    EventKind::MessageDeleted,
    EventKind::MessageRead,
    EventKind::UserTyping,
    EventKind::UserStopTyping,
];

/// Events delivered to the presence tracker.
const PRESENCE_EVENTS: [EventKind; 3] =
    [EventKind::OnlineUsers, EventKind::UserOnline, EventKind::UserOffline];

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Connection settings
    pub connection: ConnectionConfig,
    /// Local typing inactivity window
    pub typing_debounce: Duration,
    /// Lifetime of remote typing entries; `None` disables expiry
    pub remote_typing_ttl: Option<Duration>,
    /// Time an optimistic message may wait for its echo
    pub echo_timeout: Duration,
    /// Acknowledge messages from others as soon as they are displayed
    pub auto_read_receipts: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            typing_debounce: DEFAULT_DEBOUNCE,
            remote_typing_ttl: Some(DEFAULT_REMOTE_TTL),
            echo_timeout: DEFAULT_ECHO_TIMEOUT,
            auto_read_receipts: true,
        }
    }
}

/// Chat synchronization engine.
pub struct Client<E: Environment> {
    /// Environment for time and randomness.
    env: E,

    config: ClientConfig,

    /// The single connection and its listener registry.
    connection: ConnectionManager<E::Instant>,

    rooms: RoomController<E::Instant>,

    /// Messages of the active room.
    store: MessageStore<E::Instant>,

    presence: PresenceTracker,

    typing: TypingCoordinator<E::Instant>,
}

impl<E: Environment> Client<E> {
    /// Create a disconnected client.
    pub fn new(env: E, config: ClientConfig) -> Self {
        let mut connection = ConnectionManager::new(config.connection.clone());
        connection.subscribe(ListenerOwner::Presence, &PRESENCE_EVENTS);

        Self {
            env,
            connection,
            rooms: RoomController::new(),
            store: MessageStore::new(),
            presence: PresenceTracker::new(),
            typing: TypingCoordinator::new(config.typing_debounce, config.remote_typing_ttl),
            config,
        }
    }

    /// Process an event.
    ///
    /// # Errors
    ///
    /// Only user intents fail, and only when they cannot be carried out
    /// (no active room, not authenticated, empty content, invalid target).
    /// Wire events never return `Err`.
    pub fn handle(
        &mut self,
        event: ClientEvent<E::Instant>,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let actions = match event {
            ClientEvent::Connect { token } => self.handle_connect(token),
            ClientEvent::Disconnect => self.handle_disconnect(),
            ClientEvent::Transport(event) => self.handle_transport(event),
            ClientEvent::Tick { now } => self.handle_tick(now),
            ClientEvent::SelectRoom(room) => self.handle_select_room(room),
            ClientEvent::HistoryLoaded { room_id, epoch, messages } => {
                self.handle_history_loaded(room_id, epoch, messages)
            },
            ClientEvent::HistoryFailed { room_id, epoch, reason } => {
                self.handle_history_failed(room_id, epoch, &reason)
            },
            ClientEvent::SendMessage { content } => self.handle_send_message(&content)?,
            ClientEvent::RetryMessage { local_id } => self.handle_retry(local_id)?,
            ClientEvent::EditMessage { message_id, content } => {
                self.handle_edit(message_id, &content)?
            },
            ClientEvent::DeleteMessage { message_id } => self.handle_delete(message_id)?,
            ClientEvent::Keystroke => self.handle_keystroke()?,
            ClientEvent::InputClosed => self.handle_input_closed(),
        };

        Ok(coalesce_state_changes(actions))
    }

    /// Connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    /// Authenticated identity. `None` unless connected.
    pub fn identity(&self) -> Option<&Identity> {
        self.connection.identity()
    }

    /// Active room id.
    pub fn active_room(&self) -> Option<RoomId> {
        self.rooms.active_room()
    }

    /// Active room session.
    pub fn active_session(&self) -> Option<&RoomSession<E::Instant>> {
        self.rooms.active()
    }

    /// Messages of the active room, in display order.
    pub fn messages(&self) -> &[Message] {
        self.store.messages()
    }

    /// Message store of the active room.
    pub fn store(&self) -> &MessageStore<E::Instant> {
        &self.store
    }

    /// Messages grouped by local day and author.
    pub fn day_groups(&self, offset: FixedOffset) -> Vec<DayGroup> {
        group_messages(self.store.messages(), offset)
    }

    /// Presence tracker.
    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// Is `user_id` online?
    pub fn is_online(&self, user_id: UserId) -> bool {
        self.presence.is_online(user_id)
    }

    /// Remote users typing in the active room.
    pub fn typing_users(&self) -> Vec<(UserId, String)> {
        self.typing.typing_users().map(|(id, name)| (id, name.to_string())).collect()
    }

    /// True while the local user is in the typing state.
    pub fn is_typing(&self) -> bool {
        self.typing.is_typing()
    }

    /// Configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connection manager, for inspecting listeners and transport state.
    pub fn connection(&self) -> &ConnectionManager<E::Instant> {
        &self.connection
    }

    fn local_user(&self) -> Option<UserId> {
        self.connection.identity().map(|id| id.user_id)
    }

    fn handle_connect(&mut self, token: String) -> Vec<ClientAction> {
        let now = self.env.now();
        let actions = self.connection.connect(token, now);
        self.apply_connection_actions(actions)
    }

    fn handle_disconnect(&mut self) -> Vec<ClientAction> {
        let mut out = Vec::new();

        // Stop-typing goes out while the connection can still carry it.
        if let Some(signal) = self.typing.stop() {
            self.emit_typing(signal, &mut out);
        }
        self.typing.clear_remote();

        let actions = self.connection.disconnect();
        out.extend(self.apply_connection_actions(actions));
        self.presence.reset();
        out.push(ClientAction::StateChanged);
        out
    }

    fn handle_transport(&mut self, event: TransportEvent) -> Vec<ClientAction> {
        let now = self.env.now();
        let actions = self.connection.handle_transport(event, now);
        self.apply_connection_actions(actions)
    }

    fn handle_tick(&mut self, now: E::Instant) -> Vec<ClientAction> {
        let actions = self.connection.tick(now);
        let mut out = self.apply_connection_actions(actions);

        if let Some(signal) = self.typing.expire_local(now) {
            self.emit_typing(signal, &mut out);
        }
        if self.typing.expire_remote(now) {
            out.push(ClientAction::StateChanged);
        }

        let failed = self.store.expire(now, self.config.echo_timeout);
        for local_id in &failed {
            tracing::warn!(error = %ClientError::SendTimeout { local_id: *local_id }, "send failed");
            out.push(ClientAction::MessageFailed { local_id: *local_id });
        }
        if !failed.is_empty() {
            out.push(ClientAction::StateChanged);
        }

        out
    }

    fn handle_select_room(&mut self, room: Option<RoomId>) -> Vec<ClientAction> {
        let now = self.env.now();
        let Some(change) = self.rooms.select(room, now) else {
            return Vec::new();
        };

        let mut out = Vec::new();

        if let Some(left) = change.left {
            if let Some(signal) = self.typing.stop() {
                self.emit_typing(signal, &mut out);
            }
            self.connection.unsubscribe_owner(ListenerOwner::Room { epoch: left.epoch });
            self.emit(
                Payload::LeaveRoom(LeaveRoom { room_id: left.room_id }),
                Some(left.room_id),
                &mut out,
            );
            tracing::info!(room_id = left.room_id, epoch = left.epoch, "left room");
        }

        self.typing.clear_remote();
        self.store.clear();

        if let Some(joined) = change.joined {
            self.connection.subscribe(ListenerOwner::Room { epoch: joined.epoch }, &ROOM_EVENTS);
            self.join(joined, &mut out);
            tracing::info!(room_id = joined.room_id, epoch = joined.epoch, "joined room");
        }

        out.push(ClientAction::StateChanged);
        out
    }

    fn handle_history_loaded(
        &mut self,
        room_id: RoomId,
        epoch: u64,
        messages: Vec<MessageRecord>,
    ) -> Vec<ClientAction> {
        if !self.rooms.is_current(room_id, epoch) {
            tracing::debug!(room_id, epoch, "discarding history for inactive room session");
            return Vec::new();
        }

        tracing::debug!(room_id, count = messages.len(), "history loaded");
        self.store.seed(messages, self.local_user());

        let mut out = Vec::new();
        self.acknowledge_unread(&mut out);
        out.push(ClientAction::StateChanged);
        out
    }

    fn handle_history_failed(&self, room_id: RoomId, epoch: u64, reason: &str) -> Vec<ClientAction> {
        if !self.rooms.is_current(room_id, epoch) {
            return Vec::new();
        }

        tracing::warn!(room_id, reason, "history fetch failed");
        vec![ClientAction::Log { message: format!("could not load history: {reason}") }]
    }

    fn handle_send_message(&mut self, content: &str) -> Result<Vec<ClientAction>, ClientError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ClientError::EmptyContent);
        }

        let session = self.rooms.active().copied().ok_or(ClientError::NoActiveRoom)?;
        let identity = self.connection.identity().cloned().ok_or(ClientError::NotAuthenticated)?;

        let mut out = Vec::new();

        // The stop frame must precede the message on the wire.
        if let Some(signal) = self.typing.stop() {
            self.emit_typing(signal, &mut out);
        }
        self.typing.clear_remote();

        let local_id = self.store.push_local(
            identity.user_id,
            identity.username,
            content,
            self.env.wall_clock_millis(),
            self.env.now(),
        );
        tracing::debug!(%local_id, room_id = session.room_id, "sending message");

        self.emit(
            Payload::SendMessage(SendMessage {
                room_id: session.room_id,
                content: content.to_string(),
            }),
            Some(session.room_id),
            &mut out,
        );
        out.push(ClientAction::StateChanged);
        Ok(out)
    }

    fn handle_retry(&mut self, local_id: LocalId) -> Result<Vec<ClientAction>, ClientError> {
        let session = self.rooms.active().copied().ok_or(ClientError::NoActiveRoom)?;
        if self.status() != ConnectionStatus::Connected {
            return Err(ClientError::NotConnected);
        }

        let now = self.env.now();
        let content = self
            .store
            .retry(local_id, now)
            .map(|msg| msg.content.clone())
            .ok_or(ClientError::NotRetryable { local_id })?;

        let mut out = Vec::new();
        self.emit(
            Payload::SendMessage(SendMessage { room_id: session.room_id, content }),
            Some(session.room_id),
            &mut out,
        );
        out.push(ClientAction::StateChanged);
        Ok(out)
    }

    fn handle_edit(
        &mut self,
        message_id: MessageId,
        content: &str,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ClientError::EmptyContent);
        }

        let room_id = self.check_own_message(message_id)?;
        let mut out = Vec::new();
        self.emit(
            Payload::EditMessage(EditMessage { message_id, content: content.to_string() }),
            Some(room_id),
            &mut out,
        );
        Ok(out)
    }

    fn handle_delete(&mut self, message_id: MessageId) -> Result<Vec<ClientAction>, ClientError> {
        let room_id = self.check_own_message(message_id)?;
        let mut out = Vec::new();
        self.emit(Payload::DeleteMessage(DeleteMessage { message_id }), Some(room_id), &mut out);
        Ok(out)
    }

    /// Edits and deletes apply when the server echoes them, so the target
    /// must be a confirmed, live message by the local user.
    fn check_own_message(&self, message_id: MessageId) -> Result<RoomId, ClientError> {
        let room_id = self.rooms.active_room().ok_or(ClientError::NoActiveRoom)?;
        let me = self.local_user().ok_or(ClientError::NotAuthenticated)?;
        if self.status() != ConnectionStatus::Connected {
            return Err(ClientError::NotConnected);
        }

        let invalid = |reason| ClientError::InvalidTarget { message_id, reason };
        let msg = self.store.get(message_id).ok_or_else(|| invalid("unknown message"))?;
        if msg.author_id != me {
            return Err(invalid("not authored by you"));
        }
        if msg.is_deleted {
            return Err(invalid("message is deleted"));
        }

        Ok(room_id)
    }

    fn handle_keystroke(&mut self) -> Result<Vec<ClientAction>, ClientError> {
        let room_id = self.rooms.active_room().ok_or(ClientError::NoActiveRoom)?;
        if self.status() != ConnectionStatus::Connected {
            return Ok(Vec::new());
        }

        let now = self.env.now();
        let mut out = Vec::new();
        for signal in self.typing.keystroke(room_id, now) {
            self.emit_typing(signal, &mut out);
        }
        Ok(out)
    }

    fn handle_input_closed(&mut self) -> Vec<ClientAction> {
        let mut out = Vec::new();
        if let Some(signal) = self.typing.stop() {
            self.emit_typing(signal, &mut out);
        }
        out
    }

    fn apply_connection_actions(&mut self, actions: Vec<ConnectionAction>) -> Vec<ClientAction> {
        let mut out = Vec::new();

        for action in actions {
            match action {
                ConnectionAction::OpenTransport { transport } => {
                    out.push(ClientAction::OpenTransport { transport });
                },
                ConnectionAction::DisposeTransport { transport } => {
                    out.push(ClientAction::DisposeTransport { transport });
                },
                ConnectionAction::SendFrame(frame) => out.push(ClientAction::Send(frame)),
                ConnectionAction::StatusChanged(status) => {
                    out.push(ClientAction::ConnectionChanged(status));
                    out.push(ClientAction::StateChanged);
                },
                ConnectionAction::Authenticated(identity) => {
                    self.on_authenticated(&identity, &mut out);
                },
                ConnectionAction::Failed(error) => {
                    self.typing.abandon_local();
                    self.typing.clear_remote();
                    out.push(ClientAction::ConnectionFailed { error: error.into() });
                    out.push(ClientAction::StateChanged);
                },
                ConnectionAction::ServerNotice { message } => {
                    out.push(ClientAction::Log { message: format!("server error: {message}") });
                },
                ConnectionAction::Deliver { owners, frame } => {
                    self.dispatch(&owners, &frame, &mut out);
                },
            }
        }

        out
    }

    fn on_authenticated(&mut self, identity: &Identity, out: &mut Vec<ClientAction>) {
        self.presence.authenticated(identity.user_id);

        // Other components re-subscribe on every connect.
        self.connection.unsubscribe_owner(ListenerOwner::Presence);
        self.connection.subscribe(ListenerOwner::Presence, &PRESENCE_EVENTS);

        if let Some(session) = self.rooms.active().copied() {
            let owner = ListenerOwner::Room { epoch: session.epoch };
            self.connection.unsubscribe_owner(owner);
            self.connection.subscribe(owner, &ROOM_EVENTS);
            self.join(session, out);
        }

        out.push(ClientAction::StateChanged);
    }

    /// Announce the session to the server and catch up on its history.
    fn join(&self, session: RoomSession<E::Instant>, out: &mut Vec<ClientAction>) {
        self.emit(
            Payload::JoinRoom(JoinRoom { room_id: session.room_id }),
            Some(session.room_id),
            out,
        );
        out.push(ClientAction::FetchHistory { room_id: session.room_id, epoch: session.epoch });
    }

    fn dispatch(&mut self, owners: &[ListenerOwner], frame: &Frame, out: &mut Vec<ClientAction>) {
        let payload = match Payload::from_frame(frame) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(code = frame.header.event_code(), error = %e, "malformed frame");
                return;
            },
        };

        for owner in owners {
            match owner {
                ListenerOwner::Presence => self.apply_presence(&payload, out),
                ListenerOwner::Room { epoch } => {
                    self.apply_room_event(*epoch, frame.room_id(), &payload, out);
                },
                ListenerOwner::Connection => {},
            }
        }
    }

    fn apply_presence(&mut self, payload: &Payload, out: &mut Vec<ClientAction>) {
        let changed = match payload {
            Payload::OnlineUsers(seed) => {
                self.presence.seed(seed.user_ids.iter().copied());
                true
            },
            Payload::UserOnline(event) => self.presence.mark_online(event.user_id),
            Payload::UserOffline(event) => self.presence.mark_offline(event.user_id),
            other => {
                tracing::debug!(event = %other.kind(), "unexpected presence event");
                false
            },
        };

        if changed {
            out.push(ClientAction::StateChanged);
        }
    }

    fn apply_room_event(
        &mut self,
        epoch: u64,
        header_room: Option<RoomId>,
        payload: &Payload,
        out: &mut Vec<ClientAction>,
    ) {
        let Some(session) = self.rooms.active().copied() else {
            tracing::debug!(event = %payload.kind(), "room event with no active room");
            return;
        };
        if session.epoch != epoch {
            tracing::debug!(event = %payload.kind(), epoch, "room event for ended session");
            return;
        }
        // Listeners route by arrival, so an unscoped frame could still belong
        // to a room this client already left.
        if payload.kind().is_room_scoped() && header_room.is_none() {
            tracing::debug!(event = %payload.kind(), "room event without a room id");
            return;
        }

        let payload_room = match payload {
            Payload::ReceiveMessage(m) => Some(m.room_id),
            Payload::MessageEdited(m) => m.room_id,
            Payload::MessageDeleted(m) => m.room_id,
            Payload::MessageRead(m) => m.room_id,
            _ => None,
        };
        if [header_room, payload_room].into_iter().flatten().any(|r| r != session.room_id) {
            tracing::debug!(event = %payload.kind(), room_id = session.room_id, "event for other room");
            return;
        }

        let local_user = self.local_user();
        match payload {
            Payload::ReceiveMessage(m) => {
                match self.store.create(MessageRecord::from(m.clone()), local_user) {
                    CreateOutcome::Duplicate => {
                        let error = ClientError::DuplicateSuppressed { message_id: m.id };
                        tracing::debug!(%error, "ignoring create");
                        return;
                    },
                    CreateOutcome::Confirmed { local_id, .. } => {
                        tracing::debug!(%local_id, message_id = m.id, "message confirmed");
                    },
                    CreateOutcome::Appended { .. } => {},
                }
                self.acknowledge_unread(out);
                out.push(ClientAction::StateChanged);
            },
            Payload::MessageEdited(m) => {
                let outcome = self.store.edit(m.id, m.content.clone(), m.edited_at);
                patched(outcome, EventKind::MessageEdited, m.id, out);
            },
            Payload::MessageDeleted(m) => {
                let outcome = self.store.delete(m.clone());
                patched(outcome, EventKind::MessageDeleted, m.id, out);
            },
            Payload::MessageRead(m) => {
                let outcome = self.store.read(m.message_id, m.readers.iter().copied());
                patched(outcome, EventKind::MessageRead, m.message_id, out);
            },
            Payload::UserTyping(t) => {
                let now = self.env.now();
                if self.typing.remote_start(t.user_id, t.username.clone(), local_user, now) {
                    out.push(ClientAction::StateChanged);
                }
            },
            Payload::UserStopTyping(t) => {
                if self.typing.remote_stop(t.user_id) {
                    out.push(ClientAction::StateChanged);
                }
            },
            Payload::UserJoined(u) => {
                out.push(ClientAction::Log { message: format!("{} joined the room", u.username) });
            },
            Payload::UserLeft(u) => {
                out.push(ClientAction::Log { message: format!("{} left the room", u.username) });
            },
            other => tracing::debug!(event = %other.kind(), "unexpected room event"),
        }
    }

    /// Emit read receipts for messages from others not yet acknowledged.
    fn acknowledge_unread(&mut self, out: &mut Vec<ClientAction>) {
        if !self.config.auto_read_receipts || self.status() != ConnectionStatus::Connected {
            return;
        }
        let (Some(me), Some(room_id)) = (self.local_user(), self.rooms.active_room()) else {
            return;
        };

        let unread = self.store.unacknowledged_from_others(me);
        for &message_id in &unread {
            self.emit(Payload::ReadMessage(ReadMessage { message_id }), Some(room_id), out);
        }
        self.store.mark_acknowledged(unread);
    }

    fn emit_typing(&self, signal: TypingSignal, out: &mut Vec<ClientAction>) {
        let (payload, room_id) = match signal {
            TypingSignal::Start(room_id) => (Payload::Typing(Typing { room_id }), room_id),
            TypingSignal::Stop(room_id) => (Payload::StopTyping(StopTyping { room_id }), room_id),
        };
        self.emit(payload, Some(room_id), out);
    }

    /// Queue a frame if the connection can carry it.
    ///
    /// Outbound frames are dropped, not buffered, while disconnected.
    fn emit(&self, payload: Payload, room_id: Option<RoomId>, out: &mut Vec<ClientAction>) {
        let kind = payload.kind();
        match self.connection.send(payload, room_id) {
            Ok(ConnectionAction::SendFrame(frame)) => out.push(ClientAction::Send(frame)),
            Ok(_) => {},
            Err(e) => tracing::debug!(event = %kind, error = %e, "frame not sent"),
        }
    }
}

fn patched(outcome: PatchOutcome, event: EventKind, message_id: MessageId, out: &mut Vec<ClientAction>) {
    match outcome {
        PatchOutcome::Applied => out.push(ClientAction::StateChanged),
        PatchOutcome::Unchanged => {},
        PatchOutcome::Unknown => {
            let error = ClientError::StaleReference { event, message_id };
            tracing::debug!(%error, "ignoring patch");
        },
    }
}

/// Keep a single `StateChanged`, at the position of the last one.
fn coalesce_state_changes(actions: Vec<ClientAction>) -> Vec<ClientAction> {
    let Some(last) = actions.iter().rposition(|a| *a == ClientAction::StateChanged) else {
        return actions;
    };

    actions
        .into_iter()
        .enumerate()
        .filter(|(i, a)| *a != ClientAction::StateChanged || *i == last)
        .map(|(_, a)| a)
        .collect()
}

