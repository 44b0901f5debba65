//! In-memory chat server for simulation.
//!
//! `SimServer` plays the server side of the wire contract: the handshake,
//! room membership, message create/edit/delete/read broadcast, presence,
//! typing relay, and the history collaborator. It performs no I/O. Frames
//! go in through [`SimServer::receive`]; replies and broadcasts are queued in
//! per-session mailboxes that drivers drain with [`SimServer::take`].
//!
//! Iteration over sessions and rooms is ordered, so broadcast order is the
//! same on every run.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use parley_core::{Environment, connection::PROTOCOL_VERSION};
use parley_proto::{
    Frame, MessageId, Payload, RoomId, Timestamp, UserId,
    payloads::{
        message::{MessageDeleted, MessageEdited, MessageRead, MessageRecord, ReceiveMessage},
        presence::{OnlineUsers, UserOffline, UserOnline},
        room::{UserJoined, UserLeft},
        session::{ConnectError, HelloReply, ServerError},
        typing::{UserStopTyping, UserTyping},
    },
};

use crate::SimEnv;

/// Server-side session identifier.
pub type SessionId = u64;

/// Content the server substitutes for deleted messages.
pub const DELETED_CONTENT: &str = "This message was deleted";

/// An account the server accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimUser {
    /// Account id
    pub user_id: UserId,
    /// Display name
    pub username: String,
}

#[derive(Debug, Default)]
struct SimSession {
    user: Option<SimUser>,
    room: Option<RoomId>,
    mailbox: VecDeque<Frame>,
}

/// In-memory server.
#[derive(Debug)]
pub struct SimServer {
    env: SimEnv,
    accounts: HashMap<String, SimUser>,
    sessions: BTreeMap<SessionId, SimSession>,
    rooms: BTreeMap<RoomId, Vec<MessageRecord>>,
    next_message_id: MessageId,
    last_timestamp: Timestamp,
    reachable: bool,
}

impl SimServer {
    /// Create a server with no accounts and no rooms.
    pub fn new(env: SimEnv) -> Self {
        Self {
            env,
            accounts: HashMap::new(),
            sessions: BTreeMap::new(),
            rooms: BTreeMap::new(),
            next_message_id: 1,
            last_timestamp: 0,
            reachable: true,
        }
    }

    /// Accept `token` as `user_id` / `username`.
    pub fn register_user(&mut self, token: impl Into<String>, user_id: UserId, username: &str) {
        self.accounts
            .insert(token.into(), SimUser { user_id, username: username.to_string() });
    }

    /// Create an empty room. Existing rooms keep their messages.
    pub fn create_room(&mut self, room_id: RoomId) {
        self.rooms.entry(room_id).or_default();
    }

    /// While unreachable, [`SimServer::open`] refuses new sessions.
    pub fn set_reachable(&mut self, reachable: bool) {
        self.reachable = reachable;
    }

    /// Open a session. `None` if the server is unreachable.
    pub fn open(&mut self) -> Option<SessionId> {
        if !self.reachable {
            return None;
        }

        // Opaque, seeded ids; zero is never handed out.
        let session_id = loop {
            let candidate = self.env.random_u64();
            if candidate != 0 && !self.sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        self.sessions.insert(session_id, SimSession::default());
        tracing::debug!(session_id, "session opened");
        Some(session_id)
    }

    /// True while `session_id` has not been closed.
    pub fn is_open(&self, session_id: SessionId) -> bool {
        self.sessions.contains_key(&session_id)
    }

    /// Close a session, announcing the departure to everyone affected.
    pub fn close(&mut self, session_id: SessionId) {
        let Some(session) = self.sessions.remove(&session_id) else {
            return;
        };
        tracing::debug!(session_id, "session closed");

        let Some(user) = session.user else {
            return;
        };

        if let Some(room_id) = session.room {
            self.broadcast_room(
                room_id,
                Some(session_id),
                Payload::UserStopTyping(UserStopTyping {
                    user_id: user.user_id,
                    username: user.username.clone(),
                }),
            );
            self.broadcast_room(
                room_id,
                Some(session_id),
                Payload::UserLeft(UserLeft { username: user.username.clone() }),
            );
        }

        if !self.online_users().contains(&user.user_id) {
            self.broadcast_all(None, Payload::UserOffline(UserOffline { user_id: user.user_id }));
        }
    }

    /// True if frames are queued for `session_id`.
    pub fn has_mail(&self, session_id: SessionId) -> bool {
        self.sessions.get(&session_id).is_some_and(|s| !s.mailbox.is_empty())
    }

    /// Pop the next frame queued for `session_id`.
    pub fn take(&mut self, session_id: SessionId) -> Option<Frame> {
        self.sessions.get_mut(&session_id)?.mailbox.pop_front()
    }

    /// Queue a frame for `session_id` directly, bypassing the protocol.
    pub fn inject(&mut self, session_id: SessionId, payload: Payload, room_id: Option<RoomId>) {
        if let Some(frame) = encode(payload, room_id) {
            self.deliver(session_id, frame);
        }
    }

    /// History collaborator: every message of `room_id`, tombstones included.
    pub fn history(&self, room_id: RoomId) -> Option<Vec<MessageRecord>> {
        self.rooms.get(&room_id).cloned()
    }

    /// Authoritative messages of a room.
    pub fn messages(&self, room_id: RoomId) -> &[MessageRecord] {
        self.rooms.get(&room_id).map_or(&[], Vec::as_slice)
    }

    /// Users with at least one authenticated session.
    pub fn online_users(&self) -> BTreeSet<UserId> {
        self.sessions.values().filter_map(|s| s.user.as_ref()).map(|u| u.user_id).collect()
    }

    /// Users with a session joined to `room_id`.
    pub fn members(&self, room_id: RoomId) -> BTreeSet<UserId> {
        self.sessions
            .values()
            .filter(|s| s.room == Some(room_id))
            .filter_map(|s| s.user.as_ref())
            .map(|u| u.user_id)
            .collect()
    }

    /// Number of open sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Handle a frame sent by `session_id`.
    ///
    /// Protocol violations are answered with a server error frame, never by
    /// closing the session.
    pub fn receive(&mut self, session_id: SessionId, frame: &Frame) {
        if !self.sessions.contains_key(&session_id) {
            tracing::debug!(session_id, "frame for closed session");
            return;
        }

        let payload = match Payload::from_frame(frame) {
            Ok(payload) => payload,
            Err(e) => {
                self.reject(session_id, format!("malformed frame: {e}"));
                return;
            },
        };

        if let Payload::Hello(hello) = payload {
            self.hello(session_id, hello.version, &hello.token);
            return;
        }

        let Some(user) = self.user(session_id) else {
            self.reject(session_id, "not authenticated".to_string());
            return;
        };

        match payload {
            Payload::JoinRoom(join) => self.join(session_id, &user, join.room_id),
            Payload::LeaveRoom(leave) => self.leave(session_id, &user, leave.room_id),
            Payload::SendMessage(send) => {
                self.send_message(session_id, &user, send.room_id, send.content);
            },
            Payload::EditMessage(edit) => {
                self.edit_message(session_id, &user, edit.message_id, edit.content);
            },
            Payload::DeleteMessage(delete) => {
                self.delete_message(session_id, &user, delete.message_id);
            },
            Payload::ReadMessage(read) => self.read_message(session_id, &user, read.message_id),
            Payload::Typing(typing) => {
                if self.room_of(session_id) == Some(typing.room_id) {
                    self.broadcast_room(
                        typing.room_id,
                        Some(session_id),
                        Payload::UserTyping(UserTyping {
                            user_id: user.user_id,
                            username: user.username,
                        }),
                    );
                }
            },
            Payload::StopTyping(stop) => {
                if self.room_of(session_id) == Some(stop.room_id) {
                    self.broadcast_room(
                        stop.room_id,
                        Some(session_id),
                        Payload::UserStopTyping(UserStopTyping {
                            user_id: user.user_id,
                            username: user.username,
                        }),
                    );
                }
            },
            other => self.reject(session_id, format!("unexpected event {}", other.kind())),
        }
    }

    fn hello(&mut self, session_id: SessionId, version: u8, token: &str) {
        if self.user(session_id).is_some() {
            self.reject(session_id, "already authenticated".to_string());
            return;
        }

        if version != PROTOCOL_VERSION {
            let reason = format!("unsupported protocol version {version}");
            self.send(session_id, None, Payload::ConnectError(ConnectError { reason }));
            return;
        }

        let Some(user) = self.accounts.get(token).cloned() else {
            let reason = "invalid token".to_string();
            self.send(session_id, None, Payload::ConnectError(ConnectError { reason }));
            return;
        };

        let was_online = self.online_users().contains(&user.user_id);
        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.user = Some(user.clone());
        }

        self.send(
            session_id,
            None,
            Payload::HelloReply(HelloReply {
                user_id: user.user_id,
                username: user.username.clone(),
                session_id,
            }),
        );
        let user_ids = self.online_users().into_iter().collect();
        self.send(session_id, None, Payload::OnlineUsers(OnlineUsers { user_ids }));

        if !was_online {
            self.broadcast_all(
                Some(session_id),
                Payload::UserOnline(UserOnline { user_id: user.user_id }),
            );
        }
    }

    fn join(&mut self, session_id: SessionId, user: &SimUser, room_id: RoomId) {
        if !self.rooms.contains_key(&room_id) {
            self.reject(session_id, format!("room {room_id} not found"));
            return;
        }

        let previous = self.room_of(session_id);
        if previous == Some(room_id) {
            return;
        }
        if let Some(previous) = previous {
            self.leave(session_id, user, previous);
        }

        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.room = Some(room_id);
        }
        self.broadcast_room(
            room_id,
            Some(session_id),
            Payload::UserJoined(UserJoined { username: user.username.clone() }),
        );
    }

    fn leave(&mut self, session_id: SessionId, user: &SimUser, room_id: RoomId) {
        if self.room_of(session_id) != Some(room_id) {
            return;
        }

        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.room = None;
        }
        self.broadcast_room(
            room_id,
            None,
            Payload::UserLeft(UserLeft { username: user.username.clone() }),
        );
    }

    fn send_message(&mut self, session_id: SessionId, user: &SimUser, room_id: RoomId, content: String) {
        if self.room_of(session_id) != Some(room_id) {
            self.reject(session_id, format!("not a member of room {room_id}"));
            return;
        }
        if content.trim().is_empty() {
            self.reject(session_id, "message content is empty".to_string());
            return;
        }

        let record = MessageRecord {
            id: self.next_message_id,
            author_id: user.user_id,
            author_name: user.username.clone(),
            content,
            created_at: self.timestamp(),
            edited_at: None,
            is_deleted: false,
            readers: Vec::new(),
        };
        self.next_message_id += 1;

        let created = Payload::ReceiveMessage(ReceiveMessage {
            id: record.id,
            room_id,
            author_id: record.author_id,
            author_name: record.author_name.clone(),
            content: record.content.clone(),
            created_at: record.created_at,
        });
        self.rooms.entry(room_id).or_default().push(record);
        self.broadcast_room(room_id, None, created);
    }

    fn edit_message(&mut self, session_id: SessionId, user: &SimUser, id: MessageId, content: String) {
        if content.trim().is_empty() {
            self.reject(session_id, "message content is empty".to_string());
            return;
        }
        let edited_at = self.timestamp();
        let Some((room_id, record)) = self.own_message(session_id, user, id) else {
            return;
        };

        record.content.clone_from(&content);
        record.edited_at = Some(edited_at);
        self.broadcast_room(
            room_id,
            None,
            Payload::MessageEdited(MessageEdited { id, room_id: Some(room_id), content, edited_at }),
        );
    }

    fn delete_message(&mut self, session_id: SessionId, user: &SimUser, id: MessageId) {
        let deleted_at = self.timestamp();
        let Some((room_id, record)) = self.own_message(session_id, user, id) else {
            return;
        };

        record.is_deleted = true;
        record.content = DELETED_CONTENT.to_string();
        self.broadcast_room(
            room_id,
            None,
            Payload::MessageDeleted(MessageDeleted {
                id,
                room_id: Some(room_id),
                content: Some(DELETED_CONTENT.to_string()),
                deleted_at: Some(deleted_at),
            }),
        );
    }

    fn read_message(&mut self, session_id: SessionId, user: &SimUser, id: MessageId) {
        let Some(room_id) = self.room_of(session_id) else {
            return;
        };
        let Some(record) = self.rooms.get_mut(&room_id).and_then(|m| m.iter_mut().find(|r| r.id == id))
        else {
            tracing::debug!(session_id, message_id = id, "read for unknown message");
            return;
        };

        if record.author_id == user.user_id || record.readers.contains(&user.user_id) {
            return;
        }

        record.readers.push(user.user_id);
        let readers = record.readers.clone();
        self.broadcast_room(
            room_id,
            None,
            Payload::MessageRead(MessageRead { message_id: id, room_id: Some(room_id), readers }),
        );
    }

    /// Look up a live message authored by `user` in the session's room,
    /// rejecting the request otherwise.
    fn own_message(
        &mut self,
        session_id: SessionId,
        user: &SimUser,
        id: MessageId,
    ) -> Option<(RoomId, &mut MessageRecord)> {
        let problem = match self.room_of(session_id) {
            None => Some("not in a room".to_string()),
            Some(room_id) => match self.messages(room_id).iter().find(|r| r.id == id) {
                None => Some(format!("message {id} not found")),
                Some(r) if r.author_id != user.user_id => Some(format!("message {id} is not yours")),
                Some(r) if r.is_deleted => Some(format!("message {id} is deleted")),
                Some(_) => None,
            },
        };
        if let Some(problem) = problem {
            self.reject(session_id, problem);
            return None;
        }

        let room_id = self.room_of(session_id)?;
        let record = self.rooms.get_mut(&room_id)?.iter_mut().find(|r| r.id == id)?;
        Some((room_id, record))
    }

    /// Wall-clock millis, bumped so that no two mutations share a stamp.
    fn timestamp(&mut self) -> Timestamp {
        self.last_timestamp = self.env.wall_clock_millis().max(self.last_timestamp + 1);
        self.last_timestamp
    }

    fn user(&self, session_id: SessionId) -> Option<SimUser> {
        self.sessions.get(&session_id)?.user.clone()
    }

    fn room_of(&self, session_id: SessionId) -> Option<RoomId> {
        self.sessions.get(&session_id)?.room
    }

    fn reject(&mut self, session_id: SessionId, message: String) {
        tracing::debug!(session_id, %message, "rejecting request");
        self.send(session_id, None, Payload::ServerError(ServerError { message }));
    }

    fn send(&mut self, session_id: SessionId, room_id: Option<RoomId>, payload: Payload) {
        if let Some(frame) = encode(payload, room_id) {
            self.deliver(session_id, frame);
        }
    }

    /// Send to every authenticated session in `room_id` except `exclude`.
    fn broadcast_room(&mut self, room_id: RoomId, exclude: Option<SessionId>, payload: Payload) {
        let Some(frame) = encode(payload, Some(room_id)) else {
            return;
        };
        for (&session_id, session) in &mut self.sessions {
            if Some(session_id) != exclude && session.user.is_some() && session.room == Some(room_id) {
                session.mailbox.push_back(frame.clone());
            }
        }
    }

    /// Send to every authenticated session except `exclude`.
    fn broadcast_all(&mut self, exclude: Option<SessionId>, payload: Payload) {
        let Some(frame) = encode(payload, None) else {
            return;
        };
        for (&session_id, session) in &mut self.sessions {
            if Some(session_id) != exclude && session.user.is_some() {
                session.mailbox.push_back(frame.clone());
            }
        }
    }

    fn deliver(&mut self, session_id: SessionId, frame: Frame) {
        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.mailbox.push_back(frame);
        }
    }
}

fn encode(payload: Payload, room_id: Option<RoomId>) -> Option<Frame> {
    let kind = payload.kind();
    match payload.into_frame(room_id) {
        Ok(frame) => Some(frame),
        Err(e) => {
            tracing::error!(%kind, error = %e, "failed to encode server frame");
            None
        },
    }
}

/// Server shared by every driver in a simulation.
#[derive(Debug, Clone)]
pub struct SharedSimServer(Arc<Mutex<SimServer>>);

impl SharedSimServer {
    /// Share `server`.
    pub fn new(server: SimServer) -> Self {
        Self(Arc::new(Mutex::new(server)))
    }

    /// Lock the server. A poisoned lock is recovered; the server holds no
    /// invariants a panicking test could break halfway.
    pub fn lock(&self) -> MutexGuard<'_, SimServer> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
