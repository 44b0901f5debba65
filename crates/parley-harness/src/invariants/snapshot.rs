//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture what a user of the client could observe at one point in
//! time. Invariants operate on snapshots rather than live state so a check
//! never sees a half-applied event.

use std::collections::{BTreeMap, BTreeSet};

use parley_app::ChatView;
use parley_client::{
    Client, ConnectionStatus, DeliveryStatus, Environment, Message, MessageId, RoomId, UserId,
};

/// Snapshot of the entire system state.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Per-client state snapshots.
    pub clients: Vec<ClientSnapshot>,
}

impl SystemSnapshot {
    /// Create an empty snapshot (no clients).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a snapshot with a single client.
    pub fn single(client: ClientSnapshot) -> Self {
        Self { clients: vec![client] }
    }

    /// Create a snapshot from multiple clients.
    pub fn from_clients(clients: Vec<ClientSnapshot>) -> Self {
        Self { clients }
    }

    /// Add a client snapshot.
    pub fn add_client(&mut self, client: ClientSnapshot) {
        self.clients.push(client);
    }
}

/// One message as a snapshot sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSnapshot {
    /// Server id, `None` while unconfirmed.
    pub id: Option<MessageId>,
    /// Tombstone flag.
    pub is_deleted: bool,
    /// Number of readers.
    pub readers: usize,
    /// Delivery status.
    pub status: DeliveryStatus,
}

impl From<&Message> for MessageSnapshot {
    fn from(msg: &Message) -> Self {
        Self {
            id: msg.id(),
            is_deleted: msg.is_deleted,
            readers: msg.readers.len(),
            status: msg.status,
        }
    }
}

/// Snapshot of a single client's observable state.
#[derive(Debug, Clone, Default)]
pub struct ClientSnapshot {
    /// Client identifier within the simulation.
    pub id: u64,
    /// True while the connection is authenticated.
    pub connected: bool,
    /// Authenticated user.
    pub user_id: Option<UserId>,
    /// Active room.
    pub active_room: Option<RoomId>,
    /// Messages of the active room, in display order.
    pub messages: Vec<MessageSnapshot>,
    /// Users the client considers online.
    pub online_users: BTreeSet<UserId>,
    /// Remote users shown as typing.
    pub typing_users: Vec<UserId>,
    /// Ids seen tombstoned in earlier snapshots of the same room session.
    pub prior_tombstones: BTreeSet<MessageId>,
    /// Reader counts seen in earlier snapshots of the same room session.
    pub prior_readers: BTreeMap<MessageId, usize>,
}

impl ClientSnapshot {
    /// Create a new client snapshot.
    pub fn new(id: u64) -> Self {
        Self { id, ..Default::default() }
    }

    /// Snapshot a rendered view.
    pub fn from_view(id: u64, view: &ChatView) -> Self {
        Self {
            id,
            connected: view.status == ConnectionStatus::Connected,
            user_id: view.identity.as_ref().map(|i| i.user_id),
            active_room: view.active_room,
            messages: view.messages.iter().map(MessageSnapshot::from).collect(),
            online_users: view.online_users.iter().copied().collect(),
            typing_users: view.typing_users.iter().map(|(user_id, _)| *user_id).collect(),
            ..Self::new(id)
        }
    }

    /// Snapshot a client directly.
    pub fn from_client<E: Environment>(id: u64, client: &Client<E>) -> Self {
        Self {
            id,
            connected: client.status() == ConnectionStatus::Connected,
            user_id: client.identity().map(|i| i.user_id),
            active_room: client.active_room(),
            messages: client.messages().iter().map(MessageSnapshot::from).collect(),
            online_users: client.presence().online_users().into_iter().collect(),
            typing_users: client.typing_users().into_iter().map(|(user_id, _)| user_id).collect(),
            ..Self::new(id)
        }
    }

    /// Set active room.
    #[must_use]
    pub fn with_active_room(mut self, room_id: Option<RoomId>) -> Self {
        self.active_room = room_id;
        self
    }

    /// Append a message.
    #[must_use]
    pub fn with_message(mut self, message: MessageSnapshot) -> Self {
        self.messages.push(message);
        self
    }
}

/// Facts carried from one snapshot of a client to the next.
///
/// Selecting a room starts a fresh store, so the carried facts reset
/// whenever the active room changes.
#[derive(Debug, Clone, Default)]
pub struct SnapshotHistory {
    room: Option<RoomId>,
    tombstones: BTreeSet<MessageId>,
    readers: BTreeMap<MessageId, usize>,
}

impl SnapshotHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach what earlier snapshots showed to `snapshot`, then fold
    /// `snapshot` into the history.
    pub fn record(&mut self, snapshot: &mut ClientSnapshot) {
        if snapshot.active_room != self.room {
            *self = Self { room: snapshot.active_room, ..Self::default() };
        }

        snapshot.prior_tombstones.clone_from(&self.tombstones);
        snapshot.prior_readers.clone_from(&self.readers);

        for msg in &snapshot.messages {
            let Some(id) = msg.id else { continue };
            if msg.is_deleted {
                self.tombstones.insert(id);
            }
            let seen = self.readers.entry(id).or_insert(0);
            *seen = (*seen).max(msg.readers);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: MessageId, is_deleted: bool, readers: usize) -> MessageSnapshot {
        MessageSnapshot { id: Some(id), is_deleted, readers, status: DeliveryStatus::Sent }
    }

    #[test]
    fn history_carries_facts_forward() {
        let mut history = SnapshotHistory::new();
        let mut first = ClientSnapshot::new(0)
            .with_active_room(Some(10))
            .with_message(message(1, true, 2));
        history.record(&mut first);
        assert!(first.prior_tombstones.is_empty());

        let mut second = ClientSnapshot::new(0).with_active_room(Some(10));
        history.record(&mut second);
        assert!(second.prior_tombstones.contains(&1));
        assert_eq!(second.prior_readers.get(&1), Some(&2));
    }

    #[test]
    fn room_change_resets_history() {
        let mut history = SnapshotHistory::new();
        let mut first = ClientSnapshot::new(0)
            .with_active_room(Some(10))
            .with_message(message(1, true, 0));
        history.record(&mut first);

        let mut second = ClientSnapshot::new(0).with_active_room(Some(20));
        history.record(&mut second);
        assert!(second.prior_tombstones.is_empty());
    }
}
