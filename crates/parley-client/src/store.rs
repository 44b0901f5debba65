//! Message synchronization store.
//!
//! Holds the ordered messages of the active room and reconciles locally sent
//! optimistic entries with what the server pushes back.
//!
//! # Echo reconciliation
//!
//! A send is appended immediately under a temporary [`LocalId`] with
//! [`DeliveryStatus::Pending`]. When a create arrives that was authored by
//! the local user, it replaces the oldest unconfirmed local entry with the
//! same content in place: the entry keeps its position and gains the server
//! id. A create that matches nothing is appended. An entry whose echo does not
//! arrive within the timeout becomes [`DeliveryStatus::Failed`] and stays in
//! the sequence until the user retries it; a late echo still confirms it.
//!
//! # Invariants
//!
//! - Server ids are unique across the sequence.
//! - Entries are never removed outside [`MessageStore::clear`]; deletes
//!   tombstone in place.
//! - `readers` only grows.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    fmt,
    ops::Sub,
    time::Duration,
};

use parley_proto::{
    MessageId, Timestamp, UserId,
    payloads::message::{MessageDeleted, MessageRecord},
};

/// Temporary id of a locally sent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalId(u64);

impl LocalId {
    /// Raw value.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local-{}", self.0)
    }
}

/// Identity of an entry in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    /// Confirmed by the server.
    Server(MessageId),
    /// Optimistic, not yet echoed.
    Local(LocalId),
}

/// Delivery state of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Sent, waiting for the server echo.
    Pending,
    /// Confirmed by the server (or received from someone else).
    Sent,
    /// Echo did not arrive in time. Retry is up to the user.
    Failed,
}

/// A message as held by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Current identity
    pub key: MessageKey,
    /// Temporary id this entry was sent under, if it originated locally
    pub local_id: Option<LocalId>,
    /// Author
    pub author_id: UserId,
    /// Author display name
    pub author_name: String,
    /// Text (or tombstone text once deleted)
    pub content: String,
    /// Creation time (Unix millis, UTC)
    pub created_at: Timestamp,
    /// Last edit time
    pub edited_at: Option<Timestamp>,
    /// Tombstone flag
    pub is_deleted: bool,
    /// Deletion time, when the server sent one
    pub deleted_at: Option<Timestamp>,
    /// Users who acknowledged the message
    pub readers: BTreeSet<UserId>,
    /// Delivery state
    pub status: DeliveryStatus,
}

impl Message {
    /// Server id. `None` while unconfirmed.
    #[must_use]
    pub fn id(&self) -> Option<MessageId> {
        match self.key {
            MessageKey::Server(id) => Some(id),
            MessageKey::Local(_) => None,
        }
    }

    /// True once the message has been edited.
    #[must_use]
    pub fn is_edited(&self) -> bool {
        self.edited_at.is_some()
    }

    fn from_record(record: MessageRecord) -> Self {
        Self {
            key: MessageKey::Server(record.id),
            local_id: None,
            author_id: record.author_id,
            author_name: record.author_name,
            content: record.content,
            created_at: record.created_at,
            edited_at: record.edited_at,
            is_deleted: record.is_deleted,
            deleted_at: None,
            readers: record.readers.into_iter().collect(),
            status: DeliveryStatus::Sent,
        }
    }

    /// Fold an authoritative record into this entry.
    fn absorb(&mut self, record: MessageRecord) {
        self.key = MessageKey::Server(record.id);
        self.status = DeliveryStatus::Sent;
        self.created_at = record.created_at;
        self.author_name = record.author_name;
        self.readers.extend(record.readers);

        if record.is_deleted {
            self.is_deleted = true;
            self.content = record.content;
        } else if !self.is_deleted && record.edited_at >= self.edited_at {
            self.content = record.content;
            self.edited_at = record.edited_at;
        }
    }

    fn is_unconfirmed(&self) -> bool {
        matches!(self.key, MessageKey::Local(_))
    }
}

/// Result of applying a create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// New entry appended at `index`.
    Appended {
        /// Position in the sequence
        index: usize,
    },
    /// An optimistic entry was confirmed in place.
    Confirmed {
        /// Position in the sequence
        index: usize,
        /// The local id that was confirmed
        local_id: LocalId,
    },
    /// The id was already present; nothing changed.
    Duplicate,
}

/// Result of applying an edit, delete or read receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The entry changed.
    Applied,
    /// The entry exists but the patch changed nothing.
    Unchanged,
    /// No entry with that id.
    Unknown,
}

/// Ordered message set for one room.
#[derive(Debug, Clone)]
pub struct MessageStore<I> {
    messages: Vec<Message>,
    by_id: HashMap<MessageId, usize>,
    by_local: HashMap<LocalId, usize>,
    in_flight: BTreeMap<LocalId, I>,
    acknowledged: HashSet<MessageId>,
    next_local: u64,
}

impl<I> Default for MessageStore<I> {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            by_id: HashMap::new(),
            by_local: HashMap::new(),
            in_flight: BTreeMap::new(),
            acknowledged: HashSet::new(),
            next_local: 0,
        }
    }
}

impl<I> MessageStore<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages in order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of entries, tombstones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True if the store holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Message with the given server id.
    #[must_use]
    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.by_id.get(&id).map(|&i| &self.messages[i])
    }

    /// Message sent under the given local id.
    #[must_use]
    pub fn get_local(&self, local_id: LocalId) -> Option<&Message> {
        self.by_local.get(&local_id).map(|&i| &self.messages[i])
    }

    /// Position of the message with the given server id.
    #[must_use]
    pub fn position(&self, id: MessageId) -> Option<usize> {
        self.by_id.get(&id).copied()
    }

    /// Number of sends still waiting for their echo.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Drop everything. Local ids are never reused.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.by_id.clear();
        self.by_local.clear();
        self.in_flight.clear();
        self.acknowledged.clear();
    }

    /// Append an optimistic entry for a local send.
    pub fn push_local(
        &mut self,
        author_id: UserId,
        author_name: impl Into<String>,
        content: impl Into<String>,
        created_at: Timestamp,
        now: I,
    ) -> LocalId {
        let local_id = LocalId(self.next_local);
        self.next_local += 1;

        self.by_local.insert(local_id, self.messages.len());
        self.in_flight.insert(local_id, now);
        self.messages.push(Message {
            key: MessageKey::Local(local_id),
            local_id: Some(local_id),
            author_id,
            author_name: author_name.into(),
            content: content.into(),
            created_at,
            edited_at: None,
            is_deleted: false,
            deleted_at: None,
            readers: BTreeSet::new(),
            status: DeliveryStatus::Pending,
        });

        local_id
    }

    /// Apply a create event.
    ///
    /// `local_user` enables echo matching; pass `None` before authentication.
    pub fn create(&mut self, record: MessageRecord, local_user: Option<UserId>) -> CreateOutcome {
        if self.by_id.contains_key(&record.id) {
            return CreateOutcome::Duplicate;
        }

        let id = record.id;
        if Some(record.author_id) == local_user
            && let Some((index, local_id)) = self.find_unconfirmed(&record.content)
        {
            self.confirm(index, local_id, record);
            return CreateOutcome::Confirmed { index, local_id };
        }

        let index = self.messages.len();
        self.messages.push(Message::from_record(record));
        self.by_id.insert(id, index);
        CreateOutcome::Appended { index }
    }

    /// Apply an edit.
    ///
    /// Tombstones are not resurrected by late edits, and an edit older than
    /// the one already held (a frame queued before a history reseed) loses.
    pub fn edit(&mut self, id: MessageId, content: String, edited_at: Timestamp) -> PatchOutcome {
        let Some(&index) = self.by_id.get(&id) else {
            return PatchOutcome::Unknown;
        };

        let msg = &mut self.messages[index];
        if msg.is_deleted
            || msg.edited_at.is_some_and(|held| held > edited_at)
            || (msg.content == content && msg.edited_at == Some(edited_at))
        {
            return PatchOutcome::Unchanged;
        }

        msg.content = content;
        msg.edited_at = Some(edited_at);
        PatchOutcome::Applied
    }

    /// Tombstone a message in place, merging any fields the server sent.
    pub fn delete(&mut self, deleted: MessageDeleted) -> PatchOutcome {
        let Some(&index) = self.by_id.get(&deleted.id) else {
            return PatchOutcome::Unknown;
        };

        let msg = &mut self.messages[index];
        msg.is_deleted = true;
        if let Some(content) = deleted.content {
            msg.content = content;
        }
        if deleted.deleted_at.is_some() {
            msg.deleted_at = deleted.deleted_at;
        }
        PatchOutcome::Applied
    }

    /// Union `readers` into a message's reader set.
    pub fn read(&mut self, id: MessageId, readers: impl IntoIterator<Item = UserId>) -> PatchOutcome {
        let Some(&index) = self.by_id.get(&id) else {
            return PatchOutcome::Unknown;
        };

        let set = &mut self.messages[index].readers;
        let before = set.len();
        set.extend(readers);

        if set.len() > before { PatchOutcome::Applied } else { PatchOutcome::Unchanged }
    }

    /// Mark sends older than `timeout` as failed. Returns the newly failed ids.
    pub fn expire(&mut self, now: I, timeout: Duration) -> Vec<LocalId> {
        let expired: Vec<LocalId> = self
            .in_flight
            .iter()
            .filter(|&(_, &sent_at)| now - sent_at >= timeout)
            .map(|(&local_id, _)| local_id)
            .collect();

        for local_id in &expired {
            self.in_flight.remove(local_id);
            if let Some(&index) = self.by_local.get(local_id) {
                self.messages[index].status = DeliveryStatus::Failed;
            }
        }

        expired
    }

    /// Put a failed send back in flight. Returns its content for resending.
    pub fn retry(&mut self, local_id: LocalId, now: I) -> Option<&Message> {
        let index = *self.by_local.get(&local_id)?;
        let msg = &mut self.messages[index];
        if msg.status != DeliveryStatus::Failed || !msg.is_unconfirmed() {
            return None;
        }

        msg.status = DeliveryStatus::Pending;
        self.in_flight.insert(local_id, now);
        Some(&self.messages[index])
    }

    /// Merge a history snapshot.
    ///
    /// History entries come first, in id order. Live entries already present
    /// absorb their history counterpart; optimistic entries whose echo is in
    /// the snapshot are confirmed. Every other entry already in the store
    /// (pending sends, live arrivals) stays right after the entry it followed
    /// before the merge, so a reseed after reconnect does not move confirmed
    /// messages or tombstones past them. Entries that followed nothing in the
    /// snapshot go last, in their prior order.
    pub fn seed(&mut self, mut records: Vec<MessageRecord>, local_user: Option<UserId>) {
        records.sort_by_key(|r| r.id);
        records.dedup_by_key(|r| r.id);

        let mut old: Vec<Option<Message>> =
            std::mem::take(&mut self.messages).into_iter().map(Some).collect();
        let mut placed: Vec<Option<usize>> = vec![None; old.len()];
        let mut rebuilt = Vec::with_capacity(records.len() + old.len());

        for record in records {
            let existing = self.by_id.get(&record.id).copied().or_else(|| {
                if Some(record.author_id) == local_user {
                    old.iter().position(|slot| {
                        slot.as_ref().is_some_and(|m| {
                            m.is_unconfirmed() && m.content == record.content
                        })
                    })
                } else {
                    None
                }
            });

            match existing.and_then(|i| old[i].take().map(|msg| (i, msg))) {
                Some((i, mut msg)) => {
                    if let Some(local_id) = msg.local_id.filter(|_| msg.is_unconfirmed()) {
                        self.in_flight.remove(&local_id);
                    }
                    msg.absorb(record);
                    placed[i] = Some(rebuilt.len());
                    rebuilt.push(msg);
                },
                None => rebuilt.push(Message::from_record(record)),
            }
        }

        // Leftovers follow the nearest earlier entry that made it into the
        // snapshot.
        let mut after: Vec<Vec<Message>> =
            std::iter::repeat_with(Vec::new).take(rebuilt.len()).collect();
        let mut trailing = Vec::new();
        let mut anchor: Option<usize> = None;
        for (slot, position) in old.into_iter().zip(placed) {
            match (slot, position) {
                (Some(msg), _) => match anchor {
                    Some(at) => after[at].push(msg),
                    None => trailing.push(msg),
                },
                (None, Some(at)) => anchor = Some(at),
                (None, None) => {},
            }
        }

        self.messages = rebuilt
            .into_iter()
            .zip(after)
            .flat_map(|(msg, followers)| std::iter::once(msg).chain(followers))
            .chain(trailing)
            .collect();
        self.reindex();
    }

    /// Confirmed messages from others that the local user has not
    /// acknowledged yet.
    #[must_use]
    pub fn unacknowledged_from_others(&self, local_user: UserId) -> Vec<MessageId> {
        self.messages
            .iter()
            .filter(|m| m.author_id != local_user && !m.is_deleted)
            .filter(|m| !m.readers.contains(&local_user))
            .filter_map(Message::id)
            .filter(|id| !self.acknowledged.contains(id))
            .collect()
    }

    /// Record that read receipts were emitted for `ids`.
    pub fn mark_acknowledged(&mut self, ids: impl IntoIterator<Item = MessageId>) {
        self.acknowledged.extend(ids);
    }

    fn find_unconfirmed(&self, content: &str) -> Option<(usize, LocalId)> {
        // Oldest first: echoes arrive in send order.
        self.messages.iter().enumerate().find_map(|(index, m)| match m.key {
            MessageKey::Local(local_id)
                if m.status != DeliveryStatus::Sent && m.content == content =>
            {
                Some((index, local_id))
            },
            _ => None,
        })
    }

    fn confirm(&mut self, index: usize, local_id: LocalId, record: MessageRecord) {
        self.by_id.insert(record.id, index);
        self.in_flight.remove(&local_id);
        self.messages[index].absorb(record);
    }

    fn reindex(&mut self) {
        self.by_id.clear();
        self.by_local.clear();
        for (index, msg) in self.messages.iter().enumerate() {
            if let Some(id) = msg.id() {
                self.by_id.insert(id, index);
            }
            if let Some(local_id) = msg.local_id {
                self.by_local.insert(local_id, index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    const ME: UserId = 3;

    fn record(id: MessageId, author_id: UserId, content: &str) -> MessageRecord {
        MessageRecord {
            id,
            author_id,
            author_name: format!("user{author_id}"),
            content: content.to_string(),
            created_at: 1_000 + id,
            edited_at: None,
            is_deleted: false,
            readers: Vec::new(),
        }
    }

    #[test]
    fn echo_replaces_optimistic_entry_in_place() {
        let now = Instant::now();
        let mut store = MessageStore::new();
        store.create(record(1, 7, "hi"), Some(ME));
        let local = store.push_local(ME, "me", "hello", 5, now);
        store.create(record(2, 7, "yo"), Some(ME));

        let outcome = store.create(record(3, ME, "hello"), Some(ME));

        assert_eq!(outcome, CreateOutcome::Confirmed { index: 1, local_id: local });
        assert_eq!(store.len(), 3);
        assert_eq!(store.get(3).map(|m| m.status), Some(DeliveryStatus::Sent));
        assert_eq!(store.get_local(local).and_then(Message::id), Some(3));
        assert_eq!(store.in_flight(), 0);
    }

    #[test]
    fn identical_sends_confirm_in_send_order() {
        let now = Instant::now();
        let mut store = MessageStore::new();
        let first = store.push_local(ME, "me", "ok", 1, now);
        let second = store.push_local(ME, "me", "ok", 2, now);

        assert_eq!(
            store.create(record(10, ME, "ok"), Some(ME)),
            CreateOutcome::Confirmed { index: 0, local_id: first }
        );
        assert_eq!(
            store.create(record(11, ME, "ok"), Some(ME)),
            CreateOutcome::Confirmed { index: 1, local_id: second }
        );
    }

    #[test]
    fn own_message_from_elsewhere_is_appended() {
        let mut store: MessageStore<Instant> = MessageStore::new();
        let outcome = store.create(record(4, ME, "sent from another device"), Some(ME));
        assert_eq!(outcome, CreateOutcome::Appended { index: 0 });
    }

    #[test]
    fn unconfirmed_send_fails_after_timeout_and_late_echo_recovers_it() {
        let now = Instant::now();
        let timeout = Duration::from_secs(10);
        let mut store = MessageStore::new();
        let local = store.push_local(ME, "me", "slow", 1, now);

        assert!(store.expire(now + Duration::from_secs(9), timeout).is_empty());
        assert_eq!(store.expire(now + timeout, timeout), vec![local]);
        assert_eq!(store.get_local(local).map(|m| m.status), Some(DeliveryStatus::Failed));
        assert_eq!(store.len(), 1);

        store.create(record(20, ME, "slow"), Some(ME));
        assert_eq!(store.get_local(local).map(|m| m.status), Some(DeliveryStatus::Sent));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn retry_only_from_failed() {
        let now = Instant::now();
        let timeout = Duration::from_secs(10);
        let mut store = MessageStore::new();
        let local = store.push_local(ME, "me", "again", 1, now);

        assert!(store.retry(local, now).is_none());

        store.expire(now + timeout, timeout);
        let retried = store.retry(local, now + timeout).map(|m| m.content.clone());
        assert_eq!(retried.as_deref(), Some("again"));
        assert_eq!(store.in_flight(), 1);
    }

    #[test]
    fn patches_on_unknown_ids_are_no_ops() {
        let mut store: MessageStore<Instant> = MessageStore::new();
        store.create(record(1, 7, "a"), Some(ME));

        assert_eq!(store.edit(555, "x".into(), 1), PatchOutcome::Unknown);
        assert_eq!(
            store.delete(MessageDeleted { id: 555, room_id: None, content: None, deleted_at: None }),
            PatchOutcome::Unknown
        );
        assert_eq!(store.read(555, [9]), PatchOutcome::Unknown);
        assert_eq!(store.messages()[0].content, "a");
    }

    #[test]
    fn delete_merges_tombstone_and_blocks_later_edits() {
        let mut store: MessageStore<Instant> = MessageStore::new();
        store.create(record(1, 7, "secret"), Some(ME));

        store.delete(MessageDeleted {
            id: 1,
            room_id: Some(10),
            content: Some("This message was deleted".into()),
            deleted_at: Some(99),
        });
        assert_eq!(store.edit(1, "back".into(), 100), PatchOutcome::Unchanged);

        let msg = store.get(1).unwrap();
        assert!(msg.is_deleted);
        assert_eq!(msg.content, "This message was deleted");
        assert_eq!(msg.deleted_at, Some(99));
    }

    #[test]
    fn older_edit_loses_to_newer() {
        let mut store: MessageStore<Instant> = MessageStore::new();
        let mut seeded = record(1, 7, "second edit");
        seeded.edited_at = Some(200);
        store.seed(vec![seeded], Some(ME));

        assert_eq!(store.edit(1, "first edit".into(), 100), PatchOutcome::Unchanged);
        assert_eq!(store.get(1).unwrap().content, "second edit");

        assert_eq!(store.edit(1, "third edit".into(), 300), PatchOutcome::Applied);
        assert_eq!(store.get(1).unwrap().content, "third edit");
    }

    #[test]
    fn seed_keeps_pending_sends_and_merges_live_copies() {
        let now = Instant::now();
        let mut store = MessageStore::new();
        store.create(record(5, 7, "live"), Some(ME));
        store.read(5, [8]);
        let pending = store.push_local(ME, "me", "draft", 1, now);

        let mut history_copy = record(5, 7, "live");
        history_copy.readers = vec![9];
        store.seed(vec![record(4, 7, "old"), history_copy, record(3, 8, "older")], Some(ME));

        let ids: Vec<_> = store.messages().iter().map(Message::id).collect();
        assert_eq!(ids, vec![Some(3), Some(4), Some(5), None]);
        assert_eq!(store.get(5).unwrap().readers, BTreeSet::from([8, 9]));
        assert_eq!(store.get_local(pending).map(|m| m.status), Some(DeliveryStatus::Pending));
    }

    #[test]
    fn reseed_keeps_pending_sends_in_place() {
        let now = Instant::now();
        let mut store = MessageStore::new();
        store.seed(vec![record(1, 7, "a"), record(2, 7, "b")], Some(ME));
        let pending = store.push_local(ME, "me", "draft", 1, now);
        store.create(record(3, 7, "c"), Some(ME));
        store.delete(MessageDeleted { id: 3, room_id: None, content: None, deleted_at: None });
        assert_eq!(store.position(3), Some(3));

        let mut tombstone = record(3, 7, "c");
        tombstone.is_deleted = true;
        store.seed(vec![record(1, 7, "a"), record(2, 7, "b"), tombstone], Some(ME));

        let keys: Vec<_> = store.messages().iter().map(|m| m.key).collect();
        assert_eq!(keys, vec![
            MessageKey::Server(1),
            MessageKey::Server(2),
            MessageKey::Local(pending),
            MessageKey::Server(3),
        ]);
        assert_eq!(store.position(3), Some(3));
        assert!(store.get(3).unwrap().is_deleted);
        assert_eq!(store.get_local(pending).map(|m| m.status), Some(DeliveryStatus::Pending));
    }

    #[test]
    fn seed_confirms_echo_found_in_history() {
        let now = Instant::now();
        let mut store = MessageStore::new();
        let local = store.push_local(ME, "me", "early", 1, now);

        store.seed(vec![record(1, ME, "early")], Some(ME));

        assert_eq!(store.len(), 1);
        assert_eq!(store.get_local(local).and_then(Message::id), Some(1));
        assert_eq!(store.in_flight(), 0);
    }

    #[test]
    fn acknowledgements_are_emitted_once() {
        let mut store: MessageStore<Instant> = MessageStore::new();
        store.create(record(1, 7, "a"), Some(ME));
        store.create(record(2, ME, "mine"), Some(ME));
        store.create(record(3, 8, "b"), Some(ME));
        store.read(3, [ME]);

        let ids = store.unacknowledged_from_others(ME);
        assert_eq!(ids, vec![1]);

        store.mark_acknowledged(ids);
        assert!(store.unacknowledged_from_others(ME).is_empty());
    }
}
