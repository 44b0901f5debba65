//! Client-side invariants: message identity, tombstones, read receipts,
//! presence and typing.

use std::collections::HashSet;

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// A server id appears at most once in a client's message sequence.
///
/// Repeated create events and echoes of optimistic sends must never
/// produce a second entry.
pub struct UniqueMessageIds;

impl Invariant for UniqueMessageIds {
    fn name(&self) -> &'static str {
        "unique_message_ids"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            let mut seen = HashSet::new();
            for id in client.messages.iter().filter_map(|m| m.id) {
                if !seen.insert(id) {
                    return Err(Violation::new(self.name(), client.id, format!("message {id} appears twice")));
                }
            }
        }
        Ok(())
    }
}

/// A message once seen deleted stays in the sequence, still deleted.
pub struct TombstonesPersist;

impl Invariant for TombstonesPersist {
    fn name(&self) -> &'static str {
        "tombstones_persist"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            for &id in &client.prior_tombstones {
                match client.messages.iter().find(|m| m.id == Some(id)) {
                    Some(msg) if msg.is_deleted => {},
                    Some(_) => {
                        return Err(Violation::new(
                            self.name(),
                            client.id,
                            format!("message {id} was resurrected"),
                        ));
                    },
                    None => {
                        return Err(Violation::new(
                            self.name(),
                            client.id,
                            format!("tombstone {id} was removed"),
                        ));
                    },
                }
            }
        }
        Ok(())
    }
}

/// Reader sets only grow within a room session.
pub struct ReadersMonotonic;

impl Invariant for ReadersMonotonic {
    fn name(&self) -> &'static str {
        "readers_monotonic"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            for msg in &client.messages {
                let Some(id) = msg.id else { continue };
                if let Some(&before) = client.prior_readers.get(&id)
                    && msg.readers < before
                {
                    return Err(Violation::new(
                        self.name(),
                        client.id,
                        format!("readers of {id} shrank {before} -> {}", msg.readers),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// An authenticated user always sees themselves online, seed or not.
pub struct SelfOnline;

impl Invariant for SelfOnline {
    fn name(&self) -> &'static str {
        "self_online"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            if client.connected
                && let Some(user_id) = client.user_id
                && !client.online_users.contains(&user_id)
            {
                return Err(Violation::new(self.name(), client.id, format!("user {user_id} is not online")));
            }
        }
        Ok(())
    }
}

/// The local user's own typing echo never shows up as a remote typist.
pub struct NoSelfTyping;

impl Invariant for NoSelfTyping {
    fn name(&self) -> &'static str {
        "no_self_typing"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            if let Some(user_id) = client.user_id
                && client.typing_users.contains(&user_id)
            {
                return Err(Violation::new(self.name(), client.id, "sees itself typing"));
            }
        }
        Ok(())
    }
}

/// Typing indicators exist only inside an active room.
pub struct TypingRequiresRoom;

impl Invariant for TypingRequiresRoom {
    fn name(&self) -> &'static str {
        "typing_requires_room"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            if client.active_room.is_none() && !client.typing_users.is_empty() {
                return Err(Violation::new(
                    self.name(),
                    client.id,
                    format!("{:?} typing with no active room", client.typing_users),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use parley_client::DeliveryStatus;

    use super::*;
    use crate::invariants::{ClientSnapshot, MessageSnapshot};

    fn message(id: u64, is_deleted: bool, readers: usize) -> MessageSnapshot {
        MessageSnapshot { id: Some(id), is_deleted, readers, status: DeliveryStatus::Sent }
    }

    #[test]
    fn duplicate_ids_violate() {
        let client = ClientSnapshot::new(0)
            .with_message(message(1, false, 0))
            .with_message(message(1, false, 0));

        assert!(UniqueMessageIds.check(&SystemSnapshot::single(client)).is_err());
    }

    #[test]
    fn unconfirmed_messages_are_not_duplicates() {
        let pending =
            MessageSnapshot { id: None, is_deleted: false, readers: 0, status: DeliveryStatus::Pending };
        let client = ClientSnapshot::new(0).with_message(pending.clone()).with_message(pending);

        assert!(UniqueMessageIds.check(&SystemSnapshot::single(client)).is_ok());
    }

    #[test]
    fn resurrected_tombstone_violates() {
        let mut client = ClientSnapshot::new(0).with_message(message(5, false, 0));
        client.prior_tombstones.insert(5);

        let violation = TombstonesPersist.check(&SystemSnapshot::single(client)).unwrap_err();
        assert!(violation.message.contains("resurrected"));
    }

    #[test]
    fn shrinking_readers_violate() {
        let mut client = ClientSnapshot::new(0).with_message(message(5, false, 1));
        client.prior_readers.insert(5, 2);

        assert!(ReadersMonotonic.check(&SystemSnapshot::single(client)).is_err());
    }

    #[test]
    fn self_online_only_checked_while_connected() {
        let mut client = ClientSnapshot::new(0);
        client.user_id = Some(3);

        assert!(SelfOnline.check(&SystemSnapshot::single(client.clone())).is_ok());

        client.connected = true;
        assert!(SelfOnline.check(&SystemSnapshot::single(client.clone())).is_err());

        client.online_users.insert(3);
        assert!(SelfOnline.check(&SystemSnapshot::single(client)).is_ok());
    }
}
