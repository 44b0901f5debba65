//! Owner-scoped subscriptions to wire events.
//!
//! Components never register callbacks. They subscribe an owner tag to a set
//! of [`EventKind`]s, and the connection manager tells the caller which owners
//! an incoming frame routes to. Lifetimes are explicit: every subscription is
//! tied to an owner and is released with [`Listeners::unsubscribe_owner`]
//! when that owner goes away (e.g. a room session ends).

use std::collections::BTreeMap;

use parley_proto::EventKind;

/// Handle for a single subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

/// Component that owns a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerOwner {
    /// The connection manager's own session events.
    Connection,
    /// One room-session activation.
    Room {
        /// Activation epoch the subscription belongs to
        epoch: u64,
    },
    /// The presence tracker.
    Presence,
}

#[derive(Debug, Clone)]
struct Subscription {
    owner: ListenerOwner,
    kinds: Vec<EventKind>,
}

/// Registry of active subscriptions.
#[derive(Debug, Clone, Default)]
pub struct Listeners {
    next_id: u64,
    entries: BTreeMap<ListenerId, Subscription>,
}

impl Listeners {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `owner` to `kinds`.
    pub fn subscribe(&mut self, owner: ListenerOwner, kinds: &[EventKind]) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.insert(id, Subscription { owner, kinds: kinds.to_vec() });
        id
    }

    /// Remove one subscription. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Remove every subscription held by `owner`. Returns how many were
    /// removed.
    pub fn unsubscribe_owner(&mut self, owner: ListenerOwner) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, sub| sub.owner != owner);
        before - self.entries.len()
    }

    /// Owners subscribed to `kind`, each listed once, in subscription order.
    #[must_use]
    pub fn route(&self, kind: EventKind) -> Vec<ListenerOwner> {
        let mut owners = Vec::new();
        for sub in self.entries.values() {
            if sub.kinds.contains(&kind) && !owners.contains(&sub.owner) {
                owners.push(sub.owner);
            }
        }
        owners
    }

    /// True if `owner` holds any subscription.
    #[must_use]
    pub fn has_owner(&self, owner: ListenerOwner) -> bool {
        self.entries.values().any(|sub| sub.owner == owner)
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_reaches_every_owner_once() {
        let mut listeners = Listeners::new();
        listeners.subscribe(ListenerOwner::Presence, &[EventKind::UserOnline]);
        listeners.subscribe(ListenerOwner::Presence, &[EventKind::UserOnline, EventKind::UserOffline]);
        listeners.subscribe(ListenerOwner::Room { epoch: 1 }, &[EventKind::ReceiveMessage]);

        assert_eq!(listeners.route(EventKind::UserOnline), vec![ListenerOwner::Presence]);
        assert_eq!(listeners.route(EventKind::ReceiveMessage), vec![ListenerOwner::Room {
            epoch: 1
        }]);
        assert!(listeners.route(EventKind::Typing).is_empty());
    }

    #[test]
    fn unsubscribe_owner_leaves_others_alone() {
        let mut listeners = Listeners::new();
        listeners.subscribe(ListenerOwner::Connection, &[EventKind::HelloReply]);
        listeners.subscribe(ListenerOwner::Presence, &[EventKind::OnlineUsers]);
        listeners.subscribe(ListenerOwner::Room { epoch: 4 }, &[EventKind::UserTyping]);

        assert_eq!(listeners.unsubscribe_owner(ListenerOwner::Connection), 1);
        assert!(!listeners.has_owner(ListenerOwner::Connection));
        assert!(listeners.has_owner(ListenerOwner::Presence));
        assert!(listeners.has_owner(ListenerOwner::Room { epoch: 4 }));
    }

    #[test]
    fn unsubscribe_by_id_is_idempotent() {
        let mut listeners = Listeners::new();
        let id = listeners.subscribe(ListenerOwner::Presence, &[EventKind::UserOnline]);

        assert!(listeners.unsubscribe(id));
        assert!(!listeners.unsubscribe(id));
        assert!(listeners.is_empty());
    }

    #[test]
    fn stale_epoch_does_not_receive_after_release() {
        let mut listeners = Listeners::new();
        listeners.subscribe(ListenerOwner::Room { epoch: 1 }, &[EventKind::MessageEdited]);
        listeners.unsubscribe_owner(ListenerOwner::Room { epoch: 1 });
        listeners.subscribe(ListenerOwner::Room { epoch: 2 }, &[EventKind::MessageEdited]);

        assert_eq!(listeners.route(EventKind::MessageEdited), vec![ListenerOwner::Room {
            epoch: 2
        }]);
    }
}
