//! Presence tracker.
//!
//! Global set of online users. Seeded once per connection, then updated
//! incrementally. The local user is pinned online from authentication until
//! disconnect, whatever the server says.

use std::collections::HashSet;

use parley_proto::UserId;

/// Set of online users.
#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    online: HashSet<UserId>,
    local_user: Option<UserId>,
}

impl PresenceTracker {
    /// Empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new authenticated session as `user_id`.
    ///
    /// Drops the previous session's set; the local user is online
    /// immediately, before any seed arrives.
    pub fn authenticated(&mut self, user_id: UserId) {
        self.online.clear();
        self.online.insert(user_id);
        self.local_user = Some(user_id);
    }

    /// Forget everything (explicit disconnect).
    pub fn reset(&mut self) {
        self.online.clear();
        self.local_user = None;
    }

    /// Replace the whole set.
    pub fn seed(&mut self, user_ids: impl IntoIterator<Item = UserId>) {
        self.online = user_ids.into_iter().collect();
        if let Some(me) = self.local_user {
            self.online.insert(me);
        }
    }

    /// Mark a user online. Returns true if the set changed.
    pub fn mark_online(&mut self, user_id: UserId) -> bool {
        self.online.insert(user_id)
    }

    /// Mark a user offline. Returns true if the set changed.
    ///
    /// Offline events for the local user are ignored.
    pub fn mark_offline(&mut self, user_id: UserId) -> bool {
        if Some(user_id) == self.local_user {
            return false;
        }
        self.online.remove(&user_id)
    }

    /// Is `user_id` online?
    #[must_use]
    pub fn is_online(&self, user_id: UserId) -> bool {
        self.online.contains(&user_id)
    }

    /// The subset of `members` currently online, in the given order.
    #[must_use]
    pub fn online_members(&self, members: &[UserId]) -> Vec<UserId> {
        members.iter().copied().filter(|id| self.is_online(*id)).collect()
    }

    /// Every online user, sorted.
    #[must_use]
    pub fn online_users(&self) -> Vec<UserId> {
        let mut users: Vec<_> = self.online.iter().copied().collect();
        users.sort_unstable();
        users
    }

    /// Number of online users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.online.len()
    }

    /// True if nobody is online.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.online.is_empty()
    }

    /// The pinned local user.
    #[must_use]
    pub fn local_user(&self) -> Option<UserId> {
        self.local_user
    }
}
