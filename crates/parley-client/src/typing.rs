//! Typing coordinator.
//!
//! Two independent halves:
//!
//! - Local: debounces keystrokes into one start and one stop per burst.
//!   The inactivity timer is an explicit [`TypingTimer`] owned here and
//!   dropped on every exit path (expiry, send, room change, input closed).
//! - Remote: who else is typing in the active room. The local user is never
//!   in this set. Entries also expire after a TTL so a lost stop event
//!   cannot pin an indicator forever.
//!
//! ```text
//!            keystroke / Start
//!  ┌──────┐ ─────────────────> ┌────────┐ ──┐ keystroke
//!  │ Idle │                    │ Typing │   │ (re-arm timer,
//!  └──────┘ <───────────────── └────────┘ <─┘  no signal)
//!           expiry, send, room change,
//!           input closed / Stop
//! ```

use std::{ops::Sub, time::Duration};

use parley_proto::{RoomId, UserId};

/// Inactivity window after which local typing reverts to idle.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);

/// Lifetime of a remote typing entry without a refresh.
pub const DEFAULT_REMOTE_TTL: Duration = Duration::from_secs(5);

/// Start/stop signal to put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    /// Local user started typing in this room.
    Start(RoomId),
    /// Local user stopped typing in this room.
    Stop(RoomId),
}

/// Inactivity timer for the local half.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypingTimer<I> {
    armed_at: I,
    window: Duration,
}

impl<I> TypingTimer<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    fn arm(now: I, window: Duration) -> Self {
        Self { armed_at: now, window }
    }

    fn rearm(&mut self, now: I) {
        self.armed_at = now;
    }

    /// True once the window has elapsed without a re-arm.
    #[must_use]
    pub fn is_expired(&self, now: I) -> bool {
        now - self.armed_at >= self.window
    }

    /// Time left before expiry.
    #[must_use]
    pub fn remaining(&self, now: I) -> Duration {
        self.window.saturating_sub(now - self.armed_at)
    }
}

#[derive(Debug, Clone)]
enum LocalState<I> {
    Idle,
    Typing { room_id: RoomId, timer: TypingTimer<I> },
}

#[derive(Debug, Clone)]
struct RemoteTyper<I> {
    user_id: UserId,
    username: String,
    seen_at: I,
}

/// Local and remote typing state for the active room.
#[derive(Debug, Clone)]
pub struct TypingCoordinator<I> {
    debounce: Duration,
    remote_ttl: Option<Duration>,
    local: LocalState<I>,
    remote: Vec<RemoteTyper<I>>,
}

impl<I> TypingCoordinator<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Create a coordinator. `remote_ttl: None` keeps remote entries until
    /// an explicit stop or room change.
    #[must_use]
    pub fn new(debounce: Duration, remote_ttl: Option<Duration>) -> Self {
        Self { debounce, remote_ttl, local: LocalState::Idle, remote: Vec::new() }
    }

    /// True while the local user is in the typing state.
    #[must_use]
    pub fn is_typing(&self) -> bool {
        matches!(self.local, LocalState::Typing { .. })
    }

    /// The live local timer, if typing.
    #[must_use]
    pub fn timer(&self) -> Option<&TypingTimer<I>> {
        match &self.local {
            LocalState::Typing { timer, .. } => Some(timer),
            LocalState::Idle => None,
        }
    }

    /// Register a local keystroke in `room_id`.
    ///
    /// Emits `Start` only on the idle → typing transition. A keystroke for a
    /// different room than the one being typed in closes the old burst first.
    pub fn keystroke(&mut self, room_id: RoomId, now: I) -> Vec<TypingSignal> {
        if let LocalState::Typing { room_id: current, timer } = &mut self.local
            && *current == room_id
        {
            timer.rearm(now);
            return Vec::new();
        }

        let mut signals: Vec<_> = self.stop().into_iter().collect();
        self.local = LocalState::Typing { room_id, timer: TypingTimer::arm(now, self.debounce) };
        signals.push(TypingSignal::Start(room_id));
        signals
    }

    /// Revert to idle if the inactivity window elapsed.
    pub fn expire_local(&mut self, now: I) -> Option<TypingSignal> {
        let expired =
            matches!(&self.local, LocalState::Typing { timer, .. } if timer.is_expired(now));
        if expired { self.stop() } else { None }
    }

    /// Leave the typing state immediately (send, room change, input closed).
    pub fn stop(&mut self) -> Option<TypingSignal> {
        match std::mem::replace(&mut self.local, LocalState::Idle) {
            LocalState::Typing { room_id, .. } => Some(TypingSignal::Stop(room_id)),
            LocalState::Idle => None,
        }
    }

    /// Drop local state without a signal (the connection is gone).
    pub fn abandon_local(&mut self) {
        self.local = LocalState::Idle;
    }

    /// Remote user started typing. Returns true if the set changed.
    ///
    /// Echoes of the local user are ignored.
    pub fn remote_start(
        &mut self,
        user_id: UserId,
        username: String,
        local_user: Option<UserId>,
        now: I,
    ) -> bool {
        if Some(user_id) == local_user {
            return false;
        }

        if let Some(entry) = self.remote.iter_mut().find(|t| t.user_id == user_id) {
            entry.seen_at = now;
            entry.username = username;
            return false;
        }

        self.remote.push(RemoteTyper { user_id, username, seen_at: now });
        true
    }

    /// Remote user stopped typing. Returns true if the set changed.
    pub fn remote_stop(&mut self, user_id: UserId) -> bool {
        let before = self.remote.len();
        self.remote.retain(|t| t.user_id != user_id);
        self.remote.len() != before
    }

    /// Drop remote entries older than the TTL. Returns true if any expired.
    pub fn expire_remote(&mut self, now: I) -> bool {
        let Some(ttl) = self.remote_ttl else {
            return false;
        };

        let before = self.remote.len();
        self.remote.retain(|t| now - t.seen_at < ttl);
        self.remote.len() != before
    }

    /// Clear the remote set. Returns true if it was non-empty.
    pub fn clear_remote(&mut self) -> bool {
        let changed = !self.remote.is_empty();
        self.remote.clear();
        changed
    }

    /// Remote users currently typing, in arrival order.
    pub fn typing_users(&self) -> impl Iterator<Item = (UserId, &str)> {
        self.remote.iter().map(|t| (t.user_id, t.username.as_str()))
    }

    /// Is `user_id` in the remote set?
    #[must_use]
    pub fn is_remote_typing(&self, user_id: UserId) -> bool {
        self.remote.iter().any(|t| t.user_id == user_id)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    const ROOM: RoomId = 10;

    fn coordinator() -> TypingCoordinator<Instant> {
        TypingCoordinator::new(DEFAULT_DEBOUNCE, Some(DEFAULT_REMOTE_TTL))
    }

    #[test]
    fn burst_then_pause_emits_one_start_and_one_stop() {
        let t0 = Instant::now();
        let mut typing = coordinator();

        assert_eq!(typing.keystroke(ROOM, t0), vec![TypingSignal::Start(ROOM)]);
        assert!(typing.keystroke(ROOM, t0 + Duration::from_millis(300)).is_empty());
        assert!(typing.keystroke(ROOM, t0 + Duration::from_millis(600)).is_empty());

        // Timer re-armed at 600ms, so 1.2s is still within the window.
        assert_eq!(typing.expire_local(t0 + Duration::from_millis(1200)), None);
        assert_eq!(
            typing.expire_local(t0 + Duration::from_millis(1600)),
            Some(TypingSignal::Stop(ROOM))
        );
        assert_eq!(typing.expire_local(t0 + Duration::from_millis(3000)), None);
    }

    #[test]
    fn explicit_stop_releases_timer() {
        let t0 = Instant::now();
        let mut typing = coordinator();
        typing.keystroke(ROOM, t0);

        assert_eq!(typing.stop(), Some(TypingSignal::Stop(ROOM)));
        assert!(typing.timer().is_none());
        assert_eq!(typing.stop(), None);
    }

    #[test]
    fn keystroke_in_new_room_closes_previous_burst() {
        let t0 = Instant::now();
        let mut typing = coordinator();
        typing.keystroke(ROOM, t0);

        assert_eq!(typing.keystroke(20, t0), vec![TypingSignal::Stop(ROOM), TypingSignal::Start(20)]);
    }

    #[test]
    fn remote_set_excludes_self_and_dedups() {
        let t0 = Instant::now();
        let mut typing = coordinator();

        assert!(!typing.remote_start(3, "me".into(), Some(3), t0));
        assert!(typing.remote_start(7, "ada".into(), Some(3), t0));
        assert!(!typing.remote_start(7, "ada".into(), Some(3), t0));

        let users: Vec<_> = typing.typing_users().collect();
        assert_eq!(users, vec![(7, "ada")]);

        assert!(typing.remote_stop(7));
        assert!(!typing.remote_stop(7));
    }

    #[test]
    fn remote_entries_expire_unless_refreshed() {
        let t0 = Instant::now();
        let mut typing = coordinator();
        typing.remote_start(7, "ada".into(), None, t0);
        typing.remote_start(8, "bob".into(), None, t0);
        typing.remote_start(8, "bob".into(), None, t0 + Duration::from_secs(3));

        assert!(typing.expire_remote(t0 + Duration::from_secs(5)));
        assert!(!typing.is_remote_typing(7));
        assert!(typing.is_remote_typing(8));
    }

    #[test]
    fn ttl_can_be_disabled() {
        let t0 = Instant::now();
        let mut typing: TypingCoordinator<Instant> = TypingCoordinator::new(DEFAULT_DEBOUNCE, None);
        typing.remote_start(7, "ada".into(), None, t0);

        assert!(!typing.expire_remote(t0 + Duration::from_secs(3600)));
        assert!(typing.is_remote_typing(7));
    }
}
