//! Room session controller.
//!
//! At most one room is active. Every activation gets a fresh epoch; events
//! and history results tagged with any other epoch belong to a room session
//! that no longer exists and are discarded.

use parley_proto::RoomId;

/// One activation of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomSession<I> {
    /// Active room
    pub room_id: RoomId,
    /// Activation epoch, unique per controller
    pub epoch: u64,
    /// When the room was selected
    pub joined_at: I,
}

/// Effect of a room selection.
///
/// Consumers apply `left` before `joined`: the old room is left (and its
/// per-room state torn down) before the new one is joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomChange<I> {
    /// Session that ended, if any
    pub left: Option<RoomSession<I>>,
    /// Session that started, if any
    pub joined: Option<RoomSession<I>>,
}

/// Tracks the single active room.
#[derive(Debug, Clone)]
pub struct RoomController<I> {
    active: Option<RoomSession<I>>,
    next_epoch: u64,
}

impl<I> Default for RoomController<I> {
    fn default() -> Self {
        Self { active: None, next_epoch: 1 }
    }
}

impl<I: Copy> RoomController<I> {
    /// No active room.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Active session.
    #[must_use]
    pub fn active(&self) -> Option<&RoomSession<I>> {
        self.active.as_ref()
    }

    /// Active room id.
    #[must_use]
    pub fn active_room(&self) -> Option<RoomId> {
        self.active.map(|s| s.room_id)
    }

    /// Active epoch.
    #[must_use]
    pub fn epoch(&self) -> Option<u64> {
        self.active.map(|s| s.epoch)
    }

    /// True if `(room_id, epoch)` names the active session.
    #[must_use]
    pub fn is_current(&self, room_id: RoomId, epoch: u64) -> bool {
        self.active.is_some_and(|s| s.room_id == room_id && s.epoch == epoch)
    }

    /// Select a room, or none.
    ///
    /// Returns `None` when `room` is already active.
    pub fn select(&mut self, room: Option<RoomId>, now: I) -> Option<RoomChange<I>> {
        if room == self.active_room() {
            return None;
        }

        let left = self.active.take();
        let joined = room.map(|room_id| {
            let epoch = self.next_epoch;
            self.next_epoch += 1;
            RoomSession { room_id, epoch, joined_at: now }
        });
        self.active = joined;

        Some(RoomChange { left, joined })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_room_is_no_op() {
        let mut rooms = RoomController::new();
        assert!(rooms.select(Some(10), 0u64).is_some());
        assert!(rooms.select(Some(10), 1).is_none());
        assert!(rooms.select(None, 2).is_some());
        assert!(rooms.select(None, 3).is_none());
    }

    #[test]
    fn switch_leaves_old_and_bumps_epoch() {
        let mut rooms = RoomController::new();
        rooms.select(Some(10), 0u64);
        let first = rooms.epoch().unwrap();

        let change = rooms.select(Some(20), 1).unwrap();
        assert_eq!(change.left.map(|s| s.room_id), Some(10));
        assert_eq!(change.joined.map(|s| s.room_id), Some(20));
        assert!(rooms.epoch().unwrap() > first);
        assert!(!rooms.is_current(10, first));
    }

    #[test]
    fn returning_to_a_room_is_a_new_epoch() {
        let mut rooms = RoomController::new();
        rooms.select(Some(10), 0u64);
        let first = rooms.epoch().unwrap();
        rooms.select(Some(20), 1);
        rooms.select(Some(10), 2);

        assert_eq!(rooms.active_room(), Some(10));
        assert!(!rooms.is_current(10, first));
    }
}
