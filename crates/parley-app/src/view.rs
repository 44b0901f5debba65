//! Render snapshot.

use chrono::{FixedOffset, NaiveDate};
use parley_client::{
    Client, ConnectionStatus, DeliveryStatus, Environment, Identity, LocalId, Message, RoomId,
    UserId,
    grouping::{DayGroup, day_label, local_date, typing_label},
};

/// Everything a frontend needs to draw one frame.
///
/// Rebuilt from the client after every state change; frontends never read
/// the client directly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatView {
    /// Connection status
    pub status: ConnectionStatus,
    /// Authenticated identity, if connected
    pub identity: Option<Identity>,
    /// Active room
    pub active_room: Option<RoomId>,
    /// Messages of the active room, in display order
    pub messages: Vec<Message>,
    /// Day and author grouping of `messages`
    pub days: Vec<DayGroup>,
    /// Remote users typing in the active room
    pub typing_users: Vec<(UserId, String)>,
    /// Every online user, sorted
    pub online_users: Vec<UserId>,
    /// Recent notices, oldest first
    pub notices: Vec<String>,
    /// Viewer's current local date
    pub today: NaiveDate,
}

impl ChatView {
    /// Snapshot `client` for a viewer at `offset`.
    pub fn capture<E: Environment>(
        client: &Client<E>,
        offset: FixedOffset,
        now_millis: u64,
        notices: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            status: client.status(),
            identity: client.identity().cloned(),
            active_room: client.active_room(),
            messages: client.messages().to_vec(),
            days: client.day_groups(offset),
            typing_users: client.typing_users(),
            online_users: client.presence().online_users(),
            notices: notices.into_iter().collect(),
            today: local_date(now_millis, offset),
        }
    }

    /// Separator label for a day group.
    pub fn day_label(&self, day: &DayGroup) -> String {
        day_label(day.date, self.today)
    }

    /// Typing indicator text.
    pub fn typing_label(&self) -> Option<String> {
        let names: Vec<&str> = self.typing_users.iter().map(|(_, name)| name.as_str()).collect();
        typing_label(&names)
    }

    /// Local ids of messages that failed to send.
    pub fn failed(&self) -> Vec<LocalId> {
        self.messages
            .iter()
            .filter(|m| m.status == DeliveryStatus::Failed)
            .filter_map(|m| m.local_id)
            .collect()
    }

    /// True if `user_id` is online.
    pub fn is_online(&self, user_id: UserId) -> bool {
        self.online_users.binary_search(&user_id).is_ok()
    }
}
