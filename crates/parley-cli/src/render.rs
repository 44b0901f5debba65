//! Line-oriented rendering.
//!
//! A terminal scrolls, so instead of redrawing the whole view the renderer
//! remembers what it already printed and writes only what changed: status
//! and room transitions, new messages, messages whose line changed (edits,
//! deletes, confirmations, read receipts), typing and presence updates, and
//! new notices.

use std::{collections::HashMap, io::Write};

use chrono::{DateTime, FixedOffset, NaiveDate};
use parley_app::ChatView;
use parley_client::{
    ConnectionStatus, DeliveryStatus, Identity, Message, MessageKey, RoomId, UserId,
    grouping::{day_label, local_date},
};

/// Identity the user said to expect, from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectedIdentity {
    /// Expected user id
    pub user_id: Option<UserId>,
    /// Expected display name
    pub username: Option<String>,
}

impl ExpectedIdentity {
    fn mismatch(&self, identity: &Identity) -> bool {
        self.user_id.is_some_and(|id| id != identity.user_id)
            || self.username.as_ref().is_some_and(|name| *name != identity.username)
    }
}

/// Incremental renderer for [`ChatView`]s.
#[derive(Debug)]
pub struct LineRenderer {
    offset: FixedOffset,
    expected: ExpectedIdentity,
    status: ConnectionStatus,
    room: Option<RoomId>,
    lines: HashMap<MessageKey, String>,
    last_day: Option<NaiveDate>,
    typing: Option<String>,
    online: Option<usize>,
    notices: Vec<String>,
}

impl LineRenderer {
    /// Renderer showing times at `offset`.
    pub fn new(offset: FixedOffset, expected: ExpectedIdentity) -> Self {
        Self {
            offset,
            expected,
            status: ConnectionStatus::Disconnected,
            room: None,
            lines: HashMap::new(),
            last_day: None,
            typing: None,
            online: None,
            notices: Vec::new(),
        }
    }

    /// Write everything that changed since the previous view.
    pub fn render(&mut self, view: &ChatView, out: &mut impl Write) -> std::io::Result<()> {
        self.render_status(view, out)?;
        self.render_room(view, out)?;
        self.render_messages(view, out)?;
        self.render_typing(view, out)?;

        for notice in fresh_notices(&self.notices, &view.notices) {
            writeln!(out, "! {notice}")?;
        }
        self.notices.clone_from(&view.notices);
        Ok(())
    }

    fn render_status(&mut self, view: &ChatView, out: &mut impl Write) -> std::io::Result<()> {
        if view.status == self.status {
            return Ok(());
        }
        self.status = view.status;

        match (view.status, &view.identity) {
            (ConnectionStatus::Connected, Some(identity)) => {
                writeln!(out, "* connected as {} (#{})", identity.username, identity.user_id)?;
                if self.expected.mismatch(identity) {
                    tracing::warn!(
                        user_id = identity.user_id,
                        expected = ?self.expected,
                        "server authenticated a different identity"
                    );
                    writeln!(
                        out,
                        "! signed in as {} (#{}), not the expected user",
                        identity.username, identity.user_id
                    )?;
                }
            },
            (ConnectionStatus::Connected, None) => writeln!(out, "* connected")?,
            (ConnectionStatus::Connecting, _) => writeln!(out, "* connecting...")?,
            (ConnectionStatus::Disconnected, _) => writeln!(out, "* disconnected")?,
            (ConnectionStatus::Errored, _) => writeln!(out, "* connection lost, /connect to retry")?,
        }

        if view.status != ConnectionStatus::Connected {
            self.online = None;
        }
        Ok(())
    }

    fn render_room(&mut self, view: &ChatView, out: &mut impl Write) -> std::io::Result<()> {
        if view.active_room == self.room {
            return Ok(());
        }

        match (self.room, view.active_room) {
            (_, Some(room_id)) => writeln!(out, "== room {room_id} ==")?,
            (Some(room_id), None) => writeln!(out, "* left room {room_id}")?,
            (None, None) => {},
        }
        self.room = view.active_room;
        self.lines.clear();
        self.last_day = None;
        self.typing = None;
        Ok(())
    }

    fn render_messages(&mut self, view: &ChatView, out: &mut impl Write) -> std::io::Result<()> {
        for message in &view.messages {
            let line = format_message(message, self.offset);

            // A confirmed send keeps its line under the new key.
            let previous = self.lines.remove(&message.key).or_else(|| {
                message.local_id.and_then(|local_id| self.lines.remove(&MessageKey::Local(local_id)))
            });

            match previous {
                Some(previous) if previous == line => {},
                Some(_) => writeln!(out, "~ {line}")?,
                None => {
                    let day = local_date(message.created_at, self.offset);
                    if self.last_day != Some(day) {
                        writeln!(out, "-- {} --", day_label(day, view.today))?;
                        self.last_day = Some(day);
                    }
                    writeln!(out, "{line}")?;
                },
            }
            self.lines.insert(message.key, line);
        }
        Ok(())
    }

    fn render_typing(&mut self, view: &ChatView, out: &mut impl Write) -> std::io::Result<()> {
        let typing = view.typing_label();
        if typing != self.typing
            && let Some(label) = &typing
        {
            writeln!(out, "* {label}")?;
        }
        self.typing = typing;

        if view.status == ConnectionStatus::Connected {
            let online = view.online_users.len();
            if self.online != Some(online) {
                writeln!(out, "* {online} online")?;
                self.online = Some(online);
            }
        }
        Ok(())
    }
}

/// One display line for `message`.
///
/// Confirmed messages are prefixed with the id that `/edit` and `/delete`
/// take.
pub fn format_message(message: &Message, offset: FixedOffset) -> String {
    let time = i64::try_from(message.created_at)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map_or_else(
            || "--:--".to_string(),
            |utc| utc.with_timezone(&offset).format("%H:%M").to_string(),
        );
    let id = message.id().map_or_else(|| "-".to_string(), |id| format!("#{id}"));

    let mut line = format!("{id} [{time}] {}: {}", message.author_name, message.content);
    if message.is_edited() && !message.is_deleted {
        line.push_str(" (edited)");
    }
    match message.status {
        DeliveryStatus::Pending => line.push_str(" (sending)"),
        DeliveryStatus::Failed => line.push_str(" (failed, /retry to resend)"),
        DeliveryStatus::Sent => {},
    }
    if !message.readers.is_empty() {
        line.push_str(&format!(" [read by {}]", message.readers.len()));
    }
    line
}

/// Notices in `current` that were not in `seen`.
///
/// Notices form a bounded queue, so the oldest may have dropped off the
/// front; the longest suffix of `seen` that starts `current` is what was
/// already shown.
fn fresh_notices<'a>(seen: &[String], current: &'a [String]) -> &'a [String] {
    let overlap = (0..=seen.len().min(current.len()))
        .rev()
        .find(|&k| seen[seen.len() - k..] == current[..k])
        .unwrap_or(0);
    &current[overlap..]
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeSet, time::Duration};

    use parley_client::MessageStore;

    use super::*;

    const NOON_UTC: u64 = 1_700_049_600_000;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn message(id: u64, content: &str) -> Message {
        Message {
            key: MessageKey::Server(id),
            local_id: None,
            author_id: 1,
            author_name: "ada".into(),
            content: content.into(),
            created_at: NOON_UTC,
            edited_at: None,
            is_deleted: false,
            deleted_at: None,
            readers: BTreeSet::new(),
            status: DeliveryStatus::Sent,
        }
    }

    fn pending(content: &str) -> Message {
        let mut store = MessageStore::<Duration>::new();
        store.push_local(1, "ada", content, NOON_UTC, Duration::ZERO);
        store.messages()[0].clone()
    }

    fn room_view(messages: Vec<Message>) -> ChatView {
        ChatView {
            status: ConnectionStatus::Connected,
            identity: Some(Identity { user_id: 1, username: "ada".into(), session_id: 9 }),
            active_room: Some(10),
            messages,
            online_users: vec![1],
            today: local_date(NOON_UTC, utc()),
            ..ChatView::default()
        }
    }

    fn render(renderer: &mut LineRenderer, view: &ChatView) -> String {
        let mut out = Vec::new();
        renderer.render(view, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn prints_each_message_once() {
        let mut renderer = LineRenderer::new(utc(), ExpectedIdentity::default());
        let view = room_view(vec![message(1, "hello")]);

        let first = render(&mut renderer, &view);
        assert_eq!(
            first,
            "* connected as ada (#1)\n== room 10 ==\n-- Today --\n#1 [12:00] ada: hello\n* 1 online\n"
        );
        assert_eq!(render(&mut renderer, &view), "");
    }

    #[test]
    fn changed_messages_are_reprinted() {
        let mut renderer = LineRenderer::new(utc(), ExpectedIdentity::default());
        render(&mut renderer, &room_view(vec![message(1, "tpyo")]));

        let mut edited = message(1, "typo");
        edited.edited_at = Some(NOON_UTC + 1);
        edited.readers.insert(2);

        assert_eq!(
            render(&mut renderer, &room_view(vec![edited])),
            "~ #1 [12:00] ada: typo (edited) [read by 1]\n"
        );
    }

    #[test]
    fn confirmed_send_updates_in_place() {
        let mut renderer = LineRenderer::new(utc(), ExpectedIdentity::default());
        let pending = pending("hi");
        let local_id = pending.local_id;
        let out = render(&mut renderer, &room_view(vec![pending]));
        assert!(out.ends_with("- [12:00] ada: hi (sending)\n* 1 online\n"));

        let mut confirmed = message(4, "hi");
        confirmed.local_id = local_id;
        assert_eq!(render(&mut renderer, &room_view(vec![confirmed])), "~ #4 [12:00] ada: hi\n");
    }

    #[test]
    fn room_switch_starts_over() {
        let mut renderer = LineRenderer::new(utc(), ExpectedIdentity::default());
        render(&mut renderer, &room_view(vec![message(1, "hello")]));

        let mut other = room_view(vec![message(1, "hello")]);
        other.active_room = Some(20);
        assert_eq!(render(&mut renderer, &other), "== room 20 ==\n-- Today --\n#1 [12:00] ada: hello\n");

        other.active_room = None;
        other.messages.clear();
        assert_eq!(render(&mut renderer, &other), "* left room 20\n");
    }

    #[test]
    fn typing_and_notices() {
        let mut renderer = LineRenderer::new(utc(), ExpectedIdentity::default());
        let mut view = room_view(Vec::new());
        render(&mut renderer, &view);

        view.typing_users = vec![(2, "bob".into())];
        view.notices = vec!["first".into()];
        assert_eq!(render(&mut renderer, &view), "* bob is typing...\n! first\n");

        view.typing_users.clear();
        view.notices.push("second".into());
        assert_eq!(render(&mut renderer, &view), "! second\n");
    }

    #[test]
    fn unexpected_identity_is_flagged() {
        let expected = ExpectedIdentity { user_id: Some(2), username: None };
        let mut renderer = LineRenderer::new(utc(), expected);

        let out = render(&mut renderer, &room_view(Vec::new()));
        assert!(out.contains("! signed in as ada (#1), not the expected user"));
    }

    #[test]
    fn fresh_notices_survive_queue_rotation() {
        let seen: Vec<String> = ["a", "b", "c"].map(String::from).to_vec();
        let rotated: Vec<String> = ["b", "c", "d"].map(String::from).to_vec();
        let repeated: Vec<String> = ["a", "b", "c", "c"].map(String::from).to_vec();

        assert_eq!(fresh_notices(&seen, &rotated), ["d".to_string()]);
        assert_eq!(fresh_notices(&seen, &repeated), ["c".to_string()]);
        assert_eq!(fresh_notices(&[], &seen), seen.as_slice());
        assert!(fresh_notices(&seen, &seen).is_empty());
    }
}
