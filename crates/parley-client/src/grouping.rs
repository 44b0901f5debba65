//! Presentation grouping derived from store order.
//!
//! Messages are partitioned into calendar days (in the viewer's local
//! offset) following arrival order, and each day into runs of consecutive
//! messages by the same author. Groups are always recomputed from the
//! sequence; nothing here is stored.

use std::ops::Range;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate};
use parley_proto::{Timestamp, UserId};

use crate::store::Message;

/// Consecutive messages by one author within a day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorRun {
    /// Author of every message in the run
    pub author_id: UserId,
    /// Indices into the message sequence
    pub range: Range<usize>,
}

/// Messages that fall on one local calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayGroup {
    /// Local date
    pub date: NaiveDate,
    /// Author runs, in order
    pub runs: Vec<AuthorRun>,
}

impl DayGroup {
    /// Indices covered by this day.
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        let start = self.runs.first().map_or(0, |r| r.range.start);
        let end = self.runs.last().map_or(start, |r| r.range.end);
        start..end
    }
}

/// Local calendar date of a UTC millisecond timestamp.
#[must_use]
pub fn local_date(ts: Timestamp, offset: FixedOffset) -> NaiveDate {
    i64::try_from(ts)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map(|utc| utc.with_timezone(&offset).date_naive())
        .unwrap_or_default()
}

/// Partition `messages` into day groups and author runs.
#[must_use]
pub fn group_messages(messages: &[Message], offset: FixedOffset) -> Vec<DayGroup> {
    let mut days: Vec<DayGroup> = Vec::new();

    for (index, msg) in messages.iter().enumerate() {
        let date = local_date(msg.created_at, offset);

        if days.last().is_none_or(|day| day.date != date) {
            days.push(DayGroup { date, runs: Vec::new() });
        }
        let Some(day) = days.last_mut() else { continue };

        match day.runs.last_mut() {
            Some(run) if run.author_id == msg.author_id => run.range.end = index + 1,
            _ => day.runs.push(AuthorRun { author_id: msg.author_id, range: index..index + 1 }),
        }
    }

    days
}

/// Separator label for a day: `Today`, `Yesterday`, or `M/D/YYYY`.
#[must_use]
pub fn day_label(date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        "Today".to_string()
    } else if Some(date) == today.pred_opt() {
        "Yesterday".to_string()
    } else {
        format!("{}/{}/{}", date.month(), date.day(), date.year())
    }
}

/// Typing indicator text. `None` when nobody is typing.
#[must_use]
pub fn typing_label(names: &[&str]) -> Option<String> {
    match names {
        [] => None,
        [name] => Some(format!("{name} is typing...")),
        many => Some(format!("{} people are typing...", many.len())),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::store::{DeliveryStatus, MessageKey};

    const DAY_MS: u64 = 24 * 60 * 60 * 1000;

    fn msg(id: u64, author_id: UserId, created_at: Timestamp) -> Message {
        Message {
            key: MessageKey::Server(id),
            local_id: None,
            author_id,
            author_name: String::new(),
            content: String::new(),
            created_at,
            edited_at: None,
            is_deleted: false,
            deleted_at: None,
            readers: BTreeSet::new(),
            status: DeliveryStatus::Sent,
        }
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn runs_split_by_author_and_day() {
        let day0 = 10 * DAY_MS;
        let messages = vec![
            msg(1, 7, day0 + 1),
            msg(2, 7, day0 + 2),
            msg(3, 8, day0 + 3),
            msg(4, 7, day0 + DAY_MS),
        ];

        let groups = group_messages(&messages, utc());

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].runs, vec![
            AuthorRun { author_id: 7, range: 0..2 },
            AuthorRun { author_id: 8, range: 2..3 },
        ]);
        assert_eq!(groups[1].runs, vec![AuthorRun { author_id: 7, range: 3..4 }]);
        assert_eq!(groups[1].range(), 3..4);
    }

    #[test]
    fn offset_moves_day_boundary() {
        // 23:30 UTC is the next day at UTC+2.
        let late = 10 * DAY_MS + 23 * 3_600_000 + 30 * 60_000;
        let messages = vec![msg(1, 7, 10 * DAY_MS + 1000), msg(2, 7, late)];

        assert_eq!(group_messages(&messages, utc()).len(), 1);

        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(group_messages(&messages, plus_two).len(), 2);
    }

    #[test]
    fn empty_sequence_has_no_groups() {
        assert!(group_messages(&[], utc()).is_empty());
    }

    #[test]
    fn day_labels() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(day_label(today, today), "Today");
        assert_eq!(day_label(NaiveDate::from_ymd_opt(2024, 3, 8).unwrap(), today), "Yesterday");
        assert_eq!(day_label(NaiveDate::from_ymd_opt(2023, 12, 25).unwrap(), today), "12/25/2023");
    }

    #[test]
    fn typing_labels() {
        assert_eq!(typing_label(&[]), None);
        assert_eq!(typing_label(&["ada"]).as_deref(), Some("ada is typing..."));
        assert_eq!(typing_label(&["ada", "bob", "cy"]).as_deref(), Some("3 people are typing..."));
    }
}
