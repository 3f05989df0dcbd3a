//! Projections: change batches in, positioned view updates out.
//!
//! Each projection mirrors one subscription stream. Rows are inserted at
//! the position their order key implies; modify and remove mutate in
//! place by document id and never reorder. Grouping and day-separator
//! decisions are made once, when a row is inserted, and are not revisited
//! when earlier rows change or disappear.

use std::collections::BTreeSet;

use chrono::{Local, NaiveDate};
use parlor_shared::constants::CONTINUATION_WINDOW_MS;
use parlor_shared::documents::{Channel, DirectConversation, Message};
use parlor_shared::types::{MessageId, UserId};
use parlor_store::{Change, ChangeKind};

use crate::events::{ListDelta, TimelineDelta};

// ----------------------------------------------------------------------
// Timeline rows
// ----------------------------------------------------------------------

/// A message with its render decision attached.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    pub message: Message,
    /// Rendered without the author header, as part of the previous
    /// message's group.
    pub continuation: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimelineRow {
    /// Separator labeled with a local calendar date.
    DaySeparator { date: NaiveDate },
    Message(RenderedMessage),
}

/// One reaction button under a message: the emoji, how many reacted, and
/// whether the viewer is among them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionPill {
    pub emoji: String,
    pub count: usize,
    pub mine: bool,
}

/// The pills to render under `message`, from `viewer`'s point of view.
pub fn reaction_pills(message: &Message, viewer: UserId) -> Vec<ReactionPill> {
    message
        .reactions
        .iter()
        .filter(|(_, voters)| !voters.is_empty())
        .map(|(emoji, voters)| ReactionPill {
            emoji: emoji.clone(),
            count: voters.len(),
            mine: voters.contains(&viewer),
        })
        .collect()
}

// ----------------------------------------------------------------------
// Message timeline
// ----------------------------------------------------------------------

/// The rendered view of one conversation's message stream.
pub struct MessageTimeline {
    rows: Vec<TimelineRow>,
    ids: BTreeSet<MessageId>,
    /// Grouping preference, captured when the conversation was opened.
    group_messages: bool,
    /// Date on the most recent separator emitted at the tail.
    last_separator: Option<NaiveDate>,
}

impl MessageTimeline {
    pub fn new(group_messages: bool) -> Self {
        Self {
            rows: Vec::new(),
            ids: BTreeSet::new(),
            group_messages,
            last_separator: None,
        }
    }

    pub fn rows(&self) -> &[TimelineRow] {
        &self.rows
    }

    pub fn find(&self, id: MessageId) -> Option<&Message> {
        self.index_of(id).and_then(|index| match &self.rows[index] {
            TimelineRow::Message(rendered) => Some(&rendered.message),
            TimelineRow::DaySeparator { .. } => None,
        })
    }

    /// The newest message in the view authored by `uid`.
    pub fn last_authored_by(&self, uid: UserId) -> Option<&Message> {
        self.rows.iter().rev().find_map(|row| match row {
            TimelineRow::Message(rendered) if rendered.message.author_id == uid => {
                Some(&rendered.message)
            }
            _ => None,
        })
    }

    /// Fold a change batch into the view. An `Added` for an id already
    /// present (snapshot/live overlap) is treated as an update.
    pub fn apply(&mut self, batch: Vec<Change<Message>>) -> Vec<TimelineDelta> {
        let mut deltas = Vec::new();
        for change in batch {
            match change.kind {
                ChangeKind::Added => {
                    if self.ids.contains(&change.doc.id) {
                        self.update(change.doc, &mut deltas);
                    } else {
                        self.insert(change.doc, &mut deltas);
                    }
                }
                ChangeKind::Modified => self.update(change.doc, &mut deltas),
                ChangeKind::Removed => self.remove(change.doc.id, &mut deltas),
            }
        }
        deltas
    }

    fn insert(&mut self, message: Message, deltas: &mut Vec<TimelineDelta>) {
        let local_date = message.timestamp.with_timezone(&Local).date_naive();
        let mut index = self.insert_index(&message);

        // Backfill lands below an already-emitted separator for its day.
        while index < self.rows.len() {
            match &self.rows[index] {
                TimelineRow::DaySeparator { date } if *date <= local_date => index += 1,
                _ => break,
            }
        }

        let mut rows = Vec::with_capacity(2);
        if index == self.rows.len() && self.last_separator != Some(local_date) {
            rows.push(TimelineRow::DaySeparator { date: local_date });
            self.last_separator = Some(local_date);
        }

        // A fresh separator always starts a new group.
        let continuation = self.group_messages
            && rows.is_empty()
            && index > 0
            && match &self.rows[index - 1] {
                TimelineRow::Message(prev) => {
                    prev.message.author_id == message.author_id
                        && (message.timestamp - prev.message.timestamp).num_milliseconds()
                            < CONTINUATION_WINDOW_MS
                }
                TimelineRow::DaySeparator { .. } => false,
            };

        self.ids.insert(message.id);
        rows.push(TimelineRow::Message(RenderedMessage {
            message,
            continuation,
        }));
        self.rows.splice(index..index, rows.iter().cloned());
        deltas.push(TimelineDelta::Inserted { index, rows });
    }

    fn update(&mut self, message: Message, deltas: &mut Vec<TimelineDelta>) {
        let Some(index) = self.index_of(message.id) else {
            return;
        };
        if let TimelineRow::Message(rendered) = &mut self.rows[index] {
            // Author, timestamp and the grouping decision are fixed at
            // insert; only the mutable fields flow through.
            rendered.message = message;
            let row = TimelineRow::Message(rendered.clone());
            deltas.push(TimelineDelta::Updated { index, row });
        }
    }

    fn remove(&mut self, id: MessageId, deltas: &mut Vec<TimelineDelta>) {
        let Some(index) = self.index_of(id) else {
            return;
        };
        // Later rows keep their grouping; a vanished head is not
        // reconstructed.
        self.rows.remove(index);
        self.ids.remove(&id);
        deltas.push(TimelineDelta::Removed { index });
    }

    /// Position implied by ascending `(timestamp, id)`.
    fn insert_index(&self, message: &Message) -> usize {
        let mut index = self.rows.len();
        while index > 0 {
            match &self.rows[index - 1] {
                TimelineRow::Message(prev) => {
                    if (prev.message.timestamp, prev.message.id)
                        <= (message.timestamp, message.id)
                    {
                        break;
                    }
                    index -= 1;
                }
                TimelineRow::DaySeparator { .. } => index -= 1,
            }
        }
        index
    }

    fn index_of(&self, id: MessageId) -> Option<usize> {
        if !self.ids.contains(&id) {
            return None;
        }
        self.rows.iter().position(|row| match row {
            TimelineRow::Message(rendered) => rendered.message.id == id,
            TimelineRow::DaySeparator { .. } => false,
        })
    }
}

// ----------------------------------------------------------------------
// Channel list
// ----------------------------------------------------------------------

/// Channels, ascending by creation time (name as tie-break).
#[derive(Default)]
pub struct ChannelList {
    items: Vec<Channel>,
}

impl ChannelList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[Channel] {
        &self.items
    }

    pub fn apply(&mut self, batch: Vec<Change<Channel>>) -> Vec<ListDelta<Channel>> {
        let mut deltas = Vec::new();
        for change in batch {
            let existing = self.items.iter().position(|c| c.id == change.doc.id);
            match (change.kind, existing) {
                (ChangeKind::Removed, Some(index)) => {
                    self.items.remove(index);
                    deltas.push(ListDelta::Removed { index });
                }
                (ChangeKind::Removed, None) => {}
                (_, Some(index)) => {
                    self.items[index] = change.doc;
                    deltas.push(ListDelta::Updated {
                        index,
                        item: self.items[index].clone(),
                    });
                }
                (_, None) => {
                    let index = self
                        .items
                        .iter()
                        .position(|c| {
                            (c.created_at, c.name.as_str())
                                > (change.doc.created_at, change.doc.name.as_str())
                        })
                        .unwrap_or(self.items.len());
                    self.items.insert(index, change.doc);
                    deltas.push(ListDelta::Inserted {
                        index,
                        item: self.items[index].clone(),
                    });
                }
            }
        }
        deltas
    }
}

// ----------------------------------------------------------------------
// DM list
// ----------------------------------------------------------------------

/// Direct conversations, most recent activity first. The position is
/// chosen at insert; a later activity bump updates in place without
/// reordering.
#[derive(Default)]
pub struct DmList {
    items: Vec<DirectConversation>,
}

impl DmList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[DirectConversation] {
        &self.items
    }

    pub fn apply(
        &mut self,
        batch: Vec<Change<DirectConversation>>,
    ) -> Vec<ListDelta<DirectConversation>> {
        let mut deltas = Vec::new();
        for change in batch {
            let existing = self.items.iter().position(|d| d.id == change.doc.id);
            match (change.kind, existing) {
                (ChangeKind::Removed, Some(index)) => {
                    self.items.remove(index);
                    deltas.push(ListDelta::Removed { index });
                }
                (ChangeKind::Removed, None) => {}
                (_, Some(index)) => {
                    self.items[index] = change.doc;
                    deltas.push(ListDelta::Updated {
                        index,
                        item: self.items[index].clone(),
                    });
                }
                (_, None) => {
                    let index = self
                        .items
                        .iter()
                        .position(|d| d.last_activity < change.doc.last_activity)
                        .unwrap_or(self.items.len());
                    self.items.insert(index, change.doc);
                    deltas.push(ListDelta::Inserted {
                        index,
                        item: self.items[index].clone(),
                    });
                }
            }
        }
        deltas
    }
}

// ----------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use chrono::{DateTime, Duration, TimeZone, Utc};
    use parlor_shared::documents::{ChannelKind, MessageKind};
    use parlor_shared::types::{ChannelId, ConversationId, DmId};

    use super::*;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).single().unwrap()
    }

    fn message(author: UserId, at: DateTime<Utc>, content: &str) -> Message {
        Message {
            id: MessageId::new(),
            conversation: ConversationId::Channel(ChannelId::default()),
            content: content.into(),
            author_id: author,
            author_name: "Someone".into(),
            author_color: "#5865f2".into(),
            timestamp: at,
            kind: MessageKind::Text,
            reactions: BTreeMap::new(),
            votes: BTreeMap::new(),
            pinned: false,
            edited: false,
            reply_to: None,
        }
    }

    fn flags(timeline: &MessageTimeline) -> Vec<bool> {
        timeline
            .rows()
            .iter()
            .filter_map(|row| match row {
                TimelineRow::Message(rendered) => Some(rendered.continuation),
                _ => None,
            })
            .collect()
    }

    fn separators(timeline: &MessageTimeline) -> usize {
        timeline
            .rows()
            .iter()
            .filter(|row| matches!(row, TimelineRow::DaySeparator { .. }))
            .count()
    }

    #[test]
    fn close_messages_from_one_author_group() {
        let author = UserId::new();
        let mut timeline = MessageTimeline::new(true);

        timeline.apply(vec![Change::added(message(author, base(), "one"))]);
        timeline.apply(vec![Change::added(message(
            author,
            base() + Duration::seconds(30),
            "two",
        ))]);
        timeline.apply(vec![Change::added(message(
            UserId::new(),
            base() + Duration::seconds(40),
            "other voice",
        ))]);

        assert_eq!(flags(&timeline), vec![false, true, false]);
        assert_eq!(separators(&timeline), 1);
    }

    #[test]
    fn five_minute_gap_breaks_the_group() {
        let author = UserId::new();
        let mut timeline = MessageTimeline::new(true);

        timeline.apply(vec![Change::added(message(author, base(), "first"))]);
        // One under the window groups, exactly the window does not.
        timeline.apply(vec![Change::added(message(
            author,
            base() + Duration::milliseconds(CONTINUATION_WINDOW_MS - 1),
            "grouped",
        ))]);
        timeline.apply(vec![Change::added(message(
            author,
            base() + Duration::milliseconds(2 * CONTINUATION_WINDOW_MS - 1),
            "new header",
        ))]);

        assert_eq!(flags(&timeline), vec![false, true, false]);
    }

    #[test]
    fn grouping_pref_off_means_headers_everywhere() {
        let author = UserId::new();
        let mut timeline = MessageTimeline::new(false);

        timeline.apply(vec![
            Change::added(message(author, base(), "one")),
            Change::added(message(author, base() + Duration::seconds(5), "two")),
        ]);

        assert_eq!(flags(&timeline), vec![false, false]);
    }

    #[test]
    fn each_local_date_gets_one_separator() {
        let author = UserId::new();
        let mut timeline = MessageTimeline::new(true);

        timeline.apply(vec![
            Change::added(message(author, base(), "today")),
            Change::added(message(author, base() + Duration::minutes(1), "still today")),
            Change::added(message(author, base() + Duration::hours(48), "two days on")),
        ]);

        assert_eq!(separators(&timeline), 2);
        // The new separator also breaks the author group.
        assert_eq!(flags(&timeline), vec![false, true, false]);
    }

    #[test]
    fn replayed_added_updates_instead_of_duplicating() {
        let author = UserId::new();
        let mut timeline = MessageTimeline::new(true);
        let mut original = message(author, base(), "hello");

        timeline.apply(vec![Change::added(original.clone())]);
        original.edited = true;
        let deltas = timeline.apply(vec![Change::added(original.clone())]);

        assert_eq!(flags(&timeline).len(), 1);
        assert!(matches!(deltas[0], TimelineDelta::Updated { .. }));
        assert_eq!(timeline.find(original.id).map(|m| m.edited), Some(true));
    }

    #[test]
    fn modify_keeps_position_and_grouping() {
        let author = UserId::new();
        let mut timeline = MessageTimeline::new(true);
        let first = message(author, base(), "one");
        let mut second = message(author, base() + Duration::seconds(10), "two");

        timeline.apply(vec![
            Change::added(first),
            Change::added(second.clone()),
        ]);
        second.content = "two, edited".into();
        second.edited = true;
        timeline.apply(vec![Change::modified(second)]);

        assert_eq!(flags(&timeline), vec![false, true]);
    }

    #[test]
    fn removal_evicts_without_regrouping() {
        let author = UserId::new();
        let mut timeline = MessageTimeline::new(true);
        let first = message(author, base(), "head");
        let second = message(author, base() + Duration::seconds(10), "tail");

        timeline.apply(vec![
            Change::added(first.clone()),
            Change::added(second.clone()),
        ]);
        let deltas = timeline.apply(vec![Change::removed(first)]);

        // The survivor keeps its continuation flag even though its head
        // is gone.
        assert!(matches!(deltas[0], TimelineDelta::Removed { index: 1 }));
        assert_eq!(flags(&timeline), vec![true]);
        assert_eq!(separators(&timeline), 1);
    }

    #[test]
    fn backfill_lands_in_timestamp_order() {
        let author = UserId::new();
        let mut timeline = MessageTimeline::new(true);
        let newer = message(author, base() + Duration::seconds(30), "newer");
        let older = message(author, base(), "older");

        timeline.apply(vec![Change::added(newer.clone())]);
        timeline.apply(vec![Change::added(older.clone())]);

        let contents: Vec<&str> = timeline
            .rows()
            .iter()
            .filter_map(|row| match row {
                TimelineRow::Message(rendered) => Some(rendered.message.content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(contents, vec!["older", "newer"]);
        // The backfilled row sits below the day separator, not above it.
        assert!(matches!(
            timeline.rows()[0],
            TimelineRow::DaySeparator { .. }
        ));
    }

    #[test]
    fn pills_count_and_mark_mine() {
        let author = UserId::new();
        let reactor = UserId::new();
        let mut doc = message(author, base(), "hello");
        doc.reactions
            .entry("👍".into())
            .or_insert_with(BTreeSet::new)
            .insert(reactor);

        let for_author = reaction_pills(&doc, author);
        assert_eq!(for_author.len(), 1);
        assert_eq!(for_author[0].count, 1);
        assert!(!for_author[0].mine);

        let for_reactor = reaction_pills(&doc, reactor);
        assert!(for_reactor[0].mine);
    }

    fn channel(name: &str, at: DateTime<Utc>) -> Channel {
        Channel {
            id: ChannelId::new(),
            name: name.into(),
            topic: String::new(),
            kind: ChannelKind::Public,
            created_at: at,
            created_by: UserId::new(),
        }
    }

    #[test]
    fn channels_sort_by_creation_time() {
        let mut list = ChannelList::new();
        list.apply(vec![Change::added(channel("later", base() + Duration::hours(1)))]);
        let deltas = list.apply(vec![Change::added(channel("general", base()))]);

        assert_eq!(
            list.items().iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["general", "later"]
        );
        assert!(matches!(deltas[0], ListDelta::Inserted { index: 0, .. }));
    }

    fn dm(last_activity: DateTime<Utc>) -> DirectConversation {
        let members = DirectConversation::canonical_pair(UserId::new(), UserId::new());
        DirectConversation {
            id: DmId::new(),
            members,
            created_at: base(),
            last_activity,
        }
    }

    #[test]
    fn dms_insert_newest_first_and_never_reorder() {
        let mut list = DmList::new();
        let quiet = dm(base());
        let busy = dm(base() + Duration::hours(2));

        list.apply(vec![Change::added(quiet.clone())]);
        list.apply(vec![Change::added(busy.clone())]);
        assert_eq!(list.items()[0].id, busy.id);

        // An activity bump on the quiet one updates in place.
        let mut bumped = quiet.clone();
        bumped.last_activity = base() + Duration::hours(3);
        let deltas = list.apply(vec![Change::modified(bumped)]);
        assert!(matches!(deltas[0], ListDelta::Updated { index: 1, .. }));
        assert_eq!(list.items()[0].id, busy.id);
    }
}
