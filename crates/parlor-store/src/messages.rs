//! Message rows: append with monotonic timestamps, author-only edit/delete,
//! pin flips, and the per-conversation message feed.
//!
//! Reactions and votes live in their own tables (see
//! [`reactions`](crate::reactions)); every read here reassembles them onto
//! the returned [`Message`].

use std::collections::BTreeMap;

use chrono::Duration;
use parlor_shared::constants::{MAX_MESSAGE_CHARS, MAX_POLL_OPTIONS, MIN_POLL_OPTIONS};
use parlor_shared::documents::{Message, MessageKind, ReplyPreview};
use parlor_shared::types::{ConversationId, MessageId, UserId};
use parlor_shared::ValidationError;
use rusqlite::{params, OptionalExtension};

use crate::database::{bad_column, fmt_ts, now_millis, parse_ts, unknown_tag, Database};
use crate::error::{Result, StoreError};
use crate::events::{Change, StoreEvent, Subscription};
use crate::store::Store;

/// Everything the author supplies for a new message. The store fills in the
/// id, the timestamp, and the empty attribute maps.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub conversation: ConversationId,
    pub content: String,
    pub author_id: UserId,
    /// Display name snapshot; later profile edits do not rewrite history.
    pub author_name: String,
    pub author_color: String,
    pub kind: MessageKind,
    pub reply_to: Option<ReplyPreview>,
}

const MESSAGE_COLUMNS: &str = "id, conversation, content, author_id, author_name, author_color, \
     timestamp, kind, pinned, edited, reply_to, poll_question, poll_options";

impl Store {
    /// Append a message to its conversation.
    ///
    /// The assigned timestamp is `max(now, last + 1ms)` within the
    /// conversation, so ordering by timestamp is strict and stable even for
    /// bursts inside one millisecond.
    pub fn append_message(&self, draft: MessageDraft) -> Result<Message> {
        validate_draft(&draft)?;

        let message = {
            let db = self.db()?;
            let mut timestamp = now_millis();
            if let Some(last) = db.last_message_ts(&draft.conversation)? {
                if timestamp <= last {
                    timestamp = last + Duration::milliseconds(1);
                }
            }

            let message = Message {
                id: MessageId::new(),
                conversation: draft.conversation,
                content: draft.content,
                author_id: draft.author_id,
                author_name: draft.author_name,
                author_color: draft.author_color,
                timestamp,
                kind: draft.kind,
                reactions: BTreeMap::new(),
                votes: BTreeMap::new(),
                pinned: false,
                edited: false,
                reply_to: draft.reply_to,
            };
            db.insert_message(&message)?;
            message
        };

        self.publish(StoreEvent::Message {
            conversation: message.conversation,
            change: Change::added(message.clone()),
        });
        Ok(message)
    }

    pub fn get_message(&self, id: MessageId) -> Result<Option<Message>> {
        self.db()?.get_message(id)
    }

    /// The latest `limit` messages of a conversation, oldest first.
    pub fn recent_messages(
        &self,
        conversation: &ConversationId,
        limit: u32,
    ) -> Result<Vec<Message>> {
        self.db()?.list_recent_messages(conversation, limit)
    }

    /// Every pinned message of a conversation, oldest first.
    pub fn pinned_messages(&self, conversation: &ConversationId) -> Result<Vec<Message>> {
        self.db()?.list_pinned_messages(conversation)
    }

    /// Replace a message's text. Author-only; sets `edited`, keeps the
    /// timestamp (and therefore the position in the conversation).
    pub fn edit_message(&self, id: MessageId, editor: UserId, content: &str) -> Result<Message> {
        if content.trim().is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }
        let len = content.chars().count();
        if len > MAX_MESSAGE_CHARS {
            return Err(ValidationError::MessageTooLong { len }.into());
        }

        let message = {
            let db = self.db()?;
            let current = db.get_message(id)?.ok_or(StoreError::NotFound)?;
            if current.author_id != editor {
                return Err(StoreError::NotMessageAuthor);
            }
            db.update_message_content(id, content)?;
            db.get_message(id)?.ok_or(StoreError::NotFound)?
        };

        self.publish(StoreEvent::Message {
            conversation: message.conversation,
            change: Change::modified(message.clone()),
        });
        Ok(message)
    }

    /// Hard-delete a message. Author-only; reaction and vote rows go with it.
    pub fn delete_message(&self, id: MessageId, caller: UserId) -> Result<()> {
        let message = {
            let db = self.db()?;
            let current = db.get_message(id)?.ok_or(StoreError::NotFound)?;
            if current.author_id != caller {
                return Err(StoreError::NotMessageAuthor);
            }
            db.delete_message_row(id)?;
            current
        };

        self.publish(StoreEvent::Message {
            conversation: message.conversation,
            change: Change::removed(message),
        });
        Ok(())
    }

    /// Flip the pinned flag atomically in SQL, so concurrent togglers
    /// compose instead of overwriting each other.
    pub fn toggle_pin(&self, id: MessageId) -> Result<Message> {
        let message = {
            let db = self.db()?;
            if !db.flip_pinned(id)? {
                return Err(StoreError::NotFound);
            }
            db.get_message(id)?.ok_or(StoreError::NotFound)?
        };

        self.publish(StoreEvent::Message {
            conversation: message.conversation,
            change: Change::modified(message.clone()),
        });
        Ok(message)
    }

    /// Watch one conversation: the latest `history` messages as a snapshot
    /// (oldest first), then every live change.
    pub fn watch_messages(
        &self,
        conversation: ConversationId,
        history: u32,
    ) -> Result<Subscription<Message>> {
        let feed = self.feed_receiver();
        let snapshot = self.db()?.list_recent_messages(&conversation, history)?;
        Ok(self.forward(feed, snapshot, move |event| match event {
            StoreEvent::Message {
                conversation: c,
                change,
            } if c == conversation => Some(change),
            _ => None,
        }))
    }
}

fn validate_draft(draft: &MessageDraft) -> std::result::Result<(), ValidationError> {
    match &draft.kind {
        MessageKind::Text | MessageKind::Gif => {
            if draft.content.trim().is_empty() {
                return Err(ValidationError::EmptyMessage);
            }
            let len = draft.content.chars().count();
            if len > MAX_MESSAGE_CHARS {
                return Err(ValidationError::MessageTooLong { len });
            }
        }
        MessageKind::Poll { question, options } => {
            if question.trim().is_empty() {
                return Err(ValidationError::InvalidPoll);
            }
            if !(MIN_POLL_OPTIONS..=MAX_POLL_OPTIONS).contains(&options.len()) {
                return Err(ValidationError::InvalidPoll);
            }
            if options.iter().any(|o| o.trim().is_empty()) {
                return Err(ValidationError::InvalidPoll);
            }
            let mut seen = std::collections::BTreeSet::new();
            if !options.iter().all(|o| seen.insert(o.trim())) {
                return Err(ValidationError::InvalidPoll);
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// SQL layer
// ---------------------------------------------------------------------------

impl Database {
    pub(crate) fn insert_message(&self, message: &Message) -> Result<()> {
        let reply_json = message
            .reply_to
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let (question, options_json) = match &message.kind {
            MessageKind::Poll { question, options } => {
                (Some(question.clone()), Some(serde_json::to_string(options)?))
            }
            _ => (None, None),
        };

        self.conn().execute(
            "INSERT INTO messages (id, conversation, content, author_id, author_name,
                                   author_color, timestamp, kind, pinned, edited,
                                   reply_to, poll_question, poll_options)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, 0, ?9, ?10, ?11)",
            params![
                message.id.to_string(),
                message.conversation.storage_key(),
                message.content,
                message.author_id.to_string(),
                message.author_name,
                message.author_color,
                fmt_ts(message.timestamp),
                message.kind.tag(),
                reply_json,
                question,
                options_json,
            ],
        )?;
        Ok(())
    }

    pub(crate) fn get_message(&self, id: MessageId) -> Result<Option<Message>> {
        let message = self
            .conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .optional()?;

        match message {
            Some(m) => Ok(Some(self.attach_message_sets(m)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn last_message_ts(
        &self,
        conversation: &ConversationId,
    ) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
        let last: Option<String> = self.conn().query_row(
            "SELECT MAX(timestamp) FROM messages WHERE conversation = ?1",
            params![conversation.storage_key()],
            |row| row.get(0),
        )?;
        match last {
            Some(s) => Ok(Some(parse_ts(&s, 0)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn list_recent_messages(
        &self,
        conversation: &ConversationId,
        limit: u32,
    ) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE conversation = ?1
             ORDER BY timestamp DESC
             LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![conversation.storage_key(), limit], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(self.attach_message_sets(row?)?);
        }
        // Queried newest-first to apply the limit; consumers want oldest-first.
        messages.reverse();
        Ok(messages)
    }

    pub(crate) fn list_pinned_messages(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE conversation = ?1 AND pinned = 1
             ORDER BY timestamp"
        ))?;
        let rows = stmt.query_map(params![conversation.storage_key()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(self.attach_message_sets(row?)?);
        }
        Ok(messages)
    }

    pub(crate) fn update_message_content(&self, id: MessageId, content: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE messages SET content = ?2, edited = 1 WHERE id = ?1",
            params![id.to_string(), content],
        )?;
        Ok(())
    }

    pub(crate) fn delete_message_row(&self, id: MessageId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM messages WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }

    pub(crate) fn flip_pinned(&self, id: MessageId) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET pinned = 1 - pinned WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }

    fn attach_message_sets(&self, mut message: Message) -> Result<Message> {
        message.reactions = self.reactions_for(message.id)?;
        message.votes = self.votes_for(message.id)?;
        Ok(message)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let conversation_str: String = row.get(1)?;
    let author_str: String = row.get(3)?;
    let ts_str: String = row.get(6)?;
    let kind_str: String = row.get(7)?;
    let reply_json: Option<String> = row.get(10)?;

    let kind = match kind_str.as_str() {
        "text" => MessageKind::Text,
        "gif" => MessageKind::Gif,
        "poll" => {
            let question: String = row.get::<_, Option<String>>(11)?.unwrap_or_default();
            let options = match row.get::<_, Option<String>>(12)? {
                Some(json) => serde_json::from_str(&json).map_err(|e| bad_column(12, e))?,
                None => Vec::new(),
            };
            MessageKind::Poll { question, options }
        }
        other => return Err(unknown_tag(7, other)),
    };

    let reply_to = match reply_json {
        Some(json) => Some(serde_json::from_str(&json).map_err(|e| bad_column(10, e))?),
        None => None,
    };

    Ok(Message {
        id: MessageId::parse(&id_str).map_err(|e| bad_column(0, e))?,
        conversation: ConversationId::parse_key(&conversation_str)
            .map_err(|e| bad_column(1, e))?,
        content: row.get(2)?,
        author_id: UserId::parse(&author_str).map_err(|e| bad_column(3, e))?,
        author_name: row.get(4)?,
        author_color: row.get(5)?,
        timestamp: parse_ts(&ts_str, 6)?,
        kind,
        // Attached from their own tables after mapping.
        reactions: BTreeMap::new(),
        votes: BTreeMap::new(),
        pinned: row.get::<_, i64>(8)? != 0,
        edited: row.get::<_, i64>(9)? != 0,
        reply_to,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_shared::documents::{ChannelKind, User};

    fn seeded() -> (Store, User, ConversationId) {
        let store = Store::open_in_memory().unwrap();
        let user = store
            .sign_up("ada@example.com", "correct-horse", "Ada")
            .unwrap();
        let channel = store
            .create_channel("general", "", ChannelKind::Public, user.id)
            .unwrap();
        (store, user, ConversationId::Channel(channel.id))
    }

    fn draft(conversation: ConversationId, author: &User, text: &str) -> MessageDraft {
        MessageDraft {
            conversation,
            content: text.to_string(),
            author_id: author.id,
            author_name: author.display_name.clone(),
            author_color: author.avatar_color.clone(),
            kind: MessageKind::Text,
            reply_to: None,
        }
    }

    #[test]
    fn fresh_messages_start_clean() {
        let (store, user, conv) = seeded();
        let sent = store.append_message(draft(conv, &user, "hello")).unwrap();

        assert!(!sent.edited);
        assert!(!sent.pinned);
        assert!(sent.reactions.is_empty());
        assert!(sent.votes.is_empty());
        assert_eq!(sent.author_name, "Ada");
    }

    #[test]
    fn burst_sends_get_strictly_increasing_timestamps() {
        let (store, user, conv) = seeded();

        let mut last = None;
        for i in 0..5 {
            let sent = store
                .append_message(draft(conv, &user, &format!("msg {i}")))
                .unwrap();
            if let Some(prev) = last {
                assert!(sent.timestamp > prev, "timestamps must be strict");
            }
            last = Some(sent.timestamp);
        }
    }

    #[test]
    fn recent_messages_returns_latest_window_oldest_first() {
        let (store, user, conv) = seeded();
        for i in 0..5 {
            store
                .append_message(draft(conv, &user, &format!("msg {i}")))
                .unwrap();
        }

        let recent = store.recent_messages(&conv, 3).unwrap();
        let texts: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, vec!["msg 2", "msg 3", "msg 4"]);
    }

    #[test]
    fn only_the_author_may_edit_or_delete() {
        let (store, ada, conv) = seeded();
        let grace = store
            .sign_up("grace@example.com", "correct-horse", "Grace")
            .unwrap();
        let sent = store.append_message(draft(conv, &ada, "mine")).unwrap();

        assert!(matches!(
            store.edit_message(sent.id, grace.id, "hijacked"),
            Err(StoreError::NotMessageAuthor)
        ));
        assert!(matches!(
            store.delete_message(sent.id, grace.id),
            Err(StoreError::NotMessageAuthor)
        ));

        store.edit_message(sent.id, ada.id, "mine, edited").unwrap();
        store.delete_message(sent.id, ada.id).unwrap();
        assert!(store.get_message(sent.id).unwrap().is_none());
    }

    #[test]
    fn edit_sets_the_flag_but_keeps_the_timestamp() {
        let (store, user, conv) = seeded();
        let sent = store.append_message(draft(conv, &user, "v1")).unwrap();

        let edited = store.edit_message(sent.id, user.id, "v2").unwrap();
        assert!(edited.edited);
        assert_eq!(edited.content, "v2");
        assert_eq!(edited.timestamp, sent.timestamp);
    }

    #[test]
    fn pinned_and_edited_are_independent() {
        let (store, user, conv) = seeded();
        let sent = store.append_message(draft(conv, &user, "v1")).unwrap();

        store.edit_message(sent.id, user.id, "v2").unwrap();
        let pinned = store.toggle_pin(sent.id).unwrap();
        assert!(pinned.pinned && pinned.edited);

        let unpinned = store.toggle_pin(sent.id).unwrap();
        assert!(!unpinned.pinned && unpinned.edited);
    }

    #[test]
    fn pinned_listing_follows_the_flag() {
        let (store, user, conv) = seeded();
        let first = store.append_message(draft(conv, &user, "one")).unwrap();
        store.append_message(draft(conv, &user, "two")).unwrap();

        store.toggle_pin(first.id).unwrap();
        let pinned = store.pinned_messages(&conv).unwrap();
        assert_eq!(pinned.len(), 1);
        assert_eq!(pinned[0].id, first.id);
    }

    #[test]
    fn drafts_are_validated_before_any_write() {
        let (store, user, conv) = seeded();

        assert!(store.append_message(draft(conv, &user, "   ")).is_err());

        let long = "x".repeat(MAX_MESSAGE_CHARS + 1);
        assert!(matches!(
            store.append_message(draft(conv, &user, &long)),
            Err(StoreError::Validation(ValidationError::MessageTooLong { .. }))
        ));

        let mut poll = draft(conv, &user, "poll");
        poll.kind = MessageKind::Poll {
            question: "lunch?".into(),
            options: vec!["tacos".into()],
        };
        assert!(matches!(
            store.append_message(poll),
            Err(StoreError::Validation(ValidationError::InvalidPoll))
        ));

        assert!(store.recent_messages(&conv, 10).unwrap().is_empty());
    }

    #[test]
    fn reply_previews_round_trip() {
        let (store, user, conv) = seeded();
        let target = store.append_message(draft(conv, &user, "original")).unwrap();

        let mut reply = draft(conv, &user, "replying");
        reply.reply_to = Some(ReplyPreview {
            id: target.id,
            author_name: target.author_name.clone(),
            content: "original".into(),
        });
        let sent = store.append_message(reply).unwrap();

        let stored = store.get_message(sent.id).unwrap().unwrap();
        let preview = stored.reply_to.expect("preview survives storage");
        assert_eq!(preview.id, target.id);
        assert_eq!(preview.content, "original");
    }

    #[tokio::test]
    async fn watch_is_scoped_to_one_conversation() {
        let (store, user, conv) = seeded();
        let other = store
            .create_channel("ops", "", ChannelKind::Public, user.id)
            .unwrap();
        let other_conv = ConversationId::Channel(other.id);

        store.append_message(draft(conv, &user, "backlog")).unwrap();

        let mut sub = store.watch_messages(conv, 50).unwrap();
        let snapshot = sub.recv().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].doc.content, "backlog");

        store
            .append_message(draft(other_conv, &user, "elsewhere"))
            .unwrap();
        store.append_message(draft(conv, &user, "here")).unwrap();

        let live = sub.recv().await.unwrap().unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].doc.content, "here");
    }
}
