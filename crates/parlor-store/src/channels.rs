//! Channel rows: creation, lookup, topic edits, and the channel-list feed.

use parlor_shared::constants::GENERAL_CHANNEL;
use parlor_shared::documents::{Channel, ChannelKind};
use parlor_shared::names::normalize_channel_name;
use parlor_shared::types::{ChannelId, UserId};
use rusqlite::{params, OptionalExtension};

use crate::database::{bad_column, fmt_ts, now_millis, parse_ts, unknown_tag, Database};
use crate::error::{Result, StoreError};
use crate::events::{Change, StoreEvent, Subscription};
use crate::store::Store;

const CHANNEL_COLUMNS: &str = "id, name, topic, kind, created_at, created_by";

impl Store {
    /// Create a channel. The raw name is slug-normalized first, so
    /// `"My Team!!"` and `"my-team"` collide.
    pub fn create_channel(
        &self,
        name: &str,
        topic: &str,
        kind: ChannelKind,
        by: UserId,
    ) -> Result<Channel> {
        let slug = normalize_channel_name(name)?;

        let channel = {
            let db = self.db()?;
            if db.get_channel_by_name(&slug)?.is_some() {
                return Err(StoreError::NameTaken(slug));
            }
            let channel = Channel {
                id: ChannelId::new(),
                name: slug,
                topic: topic.trim().to_string(),
                kind,
                created_at: now_millis(),
                created_by: by,
            };
            db.insert_channel(&channel)?;
            channel
        };

        tracing::debug!(channel = %channel.id, name = %channel.name, "channel created");
        self.publish(StoreEvent::Channel(Change::added(channel.clone())));
        Ok(channel)
    }

    /// Make sure the default channel exists. Returns it either way; only a
    /// genuine creation publishes an event.
    pub fn ensure_general(&self, by: UserId) -> Result<Channel> {
        let (channel, created) = {
            let db = self.db()?;
            match db.get_channel_by_name(GENERAL_CHANNEL)? {
                Some(existing) => (existing, false),
                None => {
                    let channel = Channel {
                        id: ChannelId::new(),
                        name: GENERAL_CHANNEL.to_string(),
                        topic: "Talk about anything".to_string(),
                        kind: ChannelKind::Public,
                        created_at: now_millis(),
                        created_by: by,
                    };
                    db.insert_channel(&channel)?;
                    (channel, true)
                }
            }
        };

        if created {
            self.publish(StoreEvent::Channel(Change::added(channel.clone())));
        }
        Ok(channel)
    }

    pub fn get_channel(&self, id: ChannelId) -> Result<Option<Channel>> {
        self.db()?.get_channel(id)
    }

    pub fn get_channel_by_name(&self, name: &str) -> Result<Option<Channel>> {
        self.db()?.get_channel_by_name(name)
    }

    /// All channels, oldest first.
    pub fn list_channels(&self) -> Result<Vec<Channel>> {
        self.db()?.list_channels()
    }

    /// Replace a channel's topic.
    pub fn set_channel_topic(&self, id: ChannelId, topic: &str) -> Result<Channel> {
        let channel = self
            .db()?
            .update_channel_topic(id, topic.trim())?
            .ok_or(StoreError::NotFound)?;
        self.publish(StoreEvent::Channel(Change::modified(channel.clone())));
        Ok(channel)
    }

    /// Watch the channel list: snapshot in creation order, then changes.
    pub fn watch_channels(&self) -> Result<Subscription<Channel>> {
        let feed = self.feed_receiver();
        let snapshot = self.db()?.list_channels()?;
        Ok(self.forward(feed, snapshot, |event| match event {
            StoreEvent::Channel(change) => Some(change),
            _ => None,
        }))
    }
}

// ---------------------------------------------------------------------------
// SQL layer
// ---------------------------------------------------------------------------

impl Database {
    pub(crate) fn insert_channel(&self, channel: &Channel) -> Result<()> {
        self.conn().execute(
            "INSERT INTO channels (id, name, topic, kind, created_at, created_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                channel.id.to_string(),
                channel.name,
                channel.topic,
                channel.kind.as_str(),
                fmt_ts(channel.created_at),
                channel.created_by.to_string(),
            ],
        )?;
        Ok(())
    }

    pub(crate) fn get_channel(&self, id: ChannelId) -> Result<Option<Channel>> {
        let channel = self
            .conn()
            .query_row(
                &format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = ?1"),
                params![id.to_string()],
                row_to_channel,
            )
            .optional()?;
        Ok(channel)
    }

    pub(crate) fn get_channel_by_name(&self, name: &str) -> Result<Option<Channel>> {
        let channel = self
            .conn()
            .query_row(
                &format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE name = ?1"),
                params![name],
                row_to_channel,
            )
            .optional()?;
        Ok(channel)
    }

    pub(crate) fn list_channels(&self) -> Result<Vec<Channel>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels ORDER BY created_at, name"
        ))?;
        let rows = stmt.query_map([], row_to_channel)?;

        let mut channels = Vec::new();
        for row in rows {
            channels.push(row?);
        }
        Ok(channels)
    }

    pub(crate) fn update_channel_topic(
        &self,
        id: ChannelId,
        topic: &str,
    ) -> Result<Option<Channel>> {
        let affected = self.conn().execute(
            "UPDATE channels SET topic = ?2 WHERE id = ?1",
            params![id.to_string(), topic],
        )?;
        if affected == 0 {
            return Ok(None);
        }
        self.get_channel(id)
    }
}

fn row_to_channel(row: &rusqlite::Row<'_>) -> rusqlite::Result<Channel> {
    let id_str: String = row.get(0)?;
    let kind_str: String = row.get(3)?;
    let created_str: String = row.get(4)?;
    let by_str: String = row.get(5)?;

    Ok(Channel {
        id: ChannelId::parse(&id_str).map_err(|e| bad_column(0, e))?,
        name: row.get(1)?,
        topic: row.get(2)?,
        kind: ChannelKind::parse(&kind_str).ok_or_else(|| unknown_tag(3, &kind_str))?,
        created_at: parse_ts(&created_str, 4)?,
        created_by: UserId::parse(&by_str).map_err(|e| bad_column(5, e))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> (Store, UserId) {
        let store = Store::open_in_memory().unwrap();
        let user = store
            .sign_up("ada@example.com", "correct-horse", "Ada")
            .unwrap();
        (store, user.id)
    }

    #[test]
    fn names_are_normalized_and_unique() {
        let (store, by) = seeded();

        let team = store
            .create_channel("My Team!!", "", ChannelKind::Public, by)
            .unwrap();
        assert_eq!(team.name, "my-team");

        // The normalized form collides even when the raw input differs.
        let err = store
            .create_channel("my team", "", ChannelKind::Public, by)
            .unwrap_err();
        assert!(matches!(err, StoreError::NameTaken(name) if name == "my-team"));
    }

    #[test]
    fn unusable_names_are_rejected() {
        let (store, by) = seeded();
        assert!(store
            .create_channel("!!!", "", ChannelKind::Public, by)
            .is_err());
    }

    #[test]
    fn ensure_general_is_idempotent() {
        let (store, by) = seeded();

        let first = store.ensure_general(by).unwrap();
        let second = store.ensure_general(by).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.name, GENERAL_CHANNEL);
        assert_eq!(store.list_channels().unwrap().len(), 1);
    }

    #[test]
    fn list_is_ordered_by_creation() {
        let (store, by) = seeded();
        store
            .create_channel("alpha", "", ChannelKind::Public, by)
            .unwrap();
        store
            .create_channel("beta", "", ChannelKind::Public, by)
            .unwrap();

        let names: Vec<_> = store
            .list_channels()
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[test]
    fn topic_edits_round_trip() {
        let (store, by) = seeded();
        let channel = store
            .create_channel("ops", " pager duty ", ChannelKind::Public, by)
            .unwrap();
        assert_eq!(channel.topic, "pager duty");

        let updated = store.set_channel_topic(channel.id, "incident review").unwrap();
        assert_eq!(updated.topic, "incident review");
        assert_eq!(updated.created_at, channel.created_at);
    }
}
