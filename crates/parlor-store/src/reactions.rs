//! Reactions and poll votes as atomic set membership.
//!
//! Each (message, user, emoji) reaction and each (message, user, choice)
//! vote is one uniquely-indexed row. Toggles are `INSERT OR IGNORE` /
//! `DELETE` under the store lock, so two users (or two clicks) flipping the
//! same pill concurrently compose instead of overwriting each other's
//! read-modify-write.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use parlor_shared::documents::{Message, MessageKind};
use parlor_shared::types::{MessageId, UserId};
use parlor_shared::ValidationError;
use rusqlite::params;

use crate::database::{bad_column, fmt_ts, now_millis, Database};
use crate::error::{Result, StoreError};
use crate::events::{Change, StoreEvent};
use crate::store::Store;

impl Store {
    /// Flip `uid`'s membership in the reaction set for `emoji`.
    ///
    /// Returns the fresh message and whether the reaction is now present.
    /// Toggling twice restores the original state exactly.
    pub fn toggle_reaction(
        &self,
        id: MessageId,
        uid: UserId,
        emoji: &str,
    ) -> Result<(Message, bool)> {
        let emoji = emoji.trim();
        if emoji.is_empty() {
            return Err(ValidationError::EmptyReaction.into());
        }

        let (message, added) = {
            let db = self.db()?;
            if db.get_message(id)?.is_none() {
                return Err(StoreError::NotFound);
            }
            let added = if db.insert_reaction(id, uid, emoji, now_millis())? {
                true
            } else {
                db.delete_reaction(id, uid, emoji)?;
                false
            };
            (db.get_message(id)?.ok_or(StoreError::NotFound)?, added)
        };

        self.publish(StoreEvent::Message {
            conversation: message.conversation,
            change: Change::modified(message.clone()),
        });
        Ok((message, added))
    }

    /// Flip `uid`'s vote for one poll option.
    ///
    /// Voting is single-choice: picking a new option first clears the
    /// caller's vote on every other option; picking the current option
    /// withdraws the vote.
    pub fn toggle_vote(
        &self,
        id: MessageId,
        uid: UserId,
        option: &str,
    ) -> Result<(Message, bool)> {
        let (message, voted) = {
            let db = self.db()?;
            let current = db.get_message(id)?.ok_or(StoreError::NotFound)?;
            let MessageKind::Poll { options, .. } = &current.kind else {
                return Err(ValidationError::InvalidPoll.into());
            };
            if !options.iter().any(|o| o == option) {
                return Err(ValidationError::UnknownPollOption(option.to_string()).into());
            }

            let voted = if db.user_voted_for(id, uid, option)? {
                db.delete_vote(id, uid, option)?;
                false
            } else {
                db.clear_votes(id, uid)?;
                db.insert_vote(id, uid, option, now_millis())?;
                true
            };
            (db.get_message(id)?.ok_or(StoreError::NotFound)?, voted)
        };

        self.publish(StoreEvent::Message {
            conversation: message.conversation,
            change: Change::modified(message.clone()),
        });
        Ok((message, voted))
    }
}

// ---------------------------------------------------------------------------
// SQL layer
// ---------------------------------------------------------------------------

impl Database {
    pub(crate) fn reactions_for(
        &self,
        id: MessageId,
    ) -> Result<BTreeMap<String, BTreeSet<UserId>>> {
        self.grouped_uid_sets(
            "SELECT emoji, user_id FROM reactions WHERE message_id = ?1",
            id,
        )
    }

    pub(crate) fn votes_for(&self, id: MessageId) -> Result<BTreeMap<String, BTreeSet<UserId>>> {
        self.grouped_uid_sets(
            "SELECT choice, user_id FROM votes WHERE message_id = ?1",
            id,
        )
    }

    fn grouped_uid_sets(
        &self,
        sql: &str,
        id: MessageId,
    ) -> Result<BTreeMap<String, BTreeSet<UserId>>> {
        let mut stmt = self.conn().prepare(sql)?;
        let rows = stmt.query_map(params![id.to_string()], |row| {
            let key: String = row.get(0)?;
            let uid_str: String = row.get(1)?;
            let uid = UserId::parse(&uid_str).map_err(|e| bad_column(1, e))?;
            Ok((key, uid))
        })?;

        let mut sets: BTreeMap<String, BTreeSet<UserId>> = BTreeMap::new();
        for row in rows {
            let (key, uid) = row?;
            sets.entry(key).or_default().insert(uid);
        }
        Ok(sets)
    }

    pub(crate) fn insert_reaction(
        &self,
        id: MessageId,
        uid: UserId,
        emoji: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO reactions (message_id, user_id, emoji, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![id.to_string(), uid.to_string(), emoji, fmt_ts(now)],
        )?;
        Ok(affected > 0)
    }

    pub(crate) fn delete_reaction(&self, id: MessageId, uid: UserId, emoji: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
            params![id.to_string(), uid.to_string(), emoji],
        )?;
        Ok(affected > 0)
    }

    pub(crate) fn user_voted_for(
        &self,
        id: MessageId,
        uid: UserId,
        choice: &str,
    ) -> Result<bool> {
        let exists: bool = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM votes
              WHERE message_id = ?1 AND user_id = ?2 AND choice = ?3)",
            params![id.to_string(), uid.to_string(), choice],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub(crate) fn delete_vote(&self, id: MessageId, uid: UserId, choice: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM votes WHERE message_id = ?1 AND user_id = ?2 AND choice = ?3",
            params![id.to_string(), uid.to_string(), choice],
        )?;
        Ok(affected > 0)
    }

    pub(crate) fn clear_votes(&self, id: MessageId, uid: UserId) -> Result<()> {
        self.conn().execute(
            "DELETE FROM votes WHERE message_id = ?1 AND user_id = ?2",
            params![id.to_string(), uid.to_string()],
        )?;
        Ok(())
    }

    pub(crate) fn insert_vote(
        &self,
        id: MessageId,
        uid: UserId,
        choice: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO votes (message_id, user_id, choice, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![id.to_string(), uid.to_string(), choice, fmt_ts(now)],
        )?;
        Ok(affected > 0)
    }
}
