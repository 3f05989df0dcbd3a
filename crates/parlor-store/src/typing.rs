//! Typing markers: best-effort ephemeral rows, upserted per keystroke burst
//! and aged out by readers instead of being swept.

use parlor_shared::documents::TypingMarker;
use parlor_shared::types::{ConversationId, UserId};
use rusqlite::{params, OptionalExtension};

use crate::database::{bad_column, fmt_ts, now_millis, parse_ts, Database};
use crate::error::Result;
use crate::events::{Change, StoreEvent, Subscription};
use crate::store::Store;

impl Store {
    /// Refresh `uid`'s marker in a conversation. One row per (conversation,
    /// user); repeated calls only move `updated_at` forward.
    pub fn upsert_typing(
        &self,
        conversation: ConversationId,
        uid: UserId,
        display_name: &str,
    ) -> Result<TypingMarker> {
        let marker = TypingMarker {
            conversation,
            user_id: uid,
            display_name: display_name.to_string(),
            updated_at: now_millis(),
        };
        self.db()?.upsert_typing_row(&marker)?;

        self.publish(StoreEvent::Typing {
            conversation,
            change: Change::added(marker.clone()),
        });
        Ok(marker)
    }

    /// Drop `uid`'s marker. No-op (and no event) when none exists.
    pub fn clear_typing(&self, conversation: ConversationId, uid: UserId) -> Result<()> {
        let removed = {
            let db = self.db()?;
            match db.get_typing_row(&conversation, uid)? {
                Some(marker) => {
                    db.delete_typing_row(&conversation, uid)?;
                    Some(marker)
                }
                None => None,
            }
        };

        if let Some(marker) = removed {
            self.publish(StoreEvent::Typing {
                conversation,
                change: Change::removed(marker),
            });
        }
        Ok(())
    }

    /// Every marker currently stored for a conversation, stale ones
    /// included; freshness is the reader's call.
    pub fn typing_in(&self, conversation: &ConversationId) -> Result<Vec<TypingMarker>> {
        self.db()?.list_typing(conversation)
    }

    /// Watch one conversation's markers.
    pub fn watch_typing(
        &self,
        conversation: ConversationId,
    ) -> Result<Subscription<TypingMarker>> {
        let feed = self.feed_receiver();
        let snapshot = self.db()?.list_typing(&conversation)?;
        Ok(self.forward(feed, snapshot, move |event| match event {
            StoreEvent::Typing {
                conversation: c,
                change,
            } if c == conversation => Some(change),
            _ => None,
        }))
    }
}

// ---------------------------------------------------------------------------
// SQL layer
// ---------------------------------------------------------------------------

impl Database {
    pub(crate) fn upsert_typing_row(&self, marker: &TypingMarker) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO typing (conversation, user_id, display_name, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                marker.conversation.storage_key(),
                marker.user_id.to_string(),
                marker.display_name,
                fmt_ts(marker.updated_at),
            ],
        )?;
        Ok(())
    }

    pub(crate) fn get_typing_row(
        &self,
        conversation: &ConversationId,
        uid: UserId,
    ) -> Result<Option<TypingMarker>> {
        let marker = self
            .conn()
            .query_row(
                "SELECT conversation, user_id, display_name, updated_at
                 FROM typing WHERE conversation = ?1 AND user_id = ?2",
                params![conversation.storage_key(), uid.to_string()],
                row_to_typing,
            )
            .optional()?;
        Ok(marker)
    }

    pub(crate) fn delete_typing_row(
        &self,
        conversation: &ConversationId,
        uid: UserId,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM typing WHERE conversation = ?1 AND user_id = ?2",
            params![conversation.storage_key(), uid.to_string()],
        )?;
        Ok(affected > 0)
    }

    pub(crate) fn list_typing(&self, conversation: &ConversationId) -> Result<Vec<TypingMarker>> {
        let mut stmt = self.conn().prepare(
            "SELECT conversation, user_id, display_name, updated_at
             FROM typing WHERE conversation = ?1
             ORDER BY display_name",
        )?;
        let rows = stmt.query_map(params![conversation.storage_key()], row_to_typing)?;

        let mut markers = Vec::new();
        for row in rows {
            markers.push(row?);
        }
        Ok(markers)
    }
}

fn row_to_typing(row: &rusqlite::Row<'_>) -> rusqlite::Result<TypingMarker> {
    let conversation_str: String = row.get(0)?;
    let uid_str: String = row.get(1)?;
    let updated_str: String = row.get(3)?;

    Ok(TypingMarker {
        conversation: ConversationId::parse_key(&conversation_str)
            .map_err(|e| bad_column(0, e))?,
        user_id: UserId::parse(&uid_str).map_err(|e| bad_column(1, e))?,
        display_name: row.get(2)?,
        updated_at: parse_ts(&updated_str, 3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChangeKind;
    use parlor_shared::documents::ChannelKind;

    fn seeded() -> (Store, UserId, ConversationId) {
        let store = Store::open_in_memory().unwrap();
        let user = store
            .sign_up("ada@example.com", "correct-horse", "Ada")
            .unwrap();
        let channel = store
            .create_channel("general", "", ChannelKind::Public, user.id)
            .unwrap();
        (store, user.id, ConversationId::Channel(channel.id))
    }

    #[test]
    fn upsert_keeps_one_row_per_user() {
        let (store, uid, conv) = seeded();

        let first = store.upsert_typing(conv, uid, "Ada").unwrap();
        let second = store.upsert_typing(conv, uid, "Ada").unwrap();
        assert!(second.updated_at >= first.updated_at);

        let markers = store.typing_in(&conv).unwrap();
        assert_eq!(markers.len(), 1);
    }

    #[test]
    fn clear_is_idempotent() {
        let (store, uid, conv) = seeded();
        store.upsert_typing(conv, uid, "Ada").unwrap();

        store.clear_typing(conv, uid).unwrap();
        store.clear_typing(conv, uid).unwrap();
        assert!(store.typing_in(&conv).unwrap().is_empty());
    }

    #[tokio::test]
    async fn watch_sees_upserts_and_clears() {
        let (store, uid, conv) = seeded();

        let mut sub = store.watch_typing(conv).unwrap();
        assert!(sub.recv().await.unwrap().unwrap().is_empty());

        store.upsert_typing(conv, uid, "Ada").unwrap();
        let added = sub.recv().await.unwrap().unwrap();
        assert_eq!(added[0].kind, ChangeKind::Added);
        assert_eq!(added[0].doc.display_name, "Ada");

        store.clear_typing(conv, uid).unwrap();
        let removed = sub.recv().await.unwrap().unwrap();
        assert_eq!(removed[0].kind, ChangeKind::Removed);
        assert_eq!(removed[0].doc.user_id, uid);
    }
}
