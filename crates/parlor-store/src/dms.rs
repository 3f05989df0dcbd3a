//! Direct conversations: get-or-create by unordered pair, activity bumps,
//! and the per-user DM list feed.

use chrono::{DateTime, Utc};
use parlor_shared::documents::DirectConversation;
use parlor_shared::types::{DmId, UserId};
use rusqlite::{params, OptionalExtension};

use crate::database::{bad_column, fmt_ts, now_millis, parse_ts, Database};
use crate::error::{Result, StoreError};
use crate::events::{Change, StoreEvent, Subscription};
use crate::store::Store;

const DM_COLUMNS: &str = "id, member_a, member_b, created_at, last_activity";

impl Store {
    /// Get the conversation for an unordered user pair, creating it on first
    /// use. Both argument orders converge on the same record.
    pub fn open_or_create_dm(&self, a: UserId, b: UserId) -> Result<DirectConversation> {
        if a == b {
            return Err(StoreError::SelfConversation);
        }
        let pair = DirectConversation::canonical_pair(a, b);

        let (dm, created) = {
            let db = self.db()?;
            match db.get_dm_by_pair(pair)? {
                Some(existing) => (existing, false),
                None => {
                    let now = now_millis();
                    let dm = DirectConversation {
                        id: DmId::new(),
                        members: pair,
                        created_at: now,
                        last_activity: now,
                    };
                    db.insert_dm(&dm)?;
                    (dm, true)
                }
            }
        };

        if created {
            tracing::debug!(dm = %dm.id, "direct conversation created");
            self.publish(StoreEvent::Dm(Change::added(dm.clone())));
        }
        Ok(dm)
    }

    pub fn get_dm(&self, id: DmId) -> Result<Option<DirectConversation>> {
        self.db()?.get_dm(id)
    }

    /// Conversations involving `uid`, most recently active first.
    pub fn list_dms_for(&self, uid: UserId) -> Result<Vec<DirectConversation>> {
        self.db()?.list_dms_for(uid)
    }

    /// Advance `last_activity` to `at` (never backwards). Called on message
    /// send; the DM list sorts by this field at insert time.
    pub fn bump_dm_activity(&self, id: DmId, at: DateTime<Utc>) -> Result<DirectConversation> {
        let dm = self
            .db()?
            .bump_dm_row(id, at)?
            .ok_or(StoreError::NotFound)?;
        self.publish(StoreEvent::Dm(Change::modified(dm.clone())));
        Ok(dm)
    }

    /// Watch the DM list for one user: snapshot (most recent first), then
    /// changes to conversations they are part of.
    pub fn watch_dms(&self, uid: UserId) -> Result<Subscription<DirectConversation>> {
        let feed = self.feed_receiver();
        let snapshot = self.db()?.list_dms_for(uid)?;
        Ok(self.forward(feed, snapshot, move |event| match event {
            StoreEvent::Dm(change) if change.doc.has_member(&uid) => Some(change),
            _ => None,
        }))
    }
}

// ---------------------------------------------------------------------------
// SQL layer
// ---------------------------------------------------------------------------

impl Database {
    pub(crate) fn insert_dm(&self, dm: &DirectConversation) -> Result<()> {
        self.conn().execute(
            "INSERT INTO dms (id, member_a, member_b, created_at, last_activity)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                dm.id.to_string(),
                dm.members[0].to_string(),
                dm.members[1].to_string(),
                fmt_ts(dm.created_at),
                fmt_ts(dm.last_activity),
            ],
        )?;
        Ok(())
    }

    pub(crate) fn get_dm(&self, id: DmId) -> Result<Option<DirectConversation>> {
        let dm = self
            .conn()
            .query_row(
                &format!("SELECT {DM_COLUMNS} FROM dms WHERE id = ?1"),
                params![id.to_string()],
                row_to_dm,
            )
            .optional()?;
        Ok(dm)
    }

    pub(crate) fn get_dm_by_pair(&self, pair: [UserId; 2]) -> Result<Option<DirectConversation>> {
        let dm = self
            .conn()
            .query_row(
                &format!("SELECT {DM_COLUMNS} FROM dms WHERE member_a = ?1 AND member_b = ?2"),
                params![pair[0].to_string(), pair[1].to_string()],
                row_to_dm,
            )
            .optional()?;
        Ok(dm)
    }

    pub(crate) fn list_dms_for(&self, uid: UserId) -> Result<Vec<DirectConversation>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {DM_COLUMNS} FROM dms
             WHERE member_a = ?1 OR member_b = ?1
             ORDER BY last_activity DESC"
        ))?;
        let rows = stmt.query_map(params![uid.to_string()], row_to_dm)?;

        let mut dms = Vec::new();
        for row in rows {
            dms.push(row?);
        }
        Ok(dms)
    }

    /// Timestamps are fixed-width text, so SQL `MAX` keeps the bump
    /// monotonic under concurrent sends.
    pub(crate) fn bump_dm_row(
        &self,
        id: DmId,
        at: DateTime<Utc>,
    ) -> Result<Option<DirectConversation>> {
        let affected = self.conn().execute(
            "UPDATE dms SET last_activity = MAX(last_activity, ?2) WHERE id = ?1",
            params![id.to_string(), fmt_ts(at)],
        )?;
        if affected == 0 {
            return Ok(None);
        }
        self.get_dm(id)
    }
}

fn row_to_dm(row: &rusqlite::Row<'_>) -> rusqlite::Result<DirectConversation> {
    let id_str: String = row.get(0)?;
    let a_str: String = row.get(1)?;
    let b_str: String = row.get(2)?;
    let created_str: String = row.get(3)?;
    let activity_str: String = row.get(4)?;

    Ok(DirectConversation {
        id: DmId::parse(&id_str).map_err(|e| bad_column(0, e))?,
        members: [
            UserId::parse(&a_str).map_err(|e| bad_column(1, e))?,
            UserId::parse(&b_str).map_err(|e| bad_column(2, e))?,
        ],
        created_at: parse_ts(&created_str, 3)?,
        last_activity: parse_ts(&activity_str, 4)?,
    })
}
