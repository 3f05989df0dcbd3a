//! User rows: lookup, prefix search, profile edits, presence, badges.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use parlor_shared::catalog;
use parlor_shared::constants::BADGE_PROFILE_COMPLETE;
use parlor_shared::documents::{Presence, ProfileFlair, User};
use parlor_shared::names;
use parlor_shared::types::UserId;
use rusqlite::{params, OptionalExtension};

use crate::database::{bad_column, fmt_ts, now_millis, parse_ts, unknown_tag, Database};
use crate::error::{Result, StoreError};
use crate::events::{Change, StoreEvent, Subscription};
use crate::store::Store;

/// Owner-editable profile fields. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub pronouns: Option<String>,
    pub activity: Option<String>,
    pub banner: Option<String>,
    pub frame: Option<String>,
    pub effect: Option<String>,
    pub accent_color: Option<String>,
}

/// A user row plus its credential material. Never leaves the crate.
pub(crate) struct StoredCredentials {
    pub user: User,
    pub salt: String,
    pub digest: String,
}

const USER_COLUMNS: &str = "id, username, username_lower, display_name, email, avatar_color, \
     bio, status, created_at, last_seen, pronouns, activity, banner, frame, effect, accent_color";

// ---------------------------------------------------------------------------
// Store operations
// ---------------------------------------------------------------------------

impl Store {
    pub fn get_user(&self, uid: UserId) -> Result<Option<User>> {
        self.db()?.get_user(uid)
    }

    /// All registered users, ordered by lowercase username.
    pub fn list_users(&self) -> Result<Vec<User>> {
        self.db()?.list_users()
    }

    /// Case-insensitive username prefix search.
    pub fn search_users(&self, prefix: &str, limit: u32) -> Result<Vec<User>> {
        let prefix = prefix.trim().to_lowercase();
        if prefix.is_empty() {
            return Ok(Vec::new());
        }
        self.db()?.search_users(&prefix, limit)
    }

    /// Apply an owner-initiated profile edit.
    ///
    /// Flair selections are validated against the fixed catalog before
    /// anything is written. Crossing 100% profile completeness grants the
    /// profile-complete badge as a side effect, once.
    pub fn update_profile(&self, uid: UserId, mut update: ProfileUpdate) -> Result<User> {
        if let Some(name) = &update.display_name {
            update.display_name = Some(names::validate_display_name(name)?);
        }
        if let Some(banner) = &update.banner {
            catalog::validate_banner(banner)?;
        }
        if let Some(frame) = &update.frame {
            catalog::validate_frame(frame)?;
        }
        if let Some(effect) = &update.effect {
            catalog::validate_effect(effect)?;
        }
        if let Some(accent) = &update.accent_color {
            catalog::validate_accent(accent)?;
        }

        let user = {
            let db = self.db()?;
            db.apply_profile_update(uid, &update)?;
            let mut user = db.get_user(uid)?.ok_or(StoreError::NotFound)?;

            if catalog::completeness(&user).is_complete()
                && !user.badges.contains(BADGE_PROFILE_COMPLETE)
                && db.grant_badge_row(uid, BADGE_PROFILE_COMPLETE, now_millis())?
            {
                user.badges.insert(BADGE_PROFILE_COMPLETE.to_string());
            }
            user
        };

        self.publish(StoreEvent::User(Change::modified(user.clone())));
        Ok(user)
    }

    /// Manual presence selection (Idle, Dnd, Invisible, ...).
    pub fn set_status(&self, uid: UserId, status: Presence) -> Result<User> {
        let user = self
            .db()?
            .set_presence(uid, status, now_millis())?
            .ok_or(StoreError::NotFound)?;
        self.publish(StoreEvent::User(Change::modified(user.clone())));
        Ok(user)
    }

    /// Idempotent badge grant. Publishes only when the badge is new.
    pub fn grant_badge(&self, uid: UserId, badge: &str) -> Result<User> {
        let (user, granted) = {
            let db = self.db()?;
            let granted = db.grant_badge_row(uid, badge, now_millis())?;
            let user = db.get_user(uid)?.ok_or(StoreError::NotFound)?;
            (user, granted)
        };
        if granted {
            self.publish(StoreEvent::User(Change::modified(user.clone())));
        }
        Ok(user)
    }

    /// Number of users whose status counts as online. Invisible users are
    /// invisible here too.
    pub fn online_count(&self) -> Result<usize> {
        self.db()?.online_count()
    }

    /// Watch every user document: snapshot, then profile/presence changes.
    pub fn watch_users(&self) -> Result<Subscription<User>> {
        let feed = self.feed_receiver();
        let snapshot = self.db()?.list_users()?;
        Ok(self.forward(feed, snapshot, |event| match event {
            StoreEvent::User(change) => Some(change),
            _ => None,
        }))
    }
}

// ---------------------------------------------------------------------------
// SQL layer
// ---------------------------------------------------------------------------

impl Database {
    pub(crate) fn insert_user(&self, user: &User, salt_hex: &str, digest_hex: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, username, username_lower, display_name, email,
                                password_salt, password_digest, avatar_color, bio, status,
                                created_at, last_seen, pronouns, activity, banner, frame,
                                effect, accent_color)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                user.id.to_string(),
                user.username,
                user.username_lower,
                user.display_name,
                user.email,
                salt_hex,
                digest_hex,
                user.avatar_color,
                user.bio,
                user.status.as_str(),
                fmt_ts(user.created_at),
                fmt_ts(user.last_seen),
                user.profile.pronouns,
                user.profile.activity,
                user.profile.banner,
                user.profile.frame,
                user.profile.effect,
                user.profile.accent_color,
            ],
        )?;
        Ok(())
    }

    pub(crate) fn get_user(&self, uid: UserId) -> Result<Option<User>> {
        let user = self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![uid.to_string()],
                row_to_user,
            )
            .optional()?;

        match user {
            Some(user) => Ok(Some(self.attach_badges(user)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn get_credentials(&self, email: &str) -> Result<Option<StoredCredentials>> {
        let found = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {USER_COLUMNS}, password_salt, password_digest
                     FROM users WHERE email = ?1"
                ),
                params![email],
                |row| {
                    let user = row_to_user(row)?;
                    let salt: String = row.get(16)?;
                    let digest: String = row.get(17)?;
                    Ok((user, salt, digest))
                },
            )
            .optional()?;

        match found {
            Some((user, salt, digest)) => Ok(Some(StoredCredentials {
                user: self.attach_badges(user)?,
                salt,
                digest,
            })),
            None => Ok(None),
        }
    }

    pub(crate) fn email_in_use(&self, email: &str) -> Result<bool> {
        let exists: bool = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
            params![email],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub(crate) fn user_count(&self) -> Result<i64> {
        let count: i64 =
            self.conn()
                .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }

    pub(crate) fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY username_lower"
        ))?;
        let rows = stmt.query_map([], row_to_user)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(self.attach_badges(row?)?);
        }
        Ok(users)
    }

    pub(crate) fn search_users(&self, prefix_lower: &str, limit: u32) -> Result<Vec<User>> {
        let pattern = format!("{}%", escape_like(prefix_lower));
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE username_lower LIKE ?1 ESCAPE '\\'
             ORDER BY username_lower
             LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![pattern, limit], row_to_user)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(self.attach_badges(row?)?);
        }
        Ok(users)
    }

    /// Update status and last_seen, returning the fresh row.
    pub(crate) fn set_presence(
        &self,
        uid: UserId,
        status: Presence,
        seen: DateTime<Utc>,
    ) -> Result<Option<User>> {
        let affected = self.conn().execute(
            "UPDATE users SET status = ?2, last_seen = ?3 WHERE id = ?1",
            params![uid.to_string(), status.as_str(), fmt_ts(seen)],
        )?;
        if affected == 0 {
            return Ok(None);
        }
        self.get_user(uid)
    }

    pub(crate) fn apply_profile_update(&self, uid: UserId, update: &ProfileUpdate) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE users SET
                 display_name = COALESCE(?2, display_name),
                 bio          = COALESCE(?3, bio),
                 pronouns     = COALESCE(?4, pronouns),
                 activity     = COALESCE(?5, activity),
                 banner       = COALESCE(?6, banner),
                 frame        = COALESCE(?7, frame),
                 effect       = COALESCE(?8, effect),
                 accent_color = COALESCE(?9, accent_color)
             WHERE id = ?1",
            params![
                uid.to_string(),
                update.display_name,
                update.bio,
                update.pronouns,
                update.activity,
                update.banner,
                update.frame,
                update.effect,
                update.accent_color,
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub(crate) fn grant_badge_row(
        &self,
        uid: UserId,
        badge: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO badges (user_id, badge, granted_at) VALUES (?1, ?2, ?3)",
            params![uid.to_string(), badge, fmt_ts(now)],
        )?;
        Ok(affected > 0)
    }

    pub(crate) fn online_count(&self) -> Result<usize> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM users WHERE status IN ('online', 'idle', 'dnd')",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn attach_badges(&self, mut user: User) -> Result<User> {
        user.badges = self.badges_for(user.id)?;
        Ok(user)
    }

    fn badges_for(&self, uid: UserId) -> Result<BTreeSet<String>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT badge FROM badges WHERE user_id = ?1")?;
        let rows = stmt.query_map(params![uid.to_string()], |row| row.get::<_, String>(0))?;

        let mut badges = BTreeSet::new();
        for row in rows {
            badges.insert(row?);
        }
        Ok(badges)
    }
}

/// Escape `%`, `_` and `\` so a user-supplied prefix is matched literally.
fn escape_like(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id_str: String = row.get(0)?;
    let status_str: String = row.get(7)?;
    let created_str: String = row.get(8)?;
    let seen_str: String = row.get(9)?;

    let id = UserId::parse(&id_str).map_err(|e| bad_column(0, e))?;
    let status = Presence::parse(&status_str).ok_or_else(|| unknown_tag(7, &status_str))?;

    Ok(User {
        id,
        username: row.get(1)?,
        username_lower: row.get(2)?,
        display_name: row.get(3)?,
        email: row.get(4)?,
        avatar_color: row.get(5)?,
        bio: row.get(6)?,
        status,
        // Filled in by `attach_badges`; the mapper sees only the users table.
        badges: BTreeSet::new(),
        created_at: parse_ts(&created_str, 8)?,
        last_seen: parse_ts(&seen_str, 9)?,
        profile: ProfileFlair {
            pronouns: row.get(10)?,
            activity: row.get(11)?,
            banner: row.get(12)?,
            frame: row.get(13)?,
            effect: row.get(14)?,
            accent_color: row.get(15)?,
        },
    })
}
