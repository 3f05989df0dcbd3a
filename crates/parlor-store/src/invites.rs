//! Shareable channel invites: short uppercase codes with an expiry, checked
//! at redemption time.

use chrono::Duration;
use parlor_shared::constants::INVITE_CODE_LEN;
use parlor_shared::documents::Invite;
use parlor_shared::types::{ChannelId, UserId};
use rand::Rng;
use rusqlite::{params, OptionalExtension};

use crate::database::{bad_column, fmt_ts, now_millis, parse_ts, Database};
use crate::error::{Result, StoreError};
use crate::store::Store;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Attempts before giving up on finding a free code. With 36^8 codes this
/// only matters if the table is absurdly full.
const CODE_ATTEMPTS: usize = 3;

impl Store {
    /// Issue an invite code for a channel, valid for `ttl` from now.
    pub fn create_invite(&self, channel: ChannelId, by: UserId, ttl: Duration) -> Result<Invite> {
        let db = self.db()?;
        let target = db.get_channel(channel)?.ok_or(StoreError::NotFound)?;
        let now = now_millis();

        let mut rng = rand::thread_rng();
        for _ in 0..CODE_ATTEMPTS {
            let invite = Invite {
                code: random_invite_code(&mut rng),
                channel_id: target.id,
                channel_name: target.name.clone(),
                created_by: by,
                created_at: now,
                expires_at: now + ttl,
                uses: 0,
            };
            if db.insert_invite_row(&invite)? {
                tracing::debug!(code = %invite.code, channel = %target.name, "invite created");
                return Ok(invite);
            }
        }
        Err(StoreError::InviteCodeExhausted)
    }

    /// Redeem a code: validates existence and expiry, then counts the use.
    /// Codes are case-insensitive on input.
    pub fn redeem_invite(&self, code: &str) -> Result<Invite> {
        let code = code.trim().to_uppercase();

        let db = self.db()?;
        let invite = db
            .get_invite_row(&code)?
            .ok_or(StoreError::InviteInvalid)?;
        if invite.is_expired(now_millis()) {
            return Err(StoreError::InviteExpired);
        }

        db.increment_invite_uses(&code)?;
        db.get_invite_row(&code)?.ok_or(StoreError::InviteInvalid)
    }

    pub fn get_invite(&self, code: &str) -> Result<Option<Invite>> {
        self.db()?.get_invite_row(code.trim().to_uppercase().as_str())
    }
}

fn random_invite_code<R: Rng>(rng: &mut R) -> String {
    (0..INVITE_CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

// ---------------------------------------------------------------------------
// SQL layer
// ---------------------------------------------------------------------------

impl Database {
    /// Returns false when the code is already taken.
    pub(crate) fn insert_invite_row(&self, invite: &Invite) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO invites
                 (code, channel_id, channel_name, created_by, created_at, expires_at, uses)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                invite.code,
                invite.channel_id.to_string(),
                invite.channel_name,
                invite.created_by.to_string(),
                fmt_ts(invite.created_at),
                fmt_ts(invite.expires_at),
                invite.uses,
            ],
        )?;
        Ok(affected > 0)
    }

    pub(crate) fn get_invite_row(&self, code: &str) -> Result<Option<Invite>> {
        let invite = self
            .conn()
            .query_row(
                "SELECT code, channel_id, channel_name, created_by, created_at, expires_at, uses
                 FROM invites WHERE code = ?1",
                params![code],
                row_to_invite,
            )
            .optional()?;
        Ok(invite)
    }

    pub(crate) fn increment_invite_uses(&self, code: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE invites SET uses = uses + 1 WHERE code = ?1",
            params![code],
        )?;
        Ok(())
    }
}

fn row_to_invite(row: &rusqlite::Row<'_>) -> rusqlite::Result<Invite> {
    let channel_str: String = row.get(1)?;
    let by_str: String = row.get(3)?;
    let created_str: String = row.get(4)?;
    let expires_str: String = row.get(5)?;

    Ok(Invite {
        code: row.get(0)?,
        channel_id: ChannelId::parse(&channel_str).map_err(|e| bad_column(1, e))?,
        channel_name: row.get(2)?,
        created_by: UserId::parse(&by_str).map_err(|e| bad_column(3, e))?,
        created_at: parse_ts(&created_str, 4)?,
        expires_at: parse_ts(&expires_str, 5)?,
        uses: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_shared::constants::DEFAULT_INVITE_TTL_HOURS;
    use parlor_shared::documents::ChannelKind;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn seeded() -> (Store, UserId, ChannelId) {
        let store = Store::open_in_memory().unwrap();
        let user = store
            .sign_up("ada@example.com", "correct-horse", "Ada")
            .unwrap();
        let channel = store
            .create_channel("general", "", ChannelKind::Public, user.id)
            .unwrap();
        (store, user.id, channel.id)
    }

    #[test]
    fn codes_are_short_uppercase_alphanumerics() {
        let mut rng = StdRng::seed_from_u64(7);
        let code = random_invite_code(&mut rng);
        assert_eq!(code.len(), INVITE_CODE_LEN);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn redeeming_counts_uses_and_is_case_insensitive() {
        let (store, by, channel) = seeded();
        let invite = store
            .create_invite(channel, by, Duration::hours(DEFAULT_INVITE_TTL_HOURS))
            .unwrap();
        assert_eq!(invite.uses, 0);

        let redeemed = store.redeem_invite(&invite.code.to_lowercase()).unwrap();
        assert_eq!(redeemed.uses, 1);
        assert_eq!(redeemed.channel_name, "general");

        let again = store.redeem_invite(&invite.code).unwrap();
        assert_eq!(again.uses, 2);
    }

    #[test]
    fn unknown_codes_are_invalid() {
        let (store, _, _) = seeded();
        assert!(matches!(
            store.redeem_invite("NOPE1234"),
            Err(StoreError::InviteInvalid)
        ));
    }

    #[test]
    fn expired_codes_are_refused_at_redemption() {
        let (store, by, channel) = seeded();
        let invite = store
            .create_invite(channel, by, Duration::hours(-1))
            .unwrap();

        assert!(matches!(
            store.redeem_invite(&invite.code),
            Err(StoreError::InviteExpired)
        ));
        // Still on record, just unusable.
        assert!(store.get_invite(&invite.code).unwrap().is_some());
    }

    #[test]
    fn invites_require_an_existing_channel() {
        let (store, by, _) = seeded();
        assert!(matches!(
            store.create_invite(ChannelId::new(), by, Duration::hours(1)),
            Err(StoreError::NotFound)
        ));
    }
}
