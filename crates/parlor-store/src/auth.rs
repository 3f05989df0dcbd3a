//! Email/password identity provider.
//!
//! Accounts live in the `users` table next to the data they own. Passwords
//! are stored as salted keyed-BLAKE3 digests and verified in constant time;
//! repeated failed sign-ins for one email are throttled with a sliding
//! window. Sign-in and sign-out double as presence transitions.

use std::time::{Duration, Instant};

use parlor_shared::catalog::ACCENTS;
use parlor_shared::constants::{BADGE_EARLY_BIRD, MIN_PASSWORD_CHARS};
use parlor_shared::documents::{Presence, ProfileFlair, User};
use parlor_shared::types::UserId;
use rand::seq::SliceRandom;
use rand::RngCore;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::database::now_millis;
use crate::error::StoreError;
use crate::events::{Change, StoreEvent};
use crate::store::Store;

/// KDF context for password digests. Changing this invalidates every stored
/// credential.
const KDF_CONTEXT_PASSWORD: &str = "parlor password-digest v1";

/// Sliding window for the failed sign-in throttle.
const THROTTLE_WINDOW: Duration = Duration::from_secs(60);

/// Failed attempts within the window before sign-in is refused outright.
const THROTTLE_MAX_FAILURES: usize = 5;

/// Accounts created while the user table is below this size get the
/// early-bird badge.
const EARLY_BIRD_CUTOFF: i64 = 50;

/// Identity errors, one variant per fixed user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("invalid email address")]
    InvalidEmail,
    #[error("wrong email or password")]
    WrongCredentials,
    #[error("email already in use")]
    EmailInUse,
    #[error("password too weak")]
    WeakPassword,
    #[error("too many attempts")]
    RateLimited,
    #[error("store unavailable: {0}")]
    Network(String),
}

impl AuthError {
    /// Fixed user-facing copy for each kind. Any carried detail string is
    /// for logs, not for display.
    pub fn message(&self) -> &'static str {
        match self {
            AuthError::InvalidEmail => "That email address doesn't look right.",
            AuthError::WrongCredentials => "Wrong email or password.",
            AuthError::EmailInUse => "An account with that email already exists.",
            AuthError::WeakPassword => "Passwords need at least 8 characters.",
            AuthError::RateLimited => "Too many attempts. Wait a minute and try again.",
            AuthError::Network(_) => "Couldn't reach the store. Try again.",
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        AuthError::Network(e.to_string())
    }
}

impl Store {
    /// Create an account and sign it in.
    ///
    /// The display name doubles as the initial username; the client
    /// validates it before calling. The new user comes back `Online` with a
    /// random avatar color, and early accounts get the early-bird badge.
    pub fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<User, AuthError> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(AuthError::InvalidEmail);
        }
        if password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(AuthError::WeakPassword);
        }

        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        let digest = hash_password(&salt, password);

        let display_name = display_name.trim().to_string();
        let now = now_millis();
        let mut user = User {
            id: UserId::new(),
            username: display_name.clone(),
            username_lower: display_name.to_lowercase(),
            display_name,
            email,
            avatar_color: random_avatar_color(),
            bio: String::new(),
            status: Presence::Online,
            badges: Default::default(),
            profile: ProfileFlair::default(),
            created_at: now,
            last_seen: now,
        };

        {
            let db = self.db()?;
            if db.email_in_use(&user.email)? {
                return Err(AuthError::EmailInUse);
            }
            let early = db.user_count()? < EARLY_BIRD_CUTOFF;
            db.insert_user(&user, &hex::encode(salt), &digest)?;
            if early && db.grant_badge_row(user.id, BADGE_EARLY_BIRD, now)? {
                user.badges.insert(BADGE_EARLY_BIRD.to_string());
            }
        }

        tracing::info!(user = %user.id, "account created");
        self.publish(StoreEvent::User(Change::added(user.clone())));
        Ok(user)
    }

    /// Verify credentials and flip the account `Online`.
    pub fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(AuthError::InvalidEmail);
        }
        self.throttle_check(&email)?;

        let user = {
            let db = self.db()?;
            let Some(stored) = db.get_credentials(&email)? else {
                drop(db);
                self.throttle_record_failure(&email);
                return Err(AuthError::WrongCredentials);
            };
            if !verify_password(&stored.salt, &stored.digest, password) {
                drop(db);
                self.throttle_record_failure(&email);
                return Err(AuthError::WrongCredentials);
            }
            db.set_presence(stored.user.id, Presence::Online, now_millis())?
                .ok_or(StoreError::NotFound)?
        };

        self.throttle_clear(&email);
        tracing::info!(user = %user.id, "signed in");
        self.publish(StoreEvent::User(Change::modified(user.clone())));
        Ok(user)
    }

    /// Record the account `Offline`. Idempotent.
    pub fn sign_out(&self, uid: UserId) -> crate::Result<()> {
        let user = self.db()?.set_presence(uid, Presence::Offline, now_millis())?;
        if let Some(user) = user {
            tracing::info!(user = %uid, "signed out");
            self.publish(StoreEvent::User(Change::modified(user)));
        }
        Ok(())
    }

    // -- throttle ----------------------------------------------------------

    fn throttle_check(&self, email: &str) -> Result<(), AuthError> {
        let Ok(mut failures) = self.failed_signins.lock() else {
            tracing::warn!("sign-in throttle lock poisoned, skipping check");
            return Ok(());
        };
        if let Some(instants) = failures.get_mut(email) {
            instants.retain(|t| t.elapsed() < THROTTLE_WINDOW);
            if instants.len() >= THROTTLE_MAX_FAILURES {
                return Err(AuthError::RateLimited);
            }
        }
        Ok(())
    }

    fn throttle_record_failure(&self, email: &str) {
        if let Ok(mut failures) = self.failed_signins.lock() {
            failures
                .entry(email.to_string())
                .or_default()
                .push(Instant::now());
        }
    }

    fn throttle_clear(&self, email: &str) {
        if let Ok(mut failures) = self.failed_signins.lock() {
            failures.remove(email);
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.contains(char::is_whitespace)
}

fn random_avatar_color() -> String {
    ACCENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("#5865f2")
        .to_string()
}

pub(crate) fn hash_password(salt: &[u8], password: &str) -> String {
    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_PASSWORD);
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize().as_bytes())
}

fn verify_password(salt_hex: &str, digest_hex: &str, password: &str) -> bool {
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    let Ok(stored) = hex::decode(digest_hex) else {
        return false;
    };
    let Ok(candidate) = hex::decode(hash_password(&salt, password)) else {
        return false;
    };
    bool::from(stored.as_slice().ct_eq(candidate.as_slice()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    #[test]
    fn sign_up_then_sign_in_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let created = store
            .sign_up("Ada@Example.com", "correct-horse", "Ada")
            .unwrap();
        assert_eq!(created.email, "ada@example.com");
        assert_eq!(created.status, Presence::Online);
        assert!(created.badges.contains(BADGE_EARLY_BIRD));

        let signed_in = store.sign_in("ada@example.com", "correct-horse").unwrap();
        assert_eq!(signed_in.id, created.id);
        assert_eq!(signed_in.status, Presence::Online);
    }

    #[test]
    fn wrong_password_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        store
            .sign_up("ada@example.com", "correct-horse", "Ada")
            .unwrap();

        let err = store.sign_in("ada@example.com", "wrong-horse").unwrap_err();
        assert_eq!(err, AuthError::WrongCredentials);
    }

    #[test]
    fn unknown_email_looks_like_wrong_credentials() {
        let store = Store::open_in_memory().unwrap();
        let err = store
            .sign_in("nobody@example.com", "whatever-pw")
            .unwrap_err();
        assert_eq!(err, AuthError::WrongCredentials);
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        store
            .sign_up("ada@example.com", "correct-horse", "Ada")
            .unwrap();

        let err = store
            .sign_up("ADA@example.com", "other-password", "Imposter")
            .unwrap_err();
        assert_eq!(err, AuthError::EmailInUse);
    }

    #[test]
    fn weak_password_and_bad_email_are_rejected_up_front() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(
            store.sign_up("ada@example.com", "short", "Ada").unwrap_err(),
            AuthError::WeakPassword
        );
        assert_eq!(
            store.sign_up("not-an-email", "correct-horse", "Ada").unwrap_err(),
            AuthError::InvalidEmail
        );
        assert_eq!(
            store.sign_up("a@b", "correct-horse", "Ada").unwrap_err(),
            AuthError::InvalidEmail
        );
    }

    #[test]
    fn repeated_failures_trip_the_throttle() {
        let store = Store::open_in_memory().unwrap();
        store
            .sign_up("ada@example.com", "correct-horse", "Ada")
            .unwrap();

        for _ in 0..5 {
            let err = store.sign_in("ada@example.com", "wrong-horse").unwrap_err();
            assert_eq!(err, AuthError::WrongCredentials);
        }

        // Even the right password is refused until the window moves on.
        let err = store
            .sign_in("ada@example.com", "correct-horse")
            .unwrap_err();
        assert_eq!(err, AuthError::RateLimited);
    }

    #[test]
    fn sign_out_records_offline() {
        let store = Store::open_in_memory().unwrap();
        let user = store
            .sign_up("ada@example.com", "correct-horse", "Ada")
            .unwrap();

        store.sign_out(user.id).unwrap();
        let after = store.get_user(user.id).unwrap().unwrap();
        assert_eq!(after.status, Presence::Offline);
        assert!(after.last_seen >= user.last_seen);
    }

    #[test]
    fn password_digests_are_salted() {
        let a = hash_password(b"salt-one-iiiiiii", "hunter2hunter2");
        let b = hash_password(b"salt-two-iiiiiii", "hunter2hunter2");
        assert_ne!(a, b);
    }
}
