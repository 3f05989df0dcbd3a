use thiserror::Error;

use parlor_shared::ValidationError;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one row but found none.
    #[error("record not found")]
    NotFound,

    /// Input rejected before any write happened.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Another channel already uses this name.
    #[error("a channel named \"{0}\" already exists")]
    NameTaken(String),

    /// A direct conversation needs two distinct members.
    #[error("cannot open a conversation with yourself")]
    SelfConversation,

    /// Edit/delete attempted by someone other than the message author.
    #[error("only the author can change this message")]
    NotMessageAuthor,

    /// The callee's inbound call slot already holds a live session.
    #[error("callee is busy")]
    CalleeBusy,

    /// Answering a call that is no longer ringing.
    #[error("call is not ringing")]
    CallNotRinging,

    /// Redeeming a code nobody issued (or that was mistyped).
    #[error("invite code is not valid")]
    InviteInvalid,

    /// Redeeming a code past its expiry.
    #[error("invite code has expired")]
    InviteExpired,

    /// Every generated code collided with an existing one.
    #[error("could not allocate a free invite code")]
    InviteCodeExhausted,

    /// Migration failure.
    #[error("migration error: {0}")]
    Migration(String),

    /// JSON (de)serialization of a stored column failed.
    #[error("stored JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A thread panicked while holding the store lock.
    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
