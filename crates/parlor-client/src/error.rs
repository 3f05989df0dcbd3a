//! Client-level errors.

use parlor_calls::CallError;
use parlor_shared::ValidationError;
use parlor_store::{AuthError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Call(#[from] CallError),

    /// The local preference database misbehaved.
    #[error("preference storage: {0}")]
    Prefs(#[from] rusqlite::Error),

    #[error("could not determine a config directory")]
    NoConfigDir,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("not signed in")]
    NotSignedIn,

    #[error("no conversation selected")]
    NoConversation,

    #[error("no call in progress")]
    NoActiveCall,

    #[error("a call is already in progress")]
    CallInProgress,
}

pub type Result<T> = std::result::Result<T, ClientError>;
