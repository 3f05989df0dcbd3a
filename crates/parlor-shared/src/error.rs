use thiserror::Error;

use crate::constants::{MAX_MESSAGE_CHARS, MAX_POLL_OPTIONS, MIN_POLL_OPTIONS};

/// Input problems caught before anything is written. These are reported
/// immediately to the user and never cost a round-trip to the store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("message is empty")]
    EmptyMessage,

    #[error("message is {len} characters, the limit is {MAX_MESSAGE_CHARS}")]
    MessageTooLong { len: usize },

    #[error("channel name contains no usable characters")]
    EmptyChannelName,

    #[error("display name must be 3 to 32 characters")]
    InvalidDisplayName,

    #[error("a poll needs a question and {MIN_POLL_OPTIONS} to {MAX_POLL_OPTIONS} options")]
    InvalidPoll,

    #[error("\"{0}\" is not one of the poll's options")]
    UnknownPollOption(String),

    #[error("reaction emoji is empty")]
    EmptyReaction,

    #[error("unknown {kind} preset: {id}")]
    UnknownFlair { kind: &'static str, id: String },

    #[error("malformed identifier: {0}")]
    MalformedId(String),
}
