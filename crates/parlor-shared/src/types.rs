use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn parse(s: &str) -> Result<Self, ValidationError> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|_| ValidationError::MalformedId(s.to_string()))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id! {
    /// Identity of a registered user.
    UserId
}

uuid_id! {
    /// Identity of a named channel.
    ChannelId
}

uuid_id! {
    /// Identity of a direct (two-member) conversation.
    DmId
}

uuid_id! {
    /// Identity of a single message.
    MessageId
}

/// A conversation is either a channel or a DM; messages, typing markers and
/// subscriptions address both uniformly through this type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ConversationId {
    Channel(ChannelId),
    Direct(DmId),
}

impl ConversationId {
    pub fn is_direct(&self) -> bool {
        matches!(self, ConversationId::Direct(_))
    }

    /// Stable textual key, used both as the storage column value and as the
    /// stream key for subscriptions.
    pub fn storage_key(&self) -> String {
        match self {
            ConversationId::Channel(id) => format!("channel:{}", id.0),
            ConversationId::Direct(id) => format!("dm:{}", id.0),
        }
    }

    pub fn parse_key(s: &str) -> Result<Self, ValidationError> {
        let malformed = || ValidationError::MalformedId(s.to_string());
        match s.split_once(':') {
            Some(("channel", rest)) => Uuid::parse_str(rest)
                .map(|u| ConversationId::Channel(ChannelId(u)))
                .map_err(|_| malformed()),
            Some(("dm", rest)) => Uuid::parse_str(rest)
                .map(|u| ConversationId::Direct(DmId(u)))
                .map_err(|_| malformed()),
            _ => Err(malformed()),
        }
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.storage_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_key_round_trip() {
        let chan = ConversationId::Channel(ChannelId::new());
        let dm = ConversationId::Direct(DmId::new());

        assert_eq!(ConversationId::parse_key(&chan.storage_key()).unwrap(), chan);
        assert_eq!(ConversationId::parse_key(&dm.storage_key()).unwrap(), dm);
    }

    #[test]
    fn conversation_key_rejects_garbage() {
        assert!(ConversationId::parse_key("channel:not-a-uuid").is_err());
        assert!(ConversationId::parse_key("thread:abc").is_err());
        assert!(ConversationId::parse_key("plain").is_err());
    }

    #[test]
    fn id_parse_round_trip() {
        let id = MessageId::new();
        assert_eq!(MessageId::parse(&id.to_string()).unwrap(), id);
        assert!(MessageId::parse("nope").is_err());
    }
}
