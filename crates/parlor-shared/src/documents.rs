//! Document models mirrored by store rows and projected into view state.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! across crate boundaries (and to a UI layer) without a separate DTO step.
//! Mutable attribute maps (reactions, votes) are `BTreeMap`/`BTreeSet` so
//! their iteration order is stable for rendering and tests.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ChannelId, ConversationId, DmId, MessageId, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// Presence as chosen by the user or driven by sign-in/sign-out transitions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Presence {
    Online,
    Idle,
    Dnd,
    Invisible,
    Offline,
}

impl Presence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Presence::Online => "online",
            Presence::Idle => "idle",
            Presence::Dnd => "dnd",
            Presence::Invisible => "invisible",
            Presence::Offline => "offline",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "online" => Some(Presence::Online),
            "idle" => Some(Presence::Idle),
            "dnd" => Some(Presence::Dnd),
            "invisible" => Some(Presence::Invisible),
            "offline" => Some(Presence::Offline),
            _ => None,
        }
    }

    /// Whether this status counts toward the aggregate online number.
    /// Invisible users look offline to everyone else.
    pub fn counts_as_online(&self) -> bool {
        matches!(self, Presence::Online | Presence::Idle | Presence::Dnd)
    }
}

/// Cosmetic profile selections, each drawn from the fixed catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileFlair {
    pub pronouns: String,
    pub activity: String,
    pub banner: String,
    pub frame: String,
    pub effect: String,
    pub accent_color: String,
}

impl Default for ProfileFlair {
    fn default() -> Self {
        Self {
            pronouns: String::new(),
            activity: String::new(),
            banner: crate::catalog::DEFAULT_BANNER.to_string(),
            frame: crate::catalog::DEFAULT_FRAME.to_string(),
            effect: crate::catalog::DEFAULT_EFFECT.to_string(),
            accent_color: crate::catalog::DEFAULT_ACCENT.to_string(),
        }
    }
}

/// A registered account. Created at sign-up, mutated by the owner (profile
/// edits) and by presence transitions; never deleted in-band.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub username_lower: String,
    pub display_name: String,
    pub email: String,
    /// Avatar background color, assigned from the accent palette at sign-up
    /// and snapshotted onto every message the user sends.
    pub avatar_color: String,
    pub bio: String,
    pub status: Presence,
    pub badges: BTreeSet<String>,
    pub profile: ProfileFlair,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Channel / DM
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChannelKind {
    Public,
    Private,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Public => "public",
            ChannelKind::Private => "private",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "public" => Some(ChannelKind::Public),
            "private" => Some(ChannelKind::Private),
            _ => None,
        }
    }
}

/// A named channel. Names are unique and slug-normalized (see
/// [`crate::names::normalize_channel_name`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub topic: String,
    pub kind: ChannelKind,
    pub created_at: DateTime<Utc>,
    pub created_by: UserId,
}

/// A direct conversation between exactly two users. `members` is stored in
/// canonical order so the unordered pair maps to at most one record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectConversation {
    pub id: DmId,
    pub members: [UserId; 2],
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl DirectConversation {
    /// The canonical ordering for a member pair; both argument orders yield
    /// the same result.
    pub fn canonical_pair(a: UserId, b: UserId) -> [UserId; 2] {
        if a <= b {
            [a, b]
        } else {
            [b, a]
        }
    }

    pub fn other_member(&self, me: &UserId) -> UserId {
        if self.members[0] == *me {
            self.members[1]
        } else {
            self.members[0]
        }
    }

    pub fn has_member(&self, uid: &UserId) -> bool {
        self.members[0] == *uid || self.members[1] == *uid
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// What a message body is. Polls carry their question and the fixed option
/// list; votes live on the message beside reactions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Gif,
    Poll { question: String, options: Vec<String> },
}

impl MessageKind {
    pub fn tag(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Gif => "gif",
            MessageKind::Poll { .. } => "poll",
        }
    }
}

/// Denormalized fragment of the message being replied to, captured at send
/// time. Deleting or editing the target later does not touch this copy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplyPreview {
    pub id: MessageId,
    pub author_name: String,
    pub content: String,
}

/// A chat message. `author_name` and `author_color` are snapshots taken when
/// the message was sent; later profile edits do not rewrite history. The
/// timestamp is assigned by the store and is strictly monotonic within one
/// conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub conversation: ConversationId,
    pub content: String,
    pub author_id: UserId,
    pub author_name: String,
    pub author_color: String,
    pub timestamp: DateTime<Utc>,
    pub kind: MessageKind,
    pub reactions: BTreeMap<String, BTreeSet<UserId>>,
    pub votes: BTreeMap<String, BTreeSet<UserId>>,
    pub pinned: bool,
    pub edited: bool,
    pub reply_to: Option<ReplyPreview>,
}

impl Message {
    /// Whether `uid` is in the voter set for `emoji`.
    pub fn reacted_by(&self, emoji: &str, uid: &UserId) -> bool {
        self.reactions.get(emoji).is_some_and(|s| s.contains(uid))
    }
}

// ---------------------------------------------------------------------------
// Typing marker
// ---------------------------------------------------------------------------

/// Ephemeral "currently typing" signal, one per (conversation, user),
/// upserted on keystrokes and aged out on read rather than swept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypingMarker {
    pub conversation: ConversationId,
    pub user_id: UserId,
    pub display_name: String,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Call session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CallKind {
    Voice,
    Video,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallKind::Voice => "voice",
            CallKind::Video => "video",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "voice" => Some(CallKind::Voice),
            "video" => Some(CallKind::Video),
            _ => None,
        }
    }

    pub fn wants_video(&self) -> bool {
        matches!(self, CallKind::Video)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CallStatus {
    Ringing,
    Answered,
    Ended,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Ringing => "ringing",
            CallStatus::Answered => "answered",
            CallStatus::Ended => "ended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ringing" => Some(CallStatus::Ringing),
            "answered" => Some(CallStatus::Answered),
            "ended" => Some(CallStatus::Ended),
            _ => None,
        }
    }
}

/// Which half of the call a participant is.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CallSide {
    Caller,
    Callee,
}

impl CallSide {
    pub fn other(&self) -> CallSide {
        match self {
            CallSide::Caller => CallSide::Callee,
            CallSide::Callee => CallSide::Caller,
        }
    }
}

/// A session description as produced by the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sdp {
    pub sdp: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// The shared signaling record for one call, keyed by the callee: each user
/// has a single inbound call slot. Both parties mutate it; after `Ended` the
/// record is left behind until the slot is reused.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallSession {
    pub callee: UserId,
    pub caller: UserId,
    pub kind: CallKind,
    pub status: CallStatus,
    pub offer: Sdp,
    pub answer: Option<Sdp>,
    /// Append-only ICE candidate lists, one per side. Readers drain the
    /// other side's list as it grows.
    pub caller_candidates: Vec<String>,
    pub callee_candidates: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl CallSession {
    pub fn candidates_from(&self, side: CallSide) -> &[String] {
        match side {
            CallSide::Caller => &self.caller_candidates,
            CallSide::Callee => &self.callee_candidates,
        }
    }
}

// ---------------------------------------------------------------------------
// Invite
// ---------------------------------------------------------------------------

/// A shareable channel invite. Expiry is checked when the code is redeemed;
/// `uses` counts successful redemptions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Invite {
    pub code: String,
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub uses: u32,
}

impl Invite {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
