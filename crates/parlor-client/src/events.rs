//! Events a [`crate::Session`] hands to its renderer.
//!
//! Everything a frontend needs to redraw arrives through this one enum,
//! pulled from [`crate::Session::next_event`]. Deltas carry positions so
//! a renderer can patch its view instead of rebuilding it.

use parlor_calls::CallEndReason;
use parlor_shared::documents::{CallKind, Channel, DirectConversation, User};
use parlor_shared::types::{ConversationId, UserId};

use crate::prefs::Preferences;
use crate::projection::TimelineRow;

/// Severity of a transient toast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

/// Positioned update for the message timeline.
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineDelta {
    /// Rows inserted starting at `index`. A message entering on a new
    /// calendar day arrives together with its day separator.
    Inserted { index: usize, rows: Vec<TimelineRow> },
    /// The row at `index` changed in place.
    Updated { index: usize, row: TimelineRow },
    /// The row at `index` is gone.
    Removed { index: usize },
}

/// Positioned update for an ordered list projection.
#[derive(Debug, Clone, PartialEq)]
pub enum ListDelta<T> {
    Inserted { index: usize, item: T },
    Updated { index: usize, item: T },
    Removed { index: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    /// Someone is calling; ring until accepted or declined.
    Incoming { caller: UserId, kind: CallKind },
    /// We placed a call and are waiting for the other side.
    Outgoing { callee: UserId, kind: CallKind },
    /// The transport came up; the elapsed timer is running.
    Connected,
    /// The call is over, whoever ended it.
    Ended { reason: CallEndReason },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Signed in (`Some`) or out (`None`).
    AuthChanged(Option<User>),
    /// The active conversation switched; timeline and typing state reset.
    ConversationChanged(ConversationId),
    /// The signed-in user's document changed (profile edit, status,
    /// badge grant).
    ProfileChanged(User),
    Timeline(TimelineDelta),
    Channels(ListDelta<Channel>),
    Dms(ListDelta<DirectConversation>),
    /// Display names currently typing in the active conversation, the
    /// viewer excluded, already filtered for freshness.
    TypingChanged(Vec<String>),
    OnlineCount(usize),
    Call(CallEvent),
    /// `/poll` diverted the composer; open the poll builder.
    PollBuilderRequested,
    /// `/gif` diverted the composer; open the GIF picker.
    GifPickerRequested { query: String },
    PrefsChanged(Preferences),
    Toast { severity: Severity, message: String },
    /// A subscription died. Terminal for that stream; re-select the
    /// conversation (or sign in again) to resubscribe.
    StreamFailed { stream: &'static str, detail: String },
}
