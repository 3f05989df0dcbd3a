/// Application name
pub const APP_NAME: &str = "Parlor";

/// Maximum message length in characters; longer drafts are rejected, never
/// truncated.
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Two messages from the same author closer together than this render as one
/// group (no repeated header). A gap of exactly this many milliseconds starts
/// a new group.
pub const CONTINUATION_WINDOW_MS: i64 = 5 * 60 * 1000;

/// How long a typing marker stays armed after the last keystroke before the
/// client deletes it.
pub const TYPING_REARM_SECS: u64 = 4;

/// Readers treat a typing marker as live only when it is younger than this.
/// Deliberately looser than the re-arm window to absorb clock skew.
pub const TYPING_FRESH_SECS: i64 = 5;

/// Trailing debounce window for the aggregate online-count refresh.
pub const ONLINE_REFRESH_DEBOUNCE_MS: u64 = 2000;

/// The channel every account can rely on; created idempotently at first
/// sign-in.
pub const GENERAL_CHANNEL: &str = "general";

/// Reply previews embed at most this many characters of the quoted message.
pub const REPLY_PREVIEW_CHARS: usize = 80;

/// Poll option count bounds.
pub const MIN_POLL_OPTIONS: usize = 2;
pub const MAX_POLL_OPTIONS: usize = 6;

/// Invite codes: length and lifetime.
pub const INVITE_CODE_LEN: usize = 8;
pub const DEFAULT_INVITE_TTL_HOURS: i64 = 24;

/// Minimum accepted password length.
pub const MIN_PASSWORD_CHARS: usize = 8;

/// Badge granted the first time a profile reaches 100% completeness.
pub const BADGE_PROFILE_COMPLETE: &str = "profile-complete";

/// Badge granted to accounts created while the instance is young.
pub const BADGE_EARLY_BIRD: &str = "early-bird";

/// Default number of messages loaded when a conversation is opened.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
