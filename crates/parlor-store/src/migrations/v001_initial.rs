//! v001 -- Initial schema creation.
//!
//! Creates the core tables: `users`, `channels`, `dms`, `messages`,
//! `reactions`, `typing`, and `invites`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id              TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    username        TEXT NOT NULL,
    username_lower  TEXT NOT NULL,              -- lowercase, for uniqueness + search
    display_name    TEXT NOT NULL,
    email           TEXT NOT NULL UNIQUE,       -- lowercase
    password_salt   TEXT NOT NULL,              -- hex-encoded 16 bytes
    password_digest TEXT NOT NULL,              -- hex-encoded blake3 digest
    avatar_color    TEXT NOT NULL,
    bio             TEXT NOT NULL DEFAULT '',
    status          TEXT NOT NULL DEFAULT 'offline',
    created_at      TEXT NOT NULL,              -- ISO-8601 / RFC-3339
    last_seen       TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_users_username_lower ON users(username_lower);

-- ----------------------------------------------------------------
-- Channels
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS channels (
    id         TEXT PRIMARY KEY NOT NULL,       -- UUID v4
    name       TEXT NOT NULL UNIQUE,            -- normalized slug
    topic      TEXT NOT NULL DEFAULT '',
    kind       TEXT NOT NULL DEFAULT 'public',
    created_at TEXT NOT NULL,
    created_by TEXT NOT NULL                    -- UUID of creating user
);

-- ----------------------------------------------------------------
-- Direct conversations
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS dms (
    id            TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    member_a      TEXT NOT NULL,                -- smaller UUID of the pair
    member_b      TEXT NOT NULL,                -- larger UUID of the pair
    created_at    TEXT NOT NULL,
    last_activity TEXT NOT NULL,

    UNIQUE (member_a, member_b)
);

-- ----------------------------------------------------------------
-- Messages (channel and DM, keyed by conversation string)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id            TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    conversation  TEXT NOT NULL,                -- "channel:<uuid>" or "dm:<uuid>"
    content       TEXT NOT NULL,
    author_id     TEXT NOT NULL,
    author_name   TEXT NOT NULL,                -- display name at send time
    author_color  TEXT NOT NULL,                -- avatar color at send time
    timestamp     TEXT NOT NULL,                -- ISO-8601, ms precision
    kind          TEXT NOT NULL DEFAULT 'text', -- 'text' | 'gif' | 'poll'
    pinned        INTEGER NOT NULL DEFAULT 0,   -- boolean 0/1
    edited        INTEGER NOT NULL DEFAULT 0,   -- boolean 0/1
    reply_to      TEXT,                         -- JSON ReplyPreview, nullable
    poll_question TEXT,                         -- poll messages only
    poll_options  TEXT                          -- JSON array, poll messages only
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_ts
    ON messages(conversation, timestamp);

-- ----------------------------------------------------------------
-- Reactions
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS reactions (
    message_id TEXT NOT NULL,                   -- FK -> messages(id)
    user_id    TEXT NOT NULL,
    emoji      TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_reactions_unique
    ON reactions(message_id, user_id, emoji);

-- ----------------------------------------------------------------
-- Typing markers
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS typing (
    conversation TEXT NOT NULL,
    user_id      TEXT NOT NULL,
    display_name TEXT NOT NULL,
    updated_at   TEXT NOT NULL,

    PRIMARY KEY (conversation, user_id)
);

-- ----------------------------------------------------------------
-- Invites
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS invites (
    code         TEXT PRIMARY KEY NOT NULL,     -- 8-char A-Z0-9
    channel_id   TEXT NOT NULL,
    channel_name TEXT NOT NULL,
    created_by   TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    expires_at   TEXT NOT NULL,
    uses         INTEGER NOT NULL DEFAULT 0
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
