use rusqlite::Connection;

const UP_SQL: &str = r#"
-- Profile customization columns
ALTER TABLE users ADD COLUMN pronouns TEXT NOT NULL DEFAULT '';
ALTER TABLE users ADD COLUMN activity TEXT NOT NULL DEFAULT '';
ALTER TABLE users ADD COLUMN banner TEXT NOT NULL DEFAULT 'slate';
ALTER TABLE users ADD COLUMN frame TEXT NOT NULL DEFAULT 'none';
ALTER TABLE users ADD COLUMN effect TEXT NOT NULL DEFAULT 'none';
ALTER TABLE users ADD COLUMN accent_color TEXT NOT NULL DEFAULT '#5865f2';

-- Badges
CREATE TABLE IF NOT EXISTS badges (
    user_id    TEXT NOT NULL,
    badge      TEXT NOT NULL,
    granted_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_badges_unique ON badges(user_id, badge);

-- Poll votes. 'choice' rather than 'option' because the latter is reserved.
CREATE TABLE IF NOT EXISTS votes (
    message_id TEXT NOT NULL,                   -- FK -> messages(id)
    user_id    TEXT NOT NULL,
    choice     TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_votes_unique
    ON votes(message_id, user_id, choice);

-- Call signaling slots, one active slot per callee.
CREATE TABLE IF NOT EXISTS calls (
    callee            TEXT PRIMARY KEY NOT NULL,  -- UUID of the ringing user
    caller            TEXT NOT NULL,
    kind              TEXT NOT NULL,              -- 'voice' | 'video'
    status            TEXT NOT NULL,              -- 'ringing' | 'answered' | 'ended'
    offer_sdp         TEXT NOT NULL,
    offer_type        TEXT NOT NULL,
    answer_sdp        TEXT,
    answer_type       TEXT,
    caller_candidates TEXT NOT NULL DEFAULT '[]', -- JSON string array
    callee_candidates TEXT NOT NULL DEFAULT '[]', -- JSON string array
    created_at        TEXT NOT NULL
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
