//! Local UI preferences.
//!
//! A single JSON document in a small SQLite file under the platform
//! config directory. Loaded once at startup, written back on every
//! change. Unknown fields in a file written by a newer build are
//! ignored; missing fields take their defaults.

use std::fs;
use std::path::Path;

use directories::ProjectDirs;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ClientError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Theme id, `"dark"` or `"light"`.
    pub theme: String,
    /// Multiplier on the base font size.
    pub font_scale: f32,
    /// Collapse consecutive same-author messages into one group.
    pub group_messages: bool,
    /// 24-hour clock on message timestamps.
    pub clock_24h: bool,
    pub sound_enabled: bool,
    /// Enter sends; Shift+Enter inserts a newline.
    pub enter_to_send: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: "dark".to_owned(),
            font_scale: 1.0,
            group_messages: true,
            clock_24h: false,
            sound_enabled: true,
            enter_to_send: true,
        }
    }
}

const UP_SQL: &str = "
CREATE TABLE IF NOT EXISTS prefs (
    id   INTEGER PRIMARY KEY CHECK (id = 1),
    json TEXT NOT NULL
);
";

pub struct PrefsStore {
    conn: Connection,
}

impl PrefsStore {
    /// Open (or create) the preference file in the platform config
    /// directory.
    pub fn open_default() -> Result<Self> {
        let dirs =
            ProjectDirs::from("com", "parlor", "parlor").ok_or(ClientError::NoConfigDir)?;
        let dir = dirs.config_dir();
        fs::create_dir_all(dir)?;
        Self::open_at(&dir.join("prefs.db"))
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(UP_SQL)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(UP_SQL)?;
        Ok(Self { conn })
    }

    /// Read the stored preferences. A missing row or a row that no
    /// longer parses yields the defaults.
    pub fn load(&self) -> Preferences {
        let json: Option<String> = self
            .conn
            .query_row("SELECT json FROM prefs WHERE id = 1", [], |row| row.get(0))
            .ok();
        match json {
            Some(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                warn!(error = %e, "preference file unreadable, using defaults");
                Preferences::default()
            }),
            None => Preferences::default(),
        }
    }

    pub fn save(&self, prefs: &Preferences) -> Result<()> {
        let json = serde_json::to_string(prefs)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO prefs (id, json) VALUES (1, ?1)",
            [&json],
        )?;
        debug!("preferences saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.db");

        let store = PrefsStore::open_at(&path).unwrap();
        let mut prefs = store.load();
        assert_eq!(prefs, Preferences::default());

        prefs.theme = "light".into();
        prefs.group_messages = false;
        store.save(&prefs).unwrap();
        drop(store);

        let reopened = PrefsStore::open_at(&path).unwrap();
        assert_eq!(reopened.load(), prefs);
    }

    #[test]
    fn unknown_fields_and_gaps_fall_back_to_defaults() {
        let store = PrefsStore::open_in_memory().unwrap();
        store
            .conn
            .execute(
                "INSERT INTO prefs (id, json) VALUES (1, ?1)",
                [r#"{"theme":"light","future_toggle":true}"#],
            )
            .unwrap();

        let prefs = store.load();
        assert_eq!(prefs.theme, "light");
        assert!(prefs.group_messages);
        assert!(prefs.enter_to_send);
    }

    #[test]
    fn garbage_rows_do_not_poison_startup() {
        let store = PrefsStore::open_in_memory().unwrap();
        store
            .conn
            .execute("INSERT INTO prefs (id, json) VALUES (1, 'not json')", [])
            .unwrap();
        assert_eq!(store.load(), Preferences::default());
    }
}
