//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so the client runs with zero
//! configuration.

use std::path::PathBuf;

use parlor_shared::constants::{DEFAULT_HISTORY_LIMIT, DEFAULT_INVITE_TTL_HOURS};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Directory for the message database and preference file.
    /// Env: `PARLOR_DATA_DIR`
    /// Default: the platform data directory.
    pub data_dir: Option<PathBuf>,

    /// Messages loaded when a conversation is opened.
    /// Env: `PARLOR_HISTORY_LIMIT`
    /// Default: `50`
    pub history_limit: u32,

    /// Lifetime of invite codes created by this client, in hours.
    /// Env: `PARLOR_INVITE_TTL_HOURS`
    /// Default: `24`
    pub invite_ttl_hours: i64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
            invite_ttl_hours: DEFAULT_INVITE_TTL_HOURS,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("PARLOR_DATA_DIR") {
            if !dir.is_empty() {
                config.data_dir = Some(PathBuf::from(dir));
            }
        }

        if let Ok(val) = std::env::var("PARLOR_HISTORY_LIMIT") {
            match val.parse::<u32>() {
                Ok(n) if n > 0 => config.history_limit = n,
                _ => {
                    tracing::warn!(value = %val, "Invalid PARLOR_HISTORY_LIMIT, using default");
                }
            }
        }

        if let Ok(val) = std::env::var("PARLOR_INVITE_TTL_HOURS") {
            match val.parse::<i64>() {
                Ok(n) if n > 0 => config.invite_ttl_hours = n,
                _ => {
                    tracing::warn!(value = %val, "Invalid PARLOR_INVITE_TTL_HOURS, using default");
                }
            }
        }

        config
    }
}
