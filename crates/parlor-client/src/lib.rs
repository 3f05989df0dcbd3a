//! # parlor-client
//!
//! The session layer a frontend drives. A [`Session`] owns the store
//! handle, the signed-in user, the active conversation with its live
//! subscriptions, the composer, and the call engine; every mutation goes
//! through it and every observable change comes back out of
//! [`Session::next_event`] as a [`ClientEvent`]. Renderers consume that
//! event stream and never touch the store directly.
//!
//! Projections ([`projection`]) turn raw change batches into positioned
//! view updates; the composer ([`composer`]) owns draft state and slash
//! commands; [`prefs`] persists UI preferences across restarts.

pub mod calls;
pub mod commands;
pub mod composer;
pub mod config;
pub mod error;
pub mod events;
pub mod messaging;
pub mod prefs;
pub mod presence;
pub mod profile;
pub mod projection;
pub mod session;
pub mod typing;

#[cfg(test)]
mod testutil;

use tracing_subscriber::{fmt, EnvFilter};

pub use composer::Composer;
pub use config::ClientConfig;
pub use error::ClientError;
pub use events::{CallEvent, ClientEvent, ListDelta, Severity, TimelineDelta};
pub use prefs::{Preferences, PrefsStore};
pub use projection::{reaction_pills, ReactionPill, RenderedMessage, TimelineRow};
pub use session::Session;

/// Install the process-wide tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise client and store chatter at a
/// useful default. Call once, before the first [`Session`] is built.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("parlor_client=debug,parlor_store=info,parlor_calls=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
