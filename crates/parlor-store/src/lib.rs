//! # parlor-store
//!
//! The backing store for Parlor: SQLite persistence plus a realtime change
//! feed. This crate plays the role a hosted backend-as-a-service plays for a
//! web client: documents live here, every mutation is pushed to connected
//! subscribers, and the identity provider (email/password accounts, presence
//! transitions) sits next to the data it owns.
//!
//! Two layers:
//!
//! * [`Database`] wraps a `rusqlite::Connection` with typed CRUD helpers and
//!   runs migrations before anything else touches the schema.
//! * [`Store`] serializes mutations through the database and publishes a
//!   [`StoreEvent`] for each one on a broadcast feed. `watch_*` methods hand
//!   out [`Subscription`]s that replay the current snapshot and then relay
//!   live changes until cancelled.
//!
//! Reaction, vote and pin updates are atomic set operations at the SQL
//! level (unique indexes + `INSERT OR IGNORE`/`DELETE`), so concurrent
//! togglers cannot lose each other's writes.

pub mod auth;
pub mod calls;
pub mod channels;
pub mod database;
pub mod dms;
pub mod events;
pub mod invites;
pub mod messages;
pub mod migrations;
pub mod reactions;
pub mod store;
pub mod typing;
pub mod users;

mod error;

pub use auth::AuthError;
pub use database::Database;
pub use error::{Result, StoreError};
pub use events::{Change, ChangeKind, StoreEvent, StreamError, Subscription};
pub use messages::MessageDraft;
pub use store::Store;
pub use users::ProfileUpdate;
