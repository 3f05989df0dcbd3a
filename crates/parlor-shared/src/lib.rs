//! # parlor-shared
//!
//! Document models and identifiers shared by every Parlor crate: users,
//! channels, direct conversations, messages, typing markers, call sessions
//! and invites, plus the profile flair catalog and the normalization rules
//! for channel names and display names.
//!
//! Nothing in this crate touches storage or the network; it is the common
//! vocabulary the store, the call engine and the client all speak.

pub mod catalog;
pub mod constants;
pub mod documents;
pub mod names;
pub mod types;

mod error;

pub use error::ValidationError;
