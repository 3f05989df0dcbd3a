//! # parlor-calls
//!
//! The one-to-one call engine. A [`CallEngine`] is a role-aware state
//! machine (`Ringing -> Answered -> Connected -> Ended`) that owns the
//! local capture tracks and the peer transport for a single call. It
//! never performs signaling I/O itself: offers, answers and candidates
//! travel through the signaling record kept by `parlor-store`, and the
//! caller relays them between that record and the engine.
//!
//! Devices and transports sit behind the traits in [`media`], so the
//! engine is testable without hardware. [`loopback`] provides the
//! deterministic in-process implementations used by the tests.

pub mod engine;
pub mod loopback;
pub mod media;

pub use engine::{CallEndReason, CallEngine, CallError, CallPhase};
pub use media::{
    ConnectionHealth, MediaDevices, MediaError, MediaTracks, PeerConnection, PeerFactory,
};
