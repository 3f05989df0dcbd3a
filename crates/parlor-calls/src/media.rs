//! Device and transport boundaries.
//!
//! Everything the engine needs from the platform lives behind these
//! traits: capture devices, local tracks, and the peer transport. Real
//! backends wrap the platform media stack; [`crate::loopback`] provides
//! in-process stand-ins.

use parlor_shared::documents::{CallKind, Sdp};
use thiserror::Error;

/// Failures raised by devices and transports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    /// The user (or platform) refused access to the capture device.
    #[error("capture permission denied")]
    PermissionDenied,
    /// No device of the requested kind exists.
    #[error("no usable capture device")]
    NoDevice,
    /// The transport failed; the message is for logs, not users.
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Health of the peer transport, as reported by [`PeerConnection::health`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionHealth {
    #[default]
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionHealth {
    /// Whether the transport is gone for good.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionHealth::Disconnected | ConnectionHealth::Failed | ConnectionHealth::Closed
        )
    }
}

/// Access to local capture devices.
pub trait MediaDevices {
    /// Acquire microphone (and camera, for video calls) tracks. A denied
    /// permission is an error, never a silent audio-only downgrade.
    fn acquire(&self, kind: CallKind) -> Result<Box<dyn MediaTracks>, MediaError>;
}

/// Live local tracks. The engine stops them explicitly on teardown.
pub trait MediaTracks: Send {
    fn has_video(&self) -> bool;
    fn stop(&mut self);
}

/// One peer transport for one call.
pub trait PeerConnection: Send {
    fn create_offer(&mut self) -> Result<Sdp, MediaError>;
    fn create_answer(&mut self, offer: &Sdp) -> Result<Sdp, MediaError>;
    fn apply_remote_answer(&mut self, answer: &Sdp) -> Result<(), MediaError>;
    fn add_remote_candidate(&mut self, candidate: &str) -> Result<(), MediaError>;
    /// Candidates gathered locally since the last drain.
    fn drain_local_candidates(&mut self) -> Vec<String>;
    fn health(&self) -> ConnectionHealth;
    fn close(&mut self);
}

/// Builds a fresh [`PeerConnection`] per call.
pub trait PeerFactory {
    fn create(&self, kind: CallKind) -> Result<Box<dyn PeerConnection>, MediaError>;
}
