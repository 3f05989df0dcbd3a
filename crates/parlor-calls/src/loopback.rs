//! Deterministic in-process devices and transports.
//!
//! The loopback layer implements the [`crate::media`] traits without
//! touching hardware or the network. Tests drive the transport from the
//! outside through a [`PeerProbe`], which shares state with the peer the
//! factory handed to the engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use parlor_shared::documents::{CallKind, Sdp};

use crate::media::{
    ConnectionHealth, MediaDevices, MediaError, MediaTracks, PeerConnection, PeerFactory,
};

fn lock(shared: &Mutex<PeerShared>) -> MutexGuard<'_, PeerShared> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

// ----------------------------------------------------------------------
// Devices
// ----------------------------------------------------------------------

/// Device layer that grants or denies every request.
#[derive(Default)]
pub struct LoopbackMedia {
    deny: bool,
    live: Arc<AtomicUsize>,
}

impl LoopbackMedia {
    /// A device layer where every permission prompt is refused.
    pub fn denying() -> Self {
        Self {
            deny: true,
            ..Self::default()
        }
    }

    /// Track sets acquired and not yet stopped.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl MediaDevices for LoopbackMedia {
    fn acquire(&self, kind: CallKind) -> Result<Box<dyn MediaTracks>, MediaError> {
        if self.deny {
            return Err(MediaError::PermissionDenied);
        }
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(LoopbackTracks {
            video: kind.wants_video(),
            stopped: false,
            live: self.live.clone(),
        }))
    }
}

pub struct LoopbackTracks {
    video: bool,
    stopped: bool,
    live: Arc<AtomicUsize>,
}

impl MediaTracks for LoopbackTracks {
    fn has_video(&self) -> bool {
        self.video
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

// ----------------------------------------------------------------------
// Transport
// ----------------------------------------------------------------------

#[derive(Default)]
struct PeerShared {
    health: ConnectionHealth,
    closed: bool,
    local_pending: Vec<String>,
    remote_candidates: Vec<String>,
    remote_answer: Option<Sdp>,
}

/// Factory that remembers a [`PeerProbe`] for every transport it builds.
#[derive(Default)]
pub struct LoopbackPeers {
    fail: bool,
    probes: Mutex<Vec<PeerProbe>>,
}

impl LoopbackPeers {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory whose every [`create`](PeerFactory::create) fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Probe for the `index`-th transport built, in creation order.
    pub fn probe(&self, index: usize) -> Option<PeerProbe> {
        self.probes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(index)
            .cloned()
    }
}

impl PeerFactory for LoopbackPeers {
    fn create(&self, _kind: CallKind) -> Result<Box<dyn PeerConnection>, MediaError> {
        if self.fail {
            return Err(MediaError::Transport("loopback factory refused".into()));
        }
        let shared = Arc::new(Mutex::new(PeerShared::default()));
        self.probes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(PeerProbe {
                shared: shared.clone(),
            });
        Ok(Box::new(LoopbackPeer { shared }))
    }
}

pub struct LoopbackPeer {
    shared: Arc<Mutex<PeerShared>>,
}

impl PeerConnection for LoopbackPeer {
    fn create_offer(&mut self) -> Result<Sdp, MediaError> {
        let mut shared = lock(&self.shared);
        if shared.closed {
            return Err(MediaError::Transport("peer is closed".into()));
        }
        shared.health = ConnectionHealth::Connecting;
        shared
            .local_pending
            .push("candidate:1 1 udp 2122260223 127.0.0.1 9 typ host".into());
        Ok(Sdp {
            sdp: "v=0 loopback offer".into(),
            kind: "offer".into(),
        })
    }

    fn create_answer(&mut self, _offer: &Sdp) -> Result<Sdp, MediaError> {
        let mut shared = lock(&self.shared);
        if shared.closed {
            return Err(MediaError::Transport("peer is closed".into()));
        }
        shared.health = ConnectionHealth::Connected;
        shared
            .local_pending
            .push("candidate:2 1 udp 2122194687 127.0.0.1 9 typ host".into());
        Ok(Sdp {
            sdp: "v=0 loopback answer".into(),
            kind: "answer".into(),
        })
    }

    fn apply_remote_answer(&mut self, answer: &Sdp) -> Result<(), MediaError> {
        let mut shared = lock(&self.shared);
        if shared.closed {
            return Err(MediaError::Transport("peer is closed".into()));
        }
        shared.remote_answer = Some(answer.clone());
        shared.health = ConnectionHealth::Connected;
        Ok(())
    }

    fn add_remote_candidate(&mut self, candidate: &str) -> Result<(), MediaError> {
        let mut shared = lock(&self.shared);
        if shared.closed {
            return Err(MediaError::Transport("peer is closed".into()));
        }
        if candidate.contains("malformed") {
            return Err(MediaError::Transport("rejected candidate".into()));
        }
        shared.remote_candidates.push(candidate.to_owned());
        Ok(())
    }

    fn drain_local_candidates(&mut self) -> Vec<String> {
        std::mem::take(&mut lock(&self.shared).local_pending)
    }

    fn health(&self) -> ConnectionHealth {
        lock(&self.shared).health
    }

    fn close(&mut self) {
        let mut shared = lock(&self.shared);
        shared.closed = true;
        shared.health = ConnectionHealth::Closed;
    }
}

/// Test-side handle onto a live loopback transport.
#[derive(Clone)]
pub struct PeerProbe {
    shared: Arc<Mutex<PeerShared>>,
}

impl PeerProbe {
    /// Override what [`PeerConnection::health`] reports next.
    pub fn set_health(&self, health: ConnectionHealth) {
        lock(&self.shared).health = health;
    }

    pub fn closed(&self) -> bool {
        lock(&self.shared).closed
    }

    /// Remote candidates the transport accepted, in arrival order.
    pub fn remote_candidates(&self) -> Vec<String> {
        lock(&self.shared).remote_candidates.clone()
    }

    /// The answer applied by [`PeerConnection::apply_remote_answer`].
    pub fn remote_answer(&self) -> Option<Sdp> {
        lock(&self.shared).remote_answer.clone()
    }

    /// Queue a candidate as if the transport had just gathered it.
    pub fn push_local_candidate(&self, candidate: &str) {
        lock(&self.shared).local_pending.push(candidate.to_owned());
    }
}
