//! The per-call state machine.
//!
//! One [`CallEngine`] exists per active call. It owns the local tracks
//! and the peer transport, and advances through
//! `Ringing -> Answered -> Connected -> Ended` as signaling and the
//! transport report progress. All signaling writes (publishing the
//! offer, the answer, candidates, the ended status) are the caller's
//! job; the engine only consumes what the caller relays in.

use std::time::{Duration, Instant};

use parlor_shared::documents::{CallKind, CallSide, Sdp};
use parlor_shared::types::UserId;
use thiserror::Error;
use tracing::debug;

use crate::media::{
    ConnectionHealth, MediaDevices, MediaError, MediaTracks, PeerConnection, PeerFactory,
};

#[derive(Debug, Error)]
pub enum CallError {
    #[error(transparent)]
    Media(#[from] MediaError),
    /// The transition needs a call that is still ringing.
    #[error("call is not ringing")]
    NotRinging,
    /// The transition belongs to the other side of the call.
    #[error("wrong side of the call")]
    WrongSide,
}

/// Where a call is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    /// Offer placed (caller) or received (callee); nobody has committed.
    Ringing,
    /// Both sides committed; the transport is still coming up.
    Answered,
    /// The transport reports connected; the elapsed timer runs.
    Connected,
    /// Terminal. The engine holds no media or transport past this point.
    Ended(CallEndReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEndReason {
    /// Either side hung up, or the remote side went away.
    Hangup,
    /// The callee refused while it was still ringing.
    Declined,
    /// The transport died. Ended locally, without a signaling round-trip.
    TransportFailed,
}

pub struct CallEngine {
    side: CallSide,
    local: UserId,
    remote: UserId,
    kind: CallKind,
    phase: CallPhase,
    /// The offer this call started from. For the caller that is the one
    /// it created; for the callee, the one that arrived with the ring.
    offer: Sdp,
    media: Option<Box<dyn MediaTracks>>,
    peer: Option<Box<dyn PeerConnection>>,
    /// How many remote candidates have been fed to the transport. The
    /// signaling list is append-only, so this indexes the unseen tail.
    applied_remote: usize,
    connected_at: Option<Instant>,
}

impl CallEngine {
    /// Place an outbound call: acquire media, build the transport and
    /// produce the offer for the signaling record.
    ///
    /// Media comes first. If the device layer refuses there is no engine
    /// to clean up and the caller is exactly where they started.
    pub fn start_outbound(
        local: UserId,
        remote: UserId,
        kind: CallKind,
        devices: &dyn MediaDevices,
        peers: &dyn PeerFactory,
    ) -> Result<(Self, Sdp), CallError> {
        let mut media = devices.acquire(kind)?;

        let mut peer = match peers.create(kind) {
            Ok(peer) => peer,
            Err(e) => {
                media.stop();
                return Err(e.into());
            }
        };
        let offer = match peer.create_offer() {
            Ok(offer) => offer,
            Err(e) => {
                peer.close();
                media.stop();
                return Err(e.into());
            }
        };

        debug!(remote = %remote, kind = kind.as_str(), "outbound call ringing");
        let engine = Self {
            side: CallSide::Caller,
            local,
            remote,
            kind,
            phase: CallPhase::Ringing,
            offer: offer.clone(),
            media: Some(media),
            peer: Some(peer),
            applied_remote: 0,
            connected_at: None,
        };
        Ok((engine, offer))
    }

    /// Track an inbound ringing call. No device is touched until
    /// [`accept`](Self::accept); declining a call must never trip a
    /// permission prompt.
    pub fn incoming(local: UserId, remote: UserId, kind: CallKind, offer: Sdp) -> Self {
        debug!(remote = %remote, kind = kind.as_str(), "inbound call ringing");
        Self {
            side: CallSide::Callee,
            local,
            remote,
            kind,
            phase: CallPhase::Ringing,
            offer,
            media: None,
            peer: None,
            applied_remote: 0,
            connected_at: None,
        }
    }

    /// Accept the inbound call: acquire media, build the transport and
    /// produce the answer for the signaling record.
    ///
    /// On failure the call stays ringing with no media held, so the user
    /// can still decline (or retry after granting permission).
    pub fn accept(
        &mut self,
        devices: &dyn MediaDevices,
        peers: &dyn PeerFactory,
    ) -> Result<Sdp, CallError> {
        if self.side != CallSide::Callee {
            return Err(CallError::WrongSide);
        }
        if self.phase != CallPhase::Ringing {
            return Err(CallError::NotRinging);
        }

        let mut media = devices.acquire(self.kind)?;
        let mut peer = match peers.create(self.kind) {
            Ok(peer) => peer,
            Err(e) => {
                media.stop();
                return Err(e.into());
            }
        };
        let answer = match peer.create_answer(&self.offer) {
            Ok(answer) => answer,
            Err(e) => {
                peer.close();
                media.stop();
                return Err(e.into());
            }
        };

        self.media = Some(media);
        self.peer = Some(peer);
        self.phase = CallPhase::Answered;
        debug!(remote = %self.remote, "call accepted");
        Ok(answer)
    }

    /// Refuse the inbound call while it rings.
    pub fn decline(&mut self) -> Result<(), CallError> {
        if self.side != CallSide::Callee {
            return Err(CallError::WrongSide);
        }
        if self.phase != CallPhase::Ringing {
            return Err(CallError::NotRinging);
        }
        debug!(remote = %self.remote, "call declined");
        self.force_end(CallEndReason::Declined);
        Ok(())
    }

    /// Caller side: the callee's answer arrived on the signaling record.
    /// The call moves to `Answered`; [`poll_health`](Self::poll_health)
    /// promotes it once the transport comes up.
    pub fn remote_answered(&mut self, answer: &Sdp) -> Result<(), CallError> {
        if self.side != CallSide::Caller {
            return Err(CallError::WrongSide);
        }
        if self.phase != CallPhase::Ringing {
            return Err(CallError::NotRinging);
        }
        if let Some(peer) = self.peer.as_mut() {
            if let Err(e) = peer.apply_remote_answer(answer) {
                self.force_end(CallEndReason::TransportFailed);
                return Err(e.into());
            }
        }
        self.phase = CallPhase::Answered;
        debug!(remote = %self.remote, "answer applied, waiting for transport");
        Ok(())
    }

    /// Re-read transport health and fold it into the phase.
    ///
    /// `Connected` promotes an answered call and starts the elapsed
    /// timer. A terminal transport state ends the call locally, with no
    /// attempt to reach the other side over a transport that is already
    /// gone.
    pub fn poll_health(&mut self) -> CallPhase {
        let Some(peer) = self.peer.as_ref() else {
            return self.phase;
        };
        let health = peer.health();
        if health == ConnectionHealth::Connected {
            if self.phase == CallPhase::Answered {
                self.phase = CallPhase::Connected;
                self.connected_at = Some(Instant::now());
                debug!(remote = %self.remote, "call connected");
            }
        } else if health.is_terminal() && !self.is_over() {
            debug!(remote = %self.remote, ?health, "transport lost, ending call");
            self.force_end(CallEndReason::TransportFailed);
        }
        self.phase
    }

    /// Feed the remote side's candidate list, as read from the signaling
    /// record. The list is append-only; only the unseen tail is applied,
    /// and a candidate the transport rejects is skipped on its own.
    pub fn apply_remote_candidates(&mut self, candidates: &[String]) {
        let Some(peer) = self.peer.as_mut() else {
            // No transport yet (inbound, still ringing). The next feed
            // after accept replays the whole list.
            return;
        };
        if candidates.len() < self.applied_remote {
            self.applied_remote = 0;
        }
        for candidate in &candidates[self.applied_remote..] {
            if let Err(e) = peer.add_remote_candidate(candidate) {
                debug!(error = %e, "skipping rejected remote candidate");
            }
        }
        self.applied_remote = candidates.len();
    }

    /// Candidates gathered locally since the last call, ready to append
    /// to the signaling record. Empty before the transport exists.
    pub fn take_local_candidates(&mut self) -> Vec<String> {
        match self.peer.as_mut() {
            Some(peer) => peer.drain_local_candidates(),
            None => Vec::new(),
        }
    }

    /// End the call locally, whatever its phase. Idempotent.
    pub fn hang_up(&mut self) {
        if self.is_over() {
            return;
        }
        debug!(remote = %self.remote, "hanging up");
        self.force_end(CallEndReason::Hangup);
    }

    /// The other side ended the call (its status flipped on the
    /// signaling record). From here the engine cannot tell a decline
    /// from a cancel or a hang-up, so everything remote reads as one.
    pub fn remote_ended(&mut self) {
        if self.is_over() {
            return;
        }
        debug!(remote = %self.remote, "remote side ended the call");
        self.force_end(CallEndReason::Hangup);
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn phase(&self) -> CallPhase {
        self.phase
    }

    pub fn side(&self) -> CallSide {
        self.side
    }

    pub fn kind(&self) -> CallKind {
        self.kind
    }

    pub fn local(&self) -> UserId {
        self.local
    }

    pub fn remote(&self) -> UserId {
        self.remote
    }

    /// The offer this call started from.
    pub fn offer(&self) -> &Sdp {
        &self.offer
    }

    pub fn is_over(&self) -> bool {
        matches!(self.phase, CallPhase::Ended(_))
    }

    /// Time since the transport connected. `None` until then; after the
    /// call ends it keeps counting from the same origin, so the final
    /// reading is taken at teardown.
    pub fn elapsed(&self) -> Option<Duration> {
        self.connected_at.map(|since| since.elapsed())
    }

    fn force_end(&mut self, reason: CallEndReason) {
        self.phase = CallPhase::Ended(reason);
        self.teardown();
    }

    /// Close the transport and stop capture. Nothing here talks to the
    /// remote side.
    fn teardown(&mut self) {
        if let Some(mut peer) = self.peer.take() {
            peer.close();
        }
        if let Some(mut media) = self.media.take() {
            media.stop();
        }
    }
}

// ----------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------
