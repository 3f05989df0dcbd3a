//! Call operations on the [`Session`]: placing, answering and ending calls
//! through the store's per-callee signaling slots, and relaying SDP and
//! candidates between the slot and the engine.
//!
//! The engine never talks to the store itself. Every signal it produces is
//! written here, and every slot change flows back in through
//! [`Session::next_event`]'s call feed.

use parlor_calls::{CallEngine, CallError, CallPhase, MediaError};
use parlor_shared::documents::{CallKind, CallSession, CallSide, CallStatus};
use parlor_shared::types::UserId;
use parlor_store::{Change, ChangeKind};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::events::{CallEvent, ClientEvent, Severity};
use crate::session::{pump, FeedPayload, Session};

/// The in-flight call: the engine plus the store slot it signals through.
pub(crate) struct ActiveCall {
    engine: CallEngine,
    /// The callee id keying the slot (the remote user for outbound calls,
    /// the session's own for inbound).
    slot: UserId,
    last_phase: CallPhase,
    outbound_pump: Option<JoinHandle<()>>,
}

impl Drop for ActiveCall {
    fn drop(&mut self) {
        if let Some(task) = &self.outbound_pump {
            task.abort();
        }
    }
}

impl Session {
    /// Ring `other`. Media is acquired and the offer built before the slot
    /// is taken, so a denied permission never leaves a half-placed call;
    /// a busy callee releases the media again.
    pub fn start_call(&mut self, other: UserId, kind: CallKind) -> Result<()> {
        let me = self.me()?;
        if self.call.is_some() {
            self.toast(Severity::Error, "Already in a call.");
            return Err(ClientError::CallInProgress);
        }

        let (mut engine, offer) = match CallEngine::start_outbound(
            me.id,
            other,
            kind,
            self.devices.as_ref(),
            self.peers.as_ref(),
        ) {
            Ok(pair) => pair,
            Err(e) => {
                self.toast(Severity::Error, call_error_copy(&e));
                return Err(e.into());
            }
        };

        if let Err(e) = self.store.place_call(me.id, other, kind, offer) {
            engine.hang_up();
            self.toast(Severity::Error, e.to_string());
            return Err(e.into());
        }

        let epoch = self.next_epoch();
        self.call_epoch = epoch;
        let outbound_pump = pump(
            self.store.watch_calls(other)?,
            self.feed_tx.clone(),
            epoch,
            "calls",
            FeedPayload::Calls,
        );

        self.call = Some(ActiveCall {
            engine,
            slot: other,
            last_phase: CallPhase::Ringing,
            outbound_pump: Some(outbound_pump),
        });
        self.push(ClientEvent::Call(CallEvent::Outgoing {
            callee: other,
            kind,
        }));
        self.drive_engine();
        Ok(())
    }

    /// Answer the ringing inbound call. On failure the call keeps ringing
    /// and can be retried or declined.
    pub fn accept_call(&mut self) -> Result<()> {
        let me = self.me()?;
        let result = {
            let Some(active) = self.call.as_mut() else {
                return Err(ClientError::NoActiveCall);
            };
            active.engine.accept(self.devices.as_ref(), self.peers.as_ref())
        };
        let answer = match result {
            Ok(answer) => answer,
            Err(e) => {
                self.toast(Severity::Error, call_error_copy(&e));
                return Err(e.into());
            }
        };

        if let Err(e) = self.store.answer_call(me.id, answer) {
            // The caller gave up in the gap; wind the engine down.
            if let Some(active) = self.call.as_mut() {
                active.engine.hang_up();
            }
            self.drive_engine();
            self.toast(Severity::Error, e.to_string());
            return Err(e.into());
        }
        self.drive_engine();
        Ok(())
    }

    /// Refuse the ringing inbound call. Media devices are never touched.
    pub fn decline_call(&mut self) -> Result<()> {
        let declined = {
            let Some(active) = self.call.as_mut() else {
                return Err(ClientError::NoActiveCall);
            };
            active.engine.decline()
        };
        if let Err(e) = declined {
            self.toast(Severity::Error, call_error_copy(&e));
            return Err(e.into());
        }
        self.drive_engine();
        Ok(())
    }

    /// End the current call, whatever its phase. The remote side learns
    /// through the slot, never through the transport.
    pub fn hang_up_call(&mut self) -> Result<()> {
        {
            let Some(active) = self.call.as_mut() else {
                return Err(ClientError::NoActiveCall);
            };
            active.engine.hang_up();
        }
        self.drive_engine();
        Ok(())
    }

    /// Drive the engine from a UI timer while a call is live: notices the
    /// transport coming up or falling over between signaling events. A
    /// no-op without a call.
    pub fn poll_call(&mut self) {
        self.drive_engine();
    }

    pub fn call_phase(&self) -> Option<CallPhase> {
        self.call.as_ref().map(|c| c.engine.phase())
    }

    pub fn call_remote(&self) -> Option<UserId> {
        self.call.as_ref().map(|c| c.engine.remote())
    }

    /// Time since the transport connected, live or final.
    pub fn call_elapsed(&self) -> Option<std::time::Duration> {
        self.call.as_ref().and_then(|c| c.engine.elapsed())
    }

    /// Fold one slot change into the call state.
    ///
    /// Documents for the live call's slot feed the engine. A ring only ever
    /// arrives as an `Added` change (placing a call writes a whole new
    /// session), so candidate and status updates replayed after a call
    /// ended can never ring again.
    pub(crate) fn apply_call_change(&mut self, change: Change<CallSession>) {
        let Some(me) = self.user.as_ref().map(|u| u.id) else {
            return;
        };
        let doc = change.doc;
        let over = change.kind == ChangeKind::Removed || doc.status == CallStatus::Ended;
        let rings = change.kind == ChangeKind::Added && doc.status == CallStatus::Ringing;

        if let Some(active) = self.call.as_mut() {
            if doc.callee == active.slot {
                if over {
                    active.engine.remote_ended();
                } else {
                    if active.engine.side() == CallSide::Caller
                        && doc.status == CallStatus::Answered
                        && active.engine.phase() == CallPhase::Ringing
                    {
                        if let Some(answer) = &doc.answer {
                            if let Err(e) = active.engine.remote_answered(answer) {
                                debug!(error = %e, "applying remote answer failed");
                            }
                        }
                    }
                    let from = active.engine.side().other();
                    active.engine.apply_remote_candidates(doc.candidates_from(from));
                }
                self.drive_engine();
            } else if rings && doc.callee == me {
                // Someone rang while another call is up: free the slot so
                // they are not left listening to a dead ring.
                if let Err(e) = self.store.end_call(me) {
                    debug!(error = %e, "declining while busy failed");
                }
                let caller = self.caller_name(doc.caller);
                self.toast(
                    Severity::Info,
                    format!("{caller} called while you were busy."),
                );
            }
            return;
        }

        if rings && doc.callee == me {
            debug!(caller = %doc.caller, kind = doc.kind.as_str(), "incoming call");
            self.call = Some(ActiveCall {
                engine: CallEngine::incoming(me, doc.caller, doc.kind, doc.offer.clone()),
                slot: me,
                last_phase: CallPhase::Ringing,
                outbound_pump: None,
            });
            self.push(ClientEvent::Call(CallEvent::Incoming {
                caller: doc.caller,
                kind: doc.kind,
            }));
        }
    }

    /// Advance the engine after any input: relay freshly gathered local
    /// candidates into the slot, then emit at most one phase transition.
    /// Ending (locally or remotely) also closes the slot, so a transport
    /// failure still reaches the other side through signaling.
    fn drive_engine(&mut self) {
        let (slot, side, candidates) = {
            let Some(active) = self.call.as_mut() else {
                return;
            };
            active.engine.poll_health();
            (
                active.slot,
                active.engine.side(),
                active.engine.take_local_candidates(),
            )
        };
        for candidate in &candidates {
            if let Err(e) = self.store.add_call_candidate(slot, side, candidate) {
                debug!(error = %e, "candidate relay failed");
            }
        }

        let transition = {
            let Some(active) = self.call.as_mut() else {
                return;
            };
            let phase = active.engine.phase();
            if phase == active.last_phase {
                None
            } else {
                active.last_phase = phase;
                Some(phase)
            }
        };
        match transition {
            Some(CallPhase::Connected) => {
                self.push(ClientEvent::Call(CallEvent::Connected));
            }
            Some(CallPhase::Ended(reason)) => {
                if let Err(e) = self.store.end_call(slot) {
                    debug!(error = %e, "closing call slot failed");
                }
                self.push(ClientEvent::Call(CallEvent::Ended { reason }));
                self.call = None;
                self.call_epoch = 0;
            }
            _ => {}
        }
    }

    fn caller_name(&self, id: UserId) -> String {
        self.store
            .get_user(id)
            .ok()
            .flatten()
            .map(|u| u.display_name)
            .unwrap_or_else(|| "Someone".to_string())
    }
}

fn call_error_copy(e: &CallError) -> &'static str {
    match e {
        CallError::Media(MediaError::PermissionDenied) => {
            "Microphone or camera access was denied."
        }
        CallError::Media(MediaError::NoDevice) => "No microphone or camera was found.",
        CallError::Media(MediaError::Transport(_)) => "Couldn't set up the call transport.",
        CallError::NotRinging | CallError::WrongSide => "That call isn't ringing anymore.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{next_matching, session_with};
    use parlor_calls::loopback::{LoopbackMedia, LoopbackPeers};
    use parlor_calls::{CallEndReason, ConnectionHealth};
    use parlor_store::Store;
    use std::sync::Arc;

    struct Rig {
        session: crate::session::Session,
        media: Arc<LoopbackMedia>,
        peers: Arc<LoopbackPeers>,
    }

    fn rig(store: &Arc<Store>, email: &str, name: &str) -> Rig {
        let media = Arc::new(LoopbackMedia::default());
        let peers = Arc::new(LoopbackPeers::new());
        let mut session = session_with(store, media.clone(), peers.clone());
        session.sign_up(email, "correct horse", name).unwrap();
        Rig {
            session,
            media,
            peers,
        }
    }

    #[tokio::test]
    async fn a_voice_call_connects_both_sessions() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut ada = rig(&store, "ada@example.com", "Ada Lovelace");
        let mut bea = rig(&store, "bea@example.com", "Bea Arthur");
        let bea_id = bea.session.user().unwrap().id;
        let ada_id = ada.session.user().unwrap().id;

        ada.session.start_call(bea_id, CallKind::Voice).unwrap();
        next_matching(&mut ada.session, |e| {
            matches!(
                e,
                ClientEvent::Call(CallEvent::Outgoing {
                    kind: CallKind::Voice,
                    ..
                })
            )
        })
        .await;

        let incoming = next_matching(&mut bea.session, |e| {
            matches!(e, ClientEvent::Call(CallEvent::Incoming { .. }))
        })
        .await;
        assert_eq!(
            incoming,
            ClientEvent::Call(CallEvent::Incoming {
                caller: ada_id,
                kind: CallKind::Voice,
            })
        );

        bea.session.accept_call().unwrap();
        next_matching(&mut bea.session, |e| {
            matches!(e, ClientEvent::Call(CallEvent::Connected))
        })
        .await;
        next_matching(&mut ada.session, |e| {
            matches!(e, ClientEvent::Call(CallEvent::Connected))
        })
        .await;

        assert_eq!(ada.media.live(), 1);
        assert_eq!(bea.media.live(), 1);
        assert_eq!(ada.session.call_phase(), Some(CallPhase::Connected));
        assert_eq!(ada.session.call_remote(), Some(bea_id));

        // Both sides relayed their gathered candidates into the slot.
        let slot = store.get_call(bea_id).unwrap().unwrap();
        assert!(!slot.candidates_from(CallSide::Caller).is_empty());
        assert!(!slot.candidates_from(CallSide::Callee).is_empty());

        bea.session.hang_up_call().unwrap();
        next_matching(&mut bea.session, |e| {
            matches!(
                e,
                ClientEvent::Call(CallEvent::Ended {
                    reason: CallEndReason::Hangup,
                })
            )
        })
        .await;
        next_matching(&mut ada.session, |e| {
            matches!(e, ClientEvent::Call(CallEvent::Ended { .. }))
        })
        .await;

        assert_eq!(ada.media.live(), 0);
        assert_eq!(bea.media.live(), 0);
        assert_eq!(ada.session.call_phase(), None);
        // The callee's candidate crossed into the caller's transport
        // before the slot closed.
        let probe = ada.peers.probe(0).unwrap();
        assert!(!probe.remote_candidates().is_empty());
        assert!(probe.closed());
    }

    #[tokio::test]
    async fn a_busy_callee_bounces_the_caller_and_releases_media() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut ada = rig(&store, "ada@example.com", "Ada Lovelace");
        let bea = rig(&store, "bea@example.com", "Bea Arthur");
        let mut cara = rig(&store, "cara@example.com", "Cara Cruz");
        let bea_id = bea.session.user().unwrap().id;

        ada.session.start_call(bea_id, CallKind::Voice).unwrap();

        let err = cara.session.start_call(bea_id, CallKind::Video).unwrap_err();
        assert!(matches!(err, ClientError::Store(_)));
        assert_eq!(cara.media.live(), 0);
        assert_eq!(cara.session.call_phase(), None);

        let toast = next_matching(&mut cara.session, |e| {
            matches!(e, ClientEvent::Toast { .. })
        })
        .await;
        assert!(matches!(
            toast,
            ClientEvent::Toast {
                severity: Severity::Error,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn declining_never_touches_the_devices() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut ada = rig(&store, "ada@example.com", "Ada Lovelace");
        let mut bea = rig(&store, "bea@example.com", "Bea Arthur");
        let bea_id = bea.session.user().unwrap().id;

        ada.session.start_call(bea_id, CallKind::Video).unwrap();
        next_matching(&mut bea.session, |e| {
            matches!(e, ClientEvent::Call(CallEvent::Incoming { .. }))
        })
        .await;

        bea.session.decline_call().unwrap();
        let ended = next_matching(&mut bea.session, |e| {
            matches!(e, ClientEvent::Call(CallEvent::Ended { .. }))
        })
        .await;
        assert_eq!(
            ended,
            ClientEvent::Call(CallEvent::Ended {
                reason: CallEndReason::Declined,
            })
        );
        assert_eq!(bea.media.live(), 0);

        // The caller hears a plain remote end.
        next_matching(&mut ada.session, |e| {
            matches!(
                e,
                ClientEvent::Call(CallEvent::Ended {
                    reason: CallEndReason::Hangup,
                })
            )
        })
        .await;
        assert_eq!(ada.media.live(), 0);
    }

    #[tokio::test]
    async fn denied_permission_never_places_the_call() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let media = Arc::new(LoopbackMedia::denying());
        let peers = Arc::new(LoopbackPeers::new());
        let mut ada = session_with(&store, media, peers);
        ada.sign_up("ada@example.com", "correct horse", "Ada Lovelace")
            .unwrap();
        let bea = store
            .sign_up("bea@example.com", "correct horse", "Bea Arthur")
            .unwrap();

        let err = ada.start_call(bea.id, CallKind::Voice).unwrap_err();
        assert!(matches!(
            err,
            ClientError::Call(CallError::Media(MediaError::PermissionDenied))
        ));
        assert!(store.get_call(bea.id).unwrap().is_none());
        assert_eq!(ada.call_phase(), None);
    }

    #[tokio::test]
    async fn a_second_ring_while_busy_is_refused() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut ada = rig(&store, "ada@example.com", "Ada Lovelace");
        let bea = rig(&store, "bea@example.com", "Bea Arthur");
        let mut cara = rig(&store, "cara@example.com", "Cara Cruz");
        let ada_id = ada.session.user().unwrap().id;
        let bea_id = bea.session.user().unwrap().id;

        // Ada is mid-ring to Bea when Cara calls Ada.
        ada.session.start_call(bea_id, CallKind::Voice).unwrap();
        cara.session.start_call(ada_id, CallKind::Voice).unwrap();

        let toast = next_matching(&mut ada.session, |e| {
            matches!(e, ClientEvent::Toast { .. })
        })
        .await;
        let ClientEvent::Toast { severity, message } = toast else {
            unreachable!();
        };
        assert_eq!(severity, Severity::Info);
        assert!(message.contains("Cara Cruz"));
        // Her own outbound call is untouched.
        assert_eq!(ada.session.call_phase(), Some(CallPhase::Ringing));
        assert_eq!(ada.session.call_remote(), Some(bea_id));

        next_matching(&mut cara.session, |e| {
            matches!(e, ClientEvent::Call(CallEvent::Ended { .. }))
        })
        .await;
        assert_eq!(cara.media.live(), 0);
        assert_eq!(cara.session.call_phase(), None);
    }

    #[tokio::test]
    async fn transport_loss_ends_the_call_for_both_sides() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut ada = rig(&store, "ada@example.com", "Ada Lovelace");
        let mut bea = rig(&store, "bea@example.com", "Bea Arthur");
        let bea_id = bea.session.user().unwrap().id;

        ada.session.start_call(bea_id, CallKind::Voice).unwrap();
        next_matching(&mut bea.session, |e| {
            matches!(e, ClientEvent::Call(CallEvent::Incoming { .. }))
        })
        .await;
        bea.session.accept_call().unwrap();
        next_matching(&mut ada.session, |e| {
            matches!(e, ClientEvent::Call(CallEvent::Connected))
        })
        .await;

        ada.peers
            .probe(0)
            .unwrap()
            .set_health(ConnectionHealth::Failed);
        ada.session.poll_call();

        let ended = next_matching(&mut ada.session, |e| {
            matches!(e, ClientEvent::Call(CallEvent::Ended { .. }))
        })
        .await;
        assert_eq!(
            ended,
            ClientEvent::Call(CallEvent::Ended {
                reason: CallEndReason::TransportFailed,
            })
        );
        assert_eq!(ada.media.live(), 0);

        // The failure closed the slot, so the callee's session ends too.
        next_matching(&mut bea.session, |e| {
            matches!(e, ClientEvent::Call(CallEvent::Ended { .. }))
        })
        .await;
        assert_eq!(bea.media.live(), 0);
        assert_eq!(bea.session.call_phase(), None);
    }
}
