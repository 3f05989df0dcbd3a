//! Call signaling slots.
//!
//! Each user owns one inbound slot keyed by their id: placing a call writes
//! the offer into the callee's slot, the callee answers in place, and both
//! sides append ICE candidates to their own list while draining the other's.
//! A slot whose session is not `Ended` refuses new calls instead of being
//! silently overwritten.

use parlor_shared::documents::{CallKind, CallSession, CallSide, CallStatus, Sdp};
use parlor_shared::types::UserId;
use rusqlite::{params, OptionalExtension};

use crate::database::{bad_column, fmt_ts, now_millis, parse_ts, unknown_tag, Database};
use crate::error::{Result, StoreError};
use crate::events::{Change, StoreEvent, Subscription};
use crate::store::Store;

const CALL_COLUMNS: &str = "callee, caller, kind, status, offer_sdp, offer_type, \
     answer_sdp, answer_type, caller_candidates, callee_candidates, created_at";

impl Store {
    /// Write a ringing session into the callee's slot.
    ///
    /// Fails with [`StoreError::CalleeBusy`] while the slot holds a live
    /// (non-ended) session, so an established call can never be clobbered
    /// by a second caller.
    pub fn place_call(
        &self,
        caller: UserId,
        callee: UserId,
        kind: CallKind,
        offer: Sdp,
    ) -> Result<CallSession> {
        let session = {
            let db = self.db()?;
            if db.get_user(callee)?.is_none() {
                return Err(StoreError::NotFound);
            }
            if let Some(existing) = db.get_call_row(callee)? {
                if existing.status != CallStatus::Ended {
                    return Err(StoreError::CalleeBusy);
                }
            }

            let session = CallSession {
                callee,
                caller,
                kind,
                status: CallStatus::Ringing,
                offer,
                answer: None,
                caller_candidates: Vec::new(),
                callee_candidates: Vec::new(),
                created_at: now_millis(),
            };
            db.upsert_call_row(&session)?;
            session
        };

        tracing::debug!(caller = %caller, callee = %callee, "call placed");
        self.publish(StoreEvent::Call(Change::added(session.clone())));
        Ok(session)
    }

    /// Accept the ringing session in `callee`'s slot.
    pub fn answer_call(&self, callee: UserId, answer: Sdp) -> Result<CallSession> {
        let session = {
            let db = self.db()?;
            match db.get_call_row(callee)? {
                Some(s) if s.status == CallStatus::Ringing => {
                    db.set_call_answered(callee, &answer)?;
                    db.get_call_row(callee)?.ok_or(StoreError::NotFound)?
                }
                _ => return Err(StoreError::CallNotRinging),
            }
        };

        self.publish(StoreEvent::Call(Change::modified(session.clone())));
        Ok(session)
    }

    /// Mark the session in `callee`'s slot ended. Idempotent: an absent or
    /// already-ended slot is left alone and publishes nothing.
    pub fn end_call(&self, callee: UserId) -> Result<()> {
        let session = {
            let db = self.db()?;
            match db.get_call_row(callee)? {
                Some(s) if s.status != CallStatus::Ended => {
                    db.set_call_ended(callee)?;
                    db.get_call_row(callee)?
                }
                _ => None,
            }
        };

        if let Some(session) = session {
            tracing::debug!(callee = %callee, "call ended");
            self.publish(StoreEvent::Call(Change::modified(session)));
        }
        Ok(())
    }

    /// Append one ICE candidate to `side`'s list on the session in
    /// `callee`'s slot.
    pub fn add_call_candidate(
        &self,
        callee: UserId,
        side: CallSide,
        candidate: &str,
    ) -> Result<CallSession> {
        let session = self
            .db()?
            .append_call_candidate(callee, side, candidate)?
            .ok_or(StoreError::NotFound)?;
        self.publish(StoreEvent::Call(Change::modified(session.clone())));
        Ok(session)
    }

    /// The session currently in `callee`'s slot, ended or not.
    pub fn get_call(&self, callee: UserId) -> Result<Option<CallSession>> {
        self.db()?.get_call_row(callee)
    }

    /// Watch one user's inbound slot. The snapshot carries whatever session
    /// is in the slot; deciding whether it is worth ringing for is the
    /// consumer's job.
    pub fn watch_calls(&self, callee: UserId) -> Result<Subscription<CallSession>> {
        let feed = self.feed_receiver();
        let snapshot: Vec<CallSession> = self.db()?.get_call_row(callee)?.into_iter().collect();
        Ok(self.forward(feed, snapshot, move |event| match event {
            StoreEvent::Call(change) if change.doc.callee == callee => Some(change),
            _ => None,
        }))
    }
}

// ---------------------------------------------------------------------------
// SQL layer
// ---------------------------------------------------------------------------

impl Database {
    pub(crate) fn get_call_row(&self, callee: UserId) -> Result<Option<CallSession>> {
        let session = self
            .conn()
            .query_row(
                &format!("SELECT {CALL_COLUMNS} FROM calls WHERE callee = ?1"),
                params![callee.to_string()],
                row_to_call,
            )
            .optional()?;
        Ok(session)
    }

    pub(crate) fn upsert_call_row(&self, session: &CallSession) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO calls
                 (callee, caller, kind, status, offer_sdp, offer_type,
                  answer_sdp, answer_type, caller_candidates, callee_candidates, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                session.callee.to_string(),
                session.caller.to_string(),
                session.kind.as_str(),
                session.status.as_str(),
                session.offer.sdp,
                session.offer.kind,
                session.answer.as_ref().map(|a| a.sdp.clone()),
                session.answer.as_ref().map(|a| a.kind.clone()),
                serde_json::to_string(&session.caller_candidates)?,
                serde_json::to_string(&session.callee_candidates)?,
                fmt_ts(session.created_at),
            ],
        )?;
        Ok(())
    }

    pub(crate) fn set_call_answered(&self, callee: UserId, answer: &Sdp) -> Result<()> {
        self.conn().execute(
            "UPDATE calls SET status = 'answered', answer_sdp = ?2, answer_type = ?3
             WHERE callee = ?1",
            params![callee.to_string(), answer.sdp, answer.kind],
        )?;
        Ok(())
    }

    pub(crate) fn set_call_ended(&self, callee: UserId) -> Result<()> {
        self.conn().execute(
            "UPDATE calls SET status = 'ended' WHERE callee = ?1",
            params![callee.to_string()],
        )?;
        Ok(())
    }

    pub(crate) fn append_call_candidate(
        &self,
        callee: UserId,
        side: CallSide,
        candidate: &str,
    ) -> Result<Option<CallSession>> {
        let Some(mut session) = self.get_call_row(callee)? else {
            return Ok(None);
        };

        let (column, list) = match side {
            CallSide::Caller => ("caller_candidates", &mut session.caller_candidates),
            CallSide::Callee => ("callee_candidates", &mut session.callee_candidates),
        };
        list.push(candidate.to_string());
        let json = serde_json::to_string(&*list)?;

        self.conn().execute(
            &format!("UPDATE calls SET {column} = ?2 WHERE callee = ?1"),
            params![callee.to_string(), json],
        )?;
        Ok(Some(session))
    }
}

fn row_to_call(row: &rusqlite::Row<'_>) -> rusqlite::Result<CallSession> {
    let callee_str: String = row.get(0)?;
    let caller_str: String = row.get(1)?;
    let kind_str: String = row.get(2)?;
    let status_str: String = row.get(3)?;
    let answer_sdp: Option<String> = row.get(6)?;
    let answer_type: Option<String> = row.get(7)?;
    let caller_json: String = row.get(8)?;
    let callee_json: String = row.get(9)?;
    let created_str: String = row.get(10)?;

    let answer = match (answer_sdp, answer_type) {
        (Some(sdp), Some(kind)) => Some(Sdp { sdp, kind }),
        _ => None,
    };

    Ok(CallSession {
        callee: UserId::parse(&callee_str).map_err(|e| bad_column(0, e))?,
        caller: UserId::parse(&caller_str).map_err(|e| bad_column(1, e))?,
        kind: CallKind::parse(&kind_str).ok_or_else(|| unknown_tag(2, &kind_str))?,
        status: CallStatus::parse(&status_str).ok_or_else(|| unknown_tag(3, &status_str))?,
        offer: Sdp {
            sdp: row.get(4)?,
            kind: row.get(5)?,
        },
        answer,
        caller_candidates: serde_json::from_str(&caller_json).map_err(|e| bad_column(8, e))?,
        callee_candidates: serde_json::from_str(&callee_json).map_err(|e| bad_column(9, e))?,
        created_at: parse_ts(&created_str, 10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChangeKind;

    fn offer() -> Sdp {
        Sdp {
            sdp: "v=0 offer".into(),
            kind: "offer".into(),
        }
    }

    fn answer() -> Sdp {
        Sdp {
            sdp: "v=0 answer".into(),
            kind: "answer".into(),
        }
    }

    fn pair() -> (Store, UserId, UserId) {
        let store = Store::open_in_memory().unwrap();
        let a = store
            .sign_up("ada@example.com", "correct-horse", "Ada")
            .unwrap();
        let b = store
            .sign_up("grace@example.com", "correct-horse", "Grace")
            .unwrap();
        (store, a.id, b.id)
    }

    #[test]
    fn ring_answer_end_walks_the_statuses() {
        let (store, caller, callee) = pair();

        let placed = store
            .place_call(caller, callee, CallKind::Voice, offer())
            .unwrap();
        assert_eq!(placed.status, CallStatus::Ringing);
        assert!(placed.answer.is_none());

        let answered = store.answer_call(callee, answer()).unwrap();
        assert_eq!(answered.status, CallStatus::Answered);
        assert_eq!(answered.answer.as_ref().unwrap().kind, "answer");

        store.end_call(callee).unwrap();
        let after = store.get_call(callee).unwrap().unwrap();
        assert_eq!(after.status, CallStatus::Ended);
    }

    #[test]
    fn live_slot_rejects_a_second_caller() {
        let (store, caller, callee) = pair();
        let third = store
            .sign_up("carol@example.com", "correct-horse", "Carol")
            .unwrap();

        store
            .place_call(caller, callee, CallKind::Voice, offer())
            .unwrap();
        assert!(matches!(
            store.place_call(third.id, callee, CallKind::Video, offer()),
            Err(StoreError::CalleeBusy)
        ));

        // Once ended, the slot is reusable.
        store.end_call(callee).unwrap();
        let again = store
            .place_call(third.id, callee, CallKind::Video, offer())
            .unwrap();
        assert_eq!(again.caller, third.id);
        assert_eq!(again.status, CallStatus::Ringing);
        assert!(again.caller_candidates.is_empty());
    }

    #[test]
    fn answering_requires_a_ringing_session() {
        let (store, caller, callee) = pair();

        assert!(matches!(
            store.answer_call(callee, answer()),
            Err(StoreError::CallNotRinging)
        ));

        store
            .place_call(caller, callee, CallKind::Voice, offer())
            .unwrap();
        store.end_call(callee).unwrap();
        assert!(matches!(
            store.answer_call(callee, answer()),
            Err(StoreError::CallNotRinging)
        ));
    }

    #[test]
    fn end_is_idempotent() {
        let (store, caller, callee) = pair();
        store
            .place_call(caller, callee, CallKind::Voice, offer())
            .unwrap();

        store.end_call(callee).unwrap();
        store.end_call(callee).unwrap();
        store.end_call(caller).unwrap(); // no slot at all
    }

    #[test]
    fn candidates_accumulate_per_side() {
        let (store, caller, callee) = pair();
        store
            .place_call(caller, callee, CallKind::Voice, offer())
            .unwrap();

        store
            .add_call_candidate(callee, CallSide::Caller, "candidate:1")
            .unwrap();
        store
            .add_call_candidate(callee, CallSide::Caller, "candidate:2")
            .unwrap();
        let session = store
            .add_call_candidate(callee, CallSide::Callee, "candidate:9")
            .unwrap();

        assert_eq!(session.caller_candidates, vec!["candidate:1", "candidate:2"]);
        assert_eq!(session.callee_candidates, vec!["candidate:9"]);
        assert_eq!(session.candidates_from(CallSide::Caller).len(), 2);
    }

    #[test]
    fn unknown_callee_is_rejected() {
        let (store, caller, _) = pair();
        let ghost = UserId::new();
        assert!(matches!(
            store.place_call(caller, ghost, CallKind::Voice, offer()),
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn watch_is_scoped_to_the_callee_slot() {
        let (store, caller, callee) = pair();
        let other = store
            .sign_up("carol@example.com", "correct-horse", "Carol")
            .unwrap();

        let mut sub = store.watch_calls(callee).unwrap();
        assert!(sub.recv().await.unwrap().unwrap().is_empty());

        // Someone else's slot; must not be delivered.
        store
            .place_call(caller, other.id, CallKind::Voice, offer())
            .unwrap();
        store
            .place_call(caller, callee, CallKind::Video, offer())
            .unwrap();

        let live = sub.recv().await.unwrap().unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].kind, ChangeKind::Added);
        assert_eq!(live[0].doc.callee, callee);
        assert_eq!(live[0].doc.kind, CallKind::Video);
    }
}
