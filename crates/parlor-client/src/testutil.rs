//! Scaffolding shared by the session test modules: sessions wired to an
//! in-memory store and the loopback call stack, plus a bounded event drain.

use std::sync::Arc;
use std::time::Duration;

use parlor_calls::loopback::{LoopbackMedia, LoopbackPeers};
use parlor_shared::documents::{MessageKind, User};
use parlor_shared::types::ConversationId;
use parlor_store::{MessageDraft, Store};
use tokio::time::timeout;

use crate::config::ClientConfig;
use crate::events::ClientEvent;
use crate::prefs::PrefsStore;
use crate::session::Session;

pub(crate) fn open_session(store: &Arc<Store>) -> Session {
    session_with(
        store,
        Arc::new(LoopbackMedia::default()),
        Arc::new(LoopbackPeers::new()),
    )
}

/// Like [`open_session`], but with caller-held loopback handles so a test
/// can inspect track counts and peer probes afterwards.
pub(crate) fn session_with(
    store: &Arc<Store>,
    devices: Arc<LoopbackMedia>,
    peers: Arc<LoopbackPeers>,
) -> Session {
    Session::new(
        store.clone(),
        ClientConfig::default(),
        devices,
        peers,
        PrefsStore::open_in_memory().unwrap(),
    )
}

/// Drive the session until `pred` matches an event, or fail after two
/// seconds. Non-matching events are discarded.
pub(crate) async fn next_matching<F>(session: &mut Session, pred: F) -> ClientEvent
where
    F: Fn(&ClientEvent) -> bool,
{
    timeout(Duration::from_secs(2), async {
        loop {
            let event = session.next_event().await;
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("expected event never arrived")
}

/// A plain text draft written as if by another connected client.
pub(crate) fn bystander_draft(
    conversation: ConversationId,
    author: &User,
    content: &str,
) -> MessageDraft {
    MessageDraft {
        conversation,
        content: content.to_string(),
        author_id: author.id,
        author_name: author.display_name.clone(),
        author_color: author.avatar_color.clone(),
        kind: MessageKind::Text,
        reply_to: None,
    }
}
