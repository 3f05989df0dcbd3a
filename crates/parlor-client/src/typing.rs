//! Outbound typing signal.
//!
//! Each keystroke upserts the marker and re-arms a clear task; if the
//! user goes quiet the task deletes the marker after
//! [`TYPING_REARM_SECS`]. Sending a message (or leaving the
//! conversation) clears it immediately.

use std::sync::Arc;
use std::time::Duration;

use parlor_shared::constants::TYPING_REARM_SECS;
use parlor_shared::types::{ConversationId, UserId};
use parlor_store::Store;
use tokio::task::JoinHandle;
use tracing::debug;

pub struct TypingReporter {
    store: Arc<Store>,
    conversation: ConversationId,
    user_id: UserId,
    display_name: String,
    clear_task: Option<JoinHandle<()>>,
}

impl TypingReporter {
    pub fn new(
        store: Arc<Store>,
        conversation: ConversationId,
        user_id: UserId,
        display_name: String,
    ) -> Self {
        Self {
            store,
            conversation,
            user_id,
            display_name,
            clear_task: None,
        }
    }

    /// Refresh the marker and push the expiry out.
    pub fn keystroke(&mut self) -> parlor_store::Result<()> {
        self.store.upsert_typing(
            self.conversation.clone(),
            self.user_id,
            &self.display_name,
        )?;
        self.rearm();
        Ok(())
    }

    /// Drop the marker now. The pending expiry is disarmed first.
    pub fn stop(&mut self) {
        if let Some(task) = self.clear_task.take() {
            task.abort();
        }
        if let Err(e) = self.store.clear_typing(self.conversation.clone(), self.user_id) {
            debug!(error = %e, "failed to clear typing marker");
        }
    }

    fn rearm(&mut self) {
        if let Some(task) = self.clear_task.take() {
            task.abort();
        }
        let store = self.store.clone();
        let conversation = self.conversation.clone();
        let user_id = self.user_id;
        self.clear_task = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(TYPING_REARM_SECS)).await;
            if let Err(e) = store.clear_typing(conversation, user_id) {
                debug!(error = %e, "typing marker expiry failed");
            }
        }));
    }
}

impl Drop for TypingReporter {
    fn drop(&mut self) {
        if let Some(task) = self.clear_task.take() {
            task.abort();
        }
    }
}
