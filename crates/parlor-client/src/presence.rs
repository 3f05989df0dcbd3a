//! Aggregate online-count refresh.
//!
//! The count is recomputed on a trailing debounce: every message-stream
//! event pokes the counter, and the query runs once things have been
//! quiet for [`ONLINE_REFRESH_DEBOUNCE_MS`].

use std::sync::Arc;
use std::time::Duration;

use parlor_shared::constants::ONLINE_REFRESH_DEBOUNCE_MS;
use parlor_store::Store;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::events::ClientEvent;

pub struct OnlineCounter {
    store: Arc<Store>,
    events: mpsc::UnboundedSender<ClientEvent>,
    pending: Option<JoinHandle<()>>,
}

impl OnlineCounter {
    pub fn new(store: Arc<Store>, events: mpsc::UnboundedSender<ClientEvent>) -> Self {
        Self {
            store,
            events,
            pending: None,
        }
    }

    /// Note activity; the refresh fires after the quiet window.
    pub fn poke(&mut self) {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
        let store = self.store.clone();
        let events = self.events.clone();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ONLINE_REFRESH_DEBOUNCE_MS)).await;
            match store.online_count() {
                Ok(count) => {
                    let _ = events.send(ClientEvent::OnlineCount(count));
                }
                Err(e) => debug!(error = %e, "online count refresh failed"),
            }
        }));
    }
}

impl Drop for OnlineCounter {
    fn drop(&mut self) {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
    }
}
