//! The realtime store.
//!
//! [`Store`] serializes every mutation through a single [`Database`] behind
//! a mutex and publishes one [`StoreEvent`] per committed change on a
//! broadcast feed. The per-entity modules add the typed operations
//! (`append_message`, `toggle_reaction`, `place_call`, ...) and the
//! `watch_*` subscription constructors on top of the helpers here.
//!
//! Must be used from within a tokio runtime: `watch_*` methods spawn a
//! forwarder task per subscription.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use tokio::sync::{broadcast, mpsc};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::events::{Change, StoreEvent, StreamError, Subscription};

/// Capacity of the store-wide broadcast feed. A subscriber that falls more
/// than this many events behind is terminated with [`StreamError::Lagged`].
const FEED_CAPACITY: usize = 256;

/// Per-subscription delivery buffer.
const SUBSCRIPTION_BUFFER: usize = 64;

/// Shared data + realtime layer. Cheap to share as `Arc<Store>`.
pub struct Store {
    db: Mutex<Database>,
    feed: broadcast::Sender<StoreEvent>,
    /// Failed sign-in instants per email, for the sliding-window throttle.
    pub(crate) failed_signins: Mutex<HashMap<String, Vec<Instant>>>,
}

impl Store {
    /// Open the default on-disk database.
    pub fn open_default() -> Result<Self> {
        Ok(Self::with_database(Database::open_default()?))
    }

    /// Open a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        Ok(Self::with_database(Database::open_at(path)?))
    }

    /// Open a private in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::with_database(Database::open_in_memory()?))
    }

    fn with_database(db: Database) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            db: Mutex::new(db),
            feed,
            failed_signins: Mutex::new(HashMap::new()),
        }
    }

    /// Lock the database for one operation.
    pub(crate) fn db(&self) -> Result<MutexGuard<'_, Database>> {
        self.db.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Publish a committed change. No subscribers is fine.
    pub(crate) fn publish(&self, event: StoreEvent) {
        let _ = self.feed.send(event);
    }

    /// Subscribe to the raw feed. Take the receiver *before* reading the
    /// snapshot that seeds a subscription, so no change can fall between
    /// the two.
    pub(crate) fn feed_receiver(&self) -> broadcast::Receiver<StoreEvent> {
        self.feed.subscribe()
    }

    /// Build a [`Subscription`] from a snapshot plus a live-event filter.
    ///
    /// The snapshot is delivered first as one batch of `Added` changes (an
    /// empty batch still arrives, signalling "backlog complete"), then each
    /// matching live event is relayed as its own batch. A change that lands
    /// between the snapshot read and the first relay may be delivered twice,
    /// so consumers treat `Added` as upsert-by-id.
    pub(crate) fn forward<T, F>(
        &self,
        mut feed: broadcast::Receiver<StoreEvent>,
        snapshot: Vec<T>,
        filter: F,
    ) -> Subscription<T>
    where
        T: Send + 'static,
        F: Fn(StoreEvent) -> Option<Change<T>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let task = tokio::spawn(async move {
            let backlog: Vec<Change<T>> = snapshot.into_iter().map(Change::added).collect();
            if tx.send(Ok(backlog)).await.is_err() {
                return;
            }

            loop {
                match feed.recv().await {
                    Ok(event) => {
                        if let Some(change) = filter(event) {
                            if tx.send(Ok(vec![change])).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "subscription lagged behind, terminating");
                        let _ = tx.send(Err(StreamError::Lagged { missed })).await;
                        return;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        let _ = tx.send(Err(StreamError::Closed)).await;
                        return;
                    }
                }
            }
        });

        Subscription::new(rx, task)
    }
}
