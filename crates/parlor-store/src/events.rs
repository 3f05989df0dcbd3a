//! Change feed types.
//!
//! Every mutation on the [`Store`](crate::Store) publishes a [`StoreEvent`]
//! on a broadcast channel. The `watch_*` methods filter that firehose down
//! to one document type (and usually one conversation) and deliver batches
//! of [`Change`]s over a [`Subscription`].

use parlor_shared::documents::{
    CallSession, Channel, DirectConversation, Message, TypingMarker, User,
};
use parlor_shared::types::ConversationId;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// How a document changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// The document is new to this subscription. Snapshot rows are delivered
    /// as `Added` too, so consumers handle backlog and live traffic the same
    /// way.
    Added,
    /// An existing document changed in place.
    Modified,
    /// The document was deleted. The carried document is its last state.
    Removed,
}

/// A single document change.
#[derive(Debug, Clone)]
pub struct Change<T> {
    pub kind: ChangeKind,
    pub doc: T,
}

impl<T> Change<T> {
    pub fn added(doc: T) -> Self {
        Self { kind: ChangeKind::Added, doc }
    }

    pub fn modified(doc: T) -> Self {
        Self { kind: ChangeKind::Modified, doc }
    }

    pub fn removed(doc: T) -> Self {
        Self { kind: ChangeKind::Removed, doc }
    }
}

/// Events published on the store-wide broadcast channel.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// A channel was created, renamed, or had its topic changed.
    Channel(Change<Channel>),
    /// A direct conversation was created or bumped.
    Dm(Change<DirectConversation>),
    /// A message changed in some conversation.
    Message {
        conversation: ConversationId,
        change: Change<Message>,
    },
    /// A typing marker appeared or was cleared.
    Typing {
        conversation: ConversationId,
        change: Change<TypingMarker>,
    },
    /// A call signaling slot changed. Keyed by callee.
    Call(Change<CallSession>),
    /// A user profile or presence changed.
    User(Change<User>),
}

/// Why a subscription stream stopped.
///
/// Both variants are terminal: the consumer must resubscribe to recover,
/// which re-reads a fresh snapshot.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    /// The subscriber fell too far behind the broadcast channel and missed
    /// events. Continuing would silently desynchronize the local view.
    #[error("subscription lagged behind, {missed} events were dropped")]
    Lagged { missed: u64 },
    /// The store was dropped while the subscription was live.
    #[error("store closed")]
    Closed,
}

/// A live filtered view of one document type.
///
/// Changes arrive in batches. The first batch is the snapshot (every matching
/// document as [`ChangeKind::Added`]); subsequent batches carry live changes.
/// Dropping the subscription stops delivery and aborts the forwarder task.
pub struct Subscription<T> {
    rx: mpsc::Receiver<Result<Vec<Change<T>>, StreamError>>,
    task: JoinHandle<()>,
}

impl<T> Subscription<T> {
    pub(crate) fn new(
        rx: mpsc::Receiver<Result<Vec<Change<T>>, StreamError>>,
        task: JoinHandle<()>,
    ) -> Self {
        Self { rx, task }
    }

    /// Wait for the next batch of changes.
    ///
    /// Returns `None` once the stream has ended (after a [`StreamError`] or
    /// cancellation).
    pub async fn recv(&mut self) -> Option<Result<Vec<Change<T>>, StreamError>> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv) for poll-style callers.
    pub fn try_recv(&mut self) -> Option<Result<Vec<Change<T>>, StreamError>> {
        self.rx.try_recv().ok()
    }

    /// Stop the subscription explicitly. Equivalent to dropping it.
    pub fn cancel(&mut self) {
        self.task.abort();
        self.rx.close();
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}
