//! The signed-in session: one user's live view of the store.
//!
//! A [`Session`] owns the subscriptions, folds their change batches into
//! the projections from [`crate::projection`], and hands the resulting
//! [`ClientEvent`]s to the caller one at a time through [`Session::next_event`].
//! All mutating operations are synchronous calls on the session; everything
//! the caller should repaint arrives as an event, including the echo of the
//! session's own writes.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use parlor_calls::{MediaDevices, PeerFactory};
use parlor_shared::constants::TYPING_FRESH_SECS;
use parlor_shared::documents::{
    CallSession, Channel, DirectConversation, Message, TypingMarker, User,
};
use parlor_shared::names::validate_display_name;
use parlor_shared::types::{ConversationId, UserId};
use parlor_store::{Change, ChangeKind, Store, StreamError, Subscription};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::calls::ActiveCall;
use crate::composer::Composer;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::events::{ClientEvent, Severity};
use crate::prefs::{Preferences, PrefsStore};
use crate::presence::OnlineCounter;
use crate::projection::{ChannelList, DmList, MessageTimeline};
use crate::typing::TypingReporter;

/// One batch from one subscription, tagged with the epoch its pump was
/// spawned under. Batches whose epoch no longer matches the live one are
/// leftovers from a torn-down subscription and are dropped unprocessed.
pub(crate) struct Feed {
    epoch: u64,
    payload: FeedPayload,
}

pub(crate) enum FeedPayload {
    Messages(Vec<Change<Message>>),
    Typing(Vec<Change<TypingMarker>>),
    Channels(Vec<Change<Channel>>),
    Dms(Vec<Change<DirectConversation>>),
    Calls(Vec<Change<CallSession>>),
    Failed {
        stream: &'static str,
        error: StreamError,
    },
}

/// Forward a subscription into the session's feed channel until it ends.
/// The subscription lives inside the task, so aborting the task tears the
/// store-side forwarder down with it.
pub(crate) fn pump<T, F>(
    mut sub: Subscription<T>,
    tx: mpsc::UnboundedSender<Feed>,
    epoch: u64,
    stream: &'static str,
    wrap: F,
) -> JoinHandle<()>
where
    T: Send + 'static,
    F: Fn(Vec<Change<T>>) -> FeedPayload + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match sub.recv().await {
                Some(Ok(batch)) => {
                    let feed = Feed {
                        epoch,
                        payload: wrap(batch),
                    };
                    if tx.send(feed).is_err() {
                        break;
                    }
                }
                Some(Err(error)) => {
                    let feed = Feed {
                        epoch,
                        payload: FeedPayload::Failed { stream, error },
                    };
                    let _ = tx.send(feed);
                    break;
                }
                None => break,
            }
        }
    })
}

/// The streams tied to the selected conversation, plus its view state.
pub(crate) struct ActiveConversation {
    pub(crate) id: ConversationId,
    pub(crate) timeline: MessageTimeline,
    pub(crate) typing: Vec<TypingMarker>,
    pub(crate) reporter: TypingReporter,
    messages_pump: JoinHandle<()>,
    typing_pump: JoinHandle<()>,
}

impl Drop for ActiveConversation {
    fn drop(&mut self) {
        self.messages_pump.abort();
        self.typing_pump.abort();
    }
}

/// The streams that live for the whole signed-in stretch.
struct ListSubscriptions {
    channels_pump: JoinHandle<()>,
    dms_pump: JoinHandle<()>,
    calls_pump: JoinHandle<()>,
}

impl Drop for ListSubscriptions {
    fn drop(&mut self) {
        self.channels_pump.abort();
        self.dms_pump.abort();
        self.calls_pump.abort();
    }
}

pub struct Session {
    pub(crate) store: Arc<Store>,
    pub(crate) config: ClientConfig,
    pub(crate) devices: Arc<dyn MediaDevices + Send + Sync>,
    pub(crate) peers: Arc<dyn PeerFactory + Send + Sync>,
    prefs_store: PrefsStore,
    pub(crate) prefs: Preferences,

    pub(crate) user: Option<User>,
    pub(crate) composer: Composer,
    pub(crate) active: Option<ActiveConversation>,
    lists: Option<ListSubscriptions>,
    pub(crate) channels: ChannelList,
    pub(crate) dms: DmList,
    pub(crate) online: OnlineCounter,
    pub(crate) call: Option<ActiveCall>,

    pub(crate) feed_tx: mpsc::UnboundedSender<Feed>,
    feed_rx: mpsc::UnboundedReceiver<Feed>,
    direct_rx: mpsc::UnboundedReceiver<ClientEvent>,
    pending: VecDeque<ClientEvent>,

    // Epochs are drawn from one counter, so a value identifies exactly one
    // subscription wave. `lists_epoch` covers channels/dms and the standing
    // inbound call watch, `conv_epoch` the selected conversation's pair,
    // `call_epoch` the outbound watch of the callee's slot.
    epoch: u64,
    lists_epoch: u64,
    conv_epoch: u64,
    pub(crate) call_epoch: u64,
}

impl Session {
    pub fn new(
        store: Arc<Store>,
        config: ClientConfig,
        devices: Arc<dyn MediaDevices + Send + Sync>,
        peers: Arc<dyn PeerFactory + Send + Sync>,
        prefs_store: PrefsStore,
    ) -> Self {
        let (feed_tx, feed_rx) = mpsc::unbounded_channel();
        let (direct_tx, direct_rx) = mpsc::unbounded_channel();
        let prefs = prefs_store.load();
        let online = OnlineCounter::new(store.clone(), direct_tx);
        Self {
            store,
            config,
            devices,
            peers,
            prefs_store,
            prefs,
            user: None,
            composer: Composer::new(),
            active: None,
            lists: None,
            channels: ChannelList::new(),
            dms: DmList::new(),
            online,
            call: None,
            feed_tx,
            feed_rx,
            direct_rx,
            pending: VecDeque::new(),
            epoch: 0,
            lists_epoch: 0,
            conv_epoch: 0,
            call_epoch: 0,
        }
    }

    /// Open the store and preference file named by `config` and build a
    /// session around them. With no [`ClientConfig::data_dir`] both land
    /// in the platform directories.
    pub fn open(
        config: ClientConfig,
        devices: Arc<dyn MediaDevices + Send + Sync>,
        peers: Arc<dyn PeerFactory + Send + Sync>,
    ) -> Result<Self> {
        let (store, prefs_store) = match &config.data_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                (
                    Store::open_at(&dir.join("parlor.db"))?,
                    PrefsStore::open_at(&dir.join("prefs.db"))?,
                )
            }
            None => (Store::open_default()?, PrefsStore::open_default()?),
        };
        Ok(Self::new(
            Arc::new(store),
            config,
            devices,
            peers,
            prefs_store,
        ))
    }

    // ---- Auth ----

    /// Create an account and open a session with it. The display name is
    /// checked here so the form can reject it before the store is touched.
    pub fn sign_up(&mut self, email: &str, password: &str, display_name: &str) -> Result<User> {
        let display_name = validate_display_name(display_name)?;
        let user = match self.store.sign_up(email, password, &display_name) {
            Ok(user) => user,
            Err(e) => {
                self.toast(Severity::Error, e.message());
                return Err(e.into());
            }
        };
        self.finish_sign_in(user.clone())?;
        Ok(user)
    }

    pub fn sign_in(&mut self, email: &str, password: &str) -> Result<User> {
        let user = match self.store.sign_in(email, password) {
            Ok(user) => user,
            Err(e) => {
                self.toast(Severity::Error, e.message());
                return Err(e.into());
            }
        };
        self.finish_sign_in(user.clone())?;
        Ok(user)
    }

    /// Subscribe the long-lived streams and land the user in #general.
    fn finish_sign_in(&mut self, user: User) -> Result<()> {
        info!(user = %user.id, "signed in");
        let general = self.store.ensure_general(user.id)?;

        let epoch = self.next_epoch();
        self.lists_epoch = epoch;
        let channels_pump = pump(
            self.store.watch_channels()?,
            self.feed_tx.clone(),
            epoch,
            "channels",
            FeedPayload::Channels,
        );
        let dms_pump = pump(
            self.store.watch_dms(user.id)?,
            self.feed_tx.clone(),
            epoch,
            "dms",
            FeedPayload::Dms,
        );
        let calls_pump = pump(
            self.store.watch_calls(user.id)?,
            self.feed_tx.clone(),
            epoch,
            "calls",
            FeedPayload::Calls,
        );
        self.lists = Some(ListSubscriptions {
            channels_pump,
            dms_pump,
            calls_pump,
        });

        self.channels = ChannelList::new();
        self.dms = DmList::new();
        self.user = Some(user.clone());
        self.push(ClientEvent::AuthChanged(Some(user)));
        self.online.poke();
        self.select_conversation(ConversationId::Channel(general.id))?;
        Ok(())
    }

    /// Leave the session: end any call, drop every subscription, flip the
    /// stored presence to offline. Safe to call when already signed out.
    pub fn sign_out(&mut self) -> Result<()> {
        let Some(user) = self.user.take() else {
            return Ok(());
        };
        if self.call.is_some() {
            let _ = self.hang_up_call();
        }
        if let Some(mut active) = self.active.take() {
            active.reporter.stop();
        }
        self.lists = None;
        self.lists_epoch = 0;
        self.conv_epoch = 0;
        self.composer.reset();
        self.channels = ChannelList::new();
        self.dms = DmList::new();
        self.store.sign_out(user.id)?;
        info!(user = %user.id, "signed out");
        self.push(ClientEvent::AuthChanged(None));
        Ok(())
    }

    // ---- Conversation selection ----

    /// Switch the active conversation. The previous message and typing
    /// streams are torn down before the new pair is subscribed; any of
    /// their batches still queued are dropped by the epoch check.
    pub fn select_conversation(&mut self, id: ConversationId) -> Result<()> {
        let user = self.user.clone().ok_or(ClientError::NotSignedIn)?;

        if let Some(mut previous) = self.active.take() {
            previous.reporter.stop();
        }

        let epoch = self.next_epoch();
        self.conv_epoch = epoch;
        let messages_pump = pump(
            self.store.watch_messages(id.clone(), self.config.history_limit)?,
            self.feed_tx.clone(),
            epoch,
            "messages",
            FeedPayload::Messages,
        );
        let typing_pump = pump(
            self.store.watch_typing(id.clone())?,
            self.feed_tx.clone(),
            epoch,
            "typing",
            FeedPayload::Typing,
        );

        self.active = Some(ActiveConversation {
            id: id.clone(),
            timeline: MessageTimeline::new(self.prefs.group_messages),
            typing: Vec::new(),
            reporter: TypingReporter::new(
                self.store.clone(),
                id.clone(),
                user.id,
                user.display_name,
            ),
            messages_pump,
            typing_pump,
        });
        debug!(conversation = %id.storage_key(), "conversation selected");
        self.push(ClientEvent::ConversationChanged(id));
        Ok(())
    }

    // ---- Event loop ----

    /// The next thing the caller should react to. Pending events produced
    /// by synchronous operations drain first; after that the session waits
    /// on its subscription feeds.
    pub async fn next_event(&mut self) -> ClientEvent {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return event;
            }
            tokio::select! {
                Some(feed) = self.feed_rx.recv() => self.apply_feed(feed),
                Some(event) = self.direct_rx.recv() => return event,
            }
        }
    }

    fn apply_feed(&mut self, feed: Feed) {
        match feed.payload {
            FeedPayload::Messages(batch) => {
                if feed.epoch != self.conv_epoch {
                    return;
                }
                let Some(active) = self.active.as_mut() else {
                    return;
                };
                for delta in active.timeline.apply(batch) {
                    self.pending.push_back(ClientEvent::Timeline(delta));
                }
                // Message traffic is the activity signal for the online
                // counter tile.
                self.online.poke();
            }
            FeedPayload::Typing(batch) => {
                if feed.epoch != self.conv_epoch {
                    return;
                }
                let me = self.user.as_ref().map(|u| u.id);
                let Some(active) = self.active.as_mut() else {
                    return;
                };
                for change in batch {
                    match change.kind {
                        ChangeKind::Added | ChangeKind::Modified => {
                            let slot = active
                                .typing
                                .iter_mut()
                                .find(|m| m.user_id == change.doc.user_id);
                            match slot {
                                Some(marker) => *marker = change.doc,
                                None => active.typing.push(change.doc),
                            }
                        }
                        ChangeKind::Removed => {
                            active.typing.retain(|m| m.user_id != change.doc.user_id);
                        }
                    }
                }
                let names = fresh_typists(&active.typing, me);
                self.pending.push_back(ClientEvent::TypingChanged(names));
            }
            FeedPayload::Channels(batch) => {
                if feed.epoch != self.lists_epoch {
                    return;
                }
                for delta in self.channels.apply(batch) {
                    self.pending.push_back(ClientEvent::Channels(delta));
                }
            }
            FeedPayload::Dms(batch) => {
                if feed.epoch != self.lists_epoch {
                    return;
                }
                for delta in self.dms.apply(batch) {
                    self.pending.push_back(ClientEvent::Dms(delta));
                }
            }
            FeedPayload::Calls(batch) => {
                if feed.epoch != self.lists_epoch && feed.epoch != self.call_epoch {
                    return;
                }
                for change in batch {
                    self.apply_call_change(change);
                }
            }
            FeedPayload::Failed { stream, error } => {
                if !self.epoch_live(feed.epoch) {
                    return;
                }
                warn!(stream, error = %error, "subscription failed");
                self.pending.push_back(ClientEvent::StreamFailed {
                    stream,
                    detail: error.to_string(),
                });
            }
        }
    }

    // ---- Typing ----

    /// Report keystroke activity in the active conversation. Rearms the
    /// auto-clear timer; the marker goes away on send or after the quiet
    /// window.
    pub fn keystroke(&mut self) -> Result<()> {
        let active = self.active.as_mut().ok_or(ClientError::NoConversation)?;
        active.reporter.keystroke()?;
        Ok(())
    }

    /// Display names currently typing in the active conversation, excluding
    /// the session's own user, stale markers filtered out.
    pub fn typing_now(&self) -> Vec<String> {
        let Some(active) = self.active.as_ref() else {
            return Vec::new();
        };
        let me = self.user.as_ref().map(|u| u.id);
        fresh_typists(&active.typing, me)
    }

    // ---- Preferences ----

    /// Persist and adopt new preferences. A change to message grouping
    /// takes effect the next time a conversation is selected; the current
    /// timeline keeps the layout it was built with.
    pub fn set_preferences(&mut self, prefs: Preferences) -> Result<()> {
        self.prefs_store.save(&prefs)?;
        self.prefs = prefs.clone();
        self.push(ClientEvent::PrefsChanged(prefs));
        Ok(())
    }

    pub fn preferences(&self) -> &Preferences {
        &self.prefs
    }

    // ---- Accessors ----

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn composer_mut(&mut self) -> &mut Composer {
        &mut self.composer
    }

    pub fn active_conversation(&self) -> Option<&ConversationId> {
        self.active.as_ref().map(|a| &a.id)
    }

    pub fn timeline(&self) -> Option<&MessageTimeline> {
        self.active.as_ref().map(|a| &a.timeline)
    }

    pub fn channels(&self) -> &[Channel] {
        self.channels.items()
    }

    pub fn dms(&self) -> &[DirectConversation] {
        self.dms.items()
    }

    // ---- Internals shared with the other impl blocks ----

    pub(crate) fn push(&mut self, event: ClientEvent) {
        self.pending.push_back(event);
    }

    pub(crate) fn toast(&mut self, severity: Severity, message: impl Into<String>) {
        self.pending.push_back(ClientEvent::Toast {
            severity,
            message: message.into(),
        });
    }

    /// Run a store call's result through the toast surface: failures are
    /// shown to the user and still returned to the caller.
    pub(crate) fn relay<T>(&mut self, result: parlor_store::Result<T>) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                self.toast(Severity::Error, e.to_string());
                Err(e.into())
            }
        }
    }

    pub(crate) fn next_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    fn epoch_live(&self, epoch: u64) -> bool {
        epoch == self.lists_epoch || epoch == self.conv_epoch || epoch == self.call_epoch
    }

    pub(crate) fn me(&self) -> Result<User> {
        self.user.clone().ok_or(ClientError::NotSignedIn)
    }
}

fn fresh_typists(markers: &[TypingMarker], me: Option<UserId>) -> Vec<String> {
    let now = Utc::now();
    let mut names: Vec<String> = markers
        .iter()
        .filter(|m| Some(m.user_id) != me)
        .filter(|m| (now - m.updated_at).num_seconds() < TYPING_FRESH_SECS)
        .map(|m| m.display_name.clone())
        .collect();
    names.sort();
    names.dedup();
    names
}
