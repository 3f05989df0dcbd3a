//! Message, conversation and invite operations on the [`Session`].
//!
//! Everything here is a thin span between the composer and the store:
//! validate locally where the form needs early feedback, write through the
//! store, and let the subscription echo update the view. Failures surface
//! as an error toast and as the returned `Err`, and a failed send leaves
//! the draft untouched so the user can repair it.

use chrono::Duration;
use parlor_shared::documents::{
    Channel, ChannelKind, Invite, Message, MessageKind, ReplyPreview, User,
};
use parlor_shared::types::{ChannelId, ConversationId, MessageId, UserId};
use parlor_store::{MessageDraft, StoreError};
use tracing::debug;

use crate::composer::Prepared;
use crate::error::{ClientError, Result};
use crate::events::{ClientEvent, Severity};
use crate::session::Session;

impl Session {
    // ---- Sending ----

    /// Act on the composer: send the draft, finish an open edit, or divert
    /// to a builder for `/poll` and `/gif`. A validation failure toasts and
    /// keeps the draft.
    pub fn submit(&mut self) -> Result<()> {
        let me = self.me()?;
        let conversation = self
            .active
            .as_ref()
            .map(|a| a.id.clone())
            .ok_or(ClientError::NoConversation)?;

        if let Some(editing) = self.composer.editing() {
            return self.finish_edit(editing, me.id);
        }

        let prepared = match self.composer.prepare(&mut rand::thread_rng()) {
            Ok(prepared) => prepared,
            Err(e) => {
                self.toast(Severity::Error, e.to_string());
                return Err(e.into());
            }
        };
        match prepared {
            Prepared::Nothing => Ok(()),
            Prepared::PollBuilder => {
                self.composer.clear_after_send();
                self.push(ClientEvent::PollBuilderRequested);
                Ok(())
            }
            Prepared::GifPicker { query } => {
                self.composer.clear_after_send();
                self.push(ClientEvent::GifPickerRequested { query });
                Ok(())
            }
            Prepared::Send { content, reply_to } => {
                self.send_now(conversation, &me, content, MessageKind::Text, reply_to)?;
                Ok(())
            }
        }
    }

    /// Post a poll assembled in the builder. Option validation happens in
    /// the store; a bad set comes back as one toast.
    pub fn submit_poll(&mut self, question: &str, options: &[String]) -> Result<Message> {
        let me = self.me()?;
        let conversation = self
            .active
            .as_ref()
            .map(|a| a.id.clone())
            .ok_or(ClientError::NoConversation)?;
        let kind = MessageKind::Poll {
            question: question.trim().to_string(),
            options: options.iter().map(|o| o.trim().to_string()).collect(),
        };
        self.send_now(conversation, &me, question.trim().to_string(), kind, None)
    }

    /// Post a GIF picked in the picker; `url` is the media location.
    pub fn send_gif(&mut self, url: &str) -> Result<Message> {
        let me = self.me()?;
        let conversation = self
            .active
            .as_ref()
            .map(|a| a.id.clone())
            .ok_or(ClientError::NoConversation)?;
        self.send_now(
            conversation,
            &me,
            url.trim().to_string(),
            MessageKind::Gif,
            None,
        )
    }

    fn send_now(
        &mut self,
        conversation: ConversationId,
        author: &User,
        content: String,
        kind: MessageKind,
        reply_to: Option<ReplyPreview>,
    ) -> Result<Message> {
        let draft = MessageDraft {
            conversation: conversation.clone(),
            content,
            author_id: author.id,
            author_name: author.display_name.clone(),
            author_color: author.avatar_color.clone(),
            kind,
            reply_to,
        };
        let message = match self.store.append_message(draft) {
            Ok(message) => message,
            Err(e) => {
                self.toast(Severity::Error, e.to_string());
                return Err(e.into());
            }
        };
        self.composer.clear_after_send();
        if let Some(active) = self.active.as_mut() {
            active.reporter.stop();
        }
        if let ConversationId::Direct(dm) = conversation {
            if let Err(e) = self.store.bump_dm_activity(dm, message.timestamp) {
                debug!(error = %e, "dm activity bump failed");
            }
        }
        Ok(message)
    }

    // ---- Replies ----

    /// Quote a visible message in the next send. No-op if it is not in the
    /// current view.
    pub fn begin_reply(&mut self, id: MessageId) {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        if let Some(message) = active.timeline.find(id) {
            self.composer.begin_reply(message);
        }
    }

    pub fn cancel_reply(&mut self) {
        self.composer.cancel_reply();
    }

    // ---- Edits ----

    /// Open one of the user's own visible messages for editing. Someone
    /// else's message toasts and leaves the composer alone.
    pub fn start_edit(&mut self, id: MessageId) {
        let me = self.user.as_ref().map(|u| u.id);
        let Some(active) = self.active.as_ref() else {
            return;
        };
        let Some(message) = active.timeline.find(id) else {
            return;
        };
        if Some(message.author_id) != me {
            self.toast(Severity::Error, "Only your own messages can be edited.");
            return;
        }
        self.composer.start_edit(message);
    }

    /// The up-arrow shortcut: open the newest own message in the view for
    /// editing. Returns whether an edit was opened.
    pub fn edit_last_own_message(&mut self) -> bool {
        let Some(me) = self.user.as_ref().map(|u| u.id) else {
            return false;
        };
        let Some(active) = self.active.as_ref() else {
            return false;
        };
        let Some(message) = active.timeline.last_authored_by(me) else {
            return false;
        };
        self.composer.start_edit(message);
        true
    }

    pub fn cancel_edit(&mut self) {
        self.composer.cancel_edit();
    }

    fn finish_edit(&mut self, id: MessageId, me: UserId) -> Result<()> {
        let content = self.composer.draft().trim().to_string();
        match self.store.edit_message(id, me, &content) {
            Ok(_) => {
                self.composer.cancel_edit();
                Ok(())
            }
            Err(e) => {
                // Edit stays open with the draft intact.
                self.toast(Severity::Error, e.to_string());
                Err(e.into())
            }
        }
    }

    // ---- Moderating own messages, reactions, pins ----

    pub fn delete_message(&mut self, id: MessageId) -> Result<()> {
        let me = self.me()?;
        let result = self.store.delete_message(id, me.id);
        self.relay(result)
    }

    pub fn toggle_reaction(&mut self, id: MessageId, emoji: &str) -> Result<()> {
        let me = self.me()?;
        let result = self.store.toggle_reaction(id, me.id, emoji);
        self.relay(result).map(|_| ())
    }

    pub fn toggle_vote(&mut self, id: MessageId, option: &str) -> Result<()> {
        let me = self.me()?;
        let result = self.store.toggle_vote(id, me.id, option);
        self.relay(result).map(|_| ())
    }

    /// Pin or unpin; any member may curate the pinned set.
    pub fn toggle_pin(&mut self, id: MessageId) -> Result<()> {
        let result = self.store.toggle_pin(id);
        self.relay(result).map(|_| ())
    }

    /// The pinned messages of the active conversation, oldest first.
    pub fn pinned_messages(&self) -> Result<Vec<Message>> {
        let active = self.active.as_ref().ok_or(ClientError::NoConversation)?;
        Ok(self.store.pinned_messages(&active.id)?)
    }

    // ---- Conversations ----

    /// Open (or surface) the direct conversation with `other` and switch
    /// to it.
    pub fn open_dm(&mut self, other: UserId) -> Result<()> {
        let me = self.me()?;
        let result = self.store.open_or_create_dm(me.id, other);
        let dm = self.relay(result)?;
        self.select_conversation(ConversationId::Direct(dm.id))
    }

    /// Create a channel and jump into it.
    pub fn create_channel(
        &mut self,
        name: &str,
        topic: &str,
        kind: ChannelKind,
    ) -> Result<Channel> {
        let me = self.me()?;
        let result = self.store.create_channel(name, topic, kind, me.id);
        let channel = self.relay(result)?;
        self.select_conversation(ConversationId::Channel(channel.id))?;
        Ok(channel)
    }

    pub fn set_channel_topic(&mut self, channel: ChannelId, topic: &str) -> Result<Channel> {
        let result = self.store.set_channel_topic(channel, topic);
        self.relay(result)
    }

    // ---- Invites ----

    /// Mint a shareable invite code for a channel, with the configured
    /// lifetime.
    pub fn create_invite(&mut self, channel: ChannelId) -> Result<Invite> {
        let me = self.me()?;
        let ttl = Duration::hours(self.config.invite_ttl_hours);
        let result = self.store.create_invite(channel, me.id, ttl);
        self.relay(result)
    }

    /// Redeem a code and jump into the channel it names.
    pub fn redeem_invite(&mut self, code: &str) -> Result<Channel> {
        let result = self.store.redeem_invite(code);
        let invite = self.relay(result)?;
        let channel = self
            .store
            .get_channel(invite.channel_id)?
            .ok_or(StoreError::NotFound)?;
        self.select_conversation(ConversationId::Channel(channel.id))?;
        Ok(channel)
    }

    // ---- Directory ----

    /// Case-insensitive prefix search over display names.
    pub fn search_users(&self, prefix: &str, limit: u32) -> Result<Vec<User>> {
        Ok(self.store.search_users(prefix, limit)?)
    }
}
