//! Composer state: the draft, the reply target, the edit target.
//!
//! The composer never talks to the store. [`prepare`](Composer::prepare)
//! validates the draft and runs slash interception; the session decides
//! what to do with the outcome. The draft is only cleared after a send
//! succeeds, so a failed send leaves the text where the user can retry.

use parlor_shared::constants::{MAX_MESSAGE_CHARS, REPLY_PREVIEW_CHARS};
use parlor_shared::documents::{Message, ReplyPreview};
use parlor_shared::types::MessageId;
use parlor_shared::ValidationError;
use rand::Rng;

use crate::commands::{self, CommandOutcome};

/// What a validated draft turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prepared {
    /// Nothing to send; the draft was empty or a command with no output.
    Nothing,
    /// Send this content, with the current reply target attached.
    Send {
        content: String,
        reply_to: Option<ReplyPreview>,
    },
    /// Suppress the send and open the poll builder.
    PollBuilder,
    /// Suppress the send and open the GIF picker.
    GifPicker { query: String },
}

#[derive(Default)]
pub struct Composer {
    draft: String,
    reply_to: Option<ReplyPreview>,
    editing: Option<MessageId>,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn reply_target(&self) -> Option<&ReplyPreview> {
        self.reply_to.as_ref()
    }

    /// Quote `target` in the next send. The preview is a truncated copy;
    /// editing or deleting the target later does not touch it.
    pub fn begin_reply(&mut self, target: &Message) {
        self.reply_to = Some(preview_of(target));
    }

    pub fn cancel_reply(&mut self) {
        self.reply_to = None;
    }

    pub fn editing(&self) -> Option<MessageId> {
        self.editing
    }

    /// Open `target` for editing, seeding the draft with its current
    /// content. Any edit already in flight is dropped.
    pub fn start_edit(&mut self, target: &Message) {
        self.editing = Some(target.id);
        self.draft = target.content.clone();
    }

    /// Abandon the edit. Idempotent; safe to call with no edit open.
    pub fn cancel_edit(&mut self) {
        if self.editing.take().is_some() {
            self.draft.clear();
        }
    }

    /// Validate the draft and run slash interception. Does not mutate
    /// state; call [`clear_after_send`](Self::clear_after_send) once the
    /// send has actually landed.
    pub fn prepare<R: Rng>(&self, rng: &mut R) -> Result<Prepared, ValidationError> {
        let trimmed = self.draft.trim();
        if trimmed.is_empty() {
            return Ok(Prepared::Nothing);
        }
        let len = trimmed.chars().count();
        if len > MAX_MESSAGE_CHARS {
            return Err(ValidationError::MessageTooLong { len });
        }

        Ok(match commands::intercept(trimmed, rng) {
            CommandOutcome::Send(content) => Prepared::Send {
                content,
                reply_to: self.reply_to.clone(),
            },
            CommandOutcome::PassThrough => Prepared::Send {
                content: trimmed.to_owned(),
                reply_to: self.reply_to.clone(),
            },
            CommandOutcome::PollBuilder => Prepared::PollBuilder,
            CommandOutcome::GifPicker { query } => Prepared::GifPicker { query },
            CommandOutcome::Nothing => Prepared::Nothing,
        })
    }

    pub fn clear_after_send(&mut self) {
        self.draft.clear();
        self.reply_to = None;
    }

    /// Drop everything: draft, reply target, edit target.
    pub fn reset(&mut self) {
        self.draft.clear();
        self.reply_to = None;
        self.editing = None;
    }
}

fn preview_of(message: &Message) -> ReplyPreview {
    ReplyPreview {
        id: message.id,
        author_name: message.author_name.clone(),
        content: message.content.chars().take(REPLY_PREVIEW_CHARS).collect(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use parlor_shared::documents::MessageKind;
    use parlor_shared::types::{ChannelId, ConversationId, UserId};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(3)
    }

    fn message(content: &str) -> Message {
        Message {
            id: MessageId::new(),
            conversation: ConversationId::Channel(ChannelId::default()),
            content: content.into(),
            author_id: UserId::new(),
            author_name: "Quoted".into(),
            author_color: "#ed4245".into(),
            timestamp: Utc::now(),
            kind: MessageKind::Text,
            reactions: BTreeMap::new(),
            votes: BTreeMap::new(),
            pinned: false,
            edited: false,
            reply_to: None,
        }
    }

    #[test]
    fn blank_drafts_prepare_to_nothing() {
        let mut composer = Composer::new();
        assert_eq!(composer.prepare(&mut rng()).unwrap(), Prepared::Nothing);
        composer.set_draft("   \n\t ");
        assert_eq!(composer.prepare(&mut rng()).unwrap(), Prepared::Nothing);
    }

    #[test]
    fn oversized_draft_is_rejected_not_truncated() {
        let mut composer = Composer::new();
        composer.set_draft("x".repeat(MAX_MESSAGE_CHARS + 1));
        let err = composer.prepare(&mut rng()).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::MessageTooLong { len } if len == MAX_MESSAGE_CHARS + 1
        ));
        // The draft is untouched for the user to trim down.
        assert_eq!(composer.draft().chars().count(), MAX_MESSAGE_CHARS + 1);
    }

    #[test]
    fn reply_preview_is_truncated_and_detached() {
        let mut composer = Composer::new();
        let long = "y".repeat(REPLY_PREVIEW_CHARS * 2);
        let target = message(&long);
        composer.begin_reply(&target);

        let preview = composer.reply_target().unwrap();
        assert_eq!(preview.id, target.id);
        assert_eq!(preview.content.chars().count(), REPLY_PREVIEW_CHARS);
        assert_eq!(preview.author_name, "Quoted");
    }

    #[test]
    fn send_carries_the_reply_and_clear_drops_it() {
        let mut composer = Composer::new();
        composer.begin_reply(&message("quoted line"));
        composer.set_draft("replying to you");

        let Prepared::Send { content, reply_to } = composer.prepare(&mut rng()).unwrap() else {
            panic!("expected a send");
        };
        assert_eq!(content, "replying to you");
        assert!(reply_to.is_some());

        composer.clear_after_send();
        assert!(composer.draft().is_empty());
        assert!(composer.reply_target().is_none());
    }

    #[test]
    fn starting_an_edit_replaces_the_previous_one() {
        let mut composer = Composer::new();
        let first = message("first words");
        let second = message("second words");

        composer.start_edit(&first);
        assert_eq!(composer.editing(), Some(first.id));
        assert_eq!(composer.draft(), "first words");

        composer.start_edit(&second);
        assert_eq!(composer.editing(), Some(second.id));
        assert_eq!(composer.draft(), "second words");

        composer.cancel_edit();
        composer.cancel_edit();
        assert_eq!(composer.editing(), None);
        assert!(composer.draft().is_empty());
    }

    #[test]
    fn poll_command_diverts_instead_of_sending() {
        let mut composer = Composer::new();
        composer.set_draft("/poll");
        assert_eq!(composer.prepare(&mut rng()).unwrap(), Prepared::PollBuilder);

        composer.set_draft("/gif dancing crab");
        assert_eq!(
            composer.prepare(&mut rng()).unwrap(),
            Prepared::GifPicker {
                query: "dancing crab".into()
            }
        );
    }

    #[test]
    fn slash_synthesis_reaches_the_send_path() {
        let mut composer = Composer::new();
        composer.set_draft("/me pours coffee");
        let Prepared::Send { content, .. } = composer.prepare(&mut rng()).unwrap() else {
            panic!("expected a send");
        };
        assert_eq!(content, "*pours coffee*");
    }
}
