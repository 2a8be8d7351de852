//! Ephemeral message store.
//!
//! Records are mutated in place and never removed; deletion only scrubs the
//! content. Every mutator is a no-op for unknown ids and returns the updated
//! record only when something actually changed, so the router knows whether
//! to fan out.

use std::collections::HashMap;

use chrono::Utc;
use tracing::debug;

use nexus_shared::protocol::MessageDraft;
use nexus_shared::{MessageId, MessageRecord, Reaction, UserId};

#[derive(Debug, Default)]
pub struct MessageStore {
    messages: HashMap<MessageId, MessageRecord>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new message. Returns the stored record and whether it was
    /// inserted.
    ///
    /// A draft whose id is already stored is a client retry: nothing is
    /// written and the existing record comes back with `false`.
    pub fn append(&mut self, draft: MessageDraft) -> (MessageRecord, bool) {
        if let Some(existing) = draft.id.as_ref().and_then(|id| self.messages.get(id)) {
            debug!(message = %existing.id, "Duplicate send ignored");
            return (existing.clone(), false);
        }

        let now = Utc::now();
        let mut reactions: Vec<Reaction> = Vec::with_capacity(draft.reactions.len());
        for reaction in draft.reactions {
            if !reactions.contains(&reaction) {
                reactions.push(reaction);
            }
        }

        let record = MessageRecord {
            id: draft.id.unwrap_or_default(),
            conversation_id: draft.conversation_id,
            read_by: vec![draft.sender_id.clone()],
            sender_id: draft.sender_id,
            content: draft.content,
            kind: draft.kind,
            file_ref: draft.file_ref,
            file_name: draft.file_name,
            file_size: draft.file_size,
            voice_duration: draft.voice_duration,
            voice_payload: draft.voice_payload,
            reply_to: draft.reply_to,
            reactions,
            is_edited: false,
            is_deleted: false,
            created_at: draft.created_at.unwrap_or(now),
            updated_at: now,
        };
        self.messages.insert(record.id.clone(), record.clone());
        (record, true)
    }

    pub fn edit(&mut self, id: &MessageId, content: String) -> Option<MessageRecord> {
        let message = self.messages.get_mut(id)?;
        message.content = content;
        message.is_edited = true;
        message.updated_at = Utc::now();
        Some(message.clone())
    }

    /// Mark deleted and clear the content. Deleting twice changes nothing
    /// the second time.
    pub fn soft_delete(&mut self, id: &MessageId) -> Option<MessageRecord> {
        let message = self.messages.get_mut(id)?;
        if message.is_deleted {
            return None;
        }
        message.is_deleted = true;
        message.content.clear();
        message.updated_at = Utc::now();
        Some(message.clone())
    }

    /// Add the `(emoji, user)` reaction, or remove it if already present.
    pub fn toggle_reaction(
        &mut self,
        id: &MessageId,
        emoji: &str,
        user_id: &UserId,
    ) -> Option<MessageRecord> {
        let message = self.messages.get_mut(id)?;
        match message
            .reactions
            .iter()
            .position(|r| r.emoji == emoji && &r.user_id == user_id)
        {
            Some(index) => {
                message.reactions.remove(index);
            }
            None => message.reactions.push(Reaction {
                emoji: emoji.to_string(),
                user_id: user_id.clone(),
            }),
        }
        message.updated_at = Utc::now();
        Some(message.clone())
    }

    /// Record a read receipt. Does not touch `updated_at`: a receipt is not
    /// an edit of the message.
    pub fn mark_read(&mut self, id: &MessageId, user_id: &UserId) -> Option<MessageRecord> {
        let message = self.messages.get_mut(id)?;
        if message.read_by.contains(user_id) {
            return None;
        }
        message.read_by.push(user_id.clone());
        Some(message.clone())
    }

    pub fn get(&self, id: &MessageId) -> Option<&MessageRecord> {
        self.messages.get(id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
