use std::collections::HashMap;

use chrono::Utc;
use tracing::info;

use nexus_shared::protocol::ConversationDraft;
use nexus_shared::{Conversation, ConversationId, ConversationKind};

/// In-memory conversation metadata.
///
/// No uniqueness check is made: two direct conversations between the same
/// pair are allowed, clients look up an existing one before creating.
#[derive(Debug, Default)]
pub struct ConversationDirectory {
    conversations: HashMap<ConversationId, Conversation>,
}

impl ConversationDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, draft: ConversationDraft) -> Conversation {
        // Names and avatars only make sense for groups.
        let (display_name, avatar_ref) = match draft.kind {
            ConversationKind::Group => (draft.display_name, draft.avatar_ref),
            ConversationKind::Direct => (None, None),
        };

        let conversation = Conversation {
            id: ConversationId::new(),
            kind: draft.kind,
            display_name,
            avatar_ref,
            participant_ids: draft.participant_ids,
            created_by: draft.created_by,
            created_at: Utc::now(),
        };
        self.conversations
            .insert(conversation.id.clone(), conversation.clone());

        info!(
            conversation = %conversation.id,
            kind = ?conversation.kind,
            participants = conversation.participant_ids.len(),
            "Conversation created"
        );
        conversation
    }

    pub fn get(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    /// All conversations, oldest first.
    pub fn list(&self) -> Vec<Conversation> {
        let mut all: Vec<Conversation> = self.conversations.values().cloned().collect();
        all.sort_by_key(|c| c.created_at);
        all
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_shared::UserId;

    fn direct(a: &str, b: &str) -> ConversationDraft {
        ConversationDraft {
            kind: ConversationKind::Direct,
            display_name: Some("ignored".into()),
            avatar_ref: None,
            participant_ids: vec![UserId::from(a), UserId::from(b)],
            created_by: Some(UserId::from(a)),
        }
    }

    #[test]
    fn test_create_assigns_id_and_stores() {
        let mut directory = ConversationDirectory::new();
        let conversation = directory.create(direct("a", "b"));

        assert_eq!(directory.get(&conversation.id), Some(&conversation));
        assert_eq!(conversation.display_name, None);
        assert_eq!(conversation.created_by, Some(UserId::from("a")));
    }

    #[test]
    fn test_duplicate_direct_pairs_are_permitted() {
        let mut directory = ConversationDirectory::new();
        let first = directory.create(direct("a", "b"));
        let second = directory.create(direct("b", "a"));

        assert_ne!(first.id, second.id);
        assert_eq!(directory.len(), 2);
    }

    #[test]
    fn test_group_keeps_name() {
        let mut directory = ConversationDirectory::new();
        let group = directory.create(ConversationDraft {
            kind: ConversationKind::Group,
            display_name: Some("Ops".into()),
            avatar_ref: Some("ops.png".into()),
            participant_ids: vec![UserId::from("a"), UserId::from("b"), UserId::from("c")],
            created_by: None,
        });

        assert_eq!(group.display_name.as_deref(), Some("Ops"));
        assert!(directory.get(&ConversationId::from("missing")).is_none());
    }
}
