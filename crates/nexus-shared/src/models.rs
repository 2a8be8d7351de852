//! Domain records held by the relay and sent to clients.
//!
//! Every struct serializes with camelCase field names and millisecond Unix
//! timestamps, which is what browser clients expect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    ConnectionId, ConversationId, ConversationKind, MessageId, MessageKind, Presence, UserId,
};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A registered chat participant, independent of any single connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: UserId,
    pub display_name: String,
    #[serde(default)]
    pub avatar_ref: String,
    pub status: Presence,
    /// Set only while a transport is bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_handle: Option<ConnectionId>,
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// A direct or group conversation and its participants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub kind: ConversationKind,
    /// Group conversations only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Group conversations only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
    /// Distinct participants in insertion order.
    pub participant_ids: Vec<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserId>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// One `(emoji, user)` reaction. A message holds at most one per pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub emoji: String,
    pub user_id: UserId,
}

/// A chat message. Soft-deleted records keep their id and metadata but
/// lose their content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: String,
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    /// Seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_duration: Option<f64>,
    /// Opaque encoded audio produced by the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
    pub reactions: Vec<Reaction>,
    pub is_edited: bool,
    pub is_deleted: bool,
    pub read_by: Vec<UserId>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl MessageRecord {
    pub fn has_reaction(&self, emoji: &str, user_id: &UserId) -> bool {
        self.reactions
            .iter()
            .any(|r| r.emoji == emoji && &r.user_id == user_id)
    }
}
