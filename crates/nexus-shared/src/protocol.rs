//! JSON event protocol spoken over the relay WebSocket.
//!
//! Inbound frames look like `{"event": "message:send", "data": {...}, "ack": 7}`.
//! `ack` is optional; when present the relay answers the originating
//! connection with an [`ServerEvent::Ack`] carrying the same number.
//! Outbound frames are `{"event": "...", "data": ...}`.
//!
//! Payload decoding is lenient about shape (older clients send `chatId`,
//! `username`, bare-string ids, ...) but strict about required fields: a
//! frame that lacks one is rejected with a [`ProtocolError`] and the caller
//! drops it.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::*;
use crate::error::ProtocolError;
use crate::models::{Conversation, Identity, MessageRecord, Reaction};
use crate::types::{ConversationId, ConversationKind, MessageId, MessageKind, Presence, UserId};

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientFrame {
    pub event: ClientEvent,
    /// Correlation number for a reply, if the client wants one.
    pub ack: Option<u64>,
}

impl ClientFrame {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let raw: RawFrame = serde_json::from_str(text)?;
        let event = ClientEvent::decode(&raw.event, raw.data)?;
        Ok(Self {
            event,
            ack: raw.ack,
        })
    }
}

#[derive(Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    ack: Option<u64>,
}

/// Every event a client may send.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Register(IdentityDraft),
    SetStatus(Presence),
    CreateConversation(ConversationDraft),
    JoinRoom(ConversationId),
    LeaveRoom(ConversationId),
    SendMessage(MessageDraft),
    EditMessage {
        message_id: MessageId,
        content: String,
    },
    DeleteMessage(MessageId),
    React {
        message_id: MessageId,
        emoji: String,
    },
    MarkRead {
        message_id: MessageId,
        conversation_id: ConversationId,
    },
    Typing {
        conversation_id: ConversationId,
        is_typing: bool,
    },
}

impl ClientEvent {
    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Register(_) => EVENT_REGISTER,
            Self::SetStatus(_) => EVENT_SET_STATUS,
            Self::CreateConversation(_) => EVENT_CREATE_CHAT,
            Self::JoinRoom(_) => EVENT_JOIN_CHAT,
            Self::LeaveRoom(_) => EVENT_LEAVE_CHAT,
            Self::SendMessage(_) => EVENT_SEND_MESSAGE,
            Self::EditMessage { .. } => EVENT_EDIT_MESSAGE,
            Self::DeleteMessage(_) => EVENT_DELETE_MESSAGE,
            Self::React { .. } => EVENT_REACT,
            Self::MarkRead { .. } => EVENT_READ,
            Self::Typing { .. } => EVENT_TYPING,
        }
    }

    /// Decode the `data` of an inbound frame named `event`.
    pub fn decode(event: &str, data: Value) -> Result<Self, ProtocolError> {
        match event {
            EVENT_REGISTER => {
                let raw: RawIdentity = payload(EVENT_REGISTER, data)?;
                let id = non_empty(raw.id).ok_or(ProtocolError::missing(EVENT_REGISTER, "id"))?;
                Ok(Self::Register(IdentityDraft {
                    display_name: raw.display_name.unwrap_or_else(|| id.clone()),
                    avatar_ref: raw.avatar_ref.unwrap_or_default(),
                    id: UserId(id),
                }))
            }
            EVENT_SET_STATUS => {
                let status = match data {
                    Value::Object(mut map) => map.remove("status").unwrap_or(Value::Null),
                    other => other,
                };
                if status.is_null() {
                    return Err(ProtocolError::missing(EVENT_SET_STATUS, "status"));
                }
                let presence = serde_json::from_value(status).map_err(|source| {
                    ProtocolError::Malformed {
                        event: EVENT_SET_STATUS,
                        source,
                    }
                })?;
                Ok(Self::SetStatus(presence))
            }
            EVENT_CREATE_CHAT => {
                let raw: RawConversation = payload(EVENT_CREATE_CHAT, data)?;
                Ok(Self::CreateConversation(ConversationDraft::try_from(raw)?))
            }
            EVENT_JOIN_CHAT => {
                let id = bare_or_field(EVENT_JOIN_CHAT, &data, "conversationId", "chatId")?;
                Ok(Self::JoinRoom(ConversationId(id)))
            }
            EVENT_LEAVE_CHAT => {
                let id = bare_or_field(EVENT_LEAVE_CHAT, &data, "conversationId", "chatId")?;
                Ok(Self::LeaveRoom(ConversationId(id)))
            }
            EVENT_SEND_MESSAGE => {
                let raw: RawMessage = payload(EVENT_SEND_MESSAGE, data)?;
                Ok(Self::SendMessage(MessageDraft::try_from(raw)?))
            }
            EVENT_EDIT_MESSAGE => {
                let raw: RawMessageRef = payload(EVENT_EDIT_MESSAGE, data)?;
                let message_id = non_empty(raw.message_id)
                    .ok_or(ProtocolError::missing(EVENT_EDIT_MESSAGE, "messageId"))?;
                Ok(Self::EditMessage {
                    message_id: MessageId(message_id),
                    content: raw.content.unwrap_or_default(),
                })
            }
            EVENT_DELETE_MESSAGE => {
                let id = bare_or_field(EVENT_DELETE_MESSAGE, &data, "messageId", "id")?;
                Ok(Self::DeleteMessage(MessageId(id)))
            }
            EVENT_REACT => {
                let raw: RawMessageRef = payload(EVENT_REACT, data)?;
                let message_id = non_empty(raw.message_id)
                    .ok_or(ProtocolError::missing(EVENT_REACT, "messageId"))?;
                let emoji =
                    non_empty(raw.emoji).ok_or(ProtocolError::missing(EVENT_REACT, "emoji"))?;
                Ok(Self::React {
                    message_id: MessageId(message_id),
                    emoji,
                })
            }
            EVENT_READ => {
                let raw: RawMessageRef = payload(EVENT_READ, data)?;
                let message_id = non_empty(raw.message_id)
                    .ok_or(ProtocolError::missing(EVENT_READ, "messageId"))?;
                let conversation_id = non_empty(raw.conversation_id)
                    .ok_or(ProtocolError::missing(EVENT_READ, "conversationId"))?;
                Ok(Self::MarkRead {
                    message_id: MessageId(message_id),
                    conversation_id: ConversationId(conversation_id),
                })
            }
            EVENT_TYPING => {
                let raw: RawTyping = payload(EVENT_TYPING, data)?;
                let conversation_id = non_empty(raw.conversation_id)
                    .ok_or(ProtocolError::missing(EVENT_TYPING, "conversationId"))?;
                Ok(Self::Typing {
                    conversation_id: ConversationId(conversation_id),
                    is_typing: raw.is_typing.unwrap_or(true),
                })
            }
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }
}

/// Registration payload after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityDraft {
    pub id: UserId,
    pub display_name: String,
    pub avatar_ref: String,
}

/// Conversation creation payload after validation.
///
/// `participant_ids` is non-empty and free of duplicates; a `Direct` draft
/// has exactly two participants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationDraft {
    pub kind: ConversationKind,
    pub display_name: Option<String>,
    pub avatar_ref: Option<String>,
    pub participant_ids: Vec<UserId>,
    pub created_by: Option<UserId>,
}

impl TryFrom<RawConversation> for ConversationDraft {
    type Error = ProtocolError;

    fn try_from(raw: RawConversation) -> Result<Self, Self::Error> {
        let mut participant_ids: Vec<UserId> = Vec::new();
        for id in raw.participant_ids.unwrap_or_default() {
            let id = UserId(id);
            if !id.0.is_empty() && !participant_ids.contains(&id) {
                participant_ids.push(id);
            }
        }
        if participant_ids.is_empty() {
            return Err(ProtocolError::missing(EVENT_CREATE_CHAT, "participantIds"));
        }

        let kind = raw.kind.unwrap_or(ConversationKind::Group);
        if kind == ConversationKind::Direct && participant_ids.len() != 2 {
            return Err(ProtocolError::Invalid {
                event: EVENT_CREATE_CHAT,
                reason: "direct conversation needs exactly two distinct participants",
            });
        }

        Ok(Self {
            kind,
            display_name: raw.display_name,
            avatar_ref: raw.avatar_ref,
            participant_ids,
            created_by: non_empty(raw.created_by).map(UserId),
        })
    }
}

/// Message payload after validation. Optional `id` and `created_at` are
/// trusted verbatim when present so a client can safely retry a send.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDraft {
    pub id: Option<MessageId>,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: String,
    pub kind: MessageKind,
    pub file_ref: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub voice_duration: Option<f64>,
    pub voice_payload: Option<String>,
    pub reply_to: Option<MessageId>,
    pub reactions: Vec<Reaction>,
    pub created_at: Option<DateTime<Utc>>,
}

impl TryFrom<RawMessage> for MessageDraft {
    type Error = ProtocolError;

    fn try_from(raw: RawMessage) -> Result<Self, Self::Error> {
        let conversation_id = non_empty(raw.conversation_id)
            .ok_or(ProtocolError::missing(EVENT_SEND_MESSAGE, "conversationId"))?;
        let sender_id = non_empty(raw.sender_id)
            .ok_or(ProtocolError::missing(EVENT_SEND_MESSAGE, "senderId"))?;

        Ok(Self {
            id: non_empty(raw.id).map(MessageId),
            conversation_id: ConversationId(conversation_id),
            sender_id: UserId(sender_id),
            content: raw.content.unwrap_or_default(),
            kind: raw.kind.unwrap_or_default(),
            file_ref: raw.file_ref,
            file_name: raw.file_name,
            file_size: raw.file_size,
            voice_duration: raw.voice_duration,
            voice_payload: raw.voice_payload,
            reply_to: non_empty(raw.reply_to).map(MessageId),
            reactions: raw.reactions.unwrap_or_default(),
            created_at: raw.created_at,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIdentity {
    id: Option<String>,
    #[serde(alias = "username")]
    display_name: Option<String>,
    #[serde(alias = "avatar")]
    avatar_ref: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConversation {
    #[serde(alias = "type")]
    kind: Option<ConversationKind>,
    #[serde(alias = "name")]
    display_name: Option<String>,
    #[serde(alias = "avatar")]
    avatar_ref: Option<String>,
    #[serde(alias = "participants")]
    participant_ids: Option<Vec<String>>,
    created_by: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    id: Option<String>,
    #[serde(alias = "chatId")]
    conversation_id: Option<String>,
    sender_id: Option<String>,
    content: Option<String>,
    #[serde(alias = "type")]
    kind: Option<MessageKind>,
    #[serde(alias = "fileUrl")]
    file_ref: Option<String>,
    file_name: Option<String>,
    file_size: Option<u64>,
    voice_duration: Option<f64>,
    #[serde(alias = "voiceData")]
    voice_payload: Option<String>,
    reply_to: Option<String>,
    reactions: Option<Vec<Reaction>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    created_at: Option<DateTime<Utc>>,
}

/// Shared shape of edit / react / read payloads.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessageRef {
    message_id: Option<String>,
    #[serde(alias = "chatId")]
    conversation_id: Option<String>,
    content: Option<String>,
    emoji: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTyping {
    #[serde(alias = "chatId")]
    conversation_id: Option<String>,
    is_typing: Option<bool>,
}

fn payload<T: DeserializeOwned>(event: &'static str, data: Value) -> Result<T, ProtocolError> {
    let data = if data.is_null() {
        Value::Object(Default::default())
    } else {
        data
    };
    serde_json::from_value(data).map_err(|source| ProtocolError::Malformed { event, source })
}

/// Accepts either a bare string id or an object carrying it under `key`
/// (or the legacy `alias`).
fn bare_or_field(
    event: &'static str,
    data: &Value,
    key: &'static str,
    alias: &str,
) -> Result<String, ProtocolError> {
    let id = match data {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map
            .get(key)
            .or_else(|| map.get(alias))
            .and_then(Value::as_str),
        _ => None,
    };
    id.filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(ProtocolError::missing(event, key))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Every event the relay sends to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "users:list")]
    UsersList(Vec<Identity>),
    #[serde(rename = "user:status")]
    UserStatus(StatusChange),
    #[serde(rename = "chat:created")]
    ConversationCreated(Conversation),
    #[serde(rename = "message:new")]
    MessageNew(MessageRecord),
    #[serde(rename = "message:updated")]
    MessageUpdated(MessageRecord),
    #[serde(rename = "message:deleted")]
    MessageDeleted(DeletedMessage),
    #[serde(rename = "user:typing")]
    Typing(TypingStatus),
    #[serde(rename = "ack")]
    Ack(Ack),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::UsersList(_) => EVENT_USERS_LIST,
            Self::UserStatus(_) => EVENT_SET_STATUS,
            Self::ConversationCreated(_) => EVENT_CHAT_CREATED,
            Self::MessageNew(_) => EVENT_MESSAGE_NEW,
            Self::MessageUpdated(_) => EVENT_MESSAGE_UPDATED,
            Self::MessageDeleted(_) => EVENT_MESSAGE_DELETED,
            Self::Typing(_) => EVENT_TYPING,
            Self::Ack(_) => EVENT_ACK,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub user_id: UserId,
    pub status: Presence,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedMessage {
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingStatus {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub is_typing: bool,
}

/// Reply to a frame that carried an `ack` number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub ack: u64,
    pub result: AckResult,
}

/// Variants are ordered from most to least required fields so untagged
/// decoding picks the right one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AckResult {
    Message(MessageRecord),
    Conversation(Conversation),
    Identity(Identity),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_send_accepts_legacy_field_names() {
        let frame = ClientFrame::parse(
            r#"{"event":"message:send","ack":3,"data":{
                "id":"m1","chatId":"c1","senderId":"alice","content":"hi",
                "type":"voice","voiceData":"AAAA","voiceDuration":2.5,"createdAt":1700000000000
            }}"#,
        )
        .unwrap();

        assert_eq!(frame.ack, Some(3));
        let ClientEvent::SendMessage(draft) = frame.event else {
            panic!("expected SendMessage");
        };
        assert_eq!(draft.id, Some(MessageId::from("m1")));
        assert_eq!(draft.conversation_id, ConversationId::from("c1"));
        assert_eq!(draft.kind, MessageKind::Voice);
        assert_eq!(draft.voice_payload.as_deref(), Some("AAAA"));
        assert_eq!(draft.created_at.unwrap().timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_send_without_sender_is_rejected() {
        let err = ClientEvent::decode(EVENT_SEND_MESSAGE, json!({"conversationId": "c1"}))
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::MissingField {
                field: "senderId",
                ..
            }
        ));
    }

    #[test]
    fn test_join_accepts_bare_string_and_object() {
        assert_eq!(
            ClientEvent::decode(EVENT_JOIN_CHAT, json!("c1")).unwrap(),
            ClientEvent::JoinRoom(ConversationId::from("c1"))
        );
        assert_eq!(
            ClientEvent::decode(EVENT_LEAVE_CHAT, json!({"chatId": "c2"})).unwrap(),
            ClientEvent::LeaveRoom(ConversationId::from("c2"))
        );
        assert!(ClientEvent::decode(EVENT_JOIN_CHAT, json!("")).is_err());
        assert!(ClientEvent::decode(EVENT_JOIN_CHAT, Value::Null).is_err());
    }

    #[test]
    fn test_create_dedups_participants() {
        let event = ClientEvent::decode(
            EVENT_CREATE_CHAT,
            json!({"type": "direct", "participants": ["a", "b", "a"], "createdBy": "a"}),
        )
        .unwrap();
        let ClientEvent::CreateConversation(draft) = event else {
            panic!("expected CreateConversation");
        };
        assert_eq!(draft.participant_ids, vec![UserId::from("a"), UserId::from("b")]);
        assert_eq!(draft.created_by, Some(UserId::from("a")));
    }

    #[test]
    fn test_direct_with_three_participants_is_invalid() {
        let err = ClientEvent::decode(
            EVENT_CREATE_CHAT,
            json!({"kind": "direct", "participantIds": ["a", "b", "c"]}),
        )
        .unwrap_err();
        assert!(matches!(err, ProtocolError::Invalid { .. }));

        assert!(ClientEvent::decode(EVENT_CREATE_CHAT, json!({"participantIds": []})).is_err());
    }

    #[test]
    fn test_react_requires_emoji() {
        assert!(ClientEvent::decode(EVENT_REACT, json!({"messageId": "m1"})).is_err());
        assert!(ClientEvent::decode(EVENT_REACT, json!({"messageId": "m1", "emoji": "❤️"})).is_ok());
    }

    #[test]
    fn test_status_accepts_bare_value() {
        assert_eq!(
            ClientEvent::decode(EVENT_SET_STATUS, json!("away")).unwrap(),
            ClientEvent::SetStatus(Presence::Away)
        );
        assert!(ClientEvent::decode(EVENT_SET_STATUS, json!({"status": "sleepy"})).is_err());
    }

    #[test]
    fn test_unknown_event_and_garbage() {
        assert!(matches!(
            ClientFrame::parse(r#"{"event":"nope","data":{}}"#),
            Err(ProtocolError::UnknownEvent(_))
        ));
        assert!(matches!(
            ClientFrame::parse("not json"),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn test_outbound_frame_shape() {
        let event = ServerEvent::UserStatus(StatusChange {
            user_id: UserId::from("alice"),
            status: Presence::Offline,
        });
        let json: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            json!({"event": "user:status", "data": {"userId": "alice", "status": "offline"}})
        );
    }

    #[test]
    fn test_ack_decodes_to_identity() {
        let text = r#"{"event":"ack","data":{"ack":1,"result":
            {"id":"alice","displayName":"Alice","avatarRef":"","status":"online","transportHandle":4}}}"#;
        let event: ServerEvent = serde_json::from_str(text).unwrap();
        let ServerEvent::Ack(ack) = event else {
            panic!("expected Ack");
        };
        assert_eq!(ack.ack, 1);
        assert!(matches!(ack.result, AckResult::Identity(ref i) if i.id.as_str() == "alice"));
    }
}
