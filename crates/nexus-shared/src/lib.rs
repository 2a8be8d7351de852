//! # nexus-shared
//!
//! Wire-level types shared between the Nexus relay and its clients:
//! identifiers, domain records, and the JSON event protocol spoken over
//! the WebSocket connection.

pub mod constants;
pub mod error;
pub mod models;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
pub use models::{Conversation, Identity, MessageRecord, Reaction};
pub use protocol::{ClientEvent, ClientFrame, ServerEvent};
pub use types::{ConnectionId, ConversationId, ConversationKind, MessageId, MessageKind, Presence, UserId};
