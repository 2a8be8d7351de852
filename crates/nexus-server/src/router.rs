//! Event router: applies inbound client events to the relay state and fans
//! the results out.
//!
//! The router is plain synchronous code owned by the hub task, so handlers
//! never interleave and no state is locked. A bad or incomplete event is
//! dropped (the protocol layer rejects it before it gets here) and an event
//! naming an unknown message or conversation is a no-op.

use tracing::{debug, info, warn};

use nexus_shared::protocol::{
    Ack, AckResult, ConversationDraft, DeletedMessage, IdentityDraft, MessageDraft, StatusChange,
    TypingStatus,
};
use nexus_shared::{
    ClientEvent, ClientFrame, ConnectionId, Conversation, ConversationId, Identity, MessageId,
    MessageRecord, Presence, ServerEvent, UserId,
};

use crate::connections::{ConnectionTable, Outbound};
use crate::directory::ConversationDirectory;
use crate::registry::SessionRegistry;
use crate::rooms::RoomMembership;
use crate::store::MessageStore;

/// Counts reported by `/api/stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RelayStats {
    pub identities: usize,
    pub conversations: usize,
    pub messages: usize,
    pub connections: usize,
    pub rooms: usize,
}

#[derive(Debug, Default)]
pub struct EventRouter {
    registry: SessionRegistry,
    rooms: RoomMembership,
    directory: ConversationDirectory,
    store: MessageStore,
    connections: ConnectionTable,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    /// A transport finished its handshake. When it names an identity, that
    /// identity is bound, everyone else learns it is online and the new
    /// connection receives the identity list.
    pub fn connect(&mut self, conn: ConnectionId, user_id: Option<UserId>, tx: Outbound) {
        self.connections.insert(conn, user_id.clone(), tx);
        info!(conn = %conn, user = ?user_id.as_ref().map(UserId::short), "Client connected");

        if let Some(user_id) = user_id {
            self.registry.bind(&user_id, conn);
            self.connections
                .broadcast(Some(conn), status_event(user_id, Presence::Online));
            self.connections
                .send(conn, ServerEvent::UsersList(self.registry.list()));
        }
        self.evict_overflowed();
    }

    /// The transport closed. Room memberships go with it; the identity is
    /// marked offline unless it has already reconnected elsewhere.
    pub fn disconnect(&mut self, conn: ConnectionId) {
        self.close(conn);
        self.evict_overflowed();
    }

    fn close(&mut self, conn: ConnectionId) {
        let Some(closed) = self.connections.remove(conn) else {
            return;
        };
        self.rooms.drop_connection(conn);
        info!(conn = %conn, user = ?closed.user_id.as_ref().map(UserId::short), "Client disconnected");

        if let Some(user_id) = closed.user_id {
            if self.registry.unbind(&user_id, conn) {
                self.connections
                    .broadcast(None, status_event(user_id, Presence::Offline));
            }
        }
    }

    /// Close every connection whose outbound queue overflowed. Dropping its
    /// sender ends the writer task once the queued events are flushed, and
    /// the client resyncs on reconnect. Closing may overflow others in turn.
    fn evict_overflowed(&mut self) {
        while let Some(conn) = self.connections.pop_overflowed() {
            if self.connections.get(conn).is_some() {
                warn!(conn = %conn, "Evicting connection with full outbound queue");
                self.close(conn);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Inbound events
    // -----------------------------------------------------------------------

    pub fn handle(&mut self, conn: ConnectionId, frame: ClientFrame) {
        if self.connections.get(conn).is_none() {
            debug!(conn = %conn, event = frame.event.name(), "Event from unknown connection dropped");
            return;
        }

        let reply = match frame.event {
            ClientEvent::Register(draft) => Some(AckResult::Identity(self.register(conn, draft))),
            ClientEvent::SetStatus(status) => {
                self.set_status(conn, status);
                None
            }
            ClientEvent::CreateConversation(draft) => Some(AckResult::Conversation(
                self.create_conversation(conn, draft),
            )),
            ClientEvent::JoinRoom(room) => {
                self.rooms.join(conn, room);
                None
            }
            ClientEvent::LeaveRoom(room) => {
                self.rooms.leave(conn, &room);
                None
            }
            ClientEvent::SendMessage(draft) => {
                Some(AckResult::Message(self.send_message(conn, draft)))
            }
            ClientEvent::EditMessage {
                message_id,
                content,
            } => {
                self.edit_message(&message_id, content);
                None
            }
            ClientEvent::DeleteMessage(message_id) => {
                self.delete_message(&message_id);
                None
            }
            ClientEvent::React { message_id, emoji } => {
                self.react(conn, &message_id, &emoji);
                None
            }
            ClientEvent::MarkRead {
                message_id,
                conversation_id,
            } => {
                self.mark_read(conn, &message_id, &conversation_id);
                None
            }
            ClientEvent::Typing {
                conversation_id,
                is_typing,
            } => {
                self.typing(conn, conversation_id, is_typing);
                None
            }
        };

        if let (Some(ack), Some(result)) = (frame.ack, reply) {
            self.connections
                .send(conn, ServerEvent::Ack(Ack { ack, result }));
        }
        self.evict_overflowed();
    }

    fn register(&mut self, conn: ConnectionId, draft: IdentityDraft) -> Identity {
        let user_id = draft.id.clone();
        let identity = self.registry.register(draft, conn);

        if let Some(previous) = self.connections.set_user(conn, user_id.clone()) {
            if previous != user_id {
                self.registry.unbind(&previous, conn);
            }
        }

        self.connections
            .broadcast(None, ServerEvent::UsersList(self.registry.list()));
        identity
    }

    fn set_status(&mut self, conn: ConnectionId, status: Presence) {
        let Some(user_id) = self.connections.user_of(conn).cloned() else {
            debug!(conn = %conn, "Status change without identity dropped");
            return;
        };
        if self.registry.set_presence(&user_id, status) {
            self.connections
                .broadcast(Some(conn), status_event(user_id, status));
        }
    }

    fn create_conversation(
        &mut self,
        conn: ConnectionId,
        mut draft: ConversationDraft,
    ) -> Conversation {
        if draft.created_by.is_none() {
            draft.created_by = self.connections.user_of(conn).cloned();
        }
        let conversation = self.directory.create(draft);

        // Every connected participant, whether or not they joined any room.
        let targets: Vec<ConnectionId> = conversation
            .participant_ids
            .iter()
            .filter_map(|p| self.registry.lookup_handle(p))
            .collect();
        self.connections.send_many(
            &targets,
            None,
            ServerEvent::ConversationCreated(conversation.clone()),
        );
        conversation
    }

    fn send_message(&mut self, conn: ConnectionId, draft: MessageDraft) -> MessageRecord {
        let (record, inserted) = self.store.append(draft);
        if inserted {
            debug!(
                message = %record.id,
                conversation = %record.conversation_id,
                sender = %record.sender_id.short(),
                "Message stored"
            );
            let members = self.rooms.members(&record.conversation_id);
            self.connections
                .send_many(&members, Some(conn), ServerEvent::MessageNew(record.clone()));
        }
        record
    }

    fn edit_message(&mut self, message_id: &MessageId, content: String) {
        if let Some(record) = self.store.edit(message_id, content) {
            debug!(message = %message_id, "Message edited");
            let room = record.conversation_id.clone();
            self.to_room(&room, ServerEvent::MessageUpdated(record));
        }
    }

    fn delete_message(&mut self, message_id: &MessageId) {
        if let Some(record) = self.store.soft_delete(message_id) {
            debug!(message = %message_id, "Message deleted");
            let conversation_id = record.conversation_id;
            self.to_room(
                &conversation_id,
                ServerEvent::MessageDeleted(DeletedMessage {
                    message_id: record.id,
                    conversation_id: conversation_id.clone(),
                }),
            );
        }
    }

    fn react(&mut self, conn: ConnectionId, message_id: &MessageId, emoji: &str) {
        let Some(user_id) = self.connections.user_of(conn).cloned() else {
            debug!(conn = %conn, "Reaction without identity dropped");
            return;
        };
        if let Some(record) = self.store.toggle_reaction(message_id, emoji, &user_id) {
            debug!(message = %message_id, emoji, user = %user_id.short(), "Reaction toggled");
            let room = record.conversation_id.clone();
            self.to_room(&room, ServerEvent::MessageUpdated(record));
        }
    }

    /// Fans out to the room named in the event, which may differ from the
    /// message's own conversation if the client says so.
    fn mark_read(
        &mut self,
        conn: ConnectionId,
        message_id: &MessageId,
        conversation_id: &ConversationId,
    ) {
        let Some(user_id) = self.connections.user_of(conn).cloned() else {
            debug!(conn = %conn, "Read receipt without identity dropped");
            return;
        };
        if let Some(record) = self.store.mark_read(message_id, &user_id) {
            self.to_room(conversation_id, ServerEvent::MessageUpdated(record));
        }
    }

    fn typing(&mut self, conn: ConnectionId, conversation_id: ConversationId, is_typing: bool) {
        let Some(user_id) = self.connections.user_of(conn).cloned() else {
            debug!(conn = %conn, "Typing without identity dropped");
            return;
        };
        let members = self.rooms.members(&conversation_id);
        self.connections.send_many(
            &members,
            Some(conn),
            ServerEvent::Typing(TypingStatus {
                conversation_id,
                user_id,
                is_typing,
            }),
        );
    }

    fn to_room(&mut self, room: &ConversationId, event: ServerEvent) {
        let members = self.rooms.members(room);
        self.connections.send_many(&members, None, event);
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    pub fn identities(&self) -> Vec<Identity> {
        self.registry.list()
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.directory.list()
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            identities: self.registry.len(),
            conversations: self.directory.len(),
            messages: self.store.len(),
            connections: self.connections.len(),
            rooms: self.rooms.room_count(),
        }
    }
}

fn status_event(user_id: UserId, status: Presence) -> ServerEvent {
    ServerEvent::UserStatus(StatusChange { user_id, status })
}
