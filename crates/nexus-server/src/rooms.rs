use std::collections::{HashMap, HashSet};

use tracing::debug;

use nexus_shared::{ConnectionId, ConversationId};

/// Which live connections are subscribed to which conversation room.
///
/// Keyed by connection handle rather than identity: membership belongs to a
/// transport session and disappears with it.
#[derive(Debug, Default)]
pub struct RoomMembership {
    rooms: HashMap<ConversationId, HashSet<ConnectionId>>,
    joined: HashMap<ConnectionId, HashSet<ConversationId>>,
}

impl RoomMembership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&mut self, conn: ConnectionId, room: ConversationId) {
        let members = self.rooms.entry(room.clone()).or_default();
        if members.insert(conn) {
            debug!(
                room = %room,
                conn = %conn,
                members = members.len(),
                "Joined room"
            );
            self.joined.entry(conn).or_default().insert(room);
        }
    }

    /// Leave a room. Empty rooms are removed.
    pub fn leave(&mut self, conn: ConnectionId, room: &ConversationId) {
        let should_remove = match self.rooms.get_mut(room) {
            Some(members) => {
                if members.remove(&conn) {
                    debug!(room = %room, conn = %conn, members = members.len(), "Left room");
                }
                members.is_empty()
            }
            None => false,
        };
        if should_remove {
            self.rooms.remove(room);
        }

        if let Some(rooms) = self.joined.get_mut(&conn) {
            rooms.remove(room);
            if rooms.is_empty() {
                self.joined.remove(&conn);
            }
        }
    }

    /// Remove a closed connection from every room it joined.
    pub fn drop_connection(&mut self, conn: ConnectionId) {
        let Some(rooms) = self.joined.remove(&conn) else {
            return;
        };
        for room in rooms {
            if let Some(members) = self.rooms.get_mut(&room) {
                members.remove(&conn);
                if members.is_empty() {
                    self.rooms.remove(&room);
                }
            }
        }
    }

    pub fn members(&self, room: &ConversationId) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_member(&self, conn: ConnectionId, room: &ConversationId) -> bool {
        self.rooms.get(room).is_some_and(|m| m.contains(&conn))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_is_idempotent() {
        let mut rooms = RoomMembership::new();
        let c1 = ConversationId::from("c1");
        rooms.join(ConnectionId(1), c1.clone());
        rooms.join(ConnectionId(1), c1.clone());

        assert_eq!(rooms.members(&c1), vec![ConnectionId(1)]);
    }

    #[test]
    fn test_leave_never_joined_is_noop() {
        let mut rooms = RoomMembership::new();
        let c1 = ConversationId::from("c1");
        rooms.leave(ConnectionId(1), &c1);
        rooms.join(ConnectionId(2), c1.clone());
        rooms.leave(ConnectionId(1), &c1);

        assert!(rooms.is_member(ConnectionId(2), &c1));
        assert_eq!(rooms.room_count(), 1);
    }

    #[test]
    fn test_empty_room_is_removed() {
        let mut rooms = RoomMembership::new();
        let c1 = ConversationId::from("c1");
        rooms.join(ConnectionId(1), c1.clone());
        rooms.leave(ConnectionId(1), &c1);

        assert_eq!(rooms.room_count(), 0);
        assert!(rooms.members(&c1).is_empty());
    }

    #[test]
    fn test_drop_connection_clears_all_rooms() {
        let mut rooms = RoomMembership::new();
        let c1 = ConversationId::from("c1");
        let c2 = ConversationId::from("c2");
        rooms.join(ConnectionId(1), c1.clone());
        rooms.join(ConnectionId(1), c2.clone());
        rooms.join(ConnectionId(2), c2.clone());

        rooms.drop_connection(ConnectionId(1));

        assert!(!rooms.is_member(ConnectionId(1), &c1));
        assert!(!rooms.is_member(ConnectionId(1), &c2));
        assert_eq!(rooms.members(&c2), vec![ConnectionId(2)]);
        assert_eq!(rooms.room_count(), 1);
    }
}
