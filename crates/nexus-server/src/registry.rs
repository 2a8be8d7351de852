//! Session registry: known identities and the transport each one is bound to.
//!
//! Identities are never removed; disconnecting only marks them offline.
//! A handle may be bound for an id that never registered (a client that
//! connects with `?userId=` but has not sent `user:register` yet), so the
//! handle map is kept separately from the identity records.

use std::collections::HashMap;

use tracing::{debug, info};

use nexus_shared::protocol::IdentityDraft;
use nexus_shared::{ConnectionId, Identity, Presence, UserId};

#[derive(Debug, Default)]
pub struct SessionRegistry {
    identities: HashMap<UserId, Identity>,
    handles: HashMap<UserId, ConnectionId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert an identity, bind it to `handle` and mark it online.
    /// Re-registration overwrites the display fields.
    pub fn register(&mut self, draft: IdentityDraft, handle: ConnectionId) -> Identity {
        let identity = Identity {
            id: draft.id.clone(),
            display_name: draft.display_name,
            avatar_ref: draft.avatar_ref,
            status: Presence::Online,
            transport_handle: Some(handle),
        };
        self.identities.insert(draft.id.clone(), identity.clone());
        self.handles.insert(draft.id, handle);

        info!(
            user = %identity.id,
            name = %identity.display_name,
            conn = %handle,
            "Identity registered"
        );
        identity
    }

    /// Associate a transport with an identity on (re)connect.
    pub fn bind(&mut self, user_id: &UserId, handle: ConnectionId) {
        self.handles.insert(user_id.clone(), handle);
        if let Some(identity) = self.identities.get_mut(user_id) {
            identity.status = Presence::Online;
            identity.transport_handle = Some(handle);
        }
        debug!(user = %user_id, conn = %handle, "Bound transport");
    }

    /// Clear the binding if `handle` is still the one on record and mark
    /// the identity offline. Returns `false` when the identity has already
    /// moved to a newer connection, in which case nothing changes.
    pub fn unbind(&mut self, user_id: &UserId, handle: ConnectionId) -> bool {
        if self.handles.get(user_id) != Some(&handle) {
            return false;
        }
        self.handles.remove(user_id);
        if let Some(identity) = self.identities.get_mut(user_id) {
            identity.status = Presence::Offline;
            identity.transport_handle = None;
        }
        debug!(user = %user_id, conn = %handle, "Unbound transport");
        true
    }

    pub fn lookup_handle(&self, user_id: &UserId) -> Option<ConnectionId> {
        self.handles.get(user_id).copied()
    }

    /// Explicit presence change from a connected client. Unknown ids are
    /// ignored.
    pub fn set_presence(&mut self, user_id: &UserId, status: Presence) -> bool {
        match self.identities.get_mut(user_id) {
            Some(identity) => {
                identity.status = status;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, user_id: &UserId) -> Option<&Identity> {
        self.identities.get(user_id)
    }

    /// Snapshot of every identity, ordered by id.
    pub fn list(&self) -> Vec<Identity> {
        let mut all: Vec<Identity> = self.identities.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(id: &str, name: &str) -> IdentityDraft {
        IdentityDraft {
            id: UserId::from(id),
            display_name: name.to_string(),
            avatar_ref: String::new(),
        }
    }

    #[test]
    fn test_register_is_an_upsert() {
        let mut registry = SessionRegistry::new();
        registry.register(draft("alice", "Alice"), ConnectionId(1));
        let again = registry.register(draft("alice", "Alice B."), ConnectionId(2));

        assert_eq!(registry.len(), 1);
        assert_eq!(again.display_name, "Alice B.");
        assert_eq!(again.status, Presence::Online);
        assert_eq!(registry.lookup_handle(&UserId::from("alice")), Some(ConnectionId(2)));
    }

    #[test]
    fn test_unbind_marks_offline_but_keeps_identity() {
        let mut registry = SessionRegistry::new();
        let alice = UserId::from("alice");
        registry.register(draft("alice", "Alice"), ConnectionId(1));

        assert!(registry.unbind(&alice, ConnectionId(1)));

        let identity = registry.get(&alice).unwrap();
        assert_eq!(identity.status, Presence::Offline);
        assert_eq!(identity.transport_handle, None);
        assert_eq!(registry.lookup_handle(&alice), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_stale_unbind_is_ignored() {
        let mut registry = SessionRegistry::new();
        let alice = UserId::from("alice");
        registry.register(draft("alice", "Alice"), ConnectionId(1));
        registry.bind(&alice, ConnectionId(2));

        assert!(!registry.unbind(&alice, ConnectionId(1)));
        assert_eq!(registry.get(&alice).unwrap().status, Presence::Online);
        assert_eq!(registry.lookup_handle(&alice), Some(ConnectionId(2)));
    }

    #[test]
    fn test_bind_without_registration_tracks_handle_only() {
        let mut registry = SessionRegistry::new();
        let ghost = UserId::from("ghost");
        registry.bind(&ghost, ConnectionId(9));

        assert_eq!(registry.lookup_handle(&ghost), Some(ConnectionId(9)));
        assert!(registry.get(&ghost).is_none());
        assert!(registry.list().is_empty());
        assert!(!registry.set_presence(&ghost, Presence::Away));
    }

    #[test]
    fn test_list_is_sorted() {
        let mut registry = SessionRegistry::new();
        registry.register(draft("carol", "C"), ConnectionId(3));
        registry.register(draft("alice", "A"), ConnectionId(1));
        let ids: Vec<_> = registry.list().into_iter().map(|i| i.id.0).collect();
        assert_eq!(ids, vec!["alice", "carol"]);
    }
}
