//! Table of live transports and their outbound queues.
//!
//! This is the only place the relay hands events to the transport layer.
//! Sends never block. A client whose queue is full is recorded as
//! overflowed and the router evicts it, so no client silently misses state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use nexus_shared::{ConnectionId, ServerEvent, UserId};

/// Outbound half handed to the router for one connection.
pub type Outbound = mpsc::Sender<Arc<ServerEvent>>;

/// Receiving half drained by the connection's writer task.
pub type OutboundRx = mpsc::Receiver<Arc<ServerEvent>>;

pub fn outbound_channel(capacity: usize) -> (Outbound, OutboundRx) {
    mpsc::channel(capacity)
}

#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    /// Identity this transport speaks for, from the connect query or a
    /// later `user:register`.
    pub user_id: Option<UserId>,
    tx: Outbound,
}

#[derive(Debug, Default)]
pub struct ConnectionTable {
    connections: HashMap<ConnectionId, Connection>,
    /// Connections that had an event refused because their queue was full.
    overflowed: Vec<ConnectionId>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ConnectionId, user_id: Option<UserId>, tx: Outbound) {
        self.connections.insert(id, Connection { id, user_id, tx });
    }

    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        self.connections.remove(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn user_of(&self, id: ConnectionId) -> Option<&UserId> {
        self.connections.get(&id).and_then(|c| c.user_id.as_ref())
    }

    /// Rebind a connection to another identity, returning the previous one.
    pub fn set_user(&mut self, id: ConnectionId, user_id: UserId) -> Option<UserId> {
        self.connections
            .get_mut(&id)
            .and_then(|c| c.user_id.replace(user_id))
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Next connection waiting to be evicted for a full queue.
    pub fn pop_overflowed(&mut self) -> Option<ConnectionId> {
        self.overflowed.pop()
    }

    /// Unicast. Returns `false` if the connection is gone or its queue is full.
    pub fn send(&mut self, id: ConnectionId, event: ServerEvent) -> bool {
        let Some(conn) = self.connections.get(&id) else {
            return false;
        };
        match deliver(conn, Arc::new(event)) {
            Delivery::Sent => true,
            Delivery::Full => {
                self.overflowed.push(id);
                false
            }
            Delivery::Closed => false,
        }
    }

    /// Send one event to each listed connection, skipping `except`.
    pub fn send_many<'a>(
        &mut self,
        targets: impl IntoIterator<Item = &'a ConnectionId>,
        except: Option<ConnectionId>,
        event: ServerEvent,
    ) {
        let event = Arc::new(event);
        for id in targets {
            if Some(*id) == except {
                continue;
            }
            if let Some(conn) = self.connections.get(id) {
                if let Delivery::Full = deliver(conn, event.clone()) {
                    self.overflowed.push(*id);
                }
            }
        }
    }

    /// Send to every live connection, optionally skipping one.
    pub fn broadcast(&mut self, except: Option<ConnectionId>, event: ServerEvent) {
        let targets: Vec<ConnectionId> = self.connections.keys().copied().collect();
        self.send_many(&targets, except, event);
    }
}

enum Delivery {
    Sent,
    Full,
    Closed,
}

fn deliver(conn: &Connection, event: Arc<ServerEvent>) -> Delivery {
    match conn.tx.try_send(event) {
        Ok(()) => Delivery::Sent,
        Err(mpsc::error::TrySendError::Full(event)) => {
            debug!(
                conn = %conn.id,
                event = event.name(),
                "Outbound queue full"
            );
            Delivery::Full
        }
        Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
    }
}
