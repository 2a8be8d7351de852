//! The hub task: sole owner of the [`EventRouter`].
//!
//! Connections and the HTTP API talk to it through a bounded command
//! channel, so every state mutation runs one at a time in arrival order.
//! Commands from a single connection keep their order because each
//! connection has a single reader feeding the channel.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use nexus_shared::{ClientFrame, ConnectionId, Conversation, Identity, UserId};

use crate::connections::Outbound;
use crate::error::ServerError;
use crate::router::{EventRouter, RelayStats};

// ---------------------------------------------------------------------------
// Command types
// ---------------------------------------------------------------------------

/// Commands sent *into* the hub task.
#[derive(Debug)]
pub enum HubCommand {
    /// A transport is ready. The hub assigns its id.
    Connect {
        user_id: Option<UserId>,
        tx: Outbound,
        reply: oneshot::Sender<ConnectionId>,
    },
    /// A decoded frame from a connection.
    Inbound {
        conn: ConnectionId,
        frame: ClientFrame,
    },
    /// The transport closed.
    Disconnect(ConnectionId),
    /// Snapshot of all known identities.
    ListUsers(oneshot::Sender<Vec<Identity>>),
    /// Snapshot of all conversations.
    ListConversations(oneshot::Sender<Vec<Conversation>>),
    /// Entity and connection counts.
    Stats(oneshot::Sender<RelayStats>),
    /// Stop the hub.
    Shutdown,
}

/// Cloneable handle used by connections and HTTP handlers.
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    pub async fn connect(
        &self,
        user_id: Option<UserId>,
        tx: Outbound,
    ) -> Result<ConnectionId, ServerError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Connect { user_id, tx, reply }).await?;
        rx.await.map_err(|_| ServerError::HubUnavailable)
    }

    pub async fn inbound(&self, conn: ConnectionId, frame: ClientFrame) -> Result<(), ServerError> {
        self.send(HubCommand::Inbound { conn, frame }).await
    }

    pub async fn disconnect(&self, conn: ConnectionId) -> Result<(), ServerError> {
        self.send(HubCommand::Disconnect(conn)).await
    }

    pub async fn list_users(&self) -> Result<Vec<Identity>, ServerError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::ListUsers(reply)).await?;
        rx.await.map_err(|_| ServerError::HubUnavailable)
    }

    pub async fn list_conversations(&self) -> Result<Vec<Conversation>, ServerError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::ListConversations(reply)).await?;
        rx.await.map_err(|_| ServerError::HubUnavailable)
    }

    pub async fn stats(&self) -> Result<RelayStats, ServerError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Stats(reply)).await?;
        rx.await.map_err(|_| ServerError::HubUnavailable)
    }

    pub async fn shutdown(&self) -> Result<(), ServerError> {
        self.send(HubCommand::Shutdown).await
    }

    async fn send(&self, cmd: HubCommand) -> Result<(), ServerError> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| ServerError::HubUnavailable)
    }
}

/// Spawn the hub in a background tokio task and return its handle.
///
/// The task ends on [`HubCommand::Shutdown`] or once every handle is dropped.
pub fn spawn_hub(capacity: usize) -> HubHandle {
    let (tx, mut rx) = mpsc::channel::<HubCommand>(capacity);

    tokio::spawn(async move {
        let mut router = EventRouter::new();
        let mut next_id: u64 = 1;

        while let Some(cmd) = rx.recv().await {
            match cmd {
                HubCommand::Connect { user_id, tx, reply } => {
                    let conn = ConnectionId(next_id);
                    next_id += 1;
                    router.connect(conn, user_id, tx);
                    if reply.send(conn).is_err() {
                        // The session gave up before learning its id.
                        router.disconnect(conn);
                    }
                }
                HubCommand::Inbound { conn, frame } => {
                    router.handle(conn, frame);
                }
                HubCommand::Disconnect(conn) => {
                    router.disconnect(conn);
                }
                HubCommand::ListUsers(reply) => {
                    let _ = reply.send(router.identities());
                }
                HubCommand::ListConversations(reply) => {
                    let _ = reply.send(router.conversations());
                }
                HubCommand::Stats(reply) => {
                    let _ = reply.send(router.stats());
                }
                HubCommand::Shutdown => {
                    info!("Hub shutdown requested");
                    break;
                }
            }
        }

        debug!("Hub event loop terminated");
    });

    HubHandle { tx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::outbound_channel;
    use nexus_shared::ServerEvent;

    #[tokio::test]
    async fn test_connect_assigns_increasing_ids() {
        let hub = spawn_hub(16);
        let (tx1, _rx1) = outbound_channel(8);
        let (tx2, _rx2) = outbound_channel(8);

        let first = hub.connect(None, tx1).await.unwrap();
        let second = hub.connect(None, tx2).await.unwrap();

        assert!(second > first);
        assert_eq!(hub.stats().await.unwrap().connections, 2);
    }

    #[tokio::test]
    async fn test_frames_are_applied_in_order() {
        let hub = spawn_hub(16);
        let (tx, mut rx) = outbound_channel(8);
        let conn = hub.connect(None, tx).await.unwrap();

        let register = ClientFrame::parse(
            r#"{"event":"user:register","ack":1,"data":{"id":"alice","displayName":"Alice"}}"#,
        )
        .unwrap();
        hub.inbound(conn, register).await.unwrap();

        let users = hub.list_users().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].display_name, "Alice");

        assert!(matches!(*rx.recv().await.unwrap(), ServerEvent::UsersList(_)));
        assert!(matches!(*rx.recv().await.unwrap(), ServerEvent::Ack(_)));
    }

    #[tokio::test]
    async fn test_disconnect_marks_offline() {
        let hub = spawn_hub(16);
        let (tx, _rx) = outbound_channel(8);
        let conn = hub.connect(Some(UserId::from("alice")), tx).await.unwrap();
        let register =
            ClientFrame::parse(r#"{"event":"user:register","data":{"id":"alice"}}"#).unwrap();
        hub.inbound(conn, register).await.unwrap();

        hub.disconnect(conn).await.unwrap();

        let users = hub.list_users().await.unwrap();
        assert_eq!(users[0].status, nexus_shared::Presence::Offline);
        assert_eq!(hub.stats().await.unwrap().connections, 0);
    }

    #[tokio::test]
    async fn test_requests_fail_after_shutdown() {
        let hub = spawn_hub(4);
        hub.shutdown().await.unwrap();

        // Queued behind Shutdown, so it is dropped unanswered.
        assert!(matches!(hub.stats().await, Err(ServerError::HubUnavailable)));
    }
}
