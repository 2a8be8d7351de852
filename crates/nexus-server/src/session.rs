//! WebSocket transport for one client.
//!
//! Each socket gets a reader and a writer task. The reader decodes frames
//! and forwards them to the hub in arrival order; the writer drains the
//! connection's outbound queue. Whichever finishes first ends the session.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};

use nexus_shared::constants::MAX_FRAME_SIZE;
use nexus_shared::{ClientFrame, UserId};

use crate::api::AppState;
use crate::connections::outbound_channel;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub user_id: Option<String>,
}

impl ConnectParams {
    fn identity(self) -> Option<UserId> {
        self.user_id
            .filter(|id| !id.trim().is_empty())
            .map(UserId)
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Response {
    ws.max_message_size(MAX_FRAME_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, params.identity(), state))
}

async fn handle_socket(socket: WebSocket, user_id: Option<UserId>, state: AppState) {
    let (tx, mut rx) = outbound_channel(state.config.outbound_queue);

    let conn = match state.hub.connect(user_id, tx).await {
        Ok(conn) => conn,
        Err(e) => {
            warn!(error = %e, "Rejecting socket, hub unavailable");
            return;
        }
    };
    debug!(conn = %conn, "Socket upgraded");

    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let json = match event.to_json() {
                Ok(json) => json,
                Err(e) => {
                    warn!(event = event.name(), error = %e, "Failed to encode event");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let hub = state.hub.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Text(text) => match ClientFrame::parse(text.as_str()) {
                    Ok(frame) => {
                        if hub.inbound(conn, frame).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(conn = %conn, error = %e, "Dropping malformed frame");
                    }
                },
                Message::Close(_) => break,
                // Pings are answered by axum; binary frames are not part of the protocol.
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    if let Err(e) = state.hub.disconnect(conn).await {
        debug!(conn = %conn, error = %e, "Hub gone before disconnect");
    }
    debug!(conn = %conn, "Socket closed");
}
