use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::{HeaderValue, Method},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use nexus_shared::constants::PROTOCOL_VERSION;
use nexus_shared::{Conversation, Identity};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::hub::HubHandle;
use crate::router::RelayStats;
use crate::session::ws_handler;

#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub config: Arc<ServerConfig>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(hub: HubHandle, config: ServerConfig) -> Self {
        Self {
            hub,
            config: Arc::new(config),
            started_at: Instant::now(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/api/users", get(list_users))
        .route("/api/chats", get(list_chats))
        .route("/api/stats", get(relay_stats))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if config.allows_any_origin() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Skipping invalid CORS origin");
                None
            }
        })
        .collect();

    cors.allow_origin(AllowOrigin::list(origins))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
    version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfoResponse {
    name: String,
    version: &'static str,
    protocol: &'static str,
    uptime_secs: u64,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        protocol: PROTOCOL_VERSION,
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<Identity>>, ServerError> {
    Ok(Json(state.hub.list_users().await?))
}

async fn list_chats(
    State(state): State<AppState>,
) -> Result<Json<Vec<Conversation>>, ServerError> {
    Ok(Json(state.hub.list_conversations().await?))
}

async fn relay_stats(State(state): State<AppState>) -> Result<Json<RelayStats>, ServerError> {
    Ok(Json(state.hub.stats().await?))
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP and WebSocket server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::connections::outbound_channel;
    use crate::hub::spawn_hub;
    use nexus_shared::ClientFrame;

    fn test_state() -> AppState {
        AppState::new(spawn_hub(16), ServerConfig::default())
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json(build_router(test_state()), "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["timestamp"].is_string());
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_info_reports_instance_name() {
        let (status, body) = get_json(build_router(test_state()), "/info").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Nexus Chat");
        assert_eq!(body["protocol"], PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn test_users_snapshot() {
        let state = test_state();
        let (tx, _rx) = outbound_channel(8);
        let conn = state.hub.connect(None, tx).await.unwrap();
        let frame = ClientFrame::parse(
            r#"{"event":"user:register","data":{"id":"alice","username":"Alice"}}"#,
        )
        .unwrap();
        state.hub.inbound(conn, frame).await.unwrap();

        let (status, body) = get_json(build_router(state), "/api/users").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["id"], "alice");
        assert_eq!(body[0]["displayName"], "Alice");
        assert_eq!(body[0]["status"], "online");
    }

    #[tokio::test]
    async fn test_chats_and_stats() {
        let state = test_state();
        let (tx, _rx) = outbound_channel(8);
        let conn = state.hub.connect(Some("alice".into()), tx).await.unwrap();
        let frame = ClientFrame::parse(
            r#"{"event":"chat:create","data":{"type":"group","name":"Ops","participants":["alice","bob","carol"]}}"#,
        )
        .unwrap();
        state.hub.inbound(conn, frame).await.unwrap();

        let app = build_router(state);
        let (_, chats) = get_json(app.clone(), "/api/chats").await;
        assert_eq!(chats.as_array().unwrap().len(), 1);
        assert_eq!(chats[0]["displayName"], "Ops");

        let (status, stats) = get_json(app, "/api/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["conversations"], 1);
        assert_eq!(stats["connections"], 1);
    }

    #[tokio::test]
    async fn test_stopped_hub_is_unavailable() {
        let state = test_state();
        state.hub.shutdown().await.unwrap();

        let (status, body) = get_json(build_router(state), "/api/stats").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].is_string());
    }
}
