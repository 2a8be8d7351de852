use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use nexus_server::api::{self, AppState};
use nexus_server::config::ServerConfig;
use nexus_server::hub::spawn_hub;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Load .env (if any) and initialize tracing (respects RUST_LOG)
    // -----------------------------------------------------------------------
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,nexus_server=debug")),
        )
        .init();

    if let Ok(path) = dotenv {
        info!(path = %path.display(), "Loaded environment file");
    }

    info!("Starting Nexus relay v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Spawn the hub (owns all relay state)
    // -----------------------------------------------------------------------
    let hub = spawn_hub(config.hub_queue);
    let http_addr = config.http_addr;
    let app_state = AppState::new(hub.clone(), config);

    // -----------------------------------------------------------------------
    // 4. Run the HTTP/WebSocket server until it fails or Ctrl+C
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    if let Err(e) = hub.shutdown().await {
        debug!(error = %e, "Hub already stopped");
    }

    Ok(())
}
