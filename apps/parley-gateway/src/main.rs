use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parley_gateway::config::Config;
use parley_gateway::directory::HttpDirectory;
use parley_gateway::gateway::broadcast::Broadcaster;
use parley_gateway::gateway::connections::ConnectionRegistry;
use parley_gateway::gateway::presence::PresenceIndex;
use parley_gateway::gateway::rooms::RoomManager;
use parley_gateway::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing — env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    // The presence index is built exactly once, before the gateway accepts
    // connections. A failed directory query is fatal: an empty index would
    // silently masquerade as "no communities".
    let directory = HttpDirectory::new(&config.directory_url);
    let presence = match PresenceIndex::from_directory(&directory).await {
        Ok(index) => Arc::new(index),
        Err(reason) => {
            tracing::error!(%reason, "directory query failed; refusing to start");
            std::process::exit(1);
        }
    };
    tracing::info!(
        communities = presence.community_count(),
        directory_url = %config.directory_url,
        "presence index loaded"
    );

    let connections = Arc::new(ConnectionRegistry::new());
    let rooms = Arc::new(RoomManager::new());
    let broadcaster = Broadcaster::new(presence.clone(), connections.clone());

    let state = AppState {
        config: Arc::new(config),
        connections,
        presence,
        rooms,
        broadcaster,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(parley_gateway::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "parley-gateway listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
