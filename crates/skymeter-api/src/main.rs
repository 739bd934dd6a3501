//! Skymeter Gateway API Server
//!
//! REST API for the metered weather gateway.

use skymeter_api::notify::LogNotifier;
use skymeter_api::routes::{build_router, AppState};
use skymeter_api::weather::WeatherClient;
use skymeter_storage::{GatewayBackend, LocalSqliteBackend};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Get database path from environment or use default
    let db_path = std::env::var("SKYMETER_DB_PATH").unwrap_or_else(|_| "skymeter.db".to_string());

    tracing::info!("Using gateway database at: {}", db_path);

    let backend = LocalSqliteBackend::new(&db_path);

    if !backend.exists().unwrap_or(false) {
        tracing::warn!("Database does not exist, initializing new gateway database");
        backend
            .initialize()
            .expect("Failed to initialize gateway database");
    }

    let state = AppState::new(
        Arc::new(backend),
        WeatherClient::from_env(),
        Arc::new(LogNotifier),
    );

    let app = build_router(state);

    // Get port from environment or use default
    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse::<u16>()
        .expect("PORT must be a valid number");

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("skymeter API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
