//! KAZI API Server Entry Point
//!
//! Reads configuration from the environment, picks the datastore backend
//! and serves the Axum router until ctrl-c.

use std::net::SocketAddr;
use std::sync::Arc;

use kazi_api::telemetry::{init_tracing, TelemetryConfig};
use kazi_api::{
    create_api_router, ApiConfig, ApiError, ApiResult, AppState, AuthConfig, DatastoreKind,
    DbConfig, PgDatastore,
};
use kazi_storage::{Datastore, InMemoryDatastore};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::from_env();
    init_tracing(&telemetry_config)?;

    let api_config = ApiConfig::from_env()?;
    let auth_config = AuthConfig::from_env();

    let store: Arc<dyn Datastore> = match api_config.datastore {
        DatastoreKind::Postgres => {
            let db_config = DbConfig::from_env();
            tracing::info!(
                host = %db_config.host,
                database = %db_config.dbname,
                "Using Postgres datastore"
            );
            Arc::new(PgDatastore::from_config(&db_config)?)
        }
        DatastoreKind::Memory => {
            tracing::warn!("Using in-memory datastore; data is lost on exit");
            Arc::new(InMemoryDatastore::new())
        }
    };

    let addr = api_config.bind_addr()?;
    let state = AppState::new(store, Arc::new(api_config), Arc::new(auth_config));
    let app = create_api_router(state)?;

    tracing::info!(%addr, "Starting KAZI API server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}
