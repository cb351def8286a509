//! Dossier API Server Entry Point
//!
//! Loads `.env`, reads configuration once, wires the record store, provider
//! client and notifier, and starts the Axum HTTP server.

use std::sync::Arc;

use dossier_api::telemetry::{init_tracer, TelemetryConfig};
use dossier_api::{
    build_notifier, create_router, ApiError, ApiResult, AppConfig, AppState, HttpProviderClient,
    PgRecordStore, StoreBackend,
};
use dossier_storage::{InMemoryRecordStore, RecordStore};

#[tokio::main]
async fn main() -> ApiResult<()> {
    // A missing .env file is fine; the environment may be set another way.
    let _ = dotenvy::dotenv();

    init_tracer(&TelemetryConfig::from_env())?;

    let config = AppConfig::from_env();

    let store: Arc<dyn RecordStore> = match config.store {
        StoreBackend::Postgres => {
            let store = PgRecordStore::from_config(&config.db)?;
            store.ensure_schema().await?;
            Arc::new(store)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory record store; records are lost on restart");
            Arc::new(InMemoryRecordStore::new())
        }
    };

    let provider = Arc::new(HttpProviderClient::new(config.provider.clone())?);
    let notifier = build_notifier(&config.notify)?;

    let addr = config.server.bind_addr();
    let state = AppState::new(
        config.server,
        store,
        provider,
        notifier,
        config.notify.default_recipient,
    );
    let app = create_router(state);

    tracing::info!(%addr, "Starting dossier API server");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        })
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    Ok(())
}
