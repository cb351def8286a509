//! Health Check Endpoints
//!
//! - `/health/ping`: plain `pong`
//! - `/health/live`: the process is serving requests
//! - `/health/ready`: the record store answers a ping; 503 otherwise

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use dossier_storage::RecordStore;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

impl HealthState {
    fn status_code(self) -> StatusCode {
        match self {
            HealthState::Healthy => StatusCode::OK,
            HealthState::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Body of `/health/live` and `/health/ready`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HealthReport {
    pub status: HealthState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ReadinessDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ReadinessDetails {
    pub store: StoreHealth,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Outcome of pinging the record store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct StoreHealth {
    pub status: HealthState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StoreHealth {
    async fn probe(store: &dyn RecordStore) -> Self {
        let started = Instant::now();
        match store.ping().await {
            Ok(()) => Self {
                status: HealthState::Healthy,
                latency_ms: Some(started.elapsed().as_millis() as u64),
                error: None,
            },
            Err(e) => {
                tracing::warn!(error = %e, "Record store ping failed");
                Self {
                    status: HealthState::Unhealthy,
                    latency_ms: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

impl IntoResponse for HealthReport {
    fn into_response(self) -> Response {
        (self.status.status_code(), Json(self)).into_response()
    }
}

/// GET /health/ping
#[utoipa::path(
    get,
    path = "/health/ping",
    tag = "Health",
    responses(
        (status = 200, description = "Service is responding", body = String),
    ),
)]
pub async fn ping() -> &'static str {
    "pong"
}

/// GET /health/live
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Process is alive", body = HealthReport),
    ),
)]
pub async fn liveness() -> HealthReport {
    HealthReport {
        status: HealthState::Healthy,
        message: Some("Process is alive".to_string()),
        details: None,
    }
}

/// GET /health/ready
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Record store reachable", body = HealthReport),
        (status = 503, description = "Record store unreachable", body = HealthReport),
    ),
)]
pub async fn readiness(
    State(store): State<Arc<dyn RecordStore>>,
    State(start_time): State<Instant>,
) -> HealthReport {
    let store = StoreHealth::probe(store.as_ref()).await;
    HealthReport {
        status: store.status,
        message: None,
        details: Some(ReadinessDetails {
            store,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: start_time.elapsed().as_secs(),
        }),
    }
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
}
