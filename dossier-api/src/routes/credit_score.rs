//! Credit score lookup.
//!
//! Synchronous: answered from the cache, or looked up inline and stored.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use dossier_core::{QueryKind, TrackedQuery};
use std::sync::Arc;

use super::RefreshParams;
use crate::config::ServerConfig;
use crate::error::{ApiError, ApiResult};
use crate::services::RequestOrchestrator;

/// GET /credit-score/{identifier} - Cached or fresh credit score
///
/// A provider error is stored and returned as an ERROR row, not as an HTTP
/// error.
#[utoipa::path(
    get,
    path = "/credit-score/{identifier}",
    tag = "Lookups",
    params(
        ("identifier" = String, Path, description = "Tax code or VAT number"),
        RefreshParams,
    ),
    responses(
        (status = 200, description = "Current credit score row", body = TrackedQuery),
        (status = 400, description = "Invalid identifier", body = ApiError),
        (status = 500, description = "Storage failure", body = ApiError),
    ),
)]
pub async fn get_credit_score(
    State(orchestrator): State<RequestOrchestrator>,
    State(server): State<Arc<ServerConfig>>,
    Path(identifier): Path<String>,
    Query(params): Query<RefreshParams>,
    headers: HeaderMap,
) -> ApiResult<Json<TrackedQuery>> {
    let options = params.resolve_options(&server, &headers);
    let resolution = orchestrator
        .resolve(QueryKind::SyncLookup, &identifier, &options)
        .await?;
    Ok(Json(resolution.into_record()))
}
