//! Composite read: every kind for one identifier.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;

use super::RefreshParams;
use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::services::RequestOrchestrator;

/// GET /company/{identifier} - All kinds at once
///
/// Always 200. A kind that fails holds `{"error": "..."}` in its slot.
#[utoipa::path(
    get,
    path = "/company/{identifier}",
    tag = "Lookups",
    params(
        ("identifier" = String, Path, description = "Tax code or VAT number"),
        RefreshParams,
    ),
    responses(
        (status = 200, description = "One entry per kind", body = Object),
        (status = 500, description = "Unexpected failure", body = ApiError),
    ),
)]
pub async fn get_company(
    State(orchestrator): State<RequestOrchestrator>,
    State(server): State<Arc<ServerConfig>>,
    Path(identifier): Path<String>,
    Query(params): Query<RefreshParams>,
    headers: HeaderMap,
) -> Json<JsonValue> {
    let options = params.resolve_options(&server, &headers);
    Json(orchestrator.resolve_all(&identifier, &options).await)
}
