//! Full company profile.
//!
//! Asynchronous: a trigger returns a PENDING row right away and the provider
//! delivers the profile to /webhook/company-full later.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use dossier_core::{QueryKind, TrackedQuery};
use serde::Serialize;
use std::sync::Arc;

use super::RefreshParams;
use crate::config::ServerConfig;
use crate::error::{ApiError, ApiResult};
use crate::services::{RequestOrchestrator, ResolutionKind};

/// Company profile read response.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CompanyFullResponse {
    pub request: TrackedQuery,
    pub resolution: ResolutionKind,
}

/// GET /company-full/{identifier} - Cached profile or new provider request
#[utoipa::path(
    get,
    path = "/company-full/{identifier}",
    tag = "Lookups",
    params(
        ("identifier" = String, Path, description = "VAT number"),
        RefreshParams,
    ),
    responses(
        (status = 200, description = "Current profile request", body = CompanyFullResponse),
        (status = 400, description = "Invalid identifier", body = ApiError),
        (status = 500, description = "Provider or storage failure", body = ApiError),
    ),
)]
pub async fn get_company_full(
    State(orchestrator): State<RequestOrchestrator>,
    State(server): State<Arc<ServerConfig>>,
    Path(identifier): Path<String>,
    Query(params): Query<RefreshParams>,
    headers: HeaderMap,
) -> ApiResult<Json<CompanyFullResponse>> {
    let options = params.resolve_options(&server, &headers);
    let resolution = orchestrator
        .resolve(QueryKind::AsyncFullProfile, &identifier, &options)
        .await?;
    Ok(Json(CompanyFullResponse {
        resolution: resolution.kind(),
        request: resolution.into_record(),
    }))
}
