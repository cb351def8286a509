//! Negative-event check.
//!
//! Asynchronous with a detail step: once the callback reports completion the
//! detail document is fetched and stored alongside the request.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use dossier_core::{DetailRecord, QueryKind, TrackedQuery};
use dossier_storage::RecordStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::RefreshParams;
use crate::config::ServerConfig;
use crate::error::{ApiError, ApiResult};
use crate::services::{RequestOrchestrator, ResolutionKind};

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct NegativeEventParams {
    /// Tax code or VAT number to check.
    pub cf_piva: Option<String>,
    #[serde(default)]
    pub update: bool,
    pub notify: Option<String>,
}

/// Negative-event read response.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct NegativeEventResponse {
    pub request: TrackedQuery,
    /// Present once the detail fetch has succeeded.
    pub detail: Option<DetailRecord>,
    pub resolution: ResolutionKind,
}

/// GET /negative-event?cf_piva= - Cached check or new provider request
#[utoipa::path(
    get,
    path = "/negative-event",
    tag = "Lookups",
    params(NegativeEventParams),
    responses(
        (status = 200, description = "Current check and its detail", body = NegativeEventResponse),
        (status = 400, description = "Missing cf_piva", body = ApiError),
        (status = 500, description = "Provider or storage failure", body = ApiError),
    ),
)]
pub async fn get_negative_event(
    State(orchestrator): State<RequestOrchestrator>,
    State(store): State<Arc<dyn RecordStore>>,
    State(server): State<Arc<ServerConfig>>,
    Query(params): Query<NegativeEventParams>,
    headers: HeaderMap,
) -> ApiResult<Json<NegativeEventResponse>> {
    let identifier = params
        .cf_piva
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::missing_field("cf_piva"))?
        .to_string();

    let refresh = RefreshParams {
        update: params.update,
        notify: params.notify,
    };
    let options = refresh.resolve_options(&server, &headers);
    let resolution = orchestrator
        .resolve(QueryKind::AsyncNegativeCheck, &identifier, &options)
        .await?;

    let detail = store.get_detail(resolution.record().id).await?;
    Ok(Json(NegativeEventResponse {
        resolution: resolution.kind(),
        request: resolution.into_record(),
        detail,
    }))
}
