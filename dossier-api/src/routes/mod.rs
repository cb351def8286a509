//! REST API Routes Module
//!
//! Includes:
//! - Read endpoints per query kind, plus the composite fan-out
//! - Provider callback receivers under /webhook/* (not documented)
//! - Health check endpoints (Kubernetes-compatible)
//! - Prometheus metrics and the OpenAPI document
//! - CORS support for browser-based clients

pub mod callbacks;
pub mod company_full;
pub mod composite;
pub mod credit_score;
pub mod health;
pub mod negative_event;

use std::time::Duration;

use axum::{
    http::{header, HeaderMap, HeaderValue, Method},
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::constants::DEV_SERVER_URL;
use crate::services::ResolveOptions;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

// ============================================================================
// SHARED EXTRACTORS
// ============================================================================

/// Query parameters common to the read endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct RefreshParams {
    /// Bypass the cache and query the provider again.
    #[serde(default)]
    pub update: bool,
    /// Who to notify when an async answer arrives.
    pub notify: Option<String>,
}

impl RefreshParams {
    fn recipient(&self) -> Option<String> {
        self.notify
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// Turn the parameters into orchestrator options for this request.
    pub fn resolve_options(&self, server: &ServerConfig, headers: &HeaderMap) -> ResolveOptions {
        ResolveOptions {
            force_refresh: self.update,
            notify_recipient: self.recipient(),
            callback_base_url: callback_base(server, headers),
        }
    }
}

/// Base URL the provider should call back on.
///
/// The configured public URL wins; otherwise it is derived from the `Host`
/// header (and `X-Forwarded-Proto`, if a proxy set one).
pub fn callback_base(server: &ServerConfig, headers: &HeaderMap) -> String {
    if let Some(base) = &server.public_base_url {
        return base.clone();
    }

    match header_str(headers, header::HOST.as_str()) {
        Some(host) => {
            let scheme = header_str(headers, "x-forwarded-proto").unwrap_or("http");
            format!("{}://{}", scheme, host)
        }
        None => DEV_SERVER_URL.to_string(),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

// ============================================================================
// OPENAPI
// ============================================================================

/// Handler for /openapi.json when Swagger UI is not serving it.
#[cfg(all(feature = "openapi", not(feature = "swagger-ui")))]
async fn openapi_json() -> axum::Json<utoipa::openapi::OpenApi> {
    use utoipa::OpenApi;
    axum::Json(crate::openapi::ApiDoc::openapi())
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ServerConfig.
///
/// In development mode (empty origins), allows all origins.
/// In production mode, only allows configured origins.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any).allow_headers(Any)
    } else {
        tracing::info!(
            "CORS: Production mode - allowing origins: {:?}",
            config.cors_origins
        );
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the complete API router.
///
/// - Read endpoints: /credit-score/{identifier}, /negative-event,
///   /company-full/{identifier}, /company/{identifier}
/// - Callback receivers: /webhook/negative-event, /webhook/company-full
/// - Health checks at /health/*
/// - Metrics at /metrics
/// - OpenAPI spec at /openapi.json, Swagger UI at /swagger-ui
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.server);

    #[allow(unused_mut)]
    let mut router = Router::new()
        .route("/credit-score/:identifier", get(credit_score::get_credit_score))
        .route("/negative-event", get(negative_event::get_negative_event))
        .route("/company-full/:identifier", get(company_full::get_company_full))
        .route("/company/:identifier", get(composite::get_company))
        .route(
            "/webhook/negative-event",
            post(callbacks::negative_event_callback),
        )
        .route("/webhook/company-full", post(callbacks::company_full_callback))
        .nest("/health", health::create_router())
        .route("/metrics", get(metrics_handler))
        .with_state(state);

    #[cfg(feature = "swagger-ui")]
    {
        use utoipa::OpenApi;
        use utoipa_swagger_ui::SwaggerUi;
        router = router.merge(
            SwaggerUi::new("/swagger-ui").url("/openapi.json", crate::openapi::ApiDoc::openapi()),
        );
    }

    #[cfg(all(feature = "openapi", not(feature = "swagger-ui")))]
    {
        router = router.route("/openapi.json", get(openapi_json));
    }

    // Execution order: CORS -> Trace -> Observability -> Handler
    router
        .layer(from_fn(observability_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
