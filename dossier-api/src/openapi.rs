//! OpenAPI Specification for the Dossier API
//!
//! Generated by utoipa from route annotations. The provider callback
//! receivers under /webhook/* are deliberately absent.

use utoipa::OpenApi;

use crate::error::{ApiError, ErrorCode};
use crate::routes::company_full::CompanyFullResponse;
use crate::routes::health::{HealthReport, HealthState, ReadinessDetails, StoreHealth};
use crate::routes::negative_event::NegativeEventResponse;
use crate::routes::{company_full, composite, credit_score, health, negative_event};
use crate::services::ResolutionKind;
use crate::telemetry::metrics;

use dossier_core::{DetailRecord, LifecycleStatus, QueryKind, TrackedQuery, VersionStatus};

/// OpenAPI document for the Dossier API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Dossier API",
        version = "0.1.0",
        description = "Versioned cache and callback reconciliation in front of a company data provider",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local Development")
    ),
    tags(
        (name = "Lookups", description = "Cache-or-provider reads per query kind"),
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Observability", description = "Prometheus metrics")
    ),
    paths(
        credit_score::get_credit_score,
        negative_event::get_negative_event,
        company_full::get_company_full,
        composite::get_company,
        health::ping,
        health::liveness,
        health::readiness,
        metrics::metrics_handler,
    ),
    components(
        schemas(
            ApiError, ErrorCode,
            TrackedQuery, DetailRecord, QueryKind, LifecycleStatus, VersionStatus,
            ResolutionKind, NegativeEventResponse, CompanyFullResponse,
            HealthReport, HealthState, ReadinessDetails, StoreHealth,
        )
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate OpenAPI spec as JSON string.
    pub fn to_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_generation() -> Result<(), String> {
        let openapi = ApiDoc::openapi();
        assert_eq!(openapi.info.title, "Dossier API");

        let tags = openapi
            .tags
            .as_ref()
            .ok_or_else(|| "OpenAPI tags missing".to_string())?;
        assert_eq!(tags.len(), 3);
        Ok(())
    }

    #[test]
    fn test_openapi_json_serialization() -> Result<(), String> {
        let json = ApiDoc::to_json().map_err(|e| format!("Failed to serialize OpenAPI: {}", e))?;
        serde_json::from_str::<serde_json::Value>(&json)
            .map_err(|e| format!("Generated JSON invalid: {}", e))?;
        assert!(json.contains("Dossier API"));
        Ok(())
    }

    #[test]
    fn test_read_paths_documented_and_webhooks_hidden() {
        let paths = ApiDoc::openapi().paths.paths;
        assert!(paths.contains_key("/credit-score/{identifier}"));
        assert!(paths.contains_key("/negative-event"));
        assert!(paths.contains_key("/company-full/{identifier}"));
        assert!(paths.contains_key("/company/{identifier}"));
        assert!(paths.contains_key("/health/ready"));
        assert!(paths.keys().all(|p| !p.starts_with("/webhook")));
    }
}
