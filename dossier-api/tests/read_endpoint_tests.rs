//! HTTP tests for the cache-or-provider read endpoints.


use axum::http::StatusCode;
use dossier_core::{LifecycleStatus, ProviderResponse, QueryKind};
use dossier_storage::RecordStore;
use dossier_test_utils::assertions::assert_single_active;
use dossier_test_utils::fixtures::{ack_response, transport_error};
use serde_json::json;
use test_support::TestApp;

// ============================================================================
// CREDIT SCORE (SYNC)
// ============================================================================

#[tokio::test]
async fn test_credit_score_served_from_cache() {
    let app = TestApp::new();

    let (status, first) = app.get("/credit-score/IT01").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["lifecycle_status"], "COMPLETED");
    assert_eq!(first["version_status"], "ACTIVE");

    let (status, second) = app.get("/credit-score/IT01").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["id"], second["id"]);
    assert_eq!(app.provider.lookup_count(), 1);
}

#[tokio::test]
async fn test_credit_score_update_supersedes_previous() {
    let app = TestApp::new();

    let (_, first) = app.get("/credit-score/IT01").await;
    let (_, second) = app.get("/credit-score/IT01?update=true").await;
    assert_ne!(first["id"], second["id"]);
    assert_eq!(app.provider.lookup_count(), 2);

    let rows = app.store.all_queries().await;
    assert_eq!(rows.len(), 2);
    assert_single_active(&rows, QueryKind::SyncLookup, "IT01");
}

#[tokio::test]
async fn test_credit_score_provider_error_is_stored_not_raised() {
    let app = TestApp::new();
    app.provider
        .push_lookup(Ok(ProviderResponse::new(404, r#"{"message":"not found"}"#)));

    let (status, body) = app.get("/credit-score/IT404").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lifecycle_status"], "ERROR");
    assert_eq!(body["status_code"], 404);
    assert_eq!(body["primary_response_payload"]["message"], "not found");
}

// ============================================================================
// ASYNC KINDS
// ============================================================================

#[tokio::test]
async fn test_company_full_trigger_then_pending() {
    let app = TestApp::new();
    app.provider.push_trigger(Ok(ack_response("corr-1")));

    let (status, body) = app
        .get("/company-full/IT02?notify=owner@example.com")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resolution"], "triggered");
    assert_eq!(body["request"]["lifecycle_status"], "PENDING");
    assert_eq!(body["request"]["correlation_id"], "corr-1");
    assert_eq!(body["request"]["notify_recipient"], "owner@example.com");
    assert_eq!(
        body["request"]["request_payload"]["callback"]["url"],
        "http://dossier.test/webhook/company-full"
    );

    let (_, again) = app.get("/company-full/IT02").await;
    assert_eq!(again["resolution"], "pending");
    assert_eq!(again["request"]["id"], body["request"]["id"]);
    assert_eq!(app.provider.trigger_count(), 1);
}

#[tokio::test]
async fn test_missing_ack_id_returns_500_and_persists_nothing() {
    let app = TestApp::new();
    app.provider
        .push_trigger(Ok(ProviderResponse::from_json(200, &json!({"data": {}}))));

    let (status, body) = app.get("/company-full/IT02").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["message"].as_str().unwrap().contains("missing ID"));
    assert!(app.store.all_queries().await.is_empty());
}

#[tokio::test]
async fn test_trigger_rejection_passes_provider_status_through() {
    let app = TestApp::new();
    app.provider
        .push_trigger(Ok(ProviderResponse::new(422, "cf_piva not valid")));

    let (status, body) = app.get("/negative-event?cf_piva=BAD").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "UPSTREAM_ERROR");
    assert!(body["message"].as_str().unwrap().contains("cf_piva not valid"));
}

#[tokio::test]
async fn test_trigger_transport_failure_is_500() {
    let app = TestApp::new();
    app.provider.push_trigger(Err(transport_error()));

    let (status, body) = app.get("/negative-event?cf_piva=CF1").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["message"].as_str().unwrap().contains("connection refused"));
}

#[tokio::test]
async fn test_negative_event_requires_cf_piva() {
    let app = TestApp::new();

    let (status, body) = app.get("/negative-event").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MISSING_FIELD");

    let (status, _) = app.get("/negative-event?cf_piva=%20").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.provider.calls().is_empty());
}

#[tokio::test]
async fn test_negative_event_response_has_null_detail_while_pending() {
    let app = TestApp::new();

    let (status, body) = app.get("/negative-event?cf_piva=CF1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resolution"], "triggered");
    assert!(body["detail"].is_null());
    assert_eq!(body["request"]["request_payload"]["cf_piva"], "CF1");
}

#[tokio::test]
async fn test_stale_error_row_is_retriggered() {
    let app = TestApp::new();
    let (_, first) = app.get("/negative-event?cf_piva=CF1").await;
    let id = first["request"]["id"].as_i64().unwrap();
    app.store
        .set_lifecycle_status(id, LifecycleStatus::Error)
        .await
        .unwrap();

    let (_, second) = app.get("/negative-event?cf_piva=CF1").await;
    assert_eq!(second["resolution"], "triggered");
    assert_ne!(second["request"]["id"], first["request"]["id"]);
    assert_single_active(
        &app.store.all_queries().await,
        QueryKind::AsyncNegativeCheck,
        "CF1",
    );
}

// ============================================================================
// COMPOSITE
// ============================================================================

#[tokio::test]
async fn test_composite_embeds_per_kind_errors() {
    let app = TestApp::new();
    app.provider.push_trigger(Ok(ProviderResponse::new(500, "down")));
    app.provider.push_trigger(Ok(ProviderResponse::new(500, "down")));

    let (status, body) = app.get("/company/IT01").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["credit-score"]["resolution"], "triggered");
    assert_eq!(body["credit-score"]["request"]["lifecycle_status"], "COMPLETED");
    assert!(body["negative-event"]["error"].as_str().unwrap().contains("500"));
    assert!(body["company-full"]["error"].as_str().unwrap().contains("500"));
}

#[tokio::test]
async fn test_composite_all_succeed() {
    let app = TestApp::new();

    let (_, body) = app.get("/company/IT01").await;
    assert_eq!(body["negative-event"]["resolution"], "triggered");
    assert_eq!(body["company-full"]["resolution"], "triggered");
    assert_eq!(app.provider.trigger_count(), 2);
    assert_eq!(app.provider.lookup_count(), 1);
}

// ============================================================================
// AMBIENT ROUTES
// ============================================================================

#[tokio::test]
async fn test_health_ready_pings_store() {
    let app = TestApp::new();
    let (status, body) = app.get("/health/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["details"]["store"]["status"], "healthy");
}

#[tokio::test]
async fn test_metrics_endpoint_counts_requests() {
    let app = TestApp::new();
    app.get("/credit-score/IT01").await;

    let response = tower::ServiceExt::oneshot(
        app.router.clone(),
        axum::http::Request::builder()
            .uri("/metrics")
            .body(axum::body::Body::empty())
            .unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("dossier_http_requests_total"));
    assert!(text.contains("/credit-score/:identifier"));
}

#[tokio::test]
async fn test_openapi_document_hides_webhooks() {
    let app = TestApp::new();
    let (status, doc) = app.get("/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    let paths = doc["paths"].as_object().unwrap();
    assert!(paths.contains_key("/company-full/{identifier}"));
    assert!(paths.keys().all(|p| !p.starts_with("/webhook")));
}
