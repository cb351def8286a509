//! Property and scenario tests for the callback receivers.
//!
//! The provider must always get a 200 success envelope back, whatever it
//! sends; only a matched (or, for full profiles, identifiable) callback may
//! change stored state.


use axum::http::StatusCode;
use dossier_core::{DetailIndicators, LifecycleStatus, ProviderResponse, QueryKind};
use dossier_storage::RecordStore;
use dossier_test_utils::assertions::{assert_lifecycle, assert_single_active};
use dossier_test_utils::eventually;
use dossier_test_utils::fixtures::{
    company_callback_body, detail_response, negative_callback_body, pending_query,
};
use dossier_test_utils::generators::{arb_async_kind, arb_indicators, arb_vat_code};
use proptest::prelude::*;
use test_support::{TestApp, DEFAULT_RECIPIENT};

const FORM: (&str, &str) = ("content-type", "application/x-www-form-urlencoded");
const JSON: (&str, &str) = ("content-type", "application/json");

// ============================================================================
// SCENARIOS
// ============================================================================

#[tokio::test]
async fn test_negative_callback_completes_with_detail() {
    let app = TestApp::new();
    app.provider.push_detail(Ok(detail_response(DetailIndicators {
        prejudicial_events: false,
        insolvency_procedures: true,
        protests: false,
    })));
    let (_, read) = app.get("/negative-event?cf_piva=CF1").await;
    let id = read["request"]["id"].as_i64().unwrap();
    let correlation = read["request"]["correlation_id"].as_str().unwrap().to_string();

    let (status, ack) = app
        .callback(
            "negative-event",
            &[FORM],
            negative_callback_body(&correlation, "completed"),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["success"], true);
    assert_eq!(ack["request_id"], id);
    assert_eq!(ack["matched_by"], "correlation_id");

    let store = app.store.clone();
    assert!(
        eventually(|| {
            let store = store.clone();
            async move { matches!(store.get_detail(id).await, Ok(Some(_))) }
        })
        .await,
        "detail record never stored"
    );

    let (_, read) = app.get("/negative-event?cf_piva=CF1").await;
    assert_eq!(read["resolution"], "cached");
    assert_eq!(read["request"]["lifecycle_status"], "COMPLETED");
    assert_eq!(read["detail"]["has_insolvency_procedures"], true);
    assert_eq!(read["detail"]["has_protests"], false);
    assert_eq!(app.provider.detail_count(), 1);
}

#[tokio::test]
async fn test_detail_failure_marks_request_error() {
    let app = TestApp::new();
    app.provider
        .push_detail(Ok(ProviderResponse::new(502, "bad gateway")));
    let (_, read) = app.get("/negative-event?cf_piva=CF2").await;
    let id = read["request"]["id"].as_i64().unwrap();
    let correlation = read["request"]["correlation_id"].as_str().unwrap().to_string();

    app.callback(
        "negative-event",
        &[FORM],
        negative_callback_body(&correlation, "completed"),
    )
    .await;

    let store = app.store.clone();
    assert!(
        eventually(|| {
            let store = store.clone();
            async move {
                matches!(
                    store.get_query(id).await,
                    Ok(Some(q)) if q.lifecycle_status == LifecycleStatus::Error
                )
            }
        })
        .await
    );
    let row = app.store.get_query(id).await.unwrap().unwrap();
    assert!(row.callback_payload.is_some());
    assert!(app.store.get_detail(id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_session_header_matches_when_body_has_no_id() {
    let app = TestApp::new();
    let target = app
        .store
        .insert_query(pending_query(
            QueryKind::AsyncNegativeCheck,
            "CF5",
            "corr-5",
            "dossier_0123456789abcdef",
        ))
        .await
        .unwrap();
    app.store
        .insert_query(pending_query(
            QueryKind::AsyncNegativeCheck,
            "CF6",
            "corr-6",
            "dossier_fedcba9876543210",
        ))
        .await
        .unwrap();

    let (status, ack) = app
        .callback(
            "negative-event",
            &[JSON, ("session_id", "dossier_0123456789abcdef")],
            r#"{"esito": "ok"}"#,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["request_id"], target.id);
    assert_eq!(ack["matched_by"], "session_token");
}

#[tokio::test]
async fn test_empty_body_matches_by_callback_id_header() {
    let app = TestApp::new();
    let target = app
        .store
        .insert_query(pending_query(
            QueryKind::AsyncFullProfile,
            "IT8",
            "Y",
            "dossier_bbbbbbbbbbbbbbbb",
        ))
        .await
        .unwrap();

    let (status, ack) = app
        .callback("company-full", &[("x-callback-id", "Y")], "")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["request_id"], target.id);
    assert_eq!(ack["correlation_id"], "Y");
    assert_eq!(ack["matched_by"], "correlation_id");
}

#[tokio::test]
async fn test_full_profile_callback_without_id_matches_by_vat_code() {
    let app = TestApp::new();
    let (_, read) = app
        .get("/company-full/IT12345678901?notify=owner@example.com")
        .await;
    let id = read["request"]["id"].as_i64().unwrap();

    let (_, ack) = app
        .callback(
            "company-full",
            &[JSON],
            company_callback_body("IT12345678901").to_string(),
        )
        .await;
    assert_eq!(ack["request_id"], id);
    assert_eq!(ack["matched_by"], "identifier_exact");
    assert_eq!(ack["notified"], true);

    let sent = app.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "owner@example.com");
    assert_eq!(sent[0].kind, QueryKind::AsyncFullProfile);

    let (_, read) = app.get("/company-full/IT12345678901").await;
    assert_eq!(read["resolution"], "cached");
    assert_eq!(
        read["request"]["callback_payload"]["data"]["companyDetails"]["companyName"],
        "ACME SRL"
    );
}

#[tokio::test]
async fn test_unsolicited_full_profile_creates_active_row() {
    let app = TestApp::new();

    let (status, ack) = app
        .callback(
            "company-full",
            &[JSON],
            company_callback_body("IT999").to_string(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(ack.get("matched_by").is_none());
    assert_eq!(app.notifier.sent()[0].recipient, DEFAULT_RECIPIENT);

    let (_, read) = app.get("/company-full/IT999").await;
    assert_eq!(read["resolution"], "cached");
    assert_eq!(app.provider.trigger_count(), 0);
}

#[tokio::test]
async fn test_duplicate_negative_callback_updates_in_place() {
    let app = TestApp::new();
    let (_, read) = app.get("/negative-event?cf_piva=CF3").await;
    let id = read["request"]["id"].as_i64().unwrap();
    let correlation = read["request"]["correlation_id"].as_str().unwrap().to_string();
    let body = negative_callback_body(&correlation, "completed");

    for delivery in 1..=2 {
        let (status, ack) = app.callback("negative-event", &[FORM], body.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["request_id"], id);

        let provider = app.provider.clone();
        let store = app.store.clone();
        assert!(
            eventually(|| {
                let provider = provider.clone();
                let store = store.clone();
                async move {
                    provider.detail_count() == delivery
                        && matches!(store.get_detail(id).await, Ok(Some(_)))
                }
            })
            .await
        );
    }

    assert_eq!(app.store.all_queries().await.len(), 1);
    assert_eq!(app.store.all_details().await.len(), 1);
    let row = app.store.get_query(id).await.unwrap().unwrap();
    assert_lifecycle(&row, LifecycleStatus::Completed);
}

#[tokio::test]
async fn test_duplicate_full_profile_callback_updates_in_place() {
    let app = TestApp::new();
    let (_, read) = app.get("/company-full/IT55").await;
    let id = read["request"]["id"].as_i64().unwrap();
    let correlation = read["request"]["correlation_id"].as_str().unwrap().to_string();
    let body = serde_json::json!({"id": correlation, "data": {"companyDetails": {"vatCode": "IT55"}}});

    for _ in 0..2 {
        let (_, ack) = app
            .callback("company-full", &[JSON], body.to_string())
            .await;
        assert_eq!(ack["request_id"], id);
        assert_eq!(ack["matched_by"], "correlation_id");
    }

    let rows = app.store.all_queries().await;
    assert_eq!(rows.len(), 1);
    assert_lifecycle(&rows[0], LifecycleStatus::Completed);
}

#[tokio::test]
async fn test_duplicate_unsolicited_callback_reuses_created_row() {
    let app = TestApp::new();
    let body = company_callback_body("IT777").to_string();

    let (_, first) = app.callback("company-full", &[JSON], body.clone()).await;
    let (_, second) = app.callback("company-full", &[JSON], body).await;
    assert!(first.get("matched_by").is_none());
    assert_eq!(second["matched_by"], "identifier_exact");
    assert_eq!(second["request_id"], first["request_id"]);

    let rows = app.store.all_queries().await;
    assert_eq!(rows.len(), 1);
    assert_single_active(&rows, QueryKind::AsyncFullProfile, "IT777");
}

#[tokio::test]
async fn test_store_outage_still_acknowledged() {
    use axum::body::Body;
    use axum::http::Request;
    use dossier_api::{create_router, AppState, ServerConfig};
    use dossier_test_utils::{FakeProvider, OfflineStore, RecordingNotifier};
    use std::sync::Arc;
    use tower::ServiceExt;

    let router = create_router(AppState::new(
        ServerConfig::default(),
        Arc::new(OfflineStore::new()),
        Arc::new(FakeProvider::new()),
        Arc::new(RecordingNotifier::new()),
        None,
    ));
    let request = Request::builder()
        .method("POST")
        .uri("/webhook/company-full")
        .header("content-type", "application/json")
        .body(Body::from(company_callback_body("IT5").to_string()))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let ack: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(ack["success"], true);
    assert!(ack["warning"].as_str().unwrap().contains("unavailable"));
}

#[tokio::test]
async fn test_header_field_overwrites_body_field() {
    // Header layers merge after the body; a body key named like a header key
    // loses. Kept as-is: the provider never sends such keys.
    let app = TestApp::new();
    app.store
        .insert_query(pending_query(
            QueryKind::AsyncFullProfile,
            "IT7",
            "corr-7",
            "dossier_aaaaaaaaaaaaaaaa",
        ))
        .await
        .unwrap();

    app.callback(
        "company-full",
        &[JSON, ("x-trace", "from-header")],
        r#"{"id": "corr-7", "header_x_trace": "from-body"}"#,
    )
    .await;

    let rows = app.store.all_queries().await;
    assert_eq!(
        rows[0].callback_payload.as_ref().unwrap()["header_x_trace"],
        "from-header"
    );
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Any body on either receiver gets 200 and `success: true`.
    #[test]
    fn prop_receivers_always_acknowledge(
        body in proptest::collection::vec(any::<u8>(), 0..256),
        form in any::<bool>(),
        full_profile in any::<bool>(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let app = TestApp::new();
            let kind = if full_profile { "company-full" } else { "negative-event" };
            let headers: &[(&str, &str)] = if form { &[FORM] } else { &[] };

            let (status, ack) = app.callback(kind, headers, body).await;
            prop_assert_eq!(status, StatusCode::OK);
            prop_assert_eq!(&ack["success"], &serde_json::Value::Bool(true));
            Ok(())
        })?;
    }

    /// An unknown correlation id never changes stored rows.
    #[test]
    fn prop_unknown_correlation_id_mutates_nothing(
        correlation in "[a-z0-9]{8,16}",
        identifier in arb_vat_code(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let app = TestApp::new();
            // A completed row: nothing pending for the fallback to grab.
            let (_, read) = app
                .get(&format!("/credit-score/{}", identifier))
                .await;
            let before = app.store.all_queries().await;

            let (status, ack) = app
                .callback(
                    "negative-event",
                    &[FORM],
                    negative_callback_body(&format!("x-{}", correlation), "completed"),
                )
                .await;

            prop_assert_eq!(status, StatusCode::OK);
            prop_assert!(ack["warning"].as_str().map_or(false, |w| !w.is_empty()));
            prop_assert_eq!(app.store.all_queries().await, before);
            prop_assert!(app.store.all_details().await.is_empty());
            prop_assert_eq!(read["lifecycle_status"].as_str(), Some("COMPLETED"));
            Ok(())
        })?;
    }

    /// A callback carrying the correlation id of a triggered row matches it,
    /// whichever async kind it is for.
    #[test]
    fn prop_correlation_id_matches_triggered_row(
        kind in arb_async_kind(),
        identifier in arb_vat_code(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let app = TestApp::new();
            let uri = match kind {
                QueryKind::AsyncNegativeCheck => format!("/negative-event?cf_piva={}", identifier),
                _ => format!("/company-full/{}", identifier),
            };
            let (_, read) = app.get(&uri).await;
            let id = read["request"]["id"].as_i64().unwrap();
            let correlation = read["request"]["correlation_id"].as_str().unwrap().to_string();

            let (_, ack) = app
                .callback(
                    kind.as_str(),
                    &[JSON],
                    serde_json::json!({"id": correlation}).to_string(),
                )
                .await;
            prop_assert_eq!(ack["request_id"].as_i64(), Some(id));
            prop_assert_eq!(ack["matched_by"].as_str(), Some("correlation_id"));

            let row = app.store.get_query(id).await.unwrap().unwrap();
            prop_assert!(row.callback_payload.is_some());
            Ok(())
        })?;
    }

    /// The stored detail mirrors whatever flags the provider reports.
    #[test]
    fn prop_detail_flags_mirror_provider(flags in arb_indicators()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let app = TestApp::new();
            app.provider.push_detail(Ok(detail_response(flags)));
            let (_, read) = app.get("/negative-event?cf_piva=CF9").await;
            let id = read["request"]["id"].as_i64().unwrap();
            let correlation = read["request"]["correlation_id"].as_str().unwrap().to_string();

            app.callback(
                "negative-event",
                &[FORM],
                negative_callback_body(&correlation, "completed"),
            )
            .await;

            let store = app.store.clone();
            let stored = eventually(|| {
                let store = store.clone();
                async move { matches!(store.get_detail(id).await, Ok(Some(_))) }
            })
            .await;
            prop_assert!(stored);

            let detail = app.store.get_detail(id).await.unwrap().unwrap();
            prop_assert_eq!(detail.indicators(), flags);
            let row = app.store.get_query(id).await.unwrap().unwrap();
            assert_lifecycle(&row, LifecycleStatus::Completed);
            Ok(())
        })?;
    }
}
