//! Provider callback receivers.
//!
//! Unauthenticated and left out of the OpenAPI document. They always answer
//! 200 so the provider never retries.

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use dossier_core::{CallbackInput, QueryKind};

use crate::services::{CallbackAck, CallbackReconciler};

fn callback_input(headers: &HeaderMap, body: Bytes) -> CallbackInput {
    let headers = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    CallbackInput {
        body: body.to_vec(),
        headers,
    }
}

async fn receive(
    reconciler: &CallbackReconciler,
    kind: QueryKind,
    headers: &HeaderMap,
    body: Bytes,
) -> Json<CallbackAck> {
    let input = callback_input(headers, body);
    // The detail fetch, if any, keeps running after the response.
    let outcome = reconciler.handle(kind, &input).await;
    Json(outcome.ack)
}

/// POST /webhook/negative-event
pub async fn negative_event_callback(
    State(reconciler): State<CallbackReconciler>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<CallbackAck> {
    receive(&reconciler, QueryKind::AsyncNegativeCheck, &headers, body).await
}

/// POST /webhook/company-full
pub async fn company_full_callback(
    State(reconciler): State<CallbackReconciler>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<CallbackAck> {
    receive(&reconciler, QueryKind::AsyncFullProfile, &headers, body).await
}
