//! Prometheus Metrics Definitions
//!
//! Defines all dossier metrics with appropriate labels and types.
//! Exposes a /metrics endpoint for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use dossier_core::QueryKind;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s, 30s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<DossierMetrics>> = Lazy::new(DossierMetrics::new);

/// Container for all dossier metrics.
#[derive(Clone)]
pub struct DossierMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Provider call counter - labels: kind, operation, outcome
    pub provider_calls_total: CounterVec,

    /// Inbound callback counter - labels: kind, outcome
    pub callbacks_total: CounterVec,

    /// Detail fetch counter - labels: outcome
    pub detail_fetches_total: CounterVec,
}

fn registration_error(name: &str, e: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, e))
}

impl DossierMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "dossier_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| registration_error("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "dossier_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("http_request_duration_seconds", e))?,

            provider_calls_total: register_counter_vec!(
                "dossier_provider_calls_total",
                "Total calls to the external data provider",
                &["kind", "operation", "outcome"]
            )
            .map_err(|e| registration_error("provider_calls_total", e))?,

            callbacks_total: register_counter_vec!(
                "dossier_callbacks_total",
                "Total inbound provider callbacks",
                &["kind", "outcome"]
            )
            .map_err(|e| registration_error("callbacks_total", e))?,

            detail_fetches_total: register_counter_vec!(
                "dossier_detail_fetches_total",
                "Total secondary detail fetches",
                &["outcome"]
            )
            .map_err(|e| registration_error("detail_fetches_total", e))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }
}

/// Count a provider call. No-op if metrics failed to register.
pub fn record_provider_call(kind: QueryKind, operation: &str, outcome: &str) {
    if let Ok(metrics) = METRICS.as_ref() {
        metrics
            .provider_calls_total
            .with_label_values(&[kind.as_str(), operation, outcome])
            .inc();
    }
}

/// Count an inbound callback by how it was reconciled.
pub fn record_callback(kind: QueryKind, outcome: &str) {
    if let Ok(metrics) = METRICS.as_ref() {
        metrics
            .callbacks_total
            .with_label_values(&[kind.as_str(), outcome])
            .inc();
    }
}

/// Count a detail fetch.
pub fn record_detail_fetch(success: bool) {
    if let Ok(metrics) = METRICS.as_ref() {
        let outcome = if success { "success" } else { "error" };
        metrics.detail_fetches_total.with_label_values(&[outcome]).inc();
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Observability",
    responses(
        (status = 200, description = "Prometheus metrics in text format", content_type = "text/plain"),
        (status = 500, description = "Failed to encode metrics"),
    ),
)]
pub async fn metrics_handler() -> impl IntoResponse {
    // Touch the registry so counters exist before the first scrape.
    Lazy::force(&METRICS);

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
