//! Provider client trait
//!
//! The HTTP implementation lives in `dossier-api`; tests use the scripted
//! fake from `dossier-test-utils`.

use crate::enums::QueryKind;
use crate::error::ProviderError;
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};

/// A completed HTTP exchange with the provider, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse {
    pub status_code: u16,
    pub text: String,
}

impl ProviderResponse {
    pub fn new(status_code: u16, text: impl Into<String>) -> Self {
        Self {
            status_code,
            text: text.into(),
        }
    }

    pub fn from_json(status_code: u16, body: &JsonValue) -> Self {
        Self::new(status_code, body.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// The body as JSON, if it is JSON.
    pub fn json(&self) -> Option<JsonValue> {
        serde_json::from_str(&self.text).ok()
    }

    /// The body as JSON, or the raw text wrapped as a JSON string.
    pub fn body(&self) -> JsonValue {
        self.json()
            .unwrap_or_else(|| JsonValue::String(self.text.clone()))
    }

    /// Correlation id from a trigger acknowledgment: `data.id`, else `id`.
    pub fn ack_correlation_id(&self) -> Option<String> {
        let body = self.json()?;
        body.get("data")
            .and_then(|data| data.get("id"))
            .and_then(id_string)
            .or_else(|| body.get("id").and_then(id_string))
    }
}

fn id_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Outbound trigger for an async kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerRequest {
    pub kind: QueryKind,
    pub identifier: String,
    /// Absolute URL the provider will POST the callback to.
    pub callback_url: String,
    pub session_token: String,
}

impl TriggerRequest {
    pub fn new(
        kind: QueryKind,
        identifier: impl Into<String>,
        callback_base: &str,
        session_token: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
            callback_url: format!("{}/webhook/{}", callback_base.trim_end_matches('/'), kind),
            session_token: session_token.into(),
        }
    }

    /// Request body sent to the provider. Stored verbatim as `request_payload`.
    pub fn payload(&self) -> JsonValue {
        match self.kind {
            QueryKind::AsyncNegativeCheck => json!({
                "cf_piva": self.identifier,
                "callback": {
                    "url": self.callback_url,
                    "method": "POST",
                    "field": "data",
                    "headers": { "session_id": self.session_token },
                },
            }),
            _ => json!({
                "callback": {
                    "url": self.callback_url,
                    "method": "JSON",
                    "headers": { "session_id": self.session_token },
                },
            }),
        }
    }
}

/// Calls to the external data provider.
///
/// Implementations return `Ok` for every completed HTTP exchange, including
/// non-2xx ones; `Err` means no usable response arrived.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Synchronous lookup (credit score).
    async fn lookup(
        &self,
        kind: QueryKind,
        identifier: &str,
    ) -> Result<ProviderResponse, ProviderError>;

    /// Fire an async request; the answer arrives later by callback.
    async fn trigger(&self, request: &TriggerRequest) -> Result<ProviderResponse, ProviderError>;

    /// Secondary detail for a completed async request.
    async fn fetch_detail(
        &self,
        kind: QueryKind,
        correlation_id: &str,
    ) -> Result<ProviderResponse, ProviderError>;
}
