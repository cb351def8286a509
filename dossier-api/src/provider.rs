//! HTTP client for the external data provider.
//!
//! Returns every completed exchange as a [`ProviderResponse`], whatever its
//! status; callers decide what a non-2xx answer means for their kind.

use crate::config::ProviderConfig;
use crate::error::{ApiError, ApiResult};
use crate::telemetry::metrics::record_provider_call;
use async_trait::async_trait;
use dossier_core::{ProviderClient, ProviderError, ProviderResponse, QueryKind, TriggerRequest};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct HttpProviderClient {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl HttpProviderClient {
    pub fn new(config: ProviderConfig) -> ApiResult<Self> {
        // No client-wide timeout: each call sets its own.
        let client = reqwest::Client::builder()
            .user_agent("dossier/0.1")
            .build()
            .map_err(|e| ApiError::internal_error(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// Only the credit score is looked up synchronously.
    fn lookup_url(&self, identifier: &str) -> Result<Url, ProviderError> {
        endpoint(
            "lookup",
            &self.config.risk_base_url,
            &["IT-creditscore-top", identifier],
        )
    }

    fn trigger_url(&self, request: &TriggerRequest) -> Result<Url, ProviderError> {
        match request.kind {
            QueryKind::AsyncFullProfile => endpoint(
                "trigger",
                &self.config.company_base_url,
                &["IT-full", &request.identifier],
            ),
            _ => endpoint("trigger", &self.config.risk_base_url, &["IT-negativita"]),
        }
    }

    fn detail_url(&self, correlation_id: &str) -> Result<Url, ProviderError> {
        endpoint(
            "detail",
            &self.config.risk_base_url,
            &["IT-negativita", correlation_id, "dettaglio"],
        )
    }

    fn token_for(&self, kind: QueryKind) -> Option<&str> {
        match kind {
            QueryKind::AsyncFullProfile => self.config.company_token.as_deref(),
            _ => self.config.risk_token.as_deref(),
        }
    }

    async fn send(
        &self,
        kind: QueryKind,
        operation: &'static str,
        builder: reqwest::RequestBuilder,
        timeout: Option<Duration>,
    ) -> Result<ProviderResponse, ProviderError> {
        let mut builder = match self.token_for(kind) {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        };
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let result = async {
            let response = builder.send().await?;
            let status = response.status().as_u16();
            let text = response.text().await?;
            Ok::<_, reqwest::Error>(ProviderResponse::new(status, text))
        }
        .await;

        match result {
            Ok(response) => {
                let outcome = if response.is_success() { "ok" } else { "status" };
                record_provider_call(kind, operation, outcome);
                tracing::debug!(
                    kind = %kind,
                    operation,
                    status = response.status_code,
                    "Provider call completed"
                );
                Ok(response)
            }
            Err(e) if e.is_timeout() => {
                record_provider_call(kind, operation, "timeout");
                tracing::warn!(kind = %kind, operation, "Provider call timed out");
                Err(ProviderError::Timeout {
                    operation: operation.to_string(),
                })
            }
            Err(e) => {
                record_provider_call(kind, operation, "transport");
                tracing::warn!(kind = %kind, operation, error = %e, "Provider call failed");
                Err(ProviderError::Transport {
                    operation: operation.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }
}

/// `base` with `segments` appended, each percent-encoded as one path segment.
fn endpoint(operation: &str, base: &str, segments: &[&str]) -> Result<Url, ProviderError> {
    let invalid = |reason: String| ProviderError::Transport {
        operation: operation.to_string(),
        message: format!("invalid provider URL {}: {}", base, reason),
    };
    let mut url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| invalid("cannot be a base".to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn lookup(
        &self,
        kind: QueryKind,
        identifier: &str,
    ) -> Result<ProviderResponse, ProviderError> {
        let builder = self.client.get(self.lookup_url(identifier)?);
        self.send(kind, "lookup", builder, Some(self.config.sync_timeout))
            .await
    }

    async fn trigger(&self, request: &TriggerRequest) -> Result<ProviderResponse, ProviderError> {
        let builder = self
            .client
            .post(self.trigger_url(request)?)
            .json(&request.payload());
        self.send(request.kind, "trigger", builder, self.config.trigger_timeout)
            .await
    }

    async fn fetch_detail(
        &self,
        kind: QueryKind,
        correlation_id: &str,
    ) -> Result<ProviderResponse, ProviderError> {
        let builder = self.client.get(self.detail_url(correlation_id)?);
        self.send(kind, "detail", builder, self.config.detail_timeout)
            .await
    }
}
