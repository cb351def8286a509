//! Read-path orchestration: serve from the versioned cache or call the
//! provider.
//!
//! A sync kind is looked up inline and stored as a completed row. An async
//! kind is triggered and stored as a PENDING row that a later callback
//! completes.
//!
//! Demoting the previous ACTIVE row and inserting the new one are two
//! separate store calls. A failed trigger after a forced demote leaves no
//! ACTIVE row, and two concurrent refreshes can both insert.

use crate::constants::{SESSION_TOKEN_HEX_LEN, SESSION_TOKEN_PREFIX};
use dossier_core::{
    DossierError, DossierResult, LifecycleStatus, NewTrackedQuery, ProviderClient, ProviderError,
    QueryKind, TrackedQuery, TriggerRequest,
};
use dossier_storage::RecordStore;
use futures_util::future::join_all;
use serde::Serialize;
use serde_json::{json, Map, Value as JsonValue};
use std::sync::Arc;
use uuid::Uuid;

/// Per-request knobs for [`RequestOrchestrator::resolve`].
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Skip the cache and call the provider.
    pub force_refresh: bool,
    /// Stored on async rows; notified when the callback lands.
    pub notify_recipient: Option<String>,
    /// Base the provider should call back on, e.g. `https://dossier.example`.
    pub callback_base_url: String,
}

/// Where the returned row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum ResolutionKind {
    Cached,
    Pending,
    Triggered,
}

/// Outcome of a read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "resolution", content = "request", rename_all = "lowercase")]
pub enum Resolution {
    /// ACTIVE completed row served without calling the provider.
    Cached(TrackedQuery),
    /// ACTIVE row still waiting for its callback.
    Pending(TrackedQuery),
    /// Provider was called and a new ACTIVE row stored.
    Triggered(TrackedQuery),
}

impl Resolution {
    pub fn kind(&self) -> ResolutionKind {
        match self {
            Resolution::Cached(_) => ResolutionKind::Cached,
            Resolution::Pending(_) => ResolutionKind::Pending,
            Resolution::Triggered(_) => ResolutionKind::Triggered,
        }
    }

    pub fn record(&self) -> &TrackedQuery {
        match self {
            Resolution::Cached(q) | Resolution::Pending(q) | Resolution::Triggered(q) => q,
        }
    }

    pub fn into_record(self) -> TrackedQuery {
        match self {
            Resolution::Cached(q) | Resolution::Pending(q) | Resolution::Triggered(q) => q,
        }
    }
}

/// A fresh `dossier_<16 hex>` token for one async request.
pub fn new_session_token() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{}{}", SESSION_TOKEN_PREFIX, &hex[..SESSION_TOKEN_HEX_LEN])
}

/// Decides between cache and provider for every read endpoint.
#[derive(Clone)]
pub struct RequestOrchestrator {
    store: Arc<dyn RecordStore>,
    provider: Arc<dyn ProviderClient>,
}

impl RequestOrchestrator {
    pub fn new(store: Arc<dyn RecordStore>, provider: Arc<dyn ProviderClient>) -> Self {
        Self { store, provider }
    }

    /// Resolve one (kind, identifier) pair.
    ///
    /// # Arguments
    ///
    /// * `kind` - Which provider query
    /// * `identifier` - Tax code or VAT number, used verbatim
    /// * `options` - Refresh flag, recipient and callback base
    ///
    /// # Errors
    ///
    /// Returns [`DossierError::InvalidInput`] for a blank identifier. For
    /// async kinds, a provider failure is returned and nothing is inserted.
    /// Sync lookups never fail on provider errors; they store an ERROR row.
    pub async fn resolve(
        &self,
        kind: QueryKind,
        identifier: &str,
        options: &ResolveOptions,
    ) -> DossierResult<Resolution> {
        if identifier.trim().is_empty() {
            return Err(DossierError::InvalidInput(
                "identifier must not be empty".to_string(),
            ));
        }

        if kind.is_async() {
            self.resolve_async(kind, identifier, options).await
        } else {
            self.resolve_sync(kind, identifier, options).await
        }
    }

    /// Resolve every kind for one identifier concurrently.
    ///
    /// A failing kind does not fail the whole answer: its slot holds
    /// `{"error": "<message>"}`.
    pub async fn resolve_all(&self, identifier: &str, options: &ResolveOptions) -> JsonValue {
        let results = join_all(
            QueryKind::ALL
                .iter()
                .map(|kind| self.resolve(*kind, identifier, options)),
        )
        .await;

        let mut composite = Map::new();
        for (kind, result) in QueryKind::ALL.iter().zip(results) {
            let slot = match result.map(|r| serde_json::to_value(&r)) {
                Ok(Ok(value)) => value,
                Ok(Err(e)) => json!({ "error": e.to_string() }),
                Err(e) => {
                    tracing::warn!(kind = %kind, identifier, error = %e, "Composite slot failed");
                    json!({ "error": e.to_string() })
                }
            };
            composite.insert(kind.as_str().to_string(), slot);
        }
        JsonValue::Object(composite)
    }

    async fn resolve_sync(
        &self,
        kind: QueryKind,
        identifier: &str,
        options: &ResolveOptions,
    ) -> DossierResult<Resolution> {
        if !options.force_refresh {
            if let Some(active) = self.store.find_active(kind, identifier).await? {
                tracing::debug!(kind = %kind, identifier, id = active.id, "Serving cached lookup");
                return Ok(Resolution::Cached(active));
            }
        }

        let new = match self.provider.lookup(kind, identifier).await {
            Ok(response) => {
                let status = if response.is_success() {
                    LifecycleStatus::Completed
                } else {
                    tracing::warn!(
                        kind = %kind,
                        identifier,
                        status = response.status_code,
                        "Lookup returned an error status"
                    );
                    LifecycleStatus::Error
                };
                NewTrackedQuery::new(kind, identifier, status)
                    .with_response(response.body(), Some(i32::from(response.status_code)))
            }
            Err(e) => {
                tracing::warn!(kind = %kind, identifier, error = %e, "Lookup failed");
                NewTrackedQuery::new(kind, identifier, LifecycleStatus::Error).with_response(
                    json!({ "error": e.to_string() }),
                    e.upstream_status().map(i32::from),
                )
            }
        };

        let demoted = self.store.demote_active(kind, identifier).await?;
        let record = self.store.insert_query(new).await?;
        tracing::info!(
            kind = %kind,
            identifier,
            id = record.id,
            status = %record.lifecycle_status,
            demoted,
            "Lookup stored"
        );
        Ok(Resolution::Triggered(record))
    }

    async fn resolve_async(
        &self,
        kind: QueryKind,
        identifier: &str,
        options: &ResolveOptions,
    ) -> DossierResult<Resolution> {
        if !options.force_refresh {
            if let Some(active) = self.store.find_active(kind, identifier).await? {
                match active.lifecycle_status {
                    LifecycleStatus::Completed => return Ok(Resolution::Cached(active)),
                    LifecycleStatus::Pending => return Ok(Resolution::Pending(active)),
                    // A failed request is retried.
                    LifecycleStatus::Error => {}
                }
            }
        }

        // A forced refresh supersedes the current row before the trigger; a
        // retry of a failed row only once the provider has acknowledged.
        let mut demoted = if options.force_refresh {
            self.store.demote_active(kind, identifier).await?
        } else {
            0
        };

        let request = TriggerRequest::new(
            kind,
            identifier,
            &options.callback_base_url,
            new_session_token(),
        );
        let response = self.provider.trigger(&request).await?;

        if !response.is_success() {
            tracing::warn!(
                kind = %kind,
                identifier,
                status = response.status_code,
                demoted,
                "Trigger rejected by provider"
            );
            return Err(ProviderError::Status {
                operation: "trigger".to_string(),
                status: response.status_code,
                message: response.text,
            }
            .into());
        }

        let correlation_id = response
            .ack_correlation_id()
            .ok_or(ProviderError::MissingCorrelationId)?;

        let new = NewTrackedQuery::new(kind, identifier, LifecycleStatus::Pending)
            .with_correlation_id(correlation_id)
            .with_request(request.payload())
            .with_response(response.body(), Some(i32::from(response.status_code)))
            .with_recipient(options.notify_recipient.clone());
        if !options.force_refresh {
            demoted = self.store.demote_active(kind, identifier).await?;
        }
        let record = self.store.insert_query(new).await?;

        tracing::info!(
            kind = %kind,
            identifier,
            id = record.id,
            correlation_id = record.correlation_id.as_deref().unwrap_or_default(),
            session_token = %request.session_token,
            demoted,
            "Async request triggered"
        );
        Ok(Resolution::Triggered(record))
    }
}
