//! Secondary detail retrieval for completed negative-event checks.

use crate::telemetry::metrics::record_detail_fetch;
use dossier_core::{
    DetailIndicators, DetailRecord, DossierResult, LifecycleStatus, NewDetailRecord,
    ProviderClient, QueryKind, RecordId,
};
use dossier_storage::RecordStore;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// What a detail fetch did to the parent row.
#[derive(Debug, Clone, PartialEq)]
pub enum DetailOutcome {
    /// Detail stored; parent marked COMPLETED.
    Stored(DetailRecord),
    /// Provider failed; parent marked ERROR, callback payload untouched.
    Failed(String),
}

/// Fetches the detail document for a completed request and stores it.
#[derive(Clone)]
pub struct DetailFetcher {
    store: Arc<dyn RecordStore>,
    provider: Arc<dyn ProviderClient>,
}

impl DetailFetcher {
    pub fn new(store: Arc<dyn RecordStore>, provider: Arc<dyn ProviderClient>) -> Self {
        Self { store, provider }
    }

    /// Fetch the detail for `parent_id` and finalize the parent.
    ///
    /// One attempt. A provider failure of any shape (transport, non-2xx,
    /// body that is not JSON) marks the parent ERROR and is reported as
    /// [`DetailOutcome::Failed`].
    ///
    /// # Errors
    ///
    /// Only storage failures are returned as errors.
    pub async fn fetch(
        &self,
        parent_id: RecordId,
        kind: QueryKind,
        correlation_id: &str,
    ) -> DossierResult<DetailOutcome> {
        let failure = match self.provider.fetch_detail(kind, correlation_id).await {
            Ok(response) if response.is_success() => match response.json() {
                Some(payload) => {
                    let new = NewDetailRecord {
                        parent_id,
                        indicators: DetailIndicators::from_payload(&payload),
                        detail_payload: payload,
                        status_code: i32::from(response.status_code),
                    };
                    let detail = self.store.upsert_detail(new).await?;
                    self.store
                        .set_lifecycle_status(parent_id, LifecycleStatus::Completed)
                        .await?;
                    record_detail_fetch(true);
                    tracing::info!(
                        parent_id,
                        correlation_id,
                        detail_id = detail.id,
                        "Detail stored"
                    );
                    return Ok(DetailOutcome::Stored(detail));
                }
                None => format!(
                    "detail response for {} is not JSON (status {})",
                    correlation_id, response.status_code
                ),
            },
            Ok(response) => format!(
                "detail request for {} returned status {}",
                correlation_id, response.status_code
            ),
            Err(e) => e.to_string(),
        };

        self.store
            .set_lifecycle_status(parent_id, LifecycleStatus::Error)
            .await?;
        record_detail_fetch(false);
        tracing::error!(parent_id, correlation_id, error = %failure, "Detail fetch failed");
        Ok(DetailOutcome::Failed(failure))
    }

    /// Run [`fetch`](Self::fetch) in the background.
    pub fn spawn(&self, parent_id: RecordId, kind: QueryKind, correlation_id: String) -> JoinHandle<()> {
        let fetcher = self.clone();
        tokio::spawn(async move {
            if let Err(e) = fetcher.fetch(parent_id, kind, &correlation_id).await {
                tracing::error!(
                    parent_id,
                    correlation_id = %correlation_id,
                    error = %e,
                    "Detail fetch could not update storage"
                );
            }
        })
    }
}
