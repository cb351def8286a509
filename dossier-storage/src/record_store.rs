//! Async record store trait.
//!
//! Pure CRUD plus query-by-filter over tracked queries and their detail
//! records. No business rules live here: versioning decisions belong to the
//! orchestrator, matching decisions to the reconciler.

use crate::{QueryFilter, StorageResult};
use ::async_trait::async_trait;
use dossier_core::{
    DetailRecord, LifecycleStatus, NewDetailRecord, NewTrackedQuery, QueryKind, RecordId,
    TrackedQuery,
};
use serde_json::Value as JsonValue;

/// Durable storage for tracked queries and detail records.
///
/// Every method is an independent commit. Nothing here wraps a demote and the
/// following insert in one transaction.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // ========================================================================
    // TRACKED QUERY OPERATIONS
    // ========================================================================

    /// Insert a new ACTIVE tracked query and return it with its id.
    async fn insert_query(&self, new: NewTrackedQuery) -> StorageResult<TrackedQuery>;

    /// Get a tracked query by id.
    async fn get_query(&self, id: RecordId) -> StorageResult<Option<TrackedQuery>>;

    /// All tracked queries matching `filter`, newest first.
    async fn find_queries(&self, filter: &QueryFilter) -> StorageResult<Vec<TrackedQuery>>;

    /// Mark every ACTIVE row for (kind, identifier) SUPERSEDED. Returns the
    /// number of rows changed.
    async fn demote_active(&self, kind: QueryKind, identifier: &str) -> StorageResult<u64>;

    /// Store a callback payload and the lifecycle it implies.
    async fn record_callback(
        &self,
        id: RecordId,
        payload: JsonValue,
        status: LifecycleStatus,
    ) -> StorageResult<TrackedQuery>;

    /// Change only the lifecycle status.
    async fn set_lifecycle_status(&self, id: RecordId, status: LifecycleStatus)
        -> StorageResult<()>;

    /// The ACTIVE row for (kind, identifier), newest if there are several.
    async fn find_active(
        &self,
        kind: QueryKind,
        identifier: &str,
    ) -> StorageResult<Option<TrackedQuery>> {
        let filter = QueryFilter::for_kind(kind)
            .identifier_exact(identifier)
            .active()
            .limit(1);
        Ok(self.find_queries(&filter).await?.into_iter().next())
    }

    // ========================================================================
    // DETAIL RECORD OPERATIONS
    // ========================================================================

    /// The detail record owned by `parent_id`, if one exists.
    async fn get_detail(&self, parent_id: RecordId) -> StorageResult<Option<DetailRecord>>;

    /// Insert a detail record. Fails if the parent already has one.
    async fn insert_detail(&self, new: NewDetailRecord) -> StorageResult<DetailRecord>;

    /// Overwrite an existing detail record in place.
    async fn update_detail(
        &self,
        id: RecordId,
        update: &NewDetailRecord,
    ) -> StorageResult<DetailRecord>;

    /// Update the parent's detail record if there is one, else create it.
    async fn upsert_detail(&self, new: NewDetailRecord) -> StorageResult<DetailRecord> {
        match self.get_detail(new.parent_id).await? {
            Some(existing) => self.update_detail(existing.id, &new).await,
            None => self.insert_detail(new).await,
        }
    }

    // ========================================================================
    // HEALTH
    // ========================================================================

    /// Cheap liveness probe for readiness checks.
    async fn ping(&self) -> StorageResult<()> {
        Ok(())
    }
}
