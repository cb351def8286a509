//! In-memory record store.
//!
//! Backs unit and HTTP tests, and the service itself when started with
//! `DOSSIER_STORE=memory`. Ids are assigned sequentially from 1.

use crate::{QueryFilter, RecordStore, StorageResult};
use ::async_trait::async_trait;
use chrono::Utc;
use dossier_core::{
    DetailRecord, LifecycleStatus, NewDetailRecord, NewTrackedQuery, QueryKind, RecordId,
    StorageError, TrackedQuery, VersionStatus,
};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    queries: BTreeMap<RecordId, TrackedQuery>,
    details: BTreeMap<RecordId, DetailRecord>,
    next_query_id: RecordId,
    next_detail_id: RecordId,
}

/// Record store kept in process memory. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every tracked query, oldest first.
    pub async fn all_queries(&self) -> Vec<TrackedQuery> {
        self.tables.read().await.queries.values().cloned().collect()
    }

    /// Every detail record, oldest first.
    pub async fn all_details(&self) -> Vec<DetailRecord> {
        self.tables.read().await.details.values().cloned().collect()
    }

    /// Number of ACTIVE rows for (kind, identifier).
    pub async fn active_count(&self, kind: QueryKind, identifier: &str) -> usize {
        let filter = QueryFilter::for_kind(kind).identifier_exact(identifier).active();
        self.tables
            .read()
            .await
            .queries
            .values()
            .filter(|q| filter.matches(q))
            .count()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert_query(&self, new: NewTrackedQuery) -> StorageResult<TrackedQuery> {
        let mut tables = self.tables.write().await;
        tables.next_query_id += 1;
        let now = Utc::now();
        let query = TrackedQuery {
            id: tables.next_query_id,
            kind: new.kind,
            identifier: new.identifier,
            correlation_id: new.correlation_id,
            lifecycle_status: new.lifecycle_status,
            version_status: VersionStatus::Active,
            request_payload: new.request_payload,
            primary_response_payload: new.primary_response_payload,
            callback_payload: new.callback_payload,
            status_code: new.status_code,
            notify_recipient: new.notify_recipient,
            created_at: now,
            updated_at: now,
        };
        tables.queries.insert(query.id, query.clone());
        Ok(query)
    }

    async fn get_query(&self, id: RecordId) -> StorageResult<Option<TrackedQuery>> {
        Ok(self.tables.read().await.queries.get(&id).cloned())
    }

    async fn find_queries(&self, filter: &QueryFilter) -> StorageResult<Vec<TrackedQuery>> {
        let tables = self.tables.read().await;
        let mut found: Vec<TrackedQuery> = tables
            .queries
            .values()
            .filter(|q| filter.matches(q))
            .cloned()
            .collect();
        found.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        if let Some(limit) = filter.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn demote_active(&self, kind: QueryKind, identifier: &str) -> StorageResult<u64> {
        let filter = QueryFilter::for_kind(kind).identifier_exact(identifier).active();
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let mut demoted = 0;
        for query in tables.queries.values_mut().filter(|q| filter.matches(q)) {
            query.version_status = VersionStatus::Superseded;
            query.updated_at = now;
            demoted += 1;
        }
        Ok(demoted)
    }

    async fn record_callback(
        &self,
        id: RecordId,
        payload: JsonValue,
        status: LifecycleStatus,
    ) -> StorageResult<TrackedQuery> {
        let mut tables = self.tables.write().await;
        let query = tables
            .queries
            .get_mut(&id)
            .ok_or(StorageError::QueryNotFound { id })?;
        query.callback_payload = Some(payload);
        query.lifecycle_status = status;
        query.updated_at = Utc::now();
        Ok(query.clone())
    }

    async fn set_lifecycle_status(
        &self,
        id: RecordId,
        status: LifecycleStatus,
    ) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        let query = tables
            .queries
            .get_mut(&id)
            .ok_or(StorageError::QueryNotFound { id })?;
        query.lifecycle_status = status;
        query.updated_at = Utc::now();
        Ok(())
    }

    async fn get_detail(&self, parent_id: RecordId) -> StorageResult<Option<DetailRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .details
            .values()
            .find(|d| d.parent_id == parent_id)
            .cloned())
    }

    async fn insert_detail(&self, new: NewDetailRecord) -> StorageResult<DetailRecord> {
        let mut tables = self.tables.write().await;
        if tables.details.values().any(|d| d.parent_id == new.parent_id) {
            return Err(StorageError::InsertFailed {
                entity: "detail_record",
                reason: format!("parent {} already has a detail record", new.parent_id),
            });
        }
        tables.next_detail_id += 1;
        let now = Utc::now();
        let detail = DetailRecord {
            id: tables.next_detail_id,
            parent_id: new.parent_id,
            detail_payload: new.detail_payload,
            has_prejudicial_events: new.indicators.prejudicial_events,
            has_insolvency_procedures: new.indicators.insolvency_procedures,
            has_protests: new.indicators.protests,
            status_code: new.status_code,
            created_at: now,
            updated_at: now,
        };
        tables.details.insert(detail.id, detail.clone());
        Ok(detail)
    }

    async fn update_detail(
        &self,
        id: RecordId,
        update: &NewDetailRecord,
    ) -> StorageResult<DetailRecord> {
        let mut tables = self.tables.write().await;
        let detail = tables
            .details
            .get_mut(&id)
            .ok_or(StorageError::DetailNotFound { id })?;
        detail.apply(update, Utc::now());
        Ok(detail.clone())
    }
}
