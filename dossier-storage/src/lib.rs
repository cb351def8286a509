//! Dossier Storage - Record Store Trait and In-Memory Implementation
//!
//! Defines the storage abstraction for tracked queries and detail records.
//! The PostgreSQL implementation lives in dossier-api.

pub mod memory;
pub mod record_store;

pub use memory::InMemoryRecordStore;
pub use record_store::RecordStore;

use dossier_core::{LifecycleStatus, QueryKind, StorageError, TrackedQuery, VersionStatus};

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// ============================================================================
// FILTERS
// ============================================================================

/// How to compare the stored identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierMatch {
    Exact(String),
    /// Stored identifier contains the given text.
    Contains(String),
}

impl IdentifierMatch {
    pub fn matches(&self, stored: &str) -> bool {
        match self {
            IdentifierMatch::Exact(wanted) => stored == wanted,
            IdentifierMatch::Contains(fragment) => stored.contains(fragment.as_str()),
        }
    }
}

/// Conjunctive filter over tracked queries. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFilter {
    pub kind: Option<QueryKind>,
    pub identifier: Option<IdentifierMatch>,
    pub correlation_id: Option<String>,
    pub lifecycle_status: Option<LifecycleStatus>,
    pub version_status: Option<VersionStatus>,
    /// Session token embedded in the stored outbound request.
    pub session_token: Option<String>,
    pub limit: Option<usize>,
}

impl QueryFilter {
    pub fn for_kind(kind: QueryKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn identifier_exact(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(IdentifierMatch::Exact(identifier.into()));
        self
    }

    pub fn identifier_contains(mut self, fragment: impl Into<String>) -> Self {
        self.identifier = Some(IdentifierMatch::Contains(fragment.into()));
        self
    }

    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    pub fn lifecycle(mut self, status: LifecycleStatus) -> Self {
        self.lifecycle_status = Some(status);
        self
    }

    pub fn active(mut self) -> Self {
        self.version_status = Some(VersionStatus::Active);
        self
    }

    pub fn pending(self) -> Self {
        self.lifecycle(LifecycleStatus::Pending)
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// In-process evaluation, used by the in-memory store.
    pub fn matches(&self, query: &TrackedQuery) -> bool {
        self.kind.map_or(true, |kind| query.kind == kind)
            && self
                .identifier
                .as_ref()
                .map_or(true, |m| m.matches(&query.identifier))
            && self
                .correlation_id
                .as_deref()
                .map_or(true, |c| query.correlation_id.as_deref() == Some(c))
            && self
                .lifecycle_status
                .map_or(true, |s| query.lifecycle_status == s)
            && self
                .version_status
                .map_or(true, |s| query.version_status == s)
            && self
                .session_token
                .as_deref()
                .map_or(true, |t| query.session_token() == Some(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn query(identifier: &str) -> TrackedQuery {
        TrackedQuery {
            id: 1,
            kind: QueryKind::AsyncFullProfile,
            identifier: identifier.to_string(),
            correlation_id: Some("corr-1".into()),
            lifecycle_status: LifecycleStatus::Pending,
            version_status: VersionStatus::Active,
            request_payload: Some(json!({"callback": {"headers": {"session_id": "dossier_ab"}}})),
            primary_response_payload: None,
            callback_payload: None,
            status_code: Some(200),
            notify_recipient: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_identifier_contains() {
        let q = query("IT01234567890");
        assert!(QueryFilter::default().identifier_contains("01234").matches(&q));
        assert!(!QueryFilter::default().identifier_exact("01234").matches(&q));
    }

    #[test]
    fn test_filter_is_conjunctive() {
        let q = query("IT01");
        let filter = QueryFilter::for_kind(QueryKind::AsyncFullProfile)
            .active()
            .pending()
            .session_token("dossier_ab");
        assert!(filter.matches(&q));
        assert!(!filter.clone().correlation_id("other").matches(&q));
        assert!(!QueryFilter::for_kind(QueryKind::SyncLookup).matches(&q));
    }
}
