//! Dossier Test Utilities
//!
//! Shared test infrastructure for the dossier workspace:
//! - A scripted fake provider with a call log and an optional barrier
//! - A recording notifier
//! - Proptest generators and record fixtures
//! - Assertions over the versioning invariant

// Re-export the in-memory store from its source crate
pub use dossier_storage::InMemoryRecordStore;
use dossier_storage::{QueryFilter, RecordStore, StorageResult};

// Re-export core types for convenience
pub use dossier_core::{
    CallbackInput, DetailIndicators, DetailRecord, LifecycleStatus, NewDetailRecord,
    NewTrackedQuery, Notification, Notifier, ProviderClient, ProviderError, ProviderResponse,
    QueryKind, RecordId, StorageError, TrackedQuery, TriggerRequest, VersionStatus,
};

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Barrier;

// ============================================================================
// FAKE PROVIDER
// ============================================================================

/// A scripted provider answer.
pub type Scripted = Result<ProviderResponse, ProviderError>;

/// One call received by [`FakeProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    Lookup { kind: QueryKind, identifier: String },
    Trigger(TriggerRequest),
    FetchDetail { kind: QueryKind, correlation_id: String },
}

#[derive(Debug, Default)]
struct FakeState {
    lookups: VecDeque<Scripted>,
    triggers: VecDeque<Scripted>,
    details: VecDeque<Scripted>,
    calls: Vec<ProviderCall>,
    acks_issued: u64,
}

/// Provider double. Scripted answers are consumed in order; once a queue is
/// empty a default success is returned (`ack-<n>` correlation ids for
/// triggers, all-false flags for detail fetches).
#[derive(Debug, Clone, Default)]
pub struct FakeProvider {
    state: Arc<Mutex<FakeState>>,
    barrier: Option<Arc<Barrier>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lookup and trigger calls wait until `parties` of them are in flight.
    pub fn with_barrier(mut self, parties: usize) -> Self {
        self.barrier = Some(Arc::new(Barrier::new(parties)));
        self
    }

    pub fn push_lookup(&self, answer: Scripted) -> &Self {
        self.lock().lookups.push_back(answer);
        self
    }

    pub fn push_trigger(&self, answer: Scripted) -> &Self {
        self.lock().triggers.push_back(answer);
        self
    }

    pub fn push_detail(&self, answer: Scripted) -> &Self {
        self.lock().details.push_back(answer);
        self
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.lock().calls.clone()
    }

    pub fn trigger_count(&self) -> usize {
        self.count(|c| matches!(c, ProviderCall::Trigger(_)))
    }

    pub fn lookup_count(&self) -> usize {
        self.count(|c| matches!(c, ProviderCall::Lookup { .. }))
    }

    pub fn detail_count(&self) -> usize {
        self.count(|c| matches!(c, ProviderCall::FetchDetail { .. }))
    }

    /// The most recent trigger request, if any.
    pub fn last_trigger(&self) -> Option<TriggerRequest> {
        self.lock().calls.iter().rev().find_map(|c| match c {
            ProviderCall::Trigger(req) => Some(req.clone()),
            _ => None,
        })
    }

    fn count(&self, pred: impl Fn(&ProviderCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(c)).count()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn rendezvous(&self) {
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
    }
}

#[async_trait]
impl ProviderClient for FakeProvider {
    async fn lookup(&self, kind: QueryKind, identifier: &str) -> Scripted {
        let answer = {
            let mut state = self.lock();
            state.calls.push(ProviderCall::Lookup {
                kind,
                identifier: identifier.to_string(),
            });
            state.lookups.pop_front()
        };
        self.rendezvous().await;
        answer.unwrap_or_else(|| Ok(fixtures::credit_score_response(identifier, 720)))
    }

    async fn trigger(&self, request: &TriggerRequest) -> Scripted {
        let answer = {
            let mut state = self.lock();
            state.calls.push(ProviderCall::Trigger(request.clone()));
            state.acks_issued += 1;
            let n = state.acks_issued;
            state
                .triggers
                .pop_front()
                .unwrap_or_else(|| Ok(fixtures::ack_response(&format!("ack-{}", n))))
        };
        self.rendezvous().await;
        answer
    }

    async fn fetch_detail(&self, kind: QueryKind, correlation_id: &str) -> Scripted {
        let mut state = self.lock();
        state.calls.push(ProviderCall::FetchDetail {
            kind,
            correlation_id: correlation_id.to_string(),
        });
        state
            .details
            .pop_front()
            .unwrap_or_else(|| Ok(fixtures::detail_response(DetailIndicators::default())))
    }
}

// ============================================================================
// RECORDING NOTIFIER
// ============================================================================

/// Notifier double that keeps every notice it is given.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the notice but reports failure.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> bool {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notification.clone());
        !self.fail
    }
}

// ============================================================================
// OFFLINE STORE
// ============================================================================

/// Store double whose backend is down: every call fails with
/// `StorageError::Unavailable`.
#[derive(Debug, Clone, Default)]
pub struct OfflineStore;

impl OfflineStore {
    pub fn new() -> Self {
        Self
    }

    fn down<T>(&self) -> StorageResult<T> {
        Err(StorageError::Unavailable {
            reason: "connection refused".to_string(),
        })
    }
}

#[async_trait]
impl RecordStore for OfflineStore {
    async fn insert_query(&self, _new: NewTrackedQuery) -> StorageResult<TrackedQuery> {
        self.down()
    }

    async fn get_query(&self, _id: RecordId) -> StorageResult<Option<TrackedQuery>> {
        self.down()
    }

    async fn find_queries(&self, _filter: &QueryFilter) -> StorageResult<Vec<TrackedQuery>> {
        self.down()
    }

    async fn demote_active(&self, _kind: QueryKind, _identifier: &str) -> StorageResult<u64> {
        self.down()
    }

    async fn record_callback(
        &self,
        _id: RecordId,
        _payload: serde_json::Value,
        _status: LifecycleStatus,
    ) -> StorageResult<TrackedQuery> {
        self.down()
    }

    async fn set_lifecycle_status(
        &self,
        _id: RecordId,
        _status: LifecycleStatus,
    ) -> StorageResult<()> {
        self.down()
    }

    async fn get_detail(&self, _parent_id: RecordId) -> StorageResult<Option<DetailRecord>> {
        self.down()
    }

    async fn insert_detail(&self, _new: NewDetailRecord) -> StorageResult<DetailRecord> {
        self.down()
    }

    async fn update_detail(
        &self,
        _id: RecordId,
        _update: &NewDetailRecord,
    ) -> StorageResult<DetailRecord> {
        self.down()
    }

    async fn ping(&self) -> StorageResult<()> {
        self.down()
    }
}

// ============================================================================
// POLLING
// ============================================================================

/// Poll `check` until it returns true or two seconds pass.
///
/// Background detail fetches are fire-and-forget; tests use this to wait
/// for their effect.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for dossier types.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_query_kind() -> impl Strategy<Value = QueryKind> {
        prop_oneof![
            Just(QueryKind::SyncLookup),
            Just(QueryKind::AsyncNegativeCheck),
            Just(QueryKind::AsyncFullProfile),
        ]
    }

    pub fn arb_async_kind() -> impl Strategy<Value = QueryKind> {
        prop_oneof![
            Just(QueryKind::AsyncNegativeCheck),
            Just(QueryKind::AsyncFullProfile),
        ]
    }

    /// Italian-looking VAT numbers.
    pub fn arb_vat_code() -> impl Strategy<Value = String> {
        "[0-9]{11}".prop_map(|digits| format!("IT{}", digits))
    }

    pub fn arb_indicators() -> impl Strategy<Value = DetailIndicators> {
        (any::<bool>(), any::<bool>(), any::<bool>()).prop_map(|(p, i, t)| DetailIndicators {
            prejudicial_events: p,
            insolvency_procedures: i,
            protests: t,
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built provider answers, callback bodies and records.

    use super::*;
    use serde_json::Value;

    pub const CALLBACK_BASE: &str = "http://dossier.test";

    pub fn credit_score_response(identifier: &str, score: i64) -> ProviderResponse {
        ProviderResponse::from_json(
            200,
            &json!({"data": {"identifier": identifier, "creditScore": score}}),
        )
    }

    /// Trigger acknowledgment carrying `data.id`.
    pub fn ack_response(correlation_id: &str) -> ProviderResponse {
        ProviderResponse::from_json(
            200,
            &json!({"data": {"id": correlation_id, "state": "PENDING"}, "success": true}),
        )
    }

    pub fn detail_response(flags: DetailIndicators) -> ProviderResponse {
        ProviderResponse::from_json(
            200,
            &json!({
                "data": {
                    "presenzaPregiudizievoli": flags.prejudicial_events,
                    "presenzaProcedure": flags.insolvency_procedures,
                    "presenzaProtesti": flags.protests,
                }
            }),
        )
    }

    pub fn transport_error() -> ProviderError {
        ProviderError::Transport {
            operation: "fake".to_string(),
            message: "connection refused".to_string(),
        }
    }

    /// A PENDING ACTIVE row as the orchestrator would have inserted it.
    pub fn pending_query(
        kind: QueryKind,
        identifier: &str,
        correlation_id: &str,
        session_token: &str,
    ) -> NewTrackedQuery {
        let request = TriggerRequest::new(kind, identifier, CALLBACK_BASE, session_token);
        NewTrackedQuery::new(kind, identifier, LifecycleStatus::Pending)
            .with_correlation_id(correlation_id)
            .with_request(request.payload())
            .with_response(ack_response(correlation_id).body(), Some(200))
    }

    /// `data=<urlencoded json>` in the provider's double-wrapped shape.
    pub fn negative_callback_body(correlation_id: &str, status: &str) -> String {
        let inner = json!({
            "id": correlation_id,
            "data": {"id": correlation_id, "status": status, "esito": {"k": "v"}},
        });
        let encoded: String =
            url::form_urlencoded::byte_serialize(inner.to_string().as_bytes()).collect();
        format!("data={}", encoded)
    }

    /// Full-profile callback JSON without any correlation id.
    pub fn company_callback_body(vat_code: &str) -> Value {
        json!({
            "data": {
                "companyDetails": {
                    "vatCode": vat_code,
                    "companyName": "ACME SRL",
                },
                "balanceSheets": [],
            }
        })
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over stored rows.

    use super::*;

    /// Exactly one ACTIVE row for (kind, identifier) among `rows`.
    #[track_caller]
    pub fn assert_single_active(rows: &[TrackedQuery], kind: QueryKind, identifier: &str) {
        let active: Vec<_> = rows
            .iter()
            .filter(|q| q.kind == kind && q.identifier == identifier && q.is_active())
            .map(|q| q.id)
            .collect();
        assert_eq!(
            active.len(),
            1,
            "expected one ACTIVE {} row for {}, found {:?}",
            kind,
            identifier,
            active
        );
    }

    #[track_caller]
    pub fn assert_lifecycle(query: &TrackedQuery, expected: LifecycleStatus) {
        assert_eq!(
            query.lifecycle_status, expected,
            "row {} has lifecycle {}, expected {}",
            query.id, query.lifecycle_status, expected
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_provider_scripted_then_default() {
        let fake = FakeProvider::new();
        fake.push_trigger(Err(fixtures::transport_error()));

        let req = TriggerRequest::new(QueryKind::AsyncFullProfile, "IT1", "http://x", "t");
        assert!(fake.trigger(&req).await.is_err());
        let ack = fake.trigger(&req).await.unwrap();
        assert_eq!(ack.ack_correlation_id().as_deref(), Some("ack-2"));
        assert_eq!(fake.trigger_count(), 2);
        assert_eq!(fake.last_trigger(), Some(req));
    }

    #[tokio::test]
    async fn test_recording_notifier_failing_still_records() {
        let notifier = RecordingNotifier::failing();
        let notice = Notification::from_fields(
            "a@b",
            QueryKind::AsyncFullProfile,
            "IT1",
            &Default::default(),
        );
        assert!(!notifier.notify(&notice).await);
        assert_eq!(notifier.sent().len(), 1);
    }

    #[test]
    fn test_pending_fixture_carries_session_token() {
        let new = fixtures::pending_query(QueryKind::AsyncNegativeCheck, "X", "c-1", "dossier_1");
        let payload = new.request_payload.unwrap();
        assert_eq!(payload["callback"]["headers"]["session_id"], "dossier_1");
    }
}
