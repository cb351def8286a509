//! Callback Reconciliation
//!
//! Matches an inbound provider callback to the tracked query it answers,
//! stores the callback, schedules the detail fetch where the kind has one,
//! and notifies the requester.
//!
//! Each kind has an ordered list of [`MatchStrategy`] values; the first
//! strategy that finds a row wins. The provider must never see a failure,
//! so every outcome (including no match and internal errors) is a success
//! acknowledgment, with a `warning` when something went wrong.

use super::detail_fetcher::DetailFetcher;
use crate::telemetry::metrics::record_callback;
use dossier_core::payload::string_at;
use dossier_core::{
    CallbackInput, DossierResult, ExtractedCallback, FlatMap, LifecycleStatus, NewTrackedQuery,
    Notification, Notifier, PayloadExtractor, QueryKind, RecordId, TrackedQuery,
};
use dossier_storage::{QueryFilter, RecordStore};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::task::JoinHandle;

// ============================================================================
// MATCHING POLICY
// ============================================================================

/// One way of locating the tracked query a callback belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Stored correlation id equals the extracted one. Any version status.
    CorrelationId,
    /// ACTIVE row whose identifier equals the derived identifier.
    IdentifierExact,
    /// ACTIVE PENDING row whose identifier contains the derived identifier.
    IdentifierContains,
    /// ACTIVE PENDING row triggered with the callback's session token.
    SessionToken,
    /// Newest ACTIVE PENDING row of the kind. Low confidence.
    MostRecentPending,
}

impl MatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStrategy::CorrelationId => "correlation_id",
            MatchStrategy::IdentifierExact => "identifier_exact",
            MatchStrategy::IdentifierContains => "identifier_contains",
            MatchStrategy::SessionToken => "session_token",
            MatchStrategy::MostRecentPending => "most_recent_pending",
        }
    }

    pub fn is_low_confidence(&self) -> bool {
        matches!(self, MatchStrategy::MostRecentPending)
    }
}

/// How callbacks of one kind are matched.
#[derive(Debug, Clone, Copy)]
pub struct ReconcilePolicy {
    pub strategies: &'static [MatchStrategy],
    /// Store an unmatched callback as a new COMPLETED row when an identifier
    /// can be derived from it.
    pub create_on_unmatched: bool,
    /// Where the business identifier may sit in the decoded fields.
    pub identifier_paths: &'static [&'static [&'static str]],
}

const NEGATIVE_CHECK_POLICY: ReconcilePolicy = ReconcilePolicy {
    strategies: &[
        MatchStrategy::CorrelationId,
        MatchStrategy::SessionToken,
        MatchStrategy::MostRecentPending,
    ],
    create_on_unmatched: false,
    identifier_paths: &[
        &["cf_piva"],
        &["data", "cf_piva"],
        &["data_cf_piva"],
        &["data_inner_cf_piva"],
    ],
};

const FULL_PROFILE_POLICY: ReconcilePolicy = ReconcilePolicy {
    strategies: &[
        MatchStrategy::CorrelationId,
        MatchStrategy::IdentifierExact,
        MatchStrategy::IdentifierContains,
        MatchStrategy::SessionToken,
        MatchStrategy::MostRecentPending,
    ],
    create_on_unmatched: true,
    identifier_paths: &[
        &["data", "companyDetails", "vatCode"],
        &["data", "companyDetails", "taxCode"],
        &["companyDetails", "vatCode"],
        &["companyDetails", "taxCode"],
        &["data_companyDetails", "vatCode"],
        &["data_companyDetails", "taxCode"],
        &["data_inner_companyDetails", "vatCode"],
        &["data_inner_companyDetails", "taxCode"],
        &["vatCode"],
        &["taxCode"],
    ],
};

const SYNC_LOOKUP_POLICY: ReconcilePolicy = ReconcilePolicy {
    strategies: &[MatchStrategy::CorrelationId],
    create_on_unmatched: false,
    identifier_paths: &[],
};

impl ReconcilePolicy {
    pub fn for_kind(kind: QueryKind) -> Self {
        match kind {
            QueryKind::AsyncNegativeCheck => NEGATIVE_CHECK_POLICY,
            QueryKind::AsyncFullProfile => FULL_PROFILE_POLICY,
            QueryKind::SyncLookup => SYNC_LOOKUP_POLICY,
        }
    }

    /// First identifier found along `identifier_paths`.
    pub fn derive_identifier(&self, fields: &FlatMap) -> Option<String> {
        self.identifier_paths
            .iter()
            .find_map(|path| string_at(fields, path))
    }
}

// ============================================================================
// ACKNOWLEDGMENT
// ============================================================================

/// Body returned to the provider. Always `success: true`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CallbackAck {
    pub message: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<LifecycleStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_by: Option<MatchStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notified: Option<bool>,
}

impl CallbackAck {
    fn warning(message: impl Into<String>, warning: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: true,
            warning: Some(warning.into()),
            request_id: None,
            correlation_id: None,
            status: None,
            matched_by: None,
            notified: None,
        }
    }
}

/// Result of handling one callback.
#[derive(Debug)]
pub struct ReconcileOutcome {
    pub ack: CallbackAck,
    /// Background detail fetch, if one was scheduled.
    pub detail_task: Option<JoinHandle<()>>,
}

impl ReconcileOutcome {
    fn ack_only(ack: CallbackAck) -> Self {
        Self {
            ack,
            detail_task: None,
        }
    }
}

// ============================================================================
// RECONCILER
// ============================================================================

#[derive(Clone)]
pub struct CallbackReconciler {
    store: Arc<dyn RecordStore>,
    notifier: Arc<dyn Notifier>,
    detail: DetailFetcher,
    default_recipient: Option<String>,
}

impl CallbackReconciler {
    pub fn new(
        store: Arc<dyn RecordStore>,
        notifier: Arc<dyn Notifier>,
        detail: DetailFetcher,
        default_recipient: Option<String>,
    ) -> Self {
        Self {
            store,
            notifier,
            detail,
            default_recipient,
        }
    }

    /// Decode, match and apply one callback. Never fails.
    pub async fn handle(&self, kind: QueryKind, input: &CallbackInput) -> ReconcileOutcome {
        let extracted = PayloadExtractor::extract(input);
        tracing::info!(
            kind = %kind,
            correlation_id = extracted.correlation_id.as_deref().unwrap_or("-"),
            status = extracted.status.as_deref().unwrap_or("-"),
            fields = extracted.fields.len(),
            "Callback received"
        );

        match self.apply(kind, &extracted).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(kind = %kind, error = %e, "Callback processing failed");
                record_callback(kind, "error");
                ReconcileOutcome::ack_only(CallbackAck::warning(
                    "Callback received",
                    format!("Internal error while processing callback: {}", e),
                ))
            }
        }
    }

    async fn apply(
        &self,
        kind: QueryKind,
        extracted: &ExtractedCallback,
    ) -> DossierResult<ReconcileOutcome> {
        let policy = ReconcilePolicy::for_kind(kind);
        let identifier = policy.derive_identifier(&extracted.fields);
        let payload = JsonValue::Object(extracted.fields.clone());
        let status = extracted
            .status
            .as_deref()
            .and_then(LifecycleStatus::from_provider)
            .unwrap_or_else(|| kind.default_callback_status());

        let (record, matched_by) = match self
            .locate(kind, &policy, extracted, identifier.as_deref())
            .await?
        {
            Some((query, strategy)) => {
                if strategy.is_low_confidence() {
                    tracing::warn!(
                        kind = %kind,
                        id = query.id,
                        identifier = %query.identifier,
                        "Callback matched by most recent pending request"
                    );
                }
                let record = self.store.record_callback(query.id, payload, status).await?;
                (record, Some(strategy))
            }
            None => match identifier.as_deref() {
                Some(identifier) if policy.create_on_unmatched => {
                    let mut new = NewTrackedQuery::new(kind, identifier, LifecycleStatus::Completed)
                        .with_callback(payload);
                    if let Some(correlation_id) = &extracted.correlation_id {
                        new = new.with_correlation_id(correlation_id.clone());
                    }
                    let record = self.store.insert_query(new).await?;
                    tracing::info!(
                        kind = %kind,
                        id = record.id,
                        identifier,
                        "Unmatched callback stored as new request"
                    );
                    (record, None)
                }
                _ => {
                    let warning = match &extracted.correlation_id {
                        Some(id) => format!("No matching request found for correlation id {}", id),
                        None => "No matching request found and no correlation id in payload"
                            .to_string(),
                    };
                    tracing::warn!(
                        kind = %kind,
                        identifier = identifier.as_deref().unwrap_or("-"),
                        "{}",
                        warning
                    );
                    record_callback(kind, "unmatched");
                    return Ok(ReconcileOutcome::ack_only(CallbackAck::warning(
                        "Callback received",
                        warning,
                    )));
                }
            },
        };

        let detail_task = self.schedule_detail(kind, &record, extracted);
        let notified = self.notify(&record, &extracted.fields).await;

        record_callback(kind, matched_by.map_or("created", |s| s.as_str()));
        let message = match matched_by {
            Some(_) => format!("Callback processed for request {}", record.id),
            None => format!("Callback stored as new request {}", record.id),
        };
        Ok(ReconcileOutcome {
            ack: CallbackAck {
                message,
                success: true,
                warning: None,
                request_id: Some(record.id),
                correlation_id: record.correlation_id.clone(),
                status: Some(record.lifecycle_status),
                matched_by,
                notified,
            },
            detail_task,
        })
    }

    async fn locate(
        &self,
        kind: QueryKind,
        policy: &ReconcilePolicy,
        extracted: &ExtractedCallback,
        identifier: Option<&str>,
    ) -> DossierResult<Option<(TrackedQuery, MatchStrategy)>> {
        for strategy in policy.strategies {
            let filter = match strategy {
                MatchStrategy::CorrelationId => match &extracted.correlation_id {
                    Some(id) => QueryFilter::for_kind(kind).correlation_id(id.clone()),
                    None => continue,
                },
                MatchStrategy::IdentifierExact => match identifier {
                    Some(id) => QueryFilter::for_kind(kind).identifier_exact(id).active(),
                    None => continue,
                },
                MatchStrategy::IdentifierContains => match identifier {
                    Some(id) => QueryFilter::for_kind(kind)
                        .identifier_contains(id)
                        .active()
                        .pending(),
                    None => continue,
                },
                MatchStrategy::SessionToken => match &extracted.session_id {
                    Some(token) => QueryFilter::for_kind(kind)
                        .session_token(token.clone())
                        .active()
                        .pending(),
                    None => continue,
                },
                MatchStrategy::MostRecentPending => QueryFilter::for_kind(kind).active().pending(),
            };

            if let Some(found) = self
                .store
                .find_queries(&filter.limit(1))
                .await?
                .into_iter()
                .next()
            {
                tracing::debug!(
                    kind = %kind,
                    id = found.id,
                    strategy = strategy.as_str(),
                    "Callback matched"
                );
                return Ok(Some((found, *strategy)));
            }
        }
        Ok(None)
    }

    fn schedule_detail(
        &self,
        kind: QueryKind,
        record: &TrackedQuery,
        extracted: &ExtractedCallback,
    ) -> Option<JoinHandle<()>> {
        if !kind.has_detail_step() || record.lifecycle_status != LifecycleStatus::Completed {
            return None;
        }
        let correlation_id = record
            .correlation_id
            .clone()
            .or_else(|| extracted.correlation_id.clone());
        match correlation_id {
            Some(correlation_id) => Some(self.detail.spawn(record.id, kind, correlation_id)),
            None => {
                tracing::warn!(id = record.id, "No correlation id for detail fetch");
                None
            }
        }
    }

    /// Returns `None` when there is nobody to notify.
    async fn notify(&self, record: &TrackedQuery, fields: &FlatMap) -> Option<bool> {
        let recipient = record
            .notify_recipient
            .clone()
            .or_else(|| self.default_recipient.clone())?;
        let notification =
            Notification::from_fields(recipient, record.kind, record.identifier.clone(), fields);
        let sent = self.notifier.notify(&notification).await;
        if !sent {
            tracing::warn!(id = record.id, recipient = %notification.recipient, "Notification not sent");
        }
        Some(sent)
    }
}
