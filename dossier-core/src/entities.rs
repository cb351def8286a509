//! Persisted entities: tracked queries and detail records

use crate::enums::{LifecycleStatus, QueryKind, VersionStatus};
use crate::{RecordId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Path of the session token inside an outbound trigger payload.
pub const SESSION_TOKEN_PATH: [&str; 3] = ["callback", "headers", "session_id"];

// ============================================================================
// TRACKED QUERY
// ============================================================================

/// One lookup against the provider, versioned per (kind, identifier).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TrackedQuery {
    pub id: RecordId,
    pub kind: QueryKind,
    /// Tax/VAT code or company id. Not unique on its own.
    pub identifier: String,
    /// Token from the provider's acknowledgment (async kinds only).
    pub correlation_id: Option<String>,
    pub lifecycle_status: LifecycleStatus,
    pub version_status: VersionStatus,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub request_payload: Option<JsonValue>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub primary_response_payload: Option<JsonValue>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub callback_payload: Option<JsonValue>,
    /// HTTP status of the primary provider call, when there was one.
    pub status_code: Option<i32>,
    /// Who to tell when the callback lands.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_recipient: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

impl TrackedQuery {
    pub fn is_active(&self) -> bool {
        self.version_status == VersionStatus::Active
    }

    /// Session token embedded in the outbound trigger's callback configuration.
    pub fn session_token(&self) -> Option<&str> {
        let mut cursor = self.request_payload.as_ref()?;
        for segment in SESSION_TOKEN_PATH {
            cursor = cursor.get(segment)?;
        }
        cursor.as_str()
    }
}

/// Insert payload for a tracked query. New rows are always ACTIVE.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrackedQuery {
    pub kind: QueryKind,
    pub identifier: String,
    pub correlation_id: Option<String>,
    pub lifecycle_status: LifecycleStatus,
    pub request_payload: Option<JsonValue>,
    pub primary_response_payload: Option<JsonValue>,
    pub callback_payload: Option<JsonValue>,
    pub status_code: Option<i32>,
    pub notify_recipient: Option<String>,
}

impl NewTrackedQuery {
    pub fn new(kind: QueryKind, identifier: impl Into<String>, status: LifecycleStatus) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
            correlation_id: None,
            lifecycle_status: status,
            request_payload: None,
            primary_response_payload: None,
            callback_payload: None,
            status_code: None,
            notify_recipient: None,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_request(mut self, payload: JsonValue) -> Self {
        self.request_payload = Some(payload);
        self
    }

    pub fn with_response(mut self, payload: JsonValue, status_code: Option<i32>) -> Self {
        self.primary_response_payload = Some(payload);
        self.status_code = status_code;
        self
    }

    pub fn with_callback(mut self, payload: JsonValue) -> Self {
        self.callback_payload = Some(payload);
        self
    }

    pub fn with_recipient(mut self, recipient: Option<String>) -> Self {
        self.notify_recipient = recipient;
        self
    }
}

// ============================================================================
// DETAIL RECORD
// ============================================================================

/// Secondary detail fetched after a completed negative-event callback.
/// At most one per tracked query; updated in place on refetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DetailRecord {
    pub id: RecordId,
    pub parent_id: RecordId,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub detail_payload: JsonValue,
    pub has_prejudicial_events: bool,
    pub has_insolvency_procedures: bool,
    pub has_protests: bool,
    pub status_code: i32,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

impl DetailRecord {
    pub fn indicators(&self) -> DetailIndicators {
        DetailIndicators {
            prejudicial_events: self.has_prejudicial_events,
            insolvency_procedures: self.has_insolvency_procedures,
            protests: self.has_protests,
        }
    }

    /// Overwrite the fetched content, keeping identity and creation time.
    pub fn apply(&mut self, update: &NewDetailRecord, now: Timestamp) {
        self.detail_payload = update.detail_payload.clone();
        self.has_prejudicial_events = update.indicators.prejudicial_events;
        self.has_insolvency_procedures = update.indicators.insolvency_procedures;
        self.has_protests = update.indicators.protests;
        self.status_code = update.status_code;
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewDetailRecord {
    pub parent_id: RecordId,
    pub detail_payload: JsonValue,
    pub indicators: DetailIndicators,
    pub status_code: i32,
}

/// The three boolean flags derived from a detail payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetailIndicators {
    pub prejudicial_events: bool,
    pub insolvency_procedures: bool,
    pub protests: bool,
}

impl DetailIndicators {
    pub const PREJUDICIAL_EVENTS_PATH: [&'static str; 2] = ["data", "presenzaPregiudizievoli"];
    pub const INSOLVENCY_PROCEDURES_PATH: [&'static str; 2] = ["data", "presenzaProcedure"];
    pub const PROTESTS_PATH: [&'static str; 2] = ["data", "presenzaProtesti"];

    /// Read each flag independently; a missing or non-boolean value is `false`.
    pub fn from_payload(payload: &JsonValue) -> Self {
        Self {
            prejudicial_events: flag_at(payload, &Self::PREJUDICIAL_EVENTS_PATH),
            insolvency_procedures: flag_at(payload, &Self::INSOLVENCY_PROCEDURES_PATH),
            protests: flag_at(payload, &Self::PROTESTS_PATH),
        }
    }
}

fn flag_at(payload: &JsonValue, path: &[&str]) -> bool {
    let mut cursor = payload;
    for segment in path {
        match cursor.get(segment) {
            Some(next) => cursor = next,
            None => return false,
        }
    }
    cursor.as_bool().unwrap_or(false)
}
