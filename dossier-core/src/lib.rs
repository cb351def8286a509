//! Dossier Core - Data Model and Callback Extraction
//!
//! Types shared by every other crate in the workspace:
//! - tracked queries and their detail sub-records
//! - the error taxonomy for storage and provider failures
//! - the callback [`payload`] extractor (decode stages + candidate rules)
//! - the pure collaborator traits ([`ProviderClient`], [`Notifier`])
//!
//! Nothing here performs I/O. Storage lives in `dossier-storage`, the HTTP
//! service and concrete clients live in `dossier-api`.

use chrono::{DateTime, Utc};

pub mod entities;
pub mod enums;
pub mod error;
pub mod notify;
pub mod payload;
pub mod provider;

pub use entities::{
    DetailIndicators, DetailRecord, NewDetailRecord, NewTrackedQuery, TrackedQuery,
};
pub use enums::{KindParseError, LifecycleStatus, QueryKind, VersionStatus};
pub use error::{DossierError, DossierResult, ProviderError, StorageError};
pub use notify::{Notification, Notifier};
pub use payload::{CallbackInput, ExtractedCallback, FlatMap, PayloadExtractor};
pub use provider::{ProviderClient, ProviderResponse, TriggerRequest};

/// Primary key of persisted rows (tracked queries and detail records).
pub type RecordId = i64;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;
