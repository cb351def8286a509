//! Error types for dossier operations

use crate::RecordId;
use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Tracked query {id} not found")]
    QueryNotFound { id: RecordId },

    #[error("Detail record {id} not found")]
    DetailNotFound { id: RecordId },

    #[error("Insert failed for {entity}: {reason}")]
    InsertFailed { entity: &'static str, reason: String },

    #[error("Update failed for {entity} {id}: {reason}")]
    UpdateFailed {
        entity: &'static str,
        id: RecordId,
        reason: String,
    },

    #[error("Corrupt row in {table}: {reason}")]
    CorruptRow { table: &'static str, reason: String },

    #[error("Storage backend unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Errors talking to the external data provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Network failure before any response arrived.
    #[error("Transport error calling {operation}: {message}")]
    Transport { operation: String, message: String },

    #[error("Provider call {operation} timed out")]
    Timeout { operation: String },

    /// The provider answered with a non-success HTTP status.
    #[error("Provider returned status {status} for {operation}: {message}")]
    Status {
        operation: String,
        status: u16,
        message: String,
    },

    /// The response body could not be decoded.
    #[error("Invalid response from provider for {operation}: {reason}")]
    InvalidResponse { operation: String, reason: String },

    /// The acknowledgment carried no id to reconcile a callback against.
    #[error("Invalid response from provider: missing ID")]
    MissingCorrelationId,
}

impl ProviderError {
    /// Provider status to pass through to our own caller, if any.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            ProviderError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Master error type for all dossier operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DossierError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for dossier operations.
pub type DossierResult<T> = Result<T, DossierError>;
