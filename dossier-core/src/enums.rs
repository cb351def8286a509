//! Enum types for tracked queries

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// QUERY KIND
// ============================================================================

/// The three families of tracked lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum QueryKind {
    /// Credit score, answered synchronously by the provider.
    #[serde(rename = "credit-score")]
    SyncLookup,
    /// Negative-event check, acknowledged then delivered by callback.
    #[serde(rename = "negative-event")]
    AsyncNegativeCheck,
    /// Full company profile, acknowledged then delivered by callback.
    #[serde(rename = "company-full")]
    AsyncFullProfile,
}

impl QueryKind {
    pub const ALL: [QueryKind; 3] = [
        QueryKind::SyncLookup,
        QueryKind::AsyncNegativeCheck,
        QueryKind::AsyncFullProfile,
    ];

    /// Wire and database name.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::SyncLookup => "credit-score",
            QueryKind::AsyncNegativeCheck => "negative-event",
            QueryKind::AsyncFullProfile => "company-full",
        }
    }

    /// Whether the provider answers through an inbound callback.
    pub fn is_async(&self) -> bool {
        !matches!(self, QueryKind::SyncLookup)
    }

    /// Whether a completed callback is followed by a secondary detail fetch.
    pub fn has_detail_step(&self) -> bool {
        matches!(self, QueryKind::AsyncNegativeCheck)
    }

    /// Lifecycle applied to a matched callback that carries no usable status.
    pub fn default_callback_status(&self) -> LifecycleStatus {
        LifecycleStatus::Completed
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryKind {
    type Err = KindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "creditscore" | "synclookup" => Ok(QueryKind::SyncLookup),
            "negativeevent" | "asyncnegativecheck" => Ok(QueryKind::AsyncNegativeCheck),
            "companyfull" | "asyncfullprofile" => Ok(QueryKind::AsyncFullProfile),
            _ => Err(KindParseError(s.to_string())),
        }
    }
}

/// Error when parsing an invalid kind or status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindParseError(pub String);

impl fmt::Display for KindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid value: {}", self.0)
    }
}

impl std::error::Error for KindParseError {}

// ============================================================================
// LIFECYCLE / VERSION STATUS
// ============================================================================

/// Lifecycle of a tracked query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleStatus {
    Pending,
    Completed,
    Error,
}

impl LifecycleStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            LifecycleStatus::Pending => "PENDING",
            LifecycleStatus::Completed => "COMPLETED",
            LifecycleStatus::Error => "ERROR",
        }
    }

    /// Parse a provider-reported status string.
    ///
    /// Providers use several spellings; anything unrecognized yields `None`
    /// so the caller can fall back to a kind default.
    pub fn from_provider(raw: &str) -> Option<Self> {
        match normalize_token(raw).as_str() {
            "completed" | "complete" | "done" | "success" | "ok" | "evasa" => {
                Some(LifecycleStatus::Completed)
            }
            "error" | "failed" | "failure" | "ko" => Some(LifecycleStatus::Error),
            "pending" | "processing" | "inprogress" | "queued" => Some(LifecycleStatus::Pending),
            _ => None,
        }
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

impl FromStr for LifecycleStatus {
    type Err = KindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "pending" => Ok(LifecycleStatus::Pending),
            "completed" => Ok(LifecycleStatus::Completed),
            "error" => Ok(LifecycleStatus::Error),
            _ => Err(KindParseError(s.to_string())),
        }
    }
}

/// Versioning flag: one ACTIVE row per (kind, identifier), the rest history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionStatus {
    Active,
    Superseded,
}

impl VersionStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            VersionStatus::Active => "ACTIVE",
            VersionStatus::Superseded => "SUPERSEDED",
        }
    }
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

impl FromStr for VersionStatus {
    type Err = KindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "active" => Ok(VersionStatus::Active),
            // Rows written by the legacy service used "NOT ACTIVE".
            "superseded" | "notactive" => Ok(VersionStatus::Superseded),
            _ => Err(KindParseError(s.to_string())),
        }
    }
}

fn normalize_token(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip_through_str() {
        for kind in QueryKind::ALL {
            assert_eq!(kind.as_str().parse::<QueryKind>(), Ok(kind));
        }
        assert!("credit_score".parse::<QueryKind>().is_ok());
        assert!("unknown".parse::<QueryKind>().is_err());
    }

    #[test]
    fn test_kind_serializes_as_wire_name() {
        let json = serde_json::to_string(&QueryKind::AsyncFullProfile).unwrap();
        assert_eq!(json, "\"company-full\"");
    }

    #[test]
    fn test_provider_status_spellings() {
        assert_eq!(
            LifecycleStatus::from_provider("completed"),
            Some(LifecycleStatus::Completed)
        );
        assert_eq!(
            LifecycleStatus::from_provider("IN_PROGRESS"),
            Some(LifecycleStatus::Pending)
        );
        assert_eq!(
            LifecycleStatus::from_provider("Failed"),
            Some(LifecycleStatus::Error)
        );
        assert_eq!(LifecycleStatus::from_provider("CALLBACK_RECEIVED"), None);
    }

    #[test]
    fn test_legacy_not_active_parses_as_superseded() {
        assert_eq!(
            "NOT ACTIVE".parse::<VersionStatus>(),
            Ok(VersionStatus::Superseded)
        );
    }

    #[test]
    fn test_detail_step_only_for_negative_check() {
        assert!(QueryKind::AsyncNegativeCheck.has_detail_step());
        assert!(!QueryKind::AsyncFullProfile.has_detail_step());
        assert!(!QueryKind::SyncLookup.is_async());
    }
}
