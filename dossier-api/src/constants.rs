//! Constants for the Dossier API
//!
//! Defaults shared by configuration, the provider client and the routes.

// ============================================================================
// SERVER
// ============================================================================

/// Default bind address
pub const DEFAULT_BIND: &str = "0.0.0.0";

/// Default listen port
pub const DEFAULT_PORT: u16 = 3000;

/// Development server URL
pub const DEV_SERVER_URL: &str = "http://localhost:3000";

// ============================================================================
// CORS
// ============================================================================

/// Default CORS max age in seconds (24 hours)
pub const DEFAULT_CORS_MAX_AGE_SECS: u64 = 86400;

// ============================================================================
// PROVIDER
// ============================================================================

/// Timeout for synchronous provider lookups
pub const DEFAULT_SYNC_TIMEOUT_SECS: u64 = 30;

/// Default risk-data provider base URL
pub const DEFAULT_RISK_BASE_URL: &str = "https://risk.openapi.com";

/// Default company-data provider base URL
pub const DEFAULT_COMPANY_BASE_URL: &str = "https://company.openapi.com";

/// Prefix of generated session tokens
pub const SESSION_TOKEN_PREFIX: &str = "dossier_";

/// Hex characters taken from a v4 UUID for the session token
pub const SESSION_TOKEN_HEX_LEN: usize = 16;

// ============================================================================
// NOTIFICATIONS
// ============================================================================

/// Default sender for relayed notifications
pub const DEFAULT_NOTIFY_FROM: &str = "dossier@localhost";

/// Timeout for a single notification relay call
pub const NOTIFY_TIMEOUT_SECS: u64 = 10;
