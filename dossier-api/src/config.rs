//! API Configuration Module
//!
//! Configuration values are built once at startup from environment variables
//! (after `.env` is loaded) and handed to each component at construction.
//! Nothing reads the environment mid-request.

use crate::constants::{
    DEFAULT_BIND, DEFAULT_COMPANY_BASE_URL, DEFAULT_CORS_MAX_AGE_SECS, DEFAULT_NOTIFY_FROM,
    DEFAULT_PORT, DEFAULT_RISK_BASE_URL, DEFAULT_SYNC_TIMEOUT_SECS,
};
use crate::db::DbConfig;
use std::str::FromStr;
use std::time::Duration;

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|s| s.parse().ok())
}

// ============================================================================
// SERVER CONFIGURATION
// ============================================================================

/// Listener, public address and CORS settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,

    /// Base URL the provider should call back on. When unset, it is derived
    /// from the `Host` header of the request that triggers the call.
    pub public_base_url: Option<String>,

    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            public_base_url: None,
            cors_origins: Vec::new(),
            cors_max_age_secs: DEFAULT_CORS_MAX_AGE_SECS,
        }
    }
}

impl ServerConfig {
    /// Environment variables:
    /// - `DOSSIER_API_BIND` (default: 0.0.0.0)
    /// - `PORT` or `DOSSIER_API_PORT` (default: 3000)
    /// - `DOSSIER_PUBLIC_BASE_URL`
    /// - `DOSSIER_CORS_ORIGINS`: comma-separated allowed origins (empty = allow all)
    /// - `DOSSIER_CORS_MAX_AGE_SECS` (default: 86400)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let cors_origins = env_string("DOSSIER_CORS_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            bind: env_string("DOSSIER_API_BIND").unwrap_or(defaults.bind),
            port: env_parse("PORT")
                .or_else(|| env_parse("DOSSIER_API_PORT"))
                .unwrap_or(defaults.port),
            public_base_url: env_string("DOSSIER_PUBLIC_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string()),
            cors_origins,
            cors_max_age_secs: env_parse("DOSSIER_CORS_MAX_AGE_SECS")
                .unwrap_or(defaults.cors_max_age_secs),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.cors_origins.is_empty() {
            return true;
        }

        self.cors_origins.iter().any(|allowed| {
            if allowed == origin {
                return true;
            }
            // Wildcard subdomains: *.example.com
            if let Some(pattern) = allowed.strip_prefix("*.") {
                if let Some(origin_domain) = origin.strip_prefix("https://") {
                    return origin_domain.ends_with(pattern);
                }
            }
            false
        })
    }
}

// ============================================================================
// PROVIDER CONFIGURATION
// ============================================================================

/// Where the data provider lives and how long to wait for it.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL for credit score and negative-event endpoints.
    pub risk_base_url: String,
    pub risk_token: Option<String>,
    /// Base URL for the full company profile endpoint.
    pub company_base_url: String,
    pub company_token: Option<String>,
    pub sync_timeout: Duration,
    /// `None` leaves async triggers unbounded.
    pub trigger_timeout: Option<Duration>,
    pub detail_timeout: Option<Duration>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            risk_base_url: DEFAULT_RISK_BASE_URL.to_string(),
            risk_token: None,
            company_base_url: DEFAULT_COMPANY_BASE_URL.to_string(),
            company_token: None,
            sync_timeout: Duration::from_secs(DEFAULT_SYNC_TIMEOUT_SECS),
            trigger_timeout: None,
            detail_timeout: None,
        }
    }
}

impl ProviderConfig {
    /// Environment variables:
    /// - `DOSSIER_RISK_BASE_URL`, `DOSSIER_RISK_TOKEN`
    /// - `DOSSIER_COMPANY_BASE_URL`, `DOSSIER_COMPANY_TOKEN`
    /// - `DOSSIER_SYNC_TIMEOUT_SECS` (default: 30)
    /// - `DOSSIER_TRIGGER_TIMEOUT_SECS` (default: unset)
    /// - `DOSSIER_DETAIL_TIMEOUT_SECS` (default: unset)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            risk_base_url: env_string("DOSSIER_RISK_BASE_URL")
                .unwrap_or(defaults.risk_base_url)
                .trim_end_matches('/')
                .to_string(),
            risk_token: env_string("DOSSIER_RISK_TOKEN"),
            company_base_url: env_string("DOSSIER_COMPANY_BASE_URL")
                .unwrap_or(defaults.company_base_url)
                .trim_end_matches('/')
                .to_string(),
            company_token: env_string("DOSSIER_COMPANY_TOKEN"),
            sync_timeout: env_parse("DOSSIER_SYNC_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.sync_timeout),
            trigger_timeout: env_parse("DOSSIER_TRIGGER_TIMEOUT_SECS").map(Duration::from_secs),
            detail_timeout: env_parse("DOSSIER_DETAIL_TIMEOUT_SECS").map(Duration::from_secs),
        }
    }
}

// ============================================================================
// NOTIFICATION CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// HTTP relay that turns notices into mail. Unset means log-only.
    pub relay_url: Option<String>,
    /// Used when the read request named no recipient.
    pub default_recipient: Option<String>,
    pub from: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            relay_url: None,
            default_recipient: None,
            from: DEFAULT_NOTIFY_FROM.to_string(),
        }
    }
}

impl NotifyConfig {
    /// Environment variables:
    /// - `DOSSIER_NOTIFY_RELAY_URL`
    /// - `DOSSIER_NOTIFY_DEFAULT_RECIPIENT`
    /// - `DOSSIER_NOTIFY_FROM` (default: dossier@localhost)
    pub fn from_env() -> Self {
        Self {
            relay_url: env_string("DOSSIER_NOTIFY_RELAY_URL"),
            default_recipient: env_string("DOSSIER_NOTIFY_DEFAULT_RECIPIENT"),
            from: env_string("DOSSIER_NOTIFY_FROM").unwrap_or_else(|| DEFAULT_NOTIFY_FROM.into()),
        }
    }
}

// ============================================================================
// STORE SELECTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl StoreBackend {
    /// `DOSSIER_STORE=memory` selects the in-memory store.
    pub fn from_env() -> Self {
        match env_string("DOSSIER_STORE").as_deref() {
            Some(s) if s.eq_ignore_ascii_case("memory") => StoreBackend::Memory,
            _ => StoreBackend::Postgres,
        }
    }
}

// ============================================================================
// APP CONFIGURATION
// ============================================================================

/// Everything the service needs, read once.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub notify: NotifyConfig,
    pub db: DbConfig,
    pub store: StoreBackend,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::from_env(),
            provider: ProviderConfig::from_env(),
            notify: NotifyConfig::from_env(),
            db: DbConfig::from_env(),
            store: StoreBackend::from_env(),
        }
    }
}
