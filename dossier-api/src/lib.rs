//! Dossier API - HTTP Service Layer
//!
//! Fronts a slow external company data provider with a versioned cache:
//! - synchronous lookups are stored as they are answered
//! - asynchronous requests are stored as PENDING and completed when the
//!   provider calls back on /webhook/*
//! - completed negative-event checks get a second, detail fetch
//!
//! Records live in PostgreSQL (or in memory for development and tests).

pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod macros;
pub mod notify;
#[cfg(feature = "openapi")]
pub mod openapi;
pub mod provider;
pub mod routes;
pub mod services;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use config::{AppConfig, NotifyConfig, ProviderConfig, ServerConfig, StoreBackend};
pub use db::{DbConfig, PgRecordStore};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use notify::{build_notifier, HttpRelayNotifier, LogNotifier};
#[cfg(feature = "openapi")]
pub use openapi::ApiDoc;
pub use provider::HttpProviderClient;
pub use routes::create_router;
pub use services::{
    CallbackAck, CallbackReconciler, DetailFetcher, MatchStrategy, RequestOrchestrator,
    Resolution, ResolutionKind, ResolveOptions,
};
pub use state::AppState;
