//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use dossier_core::{Notifier, ProviderClient};
use dossier_storage::RecordStore;

use crate::config::ServerConfig;
use crate::services::{CallbackReconciler, DetailFetcher, RequestOrchestrator};

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Record store, for health checks and direct reads.
    pub store: Arc<dyn RecordStore>,
    pub orchestrator: RequestOrchestrator,
    pub reconciler: CallbackReconciler,
    pub server: Arc<ServerConfig>,
    pub start_time: Instant,
}

impl AppState {
    /// Wire the services over one store, provider and notifier.
    pub fn new(
        server: ServerConfig,
        store: Arc<dyn RecordStore>,
        provider: Arc<dyn ProviderClient>,
        notifier: Arc<dyn Notifier>,
        default_recipient: Option<String>,
    ) -> Self {
        let detail = DetailFetcher::new(store.clone(), provider.clone());
        Self {
            orchestrator: RequestOrchestrator::new(store.clone(), provider),
            reconciler: CallbackReconciler::new(store.clone(), notifier, detail, default_recipient),
            store,
            server: Arc::new(server),
            start_time: Instant::now(),
        }
    }
}

crate::impl_from_ref!(Arc<dyn RecordStore>, store);
crate::impl_from_ref!(RequestOrchestrator, orchestrator);
crate::impl_from_ref!(CallbackReconciler, reconciler);
crate::impl_from_ref!(Arc<ServerConfig>, server);
crate::impl_from_ref!(Instant, start_time);
