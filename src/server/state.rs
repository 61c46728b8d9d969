use axum::extract::FromRef;

use crate::backup::BackupRegistry;
use crate::document_store::DocumentStore;
use crate::maintenance::MaintenanceRunner;
use crate::security::{CsrfManager, RateLimiter};
use crate::server_store::ServerStore;
use crate::user::UserStore;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedServerStore = Arc<dyn ServerStore>;
pub type GuardedDocumentStore = Arc<dyn DocumentStore>;
pub type GuardedUserStore = Arc<dyn UserStore>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub hash: String,
    pub server_store: GuardedServerStore,
    pub document_store: GuardedDocumentStore,
    pub user_store: GuardedUserStore,
    pub maintenance_runner: MaintenanceRunner,
    pub backup_registry: BackupRegistry,
    pub rate_limiter: RateLimiter,
    pub csrf_manager: CsrfManager,
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for GuardedServerStore {
    fn from_ref(input: &ServerState) -> Self {
        input.server_store.clone()
    }
}

impl FromRef<ServerState> for GuardedDocumentStore {
    fn from_ref(input: &ServerState) -> Self {
        input.document_store.clone()
    }
}

impl FromRef<ServerState> for GuardedUserStore {
    fn from_ref(input: &ServerState) -> Self {
        input.user_store.clone()
    }
}

impl FromRef<ServerState> for MaintenanceRunner {
    fn from_ref(input: &ServerState) -> Self {
        input.maintenance_runner.clone()
    }
}

impl FromRef<ServerState> for BackupRegistry {
    fn from_ref(input: &ServerState) -> Self {
        input.backup_registry.clone()
    }
}

impl FromRef<ServerState> for CsrfManager {
    fn from_ref(input: &ServerState) -> Self {
        input.csrf_manager.clone()
    }
}
