//! Test server lifecycle management
//!
//! Spawns the admin server on a random port with seeded databases in a
//! temporary directory. Everything is torn down when the `TestServer` drops.

use super::constants::*;
use super::fixtures::create_test_stores;
use chathub_admin_server::backup::BackupRegistry;
use chathub_admin_server::document_store::DocumentStore;
use chathub_admin_server::maintenance::{MaintenanceConfig, MaintenanceRunner};
use chathub_admin_server::security::csrf::DEFAULT_CSRF_TOKEN_TTL;
use chathub_admin_server::security::{CsrfManager, RateLimitPolicy, RateLimiter};
use chathub_admin_server::server::ServerConfig;
use chathub_admin_server::server_store::ServerStore;
use chathub_admin_server::{make_app, ServerState, SqliteUserStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Knobs a test can turn before the server starts.
#[derive(Clone, Default)]
pub struct TestServerOptions {
    pub enforce_csrf: bool,
    pub rate_limit: RateLimitPolicy,
    pub collapse_concurrent_jobs: bool,
    /// Pause between cache clear steps. Zero keeps jobs fast.
    pub step_delay: Duration,
}

/// A running admin server bound to a random local port
pub struct TestServer {
    /// Base URL, e.g. `http://127.0.0.1:54321`
    pub base_url: String,
    #[allow(dead_code)]
    pub port: u16,
    /// Token of the seeded admin user
    pub admin_token: String,
    /// Token of the seeded non-admin user
    pub member_token: String,
    #[allow(dead_code)]
    pub user_store: Arc<SqliteUserStore>,
    #[allow(dead_code)]
    pub document_store: Arc<dyn DocumentStore>,
    #[allow(dead_code)]
    pub server_store: Arc<dyn ServerStore>,

    _temp_dir: TempDir,
    _shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a server with default options
    pub async fn spawn() -> Self {
        Self::spawn_with(TestServerOptions::default()).await
    }

    /// Spawns a server with custom options
    ///
    /// # Panics
    ///
    /// Panics if the fixtures cannot be created or the server does not
    /// become ready in time.
    pub async fn spawn_with(options: TestServerOptions) -> Self {
        let stores = create_test_stores().expect("Failed to create test stores");

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let port = listener
            .local_addr()
            .expect("Failed to read local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let server_store = stores.server_store.clone();
        let document_store = stores.document_store.clone();

        let state = ServerState {
            config: ServerConfig {
                port,
                enforce_csrf: options.enforce_csrf,
                ..ServerConfig::default()
            },
            start_time: Instant::now(),
            hash: "e2e-test".to_string(),
            server_store: server_store.clone(),
            document_store: document_store.clone(),
            user_store: stores.user_store.clone(),
            maintenance_runner: MaintenanceRunner::new(
                server_store.clone(),
                document_store.clone(),
                MaintenanceConfig {
                    step_delay: options.step_delay,
                    collapse_concurrent_jobs: options.collapse_concurrent_jobs,
                    ..MaintenanceConfig::default()
                },
            ),
            backup_registry: BackupRegistry::new(
                server_store.clone(),
                document_store.clone(),
                chrono::Duration::days(30),
            ),
            rate_limiter: RateLimiter::new(server_store.clone(), options.rate_limit),
            csrf_manager: CsrfManager::new(server_store.clone(), DEFAULT_CSRF_TOKEN_TTL),
        };

        let app = make_app(state);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("Test server failed");
        });

        let server = Self {
            base_url,
            port,
            admin_token: stores.admin_token,
            member_token: stores.member_token,
            user_store: stores.user_store,
            document_store,
            server_store,
            _temp_dir: stores.dir,
            _shutdown_tx: Some(shutdown_tx),
        };
        server.wait_for_ready().await;
        server
    }

    /// Polls `/` until the server answers
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::new();
        let start = Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
