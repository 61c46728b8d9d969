use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::sync::Arc;
use std::time::{Duration, Instant};
use std::{fmt::Debug, path::PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chathub_admin_server::backup::BackupRegistry;
use chathub_admin_server::config::{AppConfig, CliConfig, FileConfig};
use chathub_admin_server::document_store::{DocumentStore, SqliteDocumentStore};
use chathub_admin_server::maintenance::MaintenanceRunner;
use chathub_admin_server::security::{CsrfManager, RateLimiter};
use chathub_admin_server::server::{self, run_server, RequestsLoggingLevel, ServerConfig, ServerState};
use chathub_admin_server::server_store::{ServerStore, SqliteServerStore};
use chathub_admin_server::user::{SqliteUserStore, UserStore};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Optional TOML config file. Its values override the flags below.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding documents.db, server.db and user.db.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    #[clap(long)]
    pub frontend_dir_path: Option<String>,

    /// Reject requests failing CSRF verification instead of logging them.
    #[clap(long)]
    pub enforce_csrf: bool,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_dir: self.db_dir.clone(),
            port: self.port,
            metrics_port: self.metrics_port,
            logging_level: self.logging_level.clone(),
            frontend_dir_path: self.frontend_dir_path.clone(),
            enforce_csrf: self.enforce_csrf,
        }
    }
}

/// Periodically purges expired backups and idle rate limit records until
/// `shutdown` is cancelled.
fn spawn_housekeeping(
    config: &AppConfig,
    backup_registry: BackupRegistry,
    rate_limiter: RateLimiter,
    shutdown: CancellationToken,
) {
    let backup_interval_hours = config.backup.cleanup_interval_hours;
    if backup_interval_hours > 0 {
        info!(
            "Backup cleanup enabled: retaining {} days, purging every {} hours",
            config.backup.retention_days, backup_interval_hours
        );
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(backup_interval_hours.saturating_mul(60 * 60)));
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let registry = backup_registry.clone();
                match tokio::task::spawn_blocking(move || registry.cleanup_expired(Utc::now())).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => error!("Failed to purge expired backups: {}", e),
                    Err(e) => error!("Backup cleanup task panicked: {}", e),
                }
            }
        });
    }

    let prune_interval = rate_limiter.policy().window;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(prune_interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let limiter = rate_limiter.clone();
            match tokio::task::spawn_blocking(move || limiter.prune(Utc::now().timestamp_millis()))
                .await
            {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => error!("Failed to prune rate limit records: {:#}", e),
                Err(e) => error!("Rate limit prune task panicked: {}", e),
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config file {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    info!("Initializing metrics...");
    server::metrics::init_metrics();

    info!("Opening databases in {:?}...", config.db_dir);
    let document_store: Arc<dyn DocumentStore> =
        Arc::new(SqliteDocumentStore::new(config.documents_db_path())?);
    let server_store: Arc<dyn ServerStore> =
        Arc::new(SqliteServerStore::new(config.server_db_path())?);
    let user_store: Arc<dyn UserStore> = Arc::new(SqliteUserStore::new(config.user_db_path())?);

    match server_store.get_in_progress_maintenance_jobs() {
        Ok(jobs) => {
            for job in jobs {
                warn!(
                    "Cache clear job {} started by {} was interrupted at {}% ({})",
                    job.id, job.started_by, job.progress, job.current_task
                );
            }
        }
        Err(e) => warn!("Could not read interrupted cache clear jobs: {:#}", e),
    }
    let interrupted = server_store.mark_stale_jobs_failed()?;
    if interrupted > 0 {
        info!("Marked {} interrupted cache clear jobs as failed", interrupted);
    }

    let maintenance_runner = MaintenanceRunner::new(
        server_store.clone(),
        document_store.clone(),
        config.maintenance.clone(),
    );
    let backup_registry = BackupRegistry::new(
        server_store.clone(),
        document_store.clone(),
        chrono::Duration::try_days(config.backup.retention_days)
            .context("backup.retention_days is out of range")?,
    );
    let rate_limiter = RateLimiter::new(server_store.clone(), config.security.rate_limit);
    let csrf_manager = CsrfManager::new(server_store.clone(), config.security.csrf_token_ttl);

    if !config.security.enforce_csrf {
        info!("CSRF verification failures are logged but not enforced");
    }

    let shutdown = CancellationToken::new();
    spawn_housekeeping(
        &config,
        backup_registry.clone(),
        rate_limiter.clone(),
        shutdown.clone(),
    );

    let state = ServerState {
        config: ServerConfig {
            requests_logging_level: config.logging_level.clone(),
            port: config.port,
            metrics_port: config.metrics_port,
            frontend_dir_path: config.frontend_dir_path.clone(),
            enforce_csrf: config.security.enforce_csrf,
        },
        start_time: Instant::now(),
        hash: env!("GIT_HASH").to_string(),
        server_store,
        document_store,
        user_store,
        maintenance_runner,
        backup_registry,
        rate_limiter,
        csrf_manager,
    };

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        info!("Received Ctrl+C, shutting down...");
        signal_shutdown.cancel();
    });

    run_server(state, shutdown).await
}
