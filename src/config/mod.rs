mod file_config;

pub use file_config::{BackupFileConfig, FileConfig, MaintenanceFileConfig, SecurityFileConfig};

use crate::backup::DEFAULT_RETENTION_DAYS;
use crate::maintenance::MaintenanceConfig;
use crate::security::csrf::DEFAULT_CSRF_TOKEN_TTL;
use crate::security::RateLimitPolicy;
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound for the configured windows, blocks and token lifetimes.
pub const MAX_SECURITY_DURATION_SECS: u64 = 365 * 24 * 60 * 60;
pub const MAX_RETENTION_DAYS: i64 = 3650;
pub const MAX_CLEANUP_INTERVAL_HOURS: u64 = 365 * 24;

/// Command line values that a TOML file may override.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
    pub enforce_csrf: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,

    pub maintenance: MaintenanceConfig,
    pub security: SecuritySettings,
    pub backup: BackupSettings,
}

#[derive(Debug, Clone)]
pub struct SecuritySettings {
    pub rate_limit: RateLimitPolicy,
    pub csrf_token_ttl: Duration,
    /// Reject requests failing CSRF verification instead of only logging them.
    pub enforce_csrf: bool,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitPolicy::default(),
            csrf_token_ttl: DEFAULT_CSRF_TOKEN_TTL,
            enforce_csrf: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackupSettings {
    pub retention_days: i64,
    pub cleanup_interval_hours: u64,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            retention_days: DEFAULT_RETENTION_DAYS,
            cleanup_interval_hours: 24,
        }
    }
}

impl AppConfig {
    /// Merges the command line with the optional TOML file, file values first.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let frontend_dir_path = file
            .frontend_dir_path
            .or_else(|| cli.frontend_dir_path.clone());

        let maintenance_file = file.maintenance.unwrap_or_default();
        let maintenance_defaults = MaintenanceConfig::default();
        let maintenance = MaintenanceConfig {
            step_delay: maintenance_file
                .step_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(maintenance_defaults.step_delay),
            log_retention_count: maintenance_file
                .log_retention_count
                .unwrap_or(maintenance_defaults.log_retention_count),
            recent_jobs_limit: maintenance_file
                .recent_jobs_limit
                .unwrap_or(maintenance_defaults.recent_jobs_limit),
            collapse_concurrent_jobs: maintenance_file
                .collapse_concurrent_jobs
                .unwrap_or(maintenance_defaults.collapse_concurrent_jobs),
        };

        let security_file = file.security.unwrap_or_default();
        let security_defaults = SecuritySettings::default();
        let security = SecuritySettings {
            rate_limit: RateLimitPolicy {
                max_requests: security_file
                    .rate_limit_max_requests
                    .unwrap_or(security_defaults.rate_limit.max_requests),
                window: security_file
                    .rate_limit_window_secs
                    .map(Duration::from_secs)
                    .unwrap_or(security_defaults.rate_limit.window),
                block_duration: security_file
                    .rate_limit_block_secs
                    .map(Duration::from_secs)
                    .unwrap_or(security_defaults.rate_limit.block_duration),
            },
            csrf_token_ttl: security_file
                .csrf_token_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(security_defaults.csrf_token_ttl),
            enforce_csrf: security_file.enforce_csrf.unwrap_or(cli.enforce_csrf),
        };
        if security.rate_limit.max_requests == 0 {
            bail!("security.rate_limit_max_requests must be greater than 0");
        }
        check_security_duration("rate_limit_window_secs", security.rate_limit.window)?;
        check_security_duration("rate_limit_block_secs", security.rate_limit.block_duration)?;
        check_security_duration("csrf_token_ttl_secs", security.csrf_token_ttl)?;

        let backup_file = file.backup.unwrap_or_default();
        let backup_defaults = BackupSettings::default();
        let backup = BackupSettings {
            retention_days: backup_file
                .retention_days
                .unwrap_or(backup_defaults.retention_days),
            cleanup_interval_hours: backup_file
                .cleanup_interval_hours
                .unwrap_or(backup_defaults.cleanup_interval_hours),
        };
        if backup.retention_days <= 0 {
            bail!("backup.retention_days must be positive");
        }
        if backup.retention_days > MAX_RETENTION_DAYS {
            bail!(
                "backup.retention_days must be at most {}",
                MAX_RETENTION_DAYS
            );
        }
        if backup.cleanup_interval_hours > MAX_CLEANUP_INTERVAL_HOURS {
            bail!(
                "backup.cleanup_interval_hours must be at most {}",
                MAX_CLEANUP_INTERVAL_HOURS
            );
        }

        Ok(Self {
            db_dir,
            port,
            metrics_port,
            logging_level,
            frontend_dir_path,
            maintenance,
            security,
            backup,
        })
    }

    pub fn documents_db_path(&self) -> PathBuf {
        self.db_dir.join("documents.db")
    }

    pub fn server_db_path(&self) -> PathBuf {
        self.db_dir.join("server.db")
    }

    pub fn user_db_path(&self) -> PathBuf {
        self.db_dir.join("user.db")
    }
}

fn check_security_duration(name: &str, value: Duration) -> Result<()> {
    if value.is_zero() {
        bail!("security.{} must be greater than 0", name);
    }
    if value.as_secs() > MAX_SECURITY_DURATION_SECS {
        bail!(
            "security.{} must be at most {}",
            name,
            MAX_SECURITY_DURATION_SECS
        );
    }
    Ok(())
}

/// Case-insensitive, same names as the `--logging-level` flag.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
