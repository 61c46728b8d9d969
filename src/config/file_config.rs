use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,
    pub frontend_dir_path: Option<String>,

    pub maintenance: Option<MaintenanceFileConfig>,
    pub security: Option<SecurityFileConfig>,
    pub backup: Option<BackupFileConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct MaintenanceFileConfig {
    pub step_delay_ms: Option<u64>,
    pub log_retention_count: Option<usize>,
    pub recent_jobs_limit: Option<usize>,
    pub collapse_concurrent_jobs: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SecurityFileConfig {
    pub rate_limit_max_requests: Option<usize>,
    pub rate_limit_window_secs: Option<u64>,
    pub rate_limit_block_secs: Option<u64>,
    pub csrf_token_ttl_secs: Option<u64>,
    pub enforce_csrf: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct BackupFileConfig {
    pub retention_days: Option<i64>,
    /// 0 disables the periodic cleanup.
    pub cleanup_interval_hours: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
