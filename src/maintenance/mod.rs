//! Cache clearing jobs.
//!
//! A job is started from an HTTP handler, persisted immediately and then run on
//! a detached task that walks the enabled [`CleanupStep`]s in order, writing
//! progress back to the job record after every step.

mod runner;
mod settings;
mod step;

pub use runner::{JobStart, MaintenanceRunner, StartedBy};
pub use settings::CacheClearSettings;
pub use step::CleanupStep;

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MaintenanceError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// Pause between two consecutive steps.
    pub step_delay: Duration,
    /// Number of newest log entries the logs step keeps.
    pub log_retention_count: usize,
    pub recent_jobs_limit: usize,
    /// Reuse a running job with identical settings instead of starting another.
    pub collapse_concurrent_jobs: bool,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_millis(500),
            log_retention_count: 1000,
            recent_jobs_limit: 50,
            collapse_concurrent_jobs: false,
        }
    }
}
