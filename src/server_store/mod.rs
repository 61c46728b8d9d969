mod models;
mod schema;
mod sqlite_server_store;

pub use models::*;
pub use schema::SERVER_VERSIONED_SCHEMAS;
pub use sqlite_server_store::SqliteServerStore;

use anyhow::Result;
use chrono::{DateTime, Utc};

pub trait ServerStore: Send + Sync {
    // Maintenance jobs
    fn insert_maintenance_job(&self, job: &MaintenanceJob) -> Result<()>;
    /// Overwrites every mutable field of an existing job record.
    fn update_maintenance_job(&self, job: &MaintenanceJob) -> Result<()>;
    fn get_maintenance_job(&self, id: &str) -> Result<Option<MaintenanceJob>>;
    /// Most recently started first.
    fn list_recent_maintenance_jobs(&self, limit: usize) -> Result<Vec<MaintenanceJob>>;
    fn delete_maintenance_job(&self, id: &str) -> Result<bool>;
    fn get_in_progress_maintenance_jobs(&self) -> Result<Vec<MaintenanceJob>>;
    /// Marks every job still `in_progress` as failed. Used on startup, when no
    /// job can possibly be running.
    fn mark_stale_jobs_failed(&self) -> Result<usize>;

    // Backups
    fn insert_backup(&self, backup: &BackupItem) -> Result<()>;
    fn get_backup(&self, id: &str) -> Result<Option<BackupItem>>;
    /// Most recently deleted first.
    fn list_backups(&self) -> Result<Vec<BackupItem>>;
    fn delete_backup(&self, id: &str) -> Result<bool>;
    /// Removes backups whose `expires_at` is at or before `now`.
    fn delete_expired_backups(&self, now: DateTime<Utc>) -> Result<usize>;

    // Rate limiting
    fn get_rate_limit(&self, ip: &str) -> Result<Option<RateLimitRecord>>;
    fn put_rate_limit(&self, ip: &str, record: &RateLimitRecord, now_ms: i64) -> Result<()>;
    /// Drops records not touched since `stale_before_ms` whose block, if any,
    /// has run out by `now_ms`.
    fn prune_rate_limits(&self, stale_before_ms: i64, now_ms: i64) -> Result<usize>;

    // CSRF tokens
    fn put_csrf_token(&self, record: &CsrfTokenRecord) -> Result<()>;
    fn get_csrf_token(&self, user_id: &str) -> Result<Option<CsrfTokenRecord>>;
    fn delete_csrf_token(&self, user_id: &str) -> Result<bool>;
}
