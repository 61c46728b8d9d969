use super::models::{
    BackupEntityType, BackupItem, CsrfTokenRecord, MaintenanceJob, MaintenanceJobStatus,
    RateLimitRecord,
};
use super::schema::SERVER_VERSIONED_SCHEMAS;
use super::ServerStore;
use crate::sqlite_persistence::open_versioned_database;
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

const INTERRUPTED_JOB_MESSAGE: &str = "Job was interrupted (server restart)";

const MAINTENANCE_JOB_COLUMNS: &str = "id, status, progress, current_task, cleared_items, \
     total_items, cleared_size, duration_ms, error, step_results, settings, description, \
     started_by, started_by_email, started_at, completed_at";

const BACKUP_COLUMNS: &str =
    "id, original_id, entity_type, data, deleted_at, deleted_by, expires_at";

fn conversion_error(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, message.into())
}

pub struct SqliteServerStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteServerStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_database(db_path.as_ref(), SERVER_VERSIONED_SCHEMAS, "server")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Fixed-width UTC timestamps, so text ordering matches time ordering.
    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn parse_datetime(s: &str) -> rusqlite::Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
    }

    fn parse_json<T: DeserializeOwned>(s: &str) -> rusqlite::Result<T> {
        serde_json::from_str(s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
    }

    fn row_to_maintenance_job(row: &rusqlite::Row) -> rusqlite::Result<MaintenanceJob> {
        let status_str: String = row.get("status")?;
        let status = MaintenanceJobStatus::parse(&status_str).ok_or_else(|| {
            conversion_error(format!("Unknown maintenance job status '{}'", status_str))
        })?;

        let cleared_items_str: String = row.get("cleared_items")?;
        let step_results_str: String = row.get("step_results")?;
        let settings_str: String = row.get("settings")?;
        let started_at_str: String = row.get("started_at")?;
        let completed_at_str: Option<String> = row.get("completed_at")?;
        let progress: i64 = row.get("progress")?;
        let total_items: i64 = row.get("total_items")?;
        let cleared_size: i64 = row.get("cleared_size")?;
        let duration_ms: Option<i64> = row.get("duration_ms")?;

        Ok(MaintenanceJob {
            id: row.get("id")?,
            status,
            progress: progress.clamp(0, 100) as u8,
            current_task: row.get("current_task")?,
            cleared_items: Self::parse_json(&cleared_items_str)?,
            total_items: total_items.max(0) as usize,
            cleared_size: cleared_size.max(0) as u64,
            duration: duration_ms.map(|d| d.max(0) as u64),
            error: row.get("error")?,
            step_results: Self::parse_json(&step_results_str)?,
            settings: Self::parse_json(&settings_str)?,
            description: row.get("description")?,
            started_by: row.get("started_by")?,
            started_by_email: row.get("started_by_email")?,
            started_at: Self::parse_datetime(&started_at_str)?,
            completed_at: completed_at_str
                .map(|s| Self::parse_datetime(&s))
                .transpose()?,
        })
    }

    fn row_to_backup(row: &rusqlite::Row) -> rusqlite::Result<BackupItem> {
        let entity_type_str: String = row.get("entity_type")?;
        let data_str: String = row.get("data")?;
        let deleted_at_str: String = row.get("deleted_at")?;
        let expires_at_str: String = row.get("expires_at")?;

        Ok(BackupItem {
            id: row.get("id")?,
            original_id: row.get("original_id")?,
            entity_type: BackupEntityType::parse(&entity_type_str).ok_or_else(|| {
                conversion_error(format!("Unknown backup entity type '{}'", entity_type_str))
            })?,
            data: Self::parse_json(&data_str)?,
            deleted_at: Self::parse_datetime(&deleted_at_str)?,
            deleted_by: row.get("deleted_by")?,
            expires_at: Self::parse_datetime(&expires_at_str)?,
        })
    }

    fn job_json_fields(job: &MaintenanceJob) -> Result<(String, String, String)> {
        Ok((
            serde_json::to_string(&job.cleared_items)?,
            serde_json::to_string(&job.step_results)?,
            serde_json::to_string(&job.settings)?,
        ))
    }
}

impl ServerStore for SqliteServerStore {
    fn insert_maintenance_job(&self, job: &MaintenanceJob) -> Result<()> {
        let (cleared_items, step_results, settings) = Self::job_json_fields(job)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO maintenance_jobs ({}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                MAINTENANCE_JOB_COLUMNS
            ),
            params![
                job.id,
                job.status.as_str(),
                job.progress as i64,
                job.current_task,
                cleared_items,
                job.total_items as i64,
                job.cleared_size as i64,
                job.duration.map(|d| d as i64),
                job.error,
                step_results,
                settings,
                job.description,
                job.started_by,
                job.started_by_email,
                Self::format_datetime(&job.started_at),
                job.completed_at.as_ref().map(Self::format_datetime),
            ],
        )
        .with_context(|| format!("Failed to insert maintenance job {}", job.id))?;
        Ok(())
    }

    fn update_maintenance_job(&self, job: &MaintenanceJob) -> Result<()> {
        let (cleared_items, step_results, _) = Self::job_json_fields(job)?;
        let conn = self.conn.lock().unwrap();
        let updated = conn
            .execute(
                "UPDATE maintenance_jobs SET status = ?2, progress = ?3, current_task = ?4,
                 cleared_items = ?5, total_items = ?6, cleared_size = ?7, duration_ms = ?8,
                 error = ?9, step_results = ?10, completed_at = ?11
                 WHERE id = ?1",
                params![
                    job.id,
                    job.status.as_str(),
                    job.progress as i64,
                    job.current_task,
                    cleared_items,
                    job.total_items as i64,
                    job.cleared_size as i64,
                    job.duration.map(|d| d as i64),
                    job.error,
                    step_results,
                    job.completed_at.as_ref().map(Self::format_datetime),
                ],
            )
            .with_context(|| format!("Failed to update maintenance job {}", job.id))?;
        if updated == 0 {
            anyhow::bail!("Maintenance job {} does not exist", job.id);
        }
        Ok(())
    }

    fn get_maintenance_job(&self, id: &str) -> Result<Option<MaintenanceJob>> {
        let conn = self.conn.lock().unwrap();
        let job = conn
            .query_row(
                &format!(
                    "SELECT {} FROM maintenance_jobs WHERE id = ?1",
                    MAINTENANCE_JOB_COLUMNS
                ),
                params![id],
                Self::row_to_maintenance_job,
            )
            .optional()?;
        Ok(job)
    }

    fn list_recent_maintenance_jobs(&self, limit: usize) -> Result<Vec<MaintenanceJob>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM maintenance_jobs ORDER BY started_at DESC, rowid DESC LIMIT ?1",
            MAINTENANCE_JOB_COLUMNS
        ))?;
        let jobs = stmt
            .query_map(params![limit as i64], Self::row_to_maintenance_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    fn delete_maintenance_job(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute("DELETE FROM maintenance_jobs WHERE id = ?1", params![id])?;
        Ok(count > 0)
    }

    fn get_in_progress_maintenance_jobs(&self) -> Result<Vec<MaintenanceJob>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM maintenance_jobs WHERE status = ?1 ORDER BY started_at DESC",
            MAINTENANCE_JOB_COLUMNS
        ))?;
        let jobs = stmt
            .query_map(
                params![MaintenanceJobStatus::InProgress.as_str()],
                Self::row_to_maintenance_job,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    fn mark_stale_jobs_failed(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let now = Self::format_datetime(&Utc::now());

        let count = conn.execute(
            "UPDATE maintenance_jobs SET status = ?1, completed_at = ?2, error = ?3
             WHERE status = ?4",
            params![
                MaintenanceJobStatus::Failed.as_str(),
                now,
                INTERRUPTED_JOB_MESSAGE,
                MaintenanceJobStatus::InProgress.as_str()
            ],
        )?;

        if count > 0 {
            info!("Marked {} interrupted maintenance jobs as failed", count);
        }
        Ok(count)
    }

    fn insert_backup(&self, backup: &BackupItem) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO backups ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                BACKUP_COLUMNS
            ),
            params![
                backup.id,
                backup.original_id,
                backup.entity_type.as_str(),
                backup.data.to_string(),
                Self::format_datetime(&backup.deleted_at),
                backup.deleted_by,
                Self::format_datetime(&backup.expires_at),
            ],
        )
        .with_context(|| format!("Failed to insert backup {}", backup.id))?;
        Ok(())
    }

    fn get_backup(&self, id: &str) -> Result<Option<BackupItem>> {
        let conn = self.conn.lock().unwrap();
        let backup = conn
            .query_row(
                &format!("SELECT {} FROM backups WHERE id = ?1", BACKUP_COLUMNS),
                params![id],
                Self::row_to_backup,
            )
            .optional()?;
        Ok(backup)
    }

    fn list_backups(&self) -> Result<Vec<BackupItem>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM backups ORDER BY deleted_at DESC, rowid DESC",
            BACKUP_COLUMNS
        ))?;
        let backups = stmt
            .query_map([], Self::row_to_backup)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(backups)
    }

    fn delete_backup(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute("DELETE FROM backups WHERE id = ?1", params![id])?;
        Ok(count > 0)
    }

    fn delete_expired_backups(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "DELETE FROM backups WHERE expires_at <= ?1",
            params![Self::format_datetime(&now)],
        )?;
        Ok(count)
    }

    fn get_rate_limit(&self, ip: &str) -> Result<Option<RateLimitRecord>> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                "SELECT requests, blocked, block_until FROM rate_limits WHERE ip = ?1",
                params![ip],
                |row| {
                    let requests_str: String = row.get(0)?;
                    let blocked: i64 = row.get(1)?;
                    Ok(RateLimitRecord {
                        requests: Self::parse_json(&requests_str)?,
                        blocked: blocked != 0,
                        block_until: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn put_rate_limit(&self, ip: &str, record: &RateLimitRecord, now_ms: i64) -> Result<()> {
        let requests = serde_json::to_string(&record.requests)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO rate_limits (ip, requests, blocked, block_until, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(ip) DO UPDATE SET
                requests = ?2, blocked = ?3, block_until = ?4, updated_at = ?5",
            params![
                ip,
                requests,
                record.blocked as i64,
                record.block_until,
                now_ms
            ],
        )?;
        Ok(())
    }

    fn prune_rate_limits(&self, stale_before_ms: i64, now_ms: i64) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "DELETE FROM rate_limits
             WHERE updated_at < ?1 AND (block_until IS NULL OR block_until <= ?2)",
            params![stale_before_ms, now_ms],
        )?;
        Ok(count)
    }

    fn put_csrf_token(&self, record: &CsrfTokenRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO csrf_tokens (user_id, token_digest, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET token_digest = ?2, expires_at = ?3",
            params![
                record.user_id,
                record.token_digest,
                Self::format_datetime(&record.expires_at)
            ],
        )?;
        Ok(())
    }

    fn get_csrf_token(&self, user_id: &str) -> Result<Option<CsrfTokenRecord>> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                "SELECT user_id, token_digest, expires_at FROM csrf_tokens WHERE user_id = ?1",
                params![user_id],
                |row| {
                    let expires_at_str: String = row.get(2)?;
                    Ok(CsrfTokenRecord {
                        user_id: row.get(0)?,
                        token_digest: row.get(1)?,
                        expires_at: Self::parse_datetime(&expires_at_str)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn delete_csrf_token(&self, user_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "DELETE FROM csrf_tokens WHERE user_id = ?1",
            params![user_id],
        )?;
        Ok(count > 0)
    }
}
