use super::{CacheClearSettings, CleanupStep, MaintenanceConfig, MaintenanceError};
use crate::document_store::DocumentStore;
use crate::server::metrics;
use crate::server_store::{MaintenanceJob, MaintenanceJobStatus, ServerStore, StepResult};
use anyhow::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Admin that requested a job.
#[derive(Debug, Clone)]
pub struct StartedBy {
    pub uid: String,
    pub email: Option<String>,
}

/// Result of [`MaintenanceRunner::start`]. `handle` is `None` when the request
/// was collapsed into a job that was already running.
pub struct JobStart {
    pub job_id: String,
    pub handle: Option<JoinHandle<()>>,
}

/// Progress after finishing step `index` (0-based) of `total`.
fn progress_after_step(index: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((index + 1) as f64 * 100.0 / total as f64).round() as u8
}

#[derive(Clone)]
pub struct MaintenanceRunner {
    server_store: Arc<dyn ServerStore>,
    document_store: Arc<dyn DocumentStore>,
    config: MaintenanceConfig,
    /// Settings of running jobs mapped to their id. Only filled when
    /// `collapse_concurrent_jobs` is on.
    in_flight: Arc<Mutex<HashMap<CacheClearSettings, String>>>,
}

impl MaintenanceRunner {
    pub fn new(
        server_store: Arc<dyn ServerStore>,
        document_store: Arc<dyn DocumentStore>,
        config: MaintenanceConfig,
    ) -> Self {
        Self {
            server_store,
            document_store,
            config,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &MaintenanceConfig {
        &self.config
    }

    /// Creates the job record and spawns the job. Returns as soon as the record
    /// exists; the work itself happens on a detached task.
    pub fn start(
        &self,
        settings: CacheClearSettings,
        description: Option<String>,
        started_by: &StartedBy,
    ) -> Result<JobStart, MaintenanceError> {
        let mut in_flight = self.in_flight.lock().unwrap();
        if self.config.collapse_concurrent_jobs {
            if let Some(existing) = in_flight.get(&settings) {
                info!(
                    "Cache clear requested by {} collapsed into running job {}",
                    started_by.uid, existing
                );
                return Ok(JobStart {
                    job_id: existing.clone(),
                    handle: None,
                });
            }
        }

        let steps = CleanupStep::enabled_steps(&settings);
        let job = MaintenanceJob {
            id: uuid::Uuid::new_v4().to_string(),
            status: MaintenanceJobStatus::InProgress,
            progress: 0,
            current_task: "Initializing".to_string(),
            cleared_items: vec![],
            total_items: steps.len(),
            cleared_size: 0,
            duration: None,
            error: None,
            step_results: vec![],
            settings,
            description,
            started_by: started_by.uid.clone(),
            started_by_email: started_by.email.clone(),
            started_at: Utc::now(),
            completed_at: None,
        };
        self.server_store
            .insert_maintenance_job(&job)
            .map_err(MaintenanceError::Store)?;

        if self.config.collapse_concurrent_jobs {
            in_flight.insert(settings, job.id.clone());
        }
        drop(in_flight);

        info!(
            "Starting cache clear job {} ({} steps) for {}",
            job.id,
            steps.len(),
            started_by.uid
        );

        let job_id = job.id.clone();
        let runner = self.clone();
        let handle = tokio::spawn(async move { runner.run_job(job, steps).await });

        Ok(JobStart {
            job_id,
            handle: Some(handle),
        })
    }

    pub fn get_job(&self, job_id: &str) -> Result<MaintenanceJob, MaintenanceError> {
        self.server_store
            .get_maintenance_job(job_id)?
            .ok_or_else(|| MaintenanceError::JobNotFound(job_id.to_string()))
    }

    pub fn recent_jobs(&self) -> Result<Vec<MaintenanceJob>, MaintenanceError> {
        Ok(self
            .server_store
            .list_recent_maintenance_jobs(self.config.recent_jobs_limit)?)
    }

    /// Deletes the record. A job that is still running fails on its next write.
    pub fn delete_job(&self, job_id: &str) -> Result<(), MaintenanceError> {
        if self.server_store.delete_maintenance_job(job_id)? {
            info!("Deleted cache clear job {}", job_id);
            Ok(())
        } else {
            Err(MaintenanceError::JobNotFound(job_id.to_string()))
        }
    }

    async fn run_job(self, mut job: MaintenanceJob, steps: Vec<CleanupStep>) {
        metrics::set_maintenance_job_running(1.0);
        let start_time = Instant::now();

        let result = self.execute(&mut job, &steps, start_time).await;
        let elapsed = start_time.elapsed();

        let status_label = match result {
            Ok(()) => {
                info!(
                    "Cache clear job {} completed in {:?}, cleared {} bytes",
                    job.id, elapsed, job.cleared_size
                );
                "completed"
            }
            Err(e) => {
                error!("Cache clear job {} failed after {:?}: {:#}", job.id, elapsed, e);
                job.status = MaintenanceJobStatus::Failed;
                job.error = Some(format!("{:#}", e));
                job.duration = None;
                job.completed_at = Some(Utc::now());
                if let Err(e) = self.server_store.update_maintenance_job(&job) {
                    error!("Failed to record failure of job {}: {:#}", job.id, e);
                }
                "failed"
            }
        };

        metrics::record_maintenance_job(status_label, elapsed);
        metrics::set_maintenance_job_running(-1.0);

        if self.config.collapse_concurrent_jobs {
            let mut in_flight = self.in_flight.lock().unwrap();
            if in_flight.get(&job.settings) == Some(&job.id) {
                in_flight.remove(&job.settings);
            }
        }
    }

    /// Runs every step and persists the completed record. Any error returned
    /// here fails the whole job; individual step failures do not.
    async fn execute(
        &self,
        job: &mut MaintenanceJob,
        steps: &[CleanupStep],
        start_time: Instant,
    ) -> Result<()> {
        let total = steps.len();

        for (index, step) in steps.iter().copied().enumerate() {
            job.current_task = step.display_name().to_string();
            job.progress = job.progress.max(progress_after_step(index, total));
            self.server_store.update_maintenance_job(job)?;

            let store = Arc::clone(&self.document_store);
            let retention = self.config.log_retention_count;
            let outcome =
                tokio::task::spawn_blocking(move || step.execute(store.as_ref(), retention)).await;

            let step_result = match outcome {
                Ok(Ok(summary)) => {
                    debug!(
                        "Job {}: {} removed {} documents ({} bytes)",
                        job.id,
                        step.display_name(),
                        summary.deleted,
                        summary.bytes
                    );
                    StepResult {
                        name: step.display_name().to_string(),
                        success: true,
                        items_deleted: summary.deleted,
                        size: summary.bytes,
                        error: None,
                    }
                }
                Ok(Err(e)) => {
                    warn!("Job {}: {} failed: {:#}", job.id, step.display_name(), e);
                    StepResult {
                        name: step.display_name().to_string(),
                        success: false,
                        items_deleted: 0,
                        size: 0,
                        error: Some(format!("{:#}", e)),
                    }
                }
                Err(e) => {
                    warn!("Job {}: {} panicked: {}", job.id, step.display_name(), e);
                    StepResult {
                        name: step.display_name().to_string(),
                        success: false,
                        items_deleted: 0,
                        size: 0,
                        error: Some(format!("Task panic: {}", e)),
                    }
                }
            };

            metrics::record_maintenance_step(
                step.collection().as_str(),
                step_result.success,
                step_result.size,
            );
            job.cleared_items.push(step_result.name.clone());
            job.cleared_size += step_result.size;
            job.step_results.push(step_result);
            self.server_store.update_maintenance_job(job)?;

            if index + 1 < total && !self.config.step_delay.is_zero() {
                tokio::time::sleep(self.config.step_delay).await;
            }
        }

        job.status = MaintenanceJobStatus::Completed;
        job.progress = 100;
        job.current_task = "Completed".to_string();
        job.duration = Some(start_time.elapsed().as_millis() as u64);
        job.completed_at = Some(Utc::now());
        self.server_store.update_maintenance_job(job)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_store::{
        Collection, DeletionSummary, Document, SqliteDocumentStore,
    };
    use crate::server_store::{
        BackupItem, CsrfTokenRecord, RateLimitRecord, SqliteServerStore,
    };
    use chrono::DateTime;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Delegates to SQLite but fails every operation touching `failing`.
    struct FlakyDocumentStore {
        inner: SqliteDocumentStore,
        failing: Collection,
    }

    impl DocumentStore for FlakyDocumentStore {
        fn put_document(
            &self,
            collection: Collection,
            id: &str,
            data: &serde_json::Value,
            created_at: DateTime<Utc>,
        ) -> Result<()> {
            self.inner.put_document(collection, id, data, created_at)
        }
        fn get_document(&self, collection: Collection, id: &str) -> Result<Option<Document>> {
            self.inner.get_document(collection, id)
        }
        fn delete_document(&self, collection: Collection, id: &str) -> Result<bool> {
            self.inner.delete_document(collection, id)
        }
        fn count_documents(&self, collection: Collection) -> Result<usize> {
            self.inner.count_documents(collection)
        }
        fn list_documents(&self, collection: Collection, limit: usize) -> Result<Vec<Document>> {
            self.inner.list_documents(collection, limit)
        }
        fn delete_collection(&self, collection: Collection) -> Result<DeletionSummary> {
            if collection == self.failing {
                anyhow::bail!("permission denied on {}", collection);
            }
            self.inner.delete_collection(collection)
        }
        fn delete_all_but_newest(
            &self,
            collection: Collection,
            keep: usize,
        ) -> Result<DeletionSummary> {
            if collection == self.failing {
                anyhow::bail!("permission denied on {}", collection);
            }
            self.inner.delete_all_but_newest(collection, keep)
        }
    }

    /// Delegates to SQLite but refuses to persist a completed job.
    struct RejectCompletionServerStore {
        inner: SqliteServerStore,
    }

    impl ServerStore for RejectCompletionServerStore {
        fn insert_maintenance_job(&self, job: &MaintenanceJob) -> Result<()> {
            self.inner.insert_maintenance_job(job)
        }
        fn update_maintenance_job(&self, job: &MaintenanceJob) -> Result<()> {
            if job.status == MaintenanceJobStatus::Completed {
                anyhow::bail!("disk full");
            }
            self.inner.update_maintenance_job(job)
        }
        fn get_maintenance_job(&self, id: &str) -> Result<Option<MaintenanceJob>> {
            self.inner.get_maintenance_job(id)
        }
        fn list_recent_maintenance_jobs(&self, limit: usize) -> Result<Vec<MaintenanceJob>> {
            self.inner.list_recent_maintenance_jobs(limit)
        }
        fn delete_maintenance_job(&self, id: &str) -> Result<bool> {
            self.inner.delete_maintenance_job(id)
        }
        fn get_in_progress_maintenance_jobs(&self) -> Result<Vec<MaintenanceJob>> {
            self.inner.get_in_progress_maintenance_jobs()
        }
        fn mark_stale_jobs_failed(&self) -> Result<usize> {
            self.inner.mark_stale_jobs_failed()
        }
        fn insert_backup(&self, backup: &BackupItem) -> Result<()> {
            self.inner.insert_backup(backup)
        }
        fn get_backup(&self, id: &str) -> Result<Option<BackupItem>> {
            self.inner.get_backup(id)
        }
        fn list_backups(&self) -> Result<Vec<BackupItem>> {
            self.inner.list_backups()
        }
        fn delete_backup(&self, id: &str) -> Result<bool> {
            self.inner.delete_backup(id)
        }
        fn delete_expired_backups(&self, now: DateTime<Utc>) -> Result<usize> {
            self.inner.delete_expired_backups(now)
        }
        fn get_rate_limit(&self, ip: &str) -> Result<Option<RateLimitRecord>> {
            self.inner.get_rate_limit(ip)
        }
        fn put_rate_limit(&self, ip: &str, record: &RateLimitRecord, now_ms: i64) -> Result<()> {
            self.inner.put_rate_limit(ip, record, now_ms)
        }
        fn prune_rate_limits(&self, stale_before_ms: i64, now_ms: i64) -> Result<usize> {
            self.inner.prune_rate_limits(stale_before_ms, now_ms)
        }
        fn put_csrf_token(&self, record: &CsrfTokenRecord) -> Result<()> {
            self.inner.put_csrf_token(record)
        }
        fn get_csrf_token(&self, user_id: &str) -> Result<Option<CsrfTokenRecord>> {
            self.inner.get_csrf_token(user_id)
        }
        fn delete_csrf_token(&self, user_id: &str) -> Result<bool> {
            self.inner.delete_csrf_token(user_id)
        }
    }

    struct Fixture {
        _dir: TempDir,
        server_store: Arc<dyn ServerStore>,
        document_store: Arc<dyn DocumentStore>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let server_store: Arc<dyn ServerStore> =
            Arc::new(SqliteServerStore::new(dir.path().join("server.db")).unwrap());
        let document_store: Arc<dyn DocumentStore> =
            Arc::new(SqliteDocumentStore::new(dir.path().join("documents.db")).unwrap());
        Fixture {
            _dir: dir,
            server_store,
            document_store,
        }
    }

    fn fast_config() -> MaintenanceConfig {
        MaintenanceConfig {
            step_delay: Duration::ZERO,
            ..MaintenanceConfig::default()
        }
    }

    fn admin() -> StartedBy {
        StartedBy {
            uid: "admin-1".to_string(),
            email: Some("admin@example.com".to_string()),
        }
    }

    fn seed(store: &dyn DocumentStore, collection: Collection, count: usize) {
        for i in 0..count {
            store
                .put_document(collection, &format!("doc-{}", i), &json!({"i": i}), Utc::now())
                .unwrap();
        }
    }

    #[test]
    fn progress_rounds_to_nearest_percent() {
        assert_eq!(progress_after_step(0, 3), 33);
        assert_eq!(progress_after_step(1, 3), 67);
        assert_eq!(progress_after_step(2, 3), 100);
        assert_eq!(progress_after_step(0, 6), 17);
        assert_eq!(progress_after_step(0, 0), 100);
    }

    #[tokio::test]
    async fn default_job_clears_caches_and_completes() {
        let f = fixture();
        seed(f.document_store.as_ref(), Collection::SystemCache, 3);
        seed(f.document_store.as_ref(), Collection::TempFiles, 2);
        seed(f.document_store.as_ref(), Collection::Logs, 4);

        let runner = MaintenanceRunner::new(
            Arc::clone(&f.server_store),
            Arc::clone(&f.document_store),
            fast_config(),
        );
        let started = runner
            .start(CacheClearSettings::default(), Some("weekly".into()), &admin())
            .unwrap();
        started.handle.unwrap().await.unwrap();

        let job = runner.get_job(&started.job_id).unwrap();
        assert_eq!(job.status, MaintenanceJobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.current_task, "Completed");
        assert_eq!(job.total_items, 5);
        assert_eq!(
            job.cleared_items,
            vec![
                "System Cache",
                "User Cache",
                "Analytics Cache",
                "Settings Cache",
                "Temporary Files"
            ]
        );
        assert!(job.cleared_size > 0);
        assert!(job.duration.is_some());
        assert!(job.completed_at.is_some());
        assert_eq!(job.started_by_email.as_deref(), Some("admin@example.com"));
        assert!(job.step_results.iter().all(|r| r.success));
        assert_eq!(job.step_results[0].items_deleted, 3);

        assert_eq!(
            f.document_store.count_documents(Collection::SystemCache).unwrap(),
            0
        );
        // Logs are opt-in.
        assert_eq!(f.document_store.count_documents(Collection::Logs).unwrap(), 4);
    }

    #[tokio::test]
    async fn failing_step_is_recorded_and_job_continues() {
        let dir = TempDir::new().unwrap();
        let server_store: Arc<dyn ServerStore> =
            Arc::new(SqliteServerStore::new(dir.path().join("server.db")).unwrap());
        let document_store: Arc<dyn DocumentStore> = Arc::new(FlakyDocumentStore {
            inner: SqliteDocumentStore::new(dir.path().join("documents.db")).unwrap(),
            failing: Collection::UserCache,
        });
        seed(document_store.as_ref(), Collection::SettingsCache, 2);

        let runner = MaintenanceRunner::new(server_store, document_store.clone(), fast_config());
        let settings = CacheClearSettings {
            clear_user_cache: true,
            clear_settings_cache: true,
            ..CacheClearSettings::none()
        };
        let started = runner.start(settings, None, &admin()).unwrap();
        started.handle.unwrap().await.unwrap();

        let job = runner.get_job(&started.job_id).unwrap();
        assert_eq!(job.status, MaintenanceJobStatus::Completed);
        assert_eq!(job.cleared_items, vec!["User Cache", "Settings Cache"]);

        let failed = &job.step_results[0];
        assert!(!failed.success);
        assert_eq!(failed.size, 0);
        assert!(failed.error.as_deref().unwrap().contains("permission denied"));
        assert!(job.step_results[1].success);
        assert_eq!(job.cleared_size, job.step_results[1].size);
        assert_eq!(
            document_store
                .count_documents(Collection::SettingsCache)
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn logs_step_keeps_configured_retention() {
        let f = fixture();
        seed(f.document_store.as_ref(), Collection::Logs, 10);

        let config = MaintenanceConfig {
            log_retention_count: 4,
            ..fast_config()
        };
        let runner =
            MaintenanceRunner::new(Arc::clone(&f.server_store), Arc::clone(&f.document_store), config);
        let settings = CacheClearSettings {
            clear_logs: true,
            ..CacheClearSettings::none()
        };
        let started = runner.start(settings, None, &admin()).unwrap();
        started.handle.unwrap().await.unwrap();

        let job = runner.get_job(&started.job_id).unwrap();
        assert_eq!(job.step_results[0].items_deleted, 6);
        assert_eq!(f.document_store.count_documents(Collection::Logs).unwrap(), 4);
    }

    #[tokio::test]
    async fn no_enabled_steps_completes_immediately() {
        let f = fixture();
        let runner = MaintenanceRunner::new(
            Arc::clone(&f.server_store),
            Arc::clone(&f.document_store),
            fast_config(),
        );
        let started = runner
            .start(CacheClearSettings::none(), None, &admin())
            .unwrap();
        started.handle.unwrap().await.unwrap();

        let job = runner.get_job(&started.job_id).unwrap();
        assert_eq!(job.status, MaintenanceJobStatus::Completed);
        assert_eq!(job.total_items, 0);
        assert_eq!(job.progress, 100);
        assert!(job.cleared_items.is_empty());
    }

    #[tokio::test]
    async fn failure_to_persist_completion_marks_job_failed() {
        let dir = TempDir::new().unwrap();
        let server_store: Arc<dyn ServerStore> = Arc::new(RejectCompletionServerStore {
            inner: SqliteServerStore::new(dir.path().join("server.db")).unwrap(),
        });
        let document_store: Arc<dyn DocumentStore> =
            Arc::new(SqliteDocumentStore::new(dir.path().join("documents.db")).unwrap());

        let runner = MaintenanceRunner::new(server_store, document_store, fast_config());
        let started = runner
            .start(CacheClearSettings::default(), None, &admin())
            .unwrap();
        started.handle.unwrap().await.unwrap();

        let job = runner.get_job(&started.job_id).unwrap();
        assert_eq!(job.status, MaintenanceJobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("disk full"));
        assert!(job.completed_at.is_some());
        assert_eq!(job.cleared_items.len(), 5);
    }

    #[tokio::test]
    async fn start_returns_before_job_finishes() {
        let f = fixture();
        let config = MaintenanceConfig {
            step_delay: Duration::from_millis(200),
            ..MaintenanceConfig::default()
        };
        let runner =
            MaintenanceRunner::new(Arc::clone(&f.server_store), Arc::clone(&f.document_store), config);

        let started = runner
            .start(CacheClearSettings::default(), None, &admin())
            .unwrap();
        let job = runner.get_job(&started.job_id).unwrap();
        assert_eq!(job.status, MaintenanceJobStatus::InProgress);

        started.handle.unwrap().await.unwrap();
        let job = runner.get_job(&started.job_id).unwrap();
        assert_eq!(job.status, MaintenanceJobStatus::Completed);
    }

    #[tokio::test]
    async fn concurrent_identical_jobs_are_collapsed_when_enabled() {
        let f = fixture();
        let config = MaintenanceConfig {
            step_delay: Duration::from_millis(100),
            collapse_concurrent_jobs: true,
            ..MaintenanceConfig::default()
        };
        let runner =
            MaintenanceRunner::new(Arc::clone(&f.server_store), Arc::clone(&f.document_store), config);

        let first = runner
            .start(CacheClearSettings::default(), None, &admin())
            .unwrap();
        let second = runner
            .start(CacheClearSettings::default(), None, &admin())
            .unwrap();
        assert_eq!(first.job_id, second.job_id);
        assert!(second.handle.is_none());

        let other = runner
            .start(CacheClearSettings::none(), None, &admin())
            .unwrap();
        assert_ne!(other.job_id, first.job_id);

        first.handle.unwrap().await.unwrap();
        let third = runner
            .start(CacheClearSettings::default(), None, &admin())
            .unwrap();
        assert_ne!(third.job_id, first.job_id);
    }

    #[tokio::test]
    async fn concurrent_jobs_run_independently_by_default() {
        let f = fixture();
        let runner = MaintenanceRunner::new(
            Arc::clone(&f.server_store),
            Arc::clone(&f.document_store),
            fast_config(),
        );

        let first = runner
            .start(CacheClearSettings::default(), None, &admin())
            .unwrap();
        let second = runner
            .start(CacheClearSettings::default(), None, &admin())
            .unwrap();
        assert_ne!(first.job_id, second.job_id);
        first.handle.unwrap().await.unwrap();
        second.handle.unwrap().await.unwrap();

        assert_eq!(runner.recent_jobs().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn delete_job_and_unknown_job() {
        let f = fixture();
        let runner = MaintenanceRunner::new(
            Arc::clone(&f.server_store),
            Arc::clone(&f.document_store),
            fast_config(),
        );
        let started = runner
            .start(CacheClearSettings::none(), None, &admin())
            .unwrap();
        started.handle.unwrap().await.unwrap();

        runner.delete_job(&started.job_id).unwrap();
        assert!(matches!(
            runner.delete_job(&started.job_id),
            Err(MaintenanceError::JobNotFound(_))
        ));
        assert!(matches!(
            runner.get_job(&started.job_id),
            Err(MaintenanceError::JobNotFound(_))
        ));
    }
}
