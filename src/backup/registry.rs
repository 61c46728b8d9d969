use super::models::{BackupList, BackupListing, BackupStats, ExpiryBadge};
use super::BackupError;
use crate::document_store::{Collection, DocumentStore};
use crate::server::metrics;
use crate::server_store::{BackupEntityType, BackupItem, ServerStore};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_RETENTION_DAYS: i64 = 30;

fn live_collection(entity_type: BackupEntityType) -> Collection {
    match entity_type {
        BackupEntityType::Company => Collection::Companies,
        BackupEntityType::User => Collection::Users,
    }
}

#[derive(Clone)]
pub struct BackupRegistry {
    server_store: Arc<dyn ServerStore>,
    document_store: Arc<dyn DocumentStore>,
    retention: Duration,
}

impl BackupRegistry {
    pub fn new(
        server_store: Arc<dyn ServerStore>,
        document_store: Arc<dyn DocumentStore>,
        retention: Duration,
    ) -> Self {
        Self {
            server_store,
            document_store,
            retention,
        }
    }

    /// Moves a live company or user into a backup that can be recovered for
    /// the retention period.
    pub fn soft_delete(
        &self,
        entity_type: BackupEntityType,
        original_id: &str,
        deleted_by: &str,
        now: DateTime<Utc>,
    ) -> Result<BackupItem, BackupError> {
        let collection = live_collection(entity_type);
        let document = self
            .document_store
            .get_document(collection, original_id)?
            .ok_or_else(|| BackupError::EntityNotFound {
                entity_type,
                id: original_id.to_string(),
            })?;

        let expires_at = now.checked_add_signed(self.retention).ok_or_else(|| {
            anyhow::anyhow!("Retention of {} overflows the expiry date", self.retention)
        })?;
        let backup = BackupItem {
            id: uuid::Uuid::new_v4().to_string(),
            original_id: original_id.to_string(),
            entity_type,
            data: document.data,
            deleted_at: now,
            deleted_by: deleted_by.to_string(),
            expires_at,
        };
        // Backup first, so a failure in between never loses the entity.
        self.server_store.insert_backup(&backup)?;
        self.document_store.delete_document(collection, original_id)?;

        metrics::record_backup_operation("soft_delete", entity_type.as_str());
        info!(
            "Soft deleted {} {} into backup {} (by {})",
            entity_type, original_id, backup.id, deleted_by
        );
        Ok(backup)
    }

    /// Restores the backup into its live collection and removes the backup.
    /// Nothing changes unless every check passes.
    pub fn recover(
        &self,
        backup_id: &str,
        entity_type: BackupEntityType,
        now: DateTime<Utc>,
    ) -> Result<BackupItem, BackupError> {
        let backup = self
            .server_store
            .get_backup(backup_id)?
            .ok_or_else(|| BackupError::NotFound(backup_id.to_string()))?;

        if backup.entity_type != entity_type {
            return Err(BackupError::TypeMismatch {
                expected: backup.entity_type,
                actual: entity_type,
            });
        }
        if !backup.can_recover(now) {
            return Err(BackupError::Expired(backup_id.to_string()));
        }

        self.document_store.put_document(
            live_collection(entity_type),
            &backup.original_id,
            &backup.data,
            now,
        )?;
        self.server_store.delete_backup(backup_id)?;

        metrics::record_backup_operation("recover", entity_type.as_str());
        info!(
            "Recovered {} {} from backup {}",
            entity_type, backup.original_id, backup_id
        );
        Ok(backup)
    }

    pub fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<usize, BackupError> {
        let purged = self.server_store.delete_expired_backups(now)?;
        if purged > 0 {
            metrics::record_backups_purged(purged);
            info!("Purged {} expired backups", purged);
        }
        Ok(purged)
    }

    pub fn list(&self, now: DateTime<Utc>) -> Result<BackupList, BackupError> {
        let backups: Vec<BackupListing> = self
            .server_store
            .list_backups()?
            .into_iter()
            .map(|item| BackupListing::new(item, now))
            .collect();

        let mut stats = BackupStats {
            total: backups.len(),
            ..BackupStats::default()
        };
        for listing in &backups {
            if listing.can_recover {
                stats.recoverable += 1;
            } else {
                stats.expired += 1;
            }
            if listing.expiry_badge == ExpiryBadge::Warning {
                stats.expiring_soon += 1;
            }
            match listing.item.entity_type {
                BackupEntityType::Company => stats.companies += 1,
                BackupEntityType::User => stats.users += 1,
            }
        }

        Ok(BackupList { backups, stats })
    }
}
