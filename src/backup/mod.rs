//! Soft-deleted companies and users, recoverable for a fixed window.

mod models;
mod registry;

pub use models::{BackupList, BackupListing, BackupStats, ExpiryBadge, EXPIRING_SOON_DAYS};
pub use registry::{BackupRegistry, DEFAULT_RETENTION_DAYS};

use crate::server_store::BackupEntityType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Backup not found: {0}")]
    NotFound(String),

    #[error("Backup is a {expected}, not a {actual}")]
    TypeMismatch {
        expected: BackupEntityType,
        actual: BackupEntityType,
    },

    #[error("Backup {0} has expired and can no longer be recovered")]
    Expired(String),

    #[error("No live {entity_type} with id {id}")]
    EntityNotFound {
        entity_type: BackupEntityType,
        id: String,
    },

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}
