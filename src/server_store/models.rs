use crate::maintenance::CacheClearSettings;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Maintenance jobs
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceJobStatus {
    InProgress,
    Completed,
    Failed,
}

impl MaintenanceJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaintenanceJobStatus::InProgress => "in_progress",
            MaintenanceJobStatus::Completed => "completed",
            MaintenanceJobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(MaintenanceJobStatus::InProgress),
            "completed" => Some(MaintenanceJobStatus::Completed),
            "failed" => Some(MaintenanceJobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, MaintenanceJobStatus::InProgress)
    }
}

/// Outcome of one cleanup step inside a maintenance job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub name: String,
    pub success: bool,
    pub items_deleted: usize,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Persisted progress/status document for one maintenance run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceJob {
    pub id: String,
    pub status: MaintenanceJobStatus,
    pub progress: u8,
    pub current_task: String,
    pub cleared_items: Vec<String>,
    pub total_items: usize,
    pub cleared_size: u64,
    /// Milliseconds, set once the job completes.
    pub duration: Option<u64>,
    pub error: Option<String>,
    pub step_results: Vec<StepResult>,
    pub settings: CacheClearSettings,
    pub description: Option<String>,
    pub started_by: String,
    pub started_by_email: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Backups
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupEntityType {
    Company,
    User,
}

impl BackupEntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupEntityType::Company => "company",
            BackupEntityType::User => "user",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "company" => Some(BackupEntityType::Company),
            "user" => Some(BackupEntityType::User),
            _ => None,
        }
    }
}

impl std::fmt::Display for BackupEntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a soft-deleted entity, recoverable until `expires_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupItem {
    pub id: String,
    pub original_id: String,
    #[serde(rename = "type")]
    pub entity_type: BackupEntityType,
    pub data: serde_json::Value,
    pub deleted_at: DateTime<Utc>,
    pub deleted_by: String,
    pub expires_at: DateTime<Utc>,
}

impl BackupItem {
    pub fn can_recover(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

// =============================================================================
// Rate limiting
// =============================================================================

/// Per-IP request history. Timestamps are unix milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitRecord {
    pub requests: Vec<i64>,
    pub blocked: bool,
    pub block_until: Option<i64>,
}

// =============================================================================
// CSRF
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfTokenRecord {
    pub user_id: String,
    /// Hex encoded SHA-256 digest of the issued token.
    pub token_digest: String,
    pub expires_at: DateTime<Utc>,
}
