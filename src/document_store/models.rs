use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Logical collections held by the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    SystemCache,
    UserCache,
    AnalyticsCache,
    SettingsCache,
    TempFiles,
    Logs,
    Companies,
    Users,
}

impl Collection {
    pub const ALL: [Collection; 8] = [
        Collection::SystemCache,
        Collection::UserCache,
        Collection::AnalyticsCache,
        Collection::SettingsCache,
        Collection::TempFiles,
        Collection::Logs,
        Collection::Companies,
        Collection::Users,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::SystemCache => "system_cache",
            Collection::UserCache => "user_cache",
            Collection::AnalyticsCache => "analytics_cache",
            Collection::SettingsCache => "settings_cache",
            Collection::TempFiles => "temp_files",
            Collection::Logs => "logs",
            Collection::Companies => "companies",
            Collection::Users => "users",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single stored document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub collection: Collection,
    pub id: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// What a bulk delete removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeletionSummary {
    pub deleted: usize,
    /// Summed size of the serialized documents that were removed.
    pub bytes: u64,
}

impl DeletionSummary {
    pub fn merge(self, other: DeletionSummary) -> DeletionSummary {
        DeletionSummary {
            deleted: self.deleted + other.deleted,
            bytes: self.bytes + other.bytes,
        }
    }
}
