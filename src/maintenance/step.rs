use super::CacheClearSettings;
use crate::document_store::{Collection, DeletionSummary, DocumentStore};
use anyhow::Result;

/// A named cleanup step. Declaration order is execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CleanupStep {
    SystemCache,
    UserCache,
    AnalyticsCache,
    SettingsCache,
    TempFiles,
    Logs,
}

impl CleanupStep {
    pub const ALL: [CleanupStep; 6] = [
        CleanupStep::SystemCache,
        CleanupStep::UserCache,
        CleanupStep::AnalyticsCache,
        CleanupStep::SettingsCache,
        CleanupStep::TempFiles,
        CleanupStep::Logs,
    ];

    /// Human readable name, recorded in `clearedItems` and `currentTask`.
    pub fn display_name(&self) -> &'static str {
        match self {
            CleanupStep::SystemCache => "System Cache",
            CleanupStep::UserCache => "User Cache",
            CleanupStep::AnalyticsCache => "Analytics Cache",
            CleanupStep::SettingsCache => "Settings Cache",
            CleanupStep::TempFiles => "Temporary Files",
            CleanupStep::Logs => "Logs",
        }
    }

    pub fn collection(&self) -> Collection {
        match self {
            CleanupStep::SystemCache => Collection::SystemCache,
            CleanupStep::UserCache => Collection::UserCache,
            CleanupStep::AnalyticsCache => Collection::AnalyticsCache,
            CleanupStep::SettingsCache => Collection::SettingsCache,
            CleanupStep::TempFiles => Collection::TempFiles,
            CleanupStep::Logs => Collection::Logs,
        }
    }

    pub fn is_enabled(&self, settings: &CacheClearSettings) -> bool {
        match self {
            CleanupStep::SystemCache => settings.clear_system_cache,
            CleanupStep::UserCache => settings.clear_user_cache,
            CleanupStep::AnalyticsCache => settings.clear_analytics_cache,
            CleanupStep::SettingsCache => settings.clear_settings_cache,
            CleanupStep::TempFiles => settings.clear_temp_files,
            CleanupStep::Logs => settings.clear_logs,
        }
    }

    pub fn enabled_steps(settings: &CacheClearSettings) -> Vec<CleanupStep> {
        Self::ALL
            .into_iter()
            .filter(|step| step.is_enabled(settings))
            .collect()
    }

    /// Runs the step against the store. Cache steps empty their collection, the
    /// logs step keeps the newest `log_retention_count` entries.
    pub fn execute(
        &self,
        store: &dyn DocumentStore,
        log_retention_count: usize,
    ) -> Result<DeletionSummary> {
        match self {
            CleanupStep::Logs => store.delete_all_but_newest(self.collection(), log_retention_count),
            _ => store.delete_collection(self.collection()),
        }
    }
}
