use serde::{Deserialize, Serialize};

/// Which cleanup steps a maintenance job runs.
///
/// Every flag defaults to `true` except `clear_logs`, which has to be asked for
/// explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheClearSettings {
    pub clear_system_cache: bool,
    pub clear_user_cache: bool,
    pub clear_analytics_cache: bool,
    pub clear_settings_cache: bool,
    pub clear_temp_files: bool,
    pub clear_logs: bool,
}

impl Default for CacheClearSettings {
    fn default() -> Self {
        Self {
            clear_system_cache: true,
            clear_user_cache: true,
            clear_analytics_cache: true,
            clear_settings_cache: true,
            clear_temp_files: true,
            clear_logs: false,
        }
    }
}

impl CacheClearSettings {
    /// Settings with every step disabled, handy as a base for builders.
    pub fn none() -> Self {
        Self {
            clear_system_cache: false,
            clear_user_cache: false,
            clear_analytics_cache: false,
            clear_settings_cache: false,
            clear_temp_files: false,
            clear_logs: false,
        }
    }
}
