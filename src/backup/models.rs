use crate::server_store::BackupItem;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Backups expiring within this many days get the warning badge.
pub const EXPIRING_SOON_DAYS: i64 = 7;

const DAY_MS: f64 = 24.0 * 60.0 * 60.0 * 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryBadge {
    Expired,
    Warning,
    Normal,
}

/// A backup as shown in the admin listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupListing {
    #[serde(flatten)]
    pub item: BackupItem,
    pub can_recover: bool,
    /// Whole days left, rounded up. Zero or negative once expired.
    pub days_until_expiry: i64,
    pub expiry_badge: ExpiryBadge,
}

impl BackupListing {
    pub fn new(item: BackupItem, now: DateTime<Utc>) -> Self {
        let remaining_ms = (item.expires_at - now).num_milliseconds();
        let days_until_expiry = (remaining_ms as f64 / DAY_MS).ceil() as i64;
        let can_recover = item.can_recover(now);
        let expiry_badge = if !can_recover {
            ExpiryBadge::Expired
        } else if days_until_expiry <= EXPIRING_SOON_DAYS {
            ExpiryBadge::Warning
        } else {
            ExpiryBadge::Normal
        };
        Self {
            item,
            can_recover,
            days_until_expiry,
            expiry_badge,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStats {
    pub total: usize,
    pub recoverable: usize,
    pub expired: usize,
    pub expiring_soon: usize,
    pub companies: usize,
    pub users: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupList {
    pub backups: Vec<BackupListing>,
    pub stats: BackupStats,
}
