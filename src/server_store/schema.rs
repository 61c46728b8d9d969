//! SQLite schema definitions for the server database.
//!
//! This module defines the database schema for storing maintenance job records,
//! soft-delete backups, per-IP rate limit history and CSRF tokens.

use crate::sqlite_column;
use crate::sqlite_persistence::{SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1 - Maintenance jobs and backups
// =============================================================================

/// Maintenance jobs table - one row per cache clearing run
const MAINTENANCE_JOBS_TABLE_V1: Table = Table {
    name: "maintenance_jobs",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true), // UUID
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("progress", &SqlType::Integer, non_null = true),
        sqlite_column!("current_task", &SqlType::Text, non_null = true),
        sqlite_column!("cleared_items", &SqlType::Text, non_null = true), // JSON array
        sqlite_column!("total_items", &SqlType::Integer, non_null = true),
        sqlite_column!("cleared_size", &SqlType::Integer, non_null = true),
        sqlite_column!("duration_ms", &SqlType::Integer),
        sqlite_column!("error", &SqlType::Text),
        sqlite_column!("step_results", &SqlType::Text, non_null = true), // JSON array
        sqlite_column!("settings", &SqlType::Text, non_null = true),     // JSON object
        sqlite_column!("description", &SqlType::Text),
        sqlite_column!("started_by", &SqlType::Text, non_null = true),
        sqlite_column!("started_by_email", &SqlType::Text),
        sqlite_column!("started_at", &SqlType::Text, non_null = true), // RFC3339
        sqlite_column!("completed_at", &SqlType::Text),
    ],
    indices: &[
        ("idx_maintenance_jobs_started_at", "started_at DESC"),
        ("idx_maintenance_jobs_status", "status"),
    ],
    unique_constraints: &[],
};

/// Backups table - snapshots of soft-deleted companies and users
const BACKUPS_TABLE_V1: Table = Table {
    name: "backups",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true), // UUID
        sqlite_column!("original_id", &SqlType::Text, non_null = true),
        sqlite_column!("entity_type", &SqlType::Text, non_null = true), // 'company' or 'user'
        sqlite_column!("data", &SqlType::Text, non_null = true),        // JSON
        sqlite_column!("deleted_at", &SqlType::Text, non_null = true),
        sqlite_column!("deleted_by", &SqlType::Text, non_null = true),
        sqlite_column!("expires_at", &SqlType::Text, non_null = true),
    ],
    indices: &[
        ("idx_backups_expires_at", "expires_at"),
        ("idx_backups_deleted_at", "deleted_at DESC"),
    ],
    unique_constraints: &[],
};

// =============================================================================
// Version 2 - Rate limits and CSRF tokens
// =============================================================================

/// Rate limits table - sliding window request history per client IP
const RATE_LIMITS_TABLE_V2: Table = Table {
    name: "rate_limits",
    columns: &[
        sqlite_column!("ip", &SqlType::Text, is_primary_key = true),
        sqlite_column!("requests", &SqlType::Text, non_null = true), // JSON array of unix millis
        sqlite_column!(
            "blocked",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("block_until", &SqlType::Integer),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_rate_limits_updated_at", "updated_at")],
    unique_constraints: &[],
};

/// CSRF tokens table - one active token digest per user
const CSRF_TOKENS_TABLE_V2: Table = Table {
    name: "csrf_tokens",
    columns: &[
        sqlite_column!("user_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("token_digest", &SqlType::Text, non_null = true),
        sqlite_column!("expires_at", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

/// Migration from version 1 to version 2: add rate_limits and csrf_tokens tables
fn migrate_v1_to_v2(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE rate_limits (
            ip TEXT PRIMARY KEY,
            requests TEXT NOT NULL,
            blocked INTEGER NOT NULL DEFAULT 0,
            block_until INTEGER,
            updated_at INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX idx_rate_limits_updated_at ON rate_limits(updated_at)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE csrf_tokens (
            user_id TEXT PRIMARY KEY,
            token_digest TEXT NOT NULL,
            expires_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

// =============================================================================
// Versioned Schema Definition
// =============================================================================

/// All versioned schemas for the server database.
///
/// Version 1: Maintenance jobs and backups tables
/// Version 2: Rate limits and CSRF tokens tables
pub const SERVER_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[MAINTENANCE_JOBS_TABLE_V1, BACKUPS_TABLE_V1],
        migration: None, // Initial version has no migration
    },
    VersionedSchema {
        version: 2,
        tables: &[
            MAINTENANCE_JOBS_TABLE_V1,
            BACKUPS_TABLE_V1,
            RATE_LIMITS_TABLE_V2,
            CSRF_TOKENS_TABLE_V2,
        ],
        migration: Some(migrate_v1_to_v2),
    },
];
