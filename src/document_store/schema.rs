//! SQLite schema for the document database.
//!
//! Every collection shares one table; documents are keyed by (collection, id)
//! and carry their JSON payload plus its serialized size.

use crate::sqlite_column;
use crate::sqlite_persistence::{SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1 - Documents
// =============================================================================

const DOCUMENTS_TABLE_V1: Table = Table {
    name: "documents",
    columns: &[
        sqlite_column!("rowid_alias", &SqlType::Integer, is_primary_key = true), // AUTOINCREMENT
        sqlite_column!("collection", &SqlType::Text, non_null = true),
        sqlite_column!("doc_id", &SqlType::Text, non_null = true),
        sqlite_column!("data", &SqlType::Text, non_null = true),
        sqlite_column!("size_bytes", &SqlType::Integer, non_null = true),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true), // unix millis
    ],
    indices: &[(
        "idx_documents_collection_created",
        "collection, created_at DESC",
    )],
    unique_constraints: &[&["collection", "doc_id"]],
};

/// All versioned schemas for the document database.
///
/// Version 1: documents table
pub const DOCUMENT_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[DOCUMENTS_TABLE_V1],
    migration: None,
}];
