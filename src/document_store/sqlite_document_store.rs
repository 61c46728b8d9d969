use super::models::{Collection, DeletionSummary, Document};
use super::schema::DOCUMENT_VERSIONED_SCHEMAS;
use super::{DocumentStore, DELETE_BATCH_SIZE};
use crate::sqlite_persistence::open_versioned_database;
use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

pub struct SqliteDocumentStore {
    conn: Arc<Mutex<Connection>>,
}

fn conversion_error(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, message.into())
}

impl SqliteDocumentStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_database(
            db_path.as_ref(),
            DOCUMENT_VERSIONED_SCHEMAS,
            "document",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_document(row: &rusqlite::Row) -> rusqlite::Result<Document> {
        let collection_str: String = row.get("collection")?;
        let data_str: String = row.get("data")?;
        let created_at_ms: i64 = row.get("created_at")?;

        let collection = Collection::parse(&collection_str).ok_or_else(|| {
            conversion_error(format!("Unknown collection '{}'", collection_str))
        })?;
        let data = serde_json::from_str(&data_str)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;
        let created_at = Utc
            .timestamp_millis_opt(created_at_ms)
            .single()
            .ok_or_else(|| conversion_error(format!("Invalid timestamp {}", created_at_ms)))?;

        Ok(Document {
            collection,
            id: row.get("doc_id")?,
            data,
            created_at,
        })
    }

    /// Deletes the given rows in chunks, one transaction per chunk.
    fn delete_rows_in_batches(
        conn: &mut Connection,
        rows: &[(i64, i64)],
    ) -> Result<DeletionSummary> {
        let mut summary = DeletionSummary::default();
        for batch in rows.chunks(DELETE_BATCH_SIZE) {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare("DELETE FROM documents WHERE rowid_alias = ?1")?;
                for (row_id, size_bytes) in batch {
                    summary.deleted += stmt.execute(params![row_id])?;
                    summary.bytes += *size_bytes as u64;
                }
            }
            tx.commit()?;
            debug!("Committed delete batch of {} documents", batch.len());
        }
        Ok(summary)
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn put_document(
        &self,
        collection: Collection,
        id: &str,
        data: &serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let serialized = data.to_string();

        conn.execute(
            "INSERT INTO documents (collection, doc_id, data, size_bytes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(collection, doc_id) DO UPDATE SET data = ?3, size_bytes = ?4",
            params![
                collection.as_str(),
                id,
                serialized,
                serialized.len() as i64,
                created_at.timestamp_millis()
            ],
        )
        .with_context(|| format!("Failed to write document {}/{}", collection, id))?;

        Ok(())
    }

    fn get_document(&self, collection: Collection, id: &str) -> Result<Option<Document>> {
        let conn = self.conn.lock().unwrap();
        let document = conn
            .query_row(
                "SELECT collection, doc_id, data, created_at FROM documents
                 WHERE collection = ?1 AND doc_id = ?2",
                params![collection.as_str(), id],
                Self::row_to_document,
            )
            .optional()?;
        Ok(document)
    }

    fn delete_document(&self, collection: Collection, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND doc_id = ?2",
            params![collection.as_str(), id],
        )?;
        Ok(count > 0)
    }

    fn count_documents(&self, collection: Collection) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            params![collection.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn list_documents(&self, collection: Collection, limit: usize) -> Result<Vec<Document>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT collection, doc_id, data, created_at FROM documents
             WHERE collection = ?1 ORDER BY created_at DESC, doc_id DESC LIMIT ?2",
        )?;
        let documents = stmt
            .query_map(
                params![collection.as_str(), limit as i64],
                Self::row_to_document,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(documents)
    }

    fn delete_collection(&self, collection: Collection) -> Result<DeletionSummary> {
        let mut conn = self.conn.lock().unwrap();
        let rows = {
            let mut stmt = conn.prepare(
                "SELECT rowid_alias, size_bytes FROM documents WHERE collection = ?1",
            )?;
            let rows = stmt
                .query_map(params![collection.as_str()], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?
                .collect::<rusqlite::Result<Vec<(i64, i64)>>>()?;
            rows
        };
        Self::delete_rows_in_batches(&mut conn, &rows)
            .with_context(|| format!("Failed to clear collection {}", collection))
    }

    fn delete_all_but_newest(
        &self,
        collection: Collection,
        keep: usize,
    ) -> Result<DeletionSummary> {
        let mut conn = self.conn.lock().unwrap();
        let rows = {
            // LIMIT -1 means "no limit" in SQLite, OFFSET skips the retained ones.
            let mut stmt = conn.prepare(
                "SELECT rowid_alias, size_bytes FROM documents WHERE collection = ?1
                 ORDER BY created_at DESC, doc_id DESC LIMIT -1 OFFSET ?2",
            )?;
            let rows = stmt
                .query_map(params![collection.as_str(), keep as i64], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?
                .collect::<rusqlite::Result<Vec<(i64, i64)>>>()?;
            rows
        };
        Self::delete_rows_in_batches(&mut conn, &rows)
            .with_context(|| format!("Failed to prune collection {}", collection))
    }
}
