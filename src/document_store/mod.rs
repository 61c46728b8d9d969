//! Collection-oriented document storage.
//!
//! Cache categories, logs and the live `companies`/`users` entities all live here.
//! Handlers and the maintenance runner only see the [`DocumentStore`] trait.

mod models;
mod schema;
mod sqlite_document_store;

pub use models::{Collection, DeletionSummary, Document};
pub use schema::DOCUMENT_VERSIONED_SCHEMAS;
pub use sqlite_document_store::SqliteDocumentStore;

use anyhow::Result;
use chrono::{DateTime, Utc};

/// Maximum number of documents removed per write batch.
pub const DELETE_BATCH_SIZE: usize = 500;

pub trait DocumentStore: Send + Sync {
    /// Insert or replace a document. On replace the original creation time is kept.
    fn put_document(
        &self,
        collection: Collection,
        id: &str,
        data: &serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Result<()>;

    fn get_document(&self, collection: Collection, id: &str) -> Result<Option<Document>>;

    /// Returns true if a document was removed.
    fn delete_document(&self, collection: Collection, id: &str) -> Result<bool>;

    fn count_documents(&self, collection: Collection) -> Result<usize>;

    /// Newest first.
    fn list_documents(&self, collection: Collection, limit: usize) -> Result<Vec<Document>>;

    /// Removes every document of the collection in batches of [`DELETE_BATCH_SIZE`].
    fn delete_collection(&self, collection: Collection) -> Result<DeletionSummary>;

    /// Keeps the `keep` newest documents and removes everything older.
    fn delete_all_but_newest(&self, collection: Collection, keep: usize)
        -> Result<DeletionSummary>;
}
