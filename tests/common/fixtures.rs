//! Test fixture creation for the document, server and user databases

use super::constants::*;
use anyhow::Result;
use chathub_admin_server::document_store::{Collection, DocumentStore, SqliteDocumentStore};
use chathub_admin_server::server_store::{ServerStore, SqliteServerStore};
use chathub_admin_server::user::{SqliteUserStore, UserAuthTokenStore, UserStore};
use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

/// Stores backed by databases in a temporary directory, plus the auth
/// tokens of the seeded users.
pub struct TestStores {
    pub dir: TempDir,
    pub server_store: Arc<dyn ServerStore>,
    pub document_store: Arc<dyn DocumentStore>,
    pub user_store: Arc<SqliteUserStore>,
    pub admin_token: String,
    pub member_token: String,
}

const CACHE_COLLECTIONS: [Collection; 5] = [
    Collection::SystemCache,
    Collection::UserCache,
    Collection::AnalyticsCache,
    Collection::SettingsCache,
    Collection::TempFiles,
];

/// Creates the three databases, seeds documents and users, and issues a
/// token for each user.
pub fn create_test_stores() -> Result<TestStores> {
    let dir = TempDir::new()?;

    let server_store: Arc<dyn ServerStore> =
        Arc::new(SqliteServerStore::new(dir.path().join("server.db"))?);
    let document_store: Arc<dyn DocumentStore> =
        Arc::new(SqliteDocumentStore::new(dir.path().join("documents.db"))?);
    let user_store = Arc::new(SqliteUserStore::new(dir.path().join("user.db"))?);

    seed_documents(document_store.as_ref())?;

    user_store.create_user(ADMIN_UID, Some(ADMIN_EMAIL), true)?;
    user_store.create_user(MEMBER_UID, Some(MEMBER_EMAIL), false)?;
    let admin_token = user_store.add_auth_token(ADMIN_UID)?.0;
    let member_token = user_store.add_auth_token(MEMBER_UID)?.0;

    Ok(TestStores {
        dir,
        server_store,
        document_store,
        user_store,
        admin_token,
        member_token,
    })
}

fn seed_documents(store: &dyn DocumentStore) -> Result<()> {
    let now = Utc::now();

    for collection in CACHE_COLLECTIONS {
        for i in 0..CACHE_DOCS_PER_COLLECTION {
            store.put_document(
                collection,
                &format!("{}-{}", collection, i),
                &json!({ "key": i, "payload": "cached" }),
                now,
            )?;
        }
    }

    // Oldest first, one minute apart.
    for i in 0..LOG_DOCS {
        store.put_document(
            Collection::Logs,
            &format!("log-{}", i),
            &json!({ "level": "info", "message": format!("entry {}", i) }),
            now - Duration::minutes((LOG_DOCS - i) as i64),
        )?;
    }

    store.put_document(
        Collection::Companies,
        COMPANY_1_ID,
        &json!({ "name": "Acme Corp", "plan": "enterprise" }),
        now,
    )?;
    store.put_document(
        Collection::Companies,
        COMPANY_2_ID,
        &json!({ "name": "Globex", "plan": "starter" }),
        now,
    )?;
    store.put_document(
        Collection::Users,
        USER_DOC_1_ID,
        &json!({ "name": "Jane Doe", "companyId": COMPANY_1_ID }),
        now,
    )?;

    Ok(())
}
