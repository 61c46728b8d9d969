use super::auth::{AuthToken, AuthTokenValue};
use super::user_models::User;
use super::user_store::{UserAuthTokenStore, UserStore};
use crate::sqlite_column;
use crate::sqlite_persistence::{open_versioned_database, SqlType, Table, VersionedSchema};
use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

const USER_TABLE_V1: Table = Table {
    name: "user",
    columns: &[
        sqlite_column!("uid", &SqlType::Text, is_primary_key = true),
        sqlite_column!("email", &SqlType::Text),
        sqlite_column!(
            "is_admin",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("created", &SqlType::Integer, non_null = true), // unix seconds
    ],
    indices: &[],
    unique_constraints: &[],
};

const AUTH_TOKEN_TABLE_V1: Table = Table {
    name: "auth_token",
    columns: &[
        sqlite_column!("value", &SqlType::Text, is_primary_key = true),
        sqlite_column!("uid", &SqlType::Text, non_null = true),
        sqlite_column!("created", &SqlType::Integer, non_null = true),
        sqlite_column!("last_used", &SqlType::Integer),
    ],
    indices: &[("idx_auth_token_uid", "uid")],
    unique_constraints: &[],
};

pub const USER_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[USER_TABLE_V1, AUTH_TOKEN_TABLE_V1],
    migration: None,
}];

fn datetime_from_column_result(value: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(value, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[derive(Clone)]
pub struct SqliteUserStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteUserStore {
    pub fn new<T: AsRef<Path>>(db_path: T) -> Result<Self> {
        let conn = open_versioned_database(db_path.as_ref(), USER_VERSIONED_SCHEMAS, "user")?;
        Ok(SqliteUserStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        let is_admin: i64 = row.get("is_admin")?;
        Ok(User {
            uid: row.get("uid")?,
            email: row.get("email")?,
            is_admin: is_admin != 0,
            created_at: datetime_from_column_result(row.get("created")?),
        })
    }

    fn row_to_token(row: &rusqlite::Row) -> rusqlite::Result<AuthToken> {
        Ok(AuthToken {
            value: AuthTokenValue(row.get("value")?),
            uid: row.get("uid")?,
            created: datetime_from_column_result(row.get("created")?),
            last_used: row
                .get::<&str, Option<i64>>("last_used")?
                .map(datetime_from_column_result),
        })
    }
}

impl UserStore for SqliteUserStore {
    fn create_user(&self, uid: &str, email: Option<&str>, is_admin: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO user (uid, email, is_admin, created) VALUES (?1, ?2, ?3, ?4)",
            params![uid, email, is_admin as i64, Utc::now().timestamp()],
        )
        .with_context(|| format!("Failed to create user {}", uid))?;
        Ok(())
    }

    fn get_user(&self, uid: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().unwrap();
        let user = conn
            .query_row(
                "SELECT uid, email, is_admin, created FROM user WHERE uid = ?1",
                params![uid],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT uid, email, is_admin, created FROM user ORDER BY uid")?;
        let users = stmt
            .query_map([], Self::row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    fn set_admin(&self, uid: &str, is_admin: bool) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "UPDATE user SET is_admin = ?2 WHERE uid = ?1",
            params![uid, is_admin as i64],
        )?;
        Ok(count > 0)
    }
}

impl UserAuthTokenStore for SqliteUserStore {
    fn add_auth_token(&self, uid: &str) -> Result<AuthTokenValue> {
        let value = AuthTokenValue::generate();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO auth_token (value, uid, created) VALUES (?1, ?2, ?3)",
            params![value.0, uid, Utc::now().timestamp()],
        )
        .with_context(|| format!("Failed to add auth token for {}", uid))?;
        Ok(value)
    }

    fn resolve_auth_token(&self, token: &AuthTokenValue) -> Result<Option<AuthToken>> {
        let conn = self.conn.lock().unwrap();
        let found = conn
            .query_row(
                "SELECT value, uid, created, last_used FROM auth_token WHERE value = ?1",
                params![token.0],
                Self::row_to_token,
            )
            .optional()?;
        if found.is_some() {
            conn.execute(
                "UPDATE auth_token SET last_used = ?2 WHERE value = ?1",
                params![token.0, Utc::now().timestamp()],
            )?;
        }
        Ok(found)
    }

    fn delete_auth_token(&self, token: &AuthTokenValue) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute("DELETE FROM auth_token WHERE value = ?1", params![token.0])?;
        Ok(count > 0)
    }

    fn get_all_auth_tokens(&self, uid: &str) -> Result<Vec<AuthToken>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT value, uid, created, last_used FROM auth_token WHERE uid = ?1
             ORDER BY created DESC",
        )?;
        let tokens = stmt
            .query_map(params![uid], Self::row_to_token)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tokens)
    }
}
