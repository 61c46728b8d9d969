//! Backup management endpoints under `/v1/admin`.

use super::error::{expect_non_empty_string, expect_one_of, ApiError, FieldError, ValidateBody, ValidatedJson};
use super::session::AdminSession;
use super::state::ServerState;
use crate::backup::{BackupList, BackupRegistry};
use crate::server_store::BackupEntityType;

use axum::{
    extract::{Path, State},
    routing::{delete, get},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;

const ENTITY_TYPES: [&str; 2] = ["company", "user"];

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum BackupAction {
    Recover {
        #[serde(rename = "backupId")]
        backup_id: String,
        #[serde(rename = "type")]
        entity_type: BackupEntityType,
    },
    Cleanup,
}

impl ValidateBody for BackupAction {
    fn validate(body: &Map<String, Value>) -> Vec<FieldError> {
        let mut errors = vec![];
        expect_one_of(body, "action", &["recover", "cleanup"], &mut errors);
        if body.get("action").and_then(Value::as_str) == Some("recover") {
            expect_non_empty_string(body, "backupId", &mut errors);
            expect_one_of(body, "type", &ENTITY_TYPES, &mut errors);
        }
        errors
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SoftDeleteResponse {
    success: bool,
    backup_id: String,
}

async fn post_backup_action(
    session: AdminSession,
    State(registry): State<BackupRegistry>,
    ValidatedJson(action): ValidatedJson<BackupAction>,
) -> Result<Json<Value>, ApiError> {
    let now = Utc::now();
    match action {
        BackupAction::Recover {
            backup_id,
            entity_type,
        } => {
            let backup = registry.recover(backup_id.trim(), entity_type, now)?;
            info!(
                "Admin {} recovered {} {}",
                session.uid,
                entity_type,
                backup.original_id
            );
            Ok(Json(json!({
                "success": true,
                "message": format!("Recovered {} {}", entity_type, backup.original_id),
            })))
        }
        BackupAction::Cleanup => {
            let deleted = registry.cleanup_expired(now)?;
            Ok(Json(json!({ "success": true, "deletedCount": deleted })))
        }
    }
}

async fn get_backups(
    _session: AdminSession,
    State(registry): State<BackupRegistry>,
) -> Result<Json<BackupList>, ApiError> {
    Ok(Json(registry.list(Utc::now())?))
}

/// DELETE /entities/{type}/{id} - soft deletes a live company or user.
async fn delete_entity(
    session: AdminSession,
    State(registry): State<BackupRegistry>,
    Path((entity_type, id)): Path<(String, String)>,
) -> Result<Json<SoftDeleteResponse>, ApiError> {
    let entity_type = BackupEntityType::parse(&entity_type).ok_or_else(|| {
        ApiError::Validation(vec![FieldError::new(
            "type",
            format!("Must be one of: {}", ENTITY_TYPES.join(", ")),
        )])
    })?;
    let backup = registry.soft_delete(entity_type, &id, &session.uid, Utc::now())?;
    Ok(Json(SoftDeleteResponse {
        success: true,
        backup_id: backup.id,
    }))
}

pub fn make_backup_routes() -> Router<ServerState> {
    Router::new()
        .route(
            "/backup-management",
            get(get_backups).post(post_backup_action),
        )
        .route("/entities/{entity_type}/{id}", delete(delete_entity))
}
