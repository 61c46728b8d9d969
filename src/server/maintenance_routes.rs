//! Cache clear endpoints under `/v1/admin/cache/clear`.

use super::error::{expect_bool, expect_optional_string, ApiError, FieldError, ValidateBody, ValidatedJson};
use super::session::AdminSession;
use super::state::ServerState;
use crate::maintenance::{CacheClearSettings, MaintenanceRunner, StartedBy};

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const MAX_DESCRIPTION_LENGTH: usize = 500;

const SETTINGS_FIELDS: [&str; 6] = [
    "clearSystemCache",
    "clearUserCache",
    "clearAnalyticsCache",
    "clearSettingsCache",
    "clearTempFiles",
    "clearLogs",
];

#[derive(Debug, Deserialize)]
struct CacheClearRequest {
    #[serde(flatten)]
    settings: CacheClearSettings,
    #[serde(default)]
    description: Option<String>,
}

impl ValidateBody for CacheClearRequest {
    fn validate(body: &Map<String, Value>) -> Vec<FieldError> {
        let mut errors = vec![];
        for field in SETTINGS_FIELDS {
            expect_bool(body, field, &mut errors);
        }
        expect_optional_string(body, "description", MAX_DESCRIPTION_LENGTH, &mut errors);
        errors
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CacheClearStarted {
    success: bool,
    cache_clear_id: String,
}

#[derive(Debug, Deserialize)]
struct JobQuery {
    id: Option<String>,
}

/// POST - starts a cache clear job and returns its id without waiting for it.
async fn post_cache_clear(
    session: AdminSession,
    State(runner): State<MaintenanceRunner>,
    ValidatedJson(request): ValidatedJson<CacheClearRequest>,
) -> Result<Json<CacheClearStarted>, ApiError> {
    let description = request.description.filter(|d| !d.trim().is_empty());
    let started = runner.start(
        request.settings,
        description,
        &StartedBy {
            uid: session.uid,
            email: session.email,
        },
    )?;
    Ok(Json(CacheClearStarted {
        success: true,
        cache_clear_id: started.job_id,
    }))
}

/// GET - one job by `?id=`, otherwise the most recent jobs, newest first.
async fn get_cache_clear(
    _session: AdminSession,
    State(runner): State<MaintenanceRunner>,
    Query(query): Query<JobQuery>,
) -> Result<Response, ApiError> {
    match query.id.filter(|id| !id.is_empty()) {
        Some(id) => Ok(Json(runner.get_job(&id)?).into_response()),
        None => {
            let jobs = runner.recent_jobs()?;
            Ok(Json(json!({ "jobs": jobs })).into_response())
        }
    }
}

async fn delete_cache_clear(
    _session: AdminSession,
    State(runner): State<MaintenanceRunner>,
    Query(query): Query<JobQuery>,
) -> Result<Json<Value>, ApiError> {
    let id = query
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing id parameter".to_string()))?;
    runner.delete_job(&id)?;
    Ok(Json(json!({ "success": true })))
}

pub fn make_maintenance_routes() -> Router<ServerState> {
    Router::new().route(
        "/cache/clear",
        get(get_cache_clear)
            .post(post_cache_clear)
            .delete(delete_cache_clear),
    )
}
