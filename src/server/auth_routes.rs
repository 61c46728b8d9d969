use super::error::ApiError;
use super::session::AuthSession;
use super::state::ServerState;
use crate::security::{CsrfManager, IssuedCsrfToken};

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::debug;

/// GET /csrf - issues a fresh CSRF token, replacing the caller's previous one.
async fn get_csrf_token(
    session: AuthSession,
    State(csrf): State<CsrfManager>,
) -> Result<Json<IssuedCsrfToken>, ApiError> {
    Ok(Json(csrf.issue(&session.uid, Utc::now())?))
}

/// DELETE /csrf - drops the caller's CSRF token, if any.
async fn delete_csrf_token(
    session: AuthSession,
    State(csrf): State<CsrfManager>,
) -> Result<Json<Value>, ApiError> {
    let revoked = csrf.revoke(&session.uid)?;
    debug!("CSRF token of {} revoked: {}", session.uid, revoked);
    Ok(Json(json!({ "success": true, "revoked": revoked })))
}

pub fn make_auth_routes() -> Router<ServerState> {
    Router::new().route("/csrf", get(get_csrf_token).delete(delete_csrf_token))
}
