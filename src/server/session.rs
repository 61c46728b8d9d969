use super::state::ServerState;
use crate::user::auth::AuthTokenValue;

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde_json::json;
use tracing::{debug, error};

pub const COOKIE_SESSION_TOKEN_KEY: &str = "session_token";

/// Any caller holding a valid auth token.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub uid: String,
    pub token: String,
}

/// A caller whose user record exists and carries the admin flag.
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub uid: String,
    pub email: Option<String>,
}

#[derive(Debug)]
pub enum SessionExtractionError {
    Unauthenticated,
    UserNotFound,
    NotAdmin,
    InternalError,
}

impl IntoResponse for SessionExtractionError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            SessionExtractionError::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, "Authentication required")
            }
            SessionExtractionError::UserNotFound => (StatusCode::NOT_FOUND, "User not found"),
            SessionExtractionError::NotAdmin => {
                (StatusCode::UNAUTHORIZED, "Admin privileges required")
            }
            SessionExtractionError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };
        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}

/// Session token from the `session_token` cookie, else the `Authorization`
/// header with or without its `Bearer ` prefix.
pub fn extract_session_token(headers: &HeaderMap) -> Option<AuthTokenValue> {
    let from_cookie = CookieJar::from_headers(headers)
        .get(COOKIE_SESSION_TOKEN_KEY)
        .map(Cookie::value)
        .filter(|v| !v.is_empty())
        .map(|v| AuthTokenValue(v.to_string()));
    if from_cookie.is_some() {
        return from_cookie;
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(AuthTokenValue::from_header_value)
}

fn resolve_auth_session(
    headers: &HeaderMap,
    ctx: &ServerState,
) -> Result<Option<AuthSession>, SessionExtractionError> {
    let token = match extract_session_token(headers) {
        None => {
            debug!("No token in cookies nor headers.");
            return Ok(None);
        }
        Some(x) => x,
    };

    match ctx.user_store.resolve_auth_token(&token) {
        Ok(Some(auth_token)) => Ok(Some(AuthSession {
            uid: auth_token.uid,
            token: auth_token.value.0,
        })),
        Ok(None) => {
            debug!("Auth token not found in database");
            Ok(None)
        }
        Err(e) => {
            error!("Failed to resolve auth token: {:#}", e);
            Err(SessionExtractionError::InternalError)
        }
    }
}

impl FromRequestParts<ServerState> for AuthSession {
    type Rejection = SessionExtractionError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        resolve_auth_session(&parts.headers, ctx)?.ok_or(SessionExtractionError::Unauthenticated)
    }
}

impl OptionalFromRequestParts<ServerState> for AuthSession {
    type Rejection = SessionExtractionError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Option<Self>, Self::Rejection> {
        resolve_auth_session(&parts.headers, ctx)
    }
}

impl FromRequestParts<ServerState> for AdminSession {
    type Rejection = SessionExtractionError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        let session =
            <AuthSession as FromRequestParts<ServerState>>::from_request_parts(parts, ctx).await?;
        let user = match ctx.user_store.get_user(&session.uid) {
            Ok(Some(user)) => user,
            Ok(None) => {
                debug!("Token of {} resolved but no user record exists", session.uid);
                return Err(SessionExtractionError::UserNotFound);
            }
            Err(e) => {
                error!("Failed to load user {}: {:#}", session.uid, e);
                return Err(SessionExtractionError::InternalError);
            }
        };
        if !user.is_admin {
            debug!("User {} is not an admin", user.uid);
            return Err(SessionExtractionError::NotAdmin);
        }
        Ok(AdminSession {
            uid: user.uid,
            email: user.email,
        })
    }
}
