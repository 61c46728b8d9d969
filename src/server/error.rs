//! JSON error responses and the validated body extractor shared by the admin
//! routes.

use crate::backup::BackupError;
use crate::maintenance::MaintenanceError;
use crate::security::{sanitize_value, CsrfError};
use crate::server::metrics;

use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Too many requests")]
    TooManyRequests { retry_after_secs: Option<u64> },

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Validation(details) => json!({
                "success": false,
                "error": self.to_string(),
                "details": details,
            }),
            ApiError::Internal(e) => {
                error!("Request failed: {:#}", e);
                metrics::record_error("internal", "api");
                json!({ "success": false, "error": self.to_string() })
            }
            _ => json!({ "success": false, "error": self.to_string() }),
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::TooManyRequests {
            retry_after_secs: Some(secs),
        } = self
        {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<MaintenanceError> for ApiError {
    fn from(err: MaintenanceError) -> Self {
        match err {
            MaintenanceError::JobNotFound(_) => ApiError::NotFound(err.to_string()),
            MaintenanceError::Store(e) => ApiError::Internal(e),
        }
    }
}

impl From<BackupError> for ApiError {
    fn from(err: BackupError) -> Self {
        match err {
            BackupError::NotFound(_) | BackupError::EntityNotFound { .. } => {
                ApiError::NotFound(err.to_string())
            }
            BackupError::TypeMismatch { .. } | BackupError::Expired(_) => {
                ApiError::BadRequest(err.to_string())
            }
            BackupError::Store(e) => ApiError::Internal(e),
        }
    }
}

impl From<CsrfError> for ApiError {
    fn from(err: CsrfError) -> Self {
        match err {
            CsrfError::Store(e) => ApiError::Internal(e),
            CsrfError::Unauthenticated => ApiError::Unauthorized(err.to_string()),
            _ => ApiError::Forbidden(err.to_string()),
        }
    }
}

/// Field level checks run on the sanitized JSON object before it is
/// deserialized into the request type.
pub trait ValidateBody {
    fn validate(body: &Map<String, Value>) -> Vec<FieldError>;
}

pub fn expect_bool(body: &Map<String, Value>, field: &str, errors: &mut Vec<FieldError>) {
    match body.get(field) {
        None | Some(Value::Bool(_)) => {}
        Some(_) => errors.push(FieldError::new(field, "Expected a boolean")),
    }
}

/// Checks an optional string field. `null` counts as absent.
pub fn expect_optional_string(
    body: &Map<String, Value>,
    field: &str,
    max_len: usize,
    errors: &mut Vec<FieldError>,
) {
    match body.get(field) {
        None | Some(Value::Null) => {}
        Some(Value::String(s)) if s.chars().count() > max_len => errors.push(FieldError::new(
            field,
            format!("Must be at most {} characters", max_len),
        )),
        Some(Value::String(_)) => {}
        Some(_) => errors.push(FieldError::new(field, "Expected a string")),
    }
}

pub fn expect_non_empty_string(
    body: &Map<String, Value>,
    field: &str,
    errors: &mut Vec<FieldError>,
) {
    match body.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => {}
        Some(Value::String(_)) | None | Some(Value::Null) => {
            errors.push(FieldError::new(field, "Required"))
        }
        Some(_) => errors.push(FieldError::new(field, "Expected a string")),
    }
}

pub fn expect_one_of(
    body: &Map<String, Value>,
    field: &str,
    allowed: &[&str],
    errors: &mut Vec<FieldError>,
) {
    let ok = body
        .get(field)
        .and_then(Value::as_str)
        .is_some_and(|v| allowed.contains(&v));
    if !ok {
        errors.push(FieldError::new(
            field,
            format!("Must be one of: {}", allowed.join(", ")),
        ));
    }
}

/// JSON body that has been sanitized and validated. An empty body is read as
/// `{}`.
pub struct ValidatedJson<T>(pub T);

fn parse_validated<T>(bytes: &[u8]) -> Result<T, ApiError>
where
    T: DeserializeOwned + ValidateBody,
{
    let value: Value = if bytes.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Map::new())
    } else {
        serde_json::from_slice(bytes)
            .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))?
    };

    let value = sanitize_value(value);
    let object = match value.as_object() {
        Some(object) => object,
        None => {
            return Err(ApiError::Validation(vec![FieldError::new(
                "body",
                "Expected a JSON object",
            )]))
        }
    };

    let errors = T::validate(object);
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    serde_json::from_value(value)
        .map_err(|e| ApiError::Validation(vec![FieldError::new("body", e.to_string())]))
}

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + ValidateBody,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        parse_validated(&bytes).map(ValidatedJson)
    }
}
