//! Security middleware for the API routes.
//!
//! Order per request: rate limit, CSRF check on mutating methods, handler,
//! then the remaining-requests header. Hardening headers are added to every
//! response by [`security_headers`], which wraps the whole app.

use super::metric_path;
use super::super::session::extract_session_token;
use super::super::state::ServerState;
use crate::security::csrf::{extract_csrf_token, is_form_request};
use crate::security::{apply_security_headers, client_ip, CsrfError, RATE_LIMIT_REMAINING_HEADER};
use crate::server::error::ApiError;
use crate::server::metrics::{record_csrf_failure, record_rate_limit_hit};

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::net::SocketAddr;
use tracing::{debug, error, warn};

/// Form bodies above this size are not searched for a CSRF token.
const MAX_FORM_BODY_BYTES: usize = 64 * 1024;

fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

pub async fn security_headers(mut response: Response) -> Response {
    apply_security_headers(response.headers_mut());
    response
}

pub async fn security_layer(
    State(state): State<ServerState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let now = Utc::now();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(request.headers(), peer);
    let path = request.uri().path().to_string();

    // Fails open on store errors.
    let decision = match state.rate_limiter.check_rate_limit(&ip, now.timestamp_millis()) {
        Ok(decision) => Some(decision),
        Err(e) => {
            error!("Rate limit check failed for {}: {:#}", ip, e);
            None
        }
    };

    if let Some(decision) = decision.filter(|d| !d.allowed) {
        warn!(
            "Rate limit exceeded: {} {} ip={}",
            request.method(),
            path,
            ip
        );
        record_rate_limit_hit(&metric_path(&path));
        let mut response = ApiError::TooManyRequests {
            retry_after_secs: decision.retry_after_secs(),
        }
        .into_response();
        response
            .headers_mut()
            .insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(0));
        return response;
    }

    let request = if is_mutating(request.method()) {
        match check_csrf(&state, request, now).await {
            Ok(request) => request,
            Err(response) => return response,
        }
    } else {
        request
    };

    let mut response = next.run(request).await;
    if let Some(decision) = decision {
        response.headers_mut().insert(
            RATE_LIMIT_REMAINING_HEADER,
            HeaderValue::from(decision.remaining),
        );
    }
    response
}

/// Declared length of a url-encoded body. Bodies without a `Content-Length`
/// are never buffered.
fn form_body_length(headers: &HeaderMap) -> Option<usize> {
    if !is_form_request(headers) {
        return None;
    }
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Verifies the CSRF token of a mutating request. Failures are logged and let
/// through unless enforcement is on. Url-encoded form bodies up to
/// [`MAX_FORM_BODY_BYTES`] are buffered to look for the token field and handed
/// back untouched; larger ones are passed on without being searched.
async fn check_csrf(
    state: &ServerState,
    request: Request<Body>,
    now: chrono::DateTime<Utc>,
) -> Result<Request<Body>, Response> {
    let (parts, body) = request.into_parts();

    let (body, form_bytes) = match form_body_length(&parts.headers) {
        Some(length) if length <= MAX_FORM_BODY_BYTES => {
            match axum::body::to_bytes(body, MAX_FORM_BODY_BYTES).await {
                Ok(bytes) => (Body::from(bytes.clone()), Some(bytes)),
                Err(e) => {
                    debug!("Could not buffer form body: {:?}", e);
                    return Err(
                        ApiError::BadRequest("Could not read request body".to_string())
                            .into_response(),
                    );
                }
            }
        }
        Some(length) => {
            debug!(
                "Form body of {} bytes is too large to search for a CSRF token",
                length
            );
            (body, None)
        }
        None => (body, None),
    };

    let uid = match extract_session_token(&parts.headers) {
        Some(token) => match state.user_store.resolve_auth_token(&token) {
            Ok(auth_token) => auth_token.map(|t| t.uid),
            Err(e) => {
                error!("Failed to resolve auth token for CSRF check: {:#}", e);
                None
            }
        },
        None => None,
    };
    let candidate = extract_csrf_token(&parts.headers, form_bytes.as_deref());

    let enforced = state.config.enforce_csrf;
    if let Err(e) = state
        .csrf_manager
        .verify(uid.as_deref(), candidate.as_deref(), now)
    {
        record_csrf_failure(e.reason(), enforced);
        if enforced {
            warn!(
                "Rejecting {} {}: CSRF validation failed ({})",
                parts.method, parts.uri, e
            );
            let response = match e {
                CsrfError::Store(e) => ApiError::Internal(e),
                _ => ApiError::Forbidden("Invalid CSRF token".to_string()),
            };
            return Err(response.into_response());
        }
        warn!(
            "CSRF validation failed for {} {} ({}), continuing",
            parts.method, parts.uri, e
        );
    }

    Ok(Request::from_parts(parts, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_state_changing_methods_are_checked() {
        assert!(is_mutating(&Method::POST));
        assert!(is_mutating(&Method::PUT));
        assert!(is_mutating(&Method::PATCH));
        assert!(is_mutating(&Method::DELETE));
        assert!(!is_mutating(&Method::GET));
        assert!(!is_mutating(&Method::HEAD));
        assert!(!is_mutating(&Method::OPTIONS));
    }
}
