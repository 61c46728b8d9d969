//! Per-user CSRF tokens.
//!
//! Only the SHA-256 digest of an issued token is stored. Verification hashes
//! the presented candidate and compares digests in constant time.

use crate::server_store::{CsrfTokenRecord, ServerStore};
use axum::http::{header, HeaderMap};
use chrono::{DateTime, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const CSRF_HEADER: &str = "x-csrf-token";
pub const CSRF_FORM_FIELD: &str = "csrf_token";
pub const CSRF_TOKEN_LENGTH: usize = 48;
pub const DEFAULT_CSRF_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Error)]
pub enum CsrfError {
    #[error("No CSRF token presented")]
    Missing,

    #[error("Request is not authenticated")]
    Unauthenticated,

    #[error("No CSRF token issued for user {0}")]
    NotIssued(String),

    #[error("CSRF token expired")]
    Expired,

    #[error("CSRF token mismatch")]
    Mismatch,

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl CsrfError {
    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            CsrfError::Missing => "missing",
            CsrfError::Unauthenticated => "unauthenticated",
            CsrfError::NotIssued(_) => "not_issued",
            CsrfError::Expired => "expired",
            CsrfError::Mismatch => "mismatch",
            CsrfError::Store(_) => "store",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCsrfToken {
    pub csrf_token: String,
    pub expires_at: DateTime<Utc>,
}

fn digest_hex(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Finds the candidate token of a request. First match wins, in order:
/// `Authorization: Bearer`, the `X-CSRF-Token` header, then the `csrf_token`
/// field of a url-encoded form body.
pub fn extract_csrf_token(headers: &HeaderMap, form_body: Option<&[u8]>) -> Option<String> {
    if let Some(bearer) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return Some(bearer.to_string());
    }

    if let Some(value) = headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return Some(value.to_string());
    }

    form_body.and_then(form_field_token)
}

fn form_field_token(body: &[u8]) -> Option<String> {
    let body = std::str::from_utf8(body).ok()?;
    body.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key != CSRF_FORM_FIELD {
            return None;
        }
        let value = value.replace('+', " ");
        let decoded = urlencoding::decode(&value).ok()?.into_owned();
        if decoded.is_empty() {
            None
        } else {
            Some(decoded)
        }
    })
}

/// Whether the request body should be read for a form token.
pub fn is_form_request(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false)
}

#[derive(Clone)]
pub struct CsrfManager {
    store: Arc<dyn ServerStore>,
    ttl: Duration,
}

impl CsrfManager {
    pub fn new(store: Arc<dyn ServerStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Issues a fresh token for the user, replacing any previous one.
    pub fn issue(&self, uid: &str, now: DateTime<Utc>) -> Result<IssuedCsrfToken, CsrfError> {
        let token: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(CSRF_TOKEN_LENGTH)
            .map(char::from)
            .collect();
        let expires_at = chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| anyhow::anyhow!("CSRF token TTL {:?} is out of range", self.ttl))?;

        self.store.put_csrf_token(&CsrfTokenRecord {
            user_id: uid.to_string(),
            token_digest: digest_hex(&token),
            expires_at,
        })?;

        Ok(IssuedCsrfToken {
            csrf_token: token,
            expires_at,
        })
    }

    pub fn verify(
        &self,
        uid: Option<&str>,
        candidate: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), CsrfError> {
        let candidate = candidate.ok_or(CsrfError::Missing)?;
        let uid = uid.ok_or(CsrfError::Unauthenticated)?;
        let stored = self
            .store
            .get_csrf_token(uid)?
            .ok_or_else(|| CsrfError::NotIssued(uid.to_string()))?;

        if now >= stored.expires_at {
            return Err(CsrfError::Expired);
        }
        if !constant_time_eq(
            digest_hex(candidate).as_bytes(),
            stored.token_digest.as_bytes(),
        ) {
            return Err(CsrfError::Mismatch);
        }
        Ok(())
    }

    pub fn revoke(&self, uid: &str) -> Result<bool, CsrfError> {
        Ok(self.store.delete_csrf_token(uid)?)
    }
}
